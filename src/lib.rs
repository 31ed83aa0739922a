//! The command-execution core of a small Unix shell.
//!
//! A line of input goes through a [`source::Source`] cursor, the tokenizer
//! in [`lexer`] and the command-tree builder in [`parser`]. Each command is
//! then expanded and split into arguments and redirections by [`resolve`],
//! and the [`executor`] maps the pipeline onto processes through a
//! [`launcher::Launcher`]: either the real one, which forks, pipes, redirects
//! and execs, or the dry-run one, which only reports what it would do.
//!
//! The main entry point is [`Interpreter`], which drives the control flow of
//! a line (`;`, `&&`, `||`, `&`) and hosts the builtins.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod executor;
pub mod expand;
pub mod external;
mod interpreter;
pub mod jobs;
pub mod launcher;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod source;
pub mod timeline;

/// Just a convenient re-export of the command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;

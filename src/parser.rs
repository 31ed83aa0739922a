//! Command-tree builder.
//!
//! The parser does not interpret redirections: `<`, `>` and `>>` and their
//! targets become ordinary children of the command, in source order, for the
//! resolver to pick up later.

use crate::lexer::{self, Token};
use crate::source::Source;
use thiserror::Error;

/// Maximum number of commands in one pipeline.
pub const MAX_PIPELINE: usize = 64;

/// Kind of a node in the command tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of one simple command.
    Command,
    /// One raw, unexpanded token.
    Word,
}

/// A node of the command tree. Each node owns its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub kind: NodeKind,
    /// Raw token text for `Word` nodes, empty for `Command` nodes.
    pub text: String,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    /// An empty `Command` node.
    pub fn command() -> Self {
        Self {
            kind: NodeKind::Command,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// A `Word` leaf holding `text` verbatim.
    pub fn word(text: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Word,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: CommandNode) {
        self.children.push(child);
    }

    /// A command without children stands for a blank fragment and is a no-op.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Raw text of the children in source order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| c.text.as_str())
    }
}

/// Errors that abort the construction of the current line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// More than [`MAX_PIPELINE`] commands were chained with `|`.
    #[error("pipeline too long (at most {MAX_PIPELINE} commands)")]
    PipelineTooLong,
}

/// Build one simple command starting with `first`.
///
/// Tokens are consumed until a newline, one of `&&`, `||`, `;`, `|`, `&`, or
/// end-of-input. A stopping newline or operator is given back to `src` so the
/// caller sees it next.
pub fn parse_simple_command(first: Token, src: &mut Source) -> CommandNode {
    let mut cmd = CommandNode::command();
    let mut tok = first;

    loop {
        match &tok {
            Token::EndOfInput => break,
            Token::Newline => {
                tok.unread(src);
                break;
            }
            Token::Operator(op) if op.ends_command() => {
                tok.unread(src);
                break;
            }
            Token::Operator(op) => cmd.add_child(CommandNode::word(op.as_str())),
            Token::Word(text) => cmd.add_child(CommandNode::word(text.as_str())),
        }
        tok = lexer::tokenize(src);
    }

    cmd
}

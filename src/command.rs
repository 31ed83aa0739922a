use crate::interpreter::Interpreter;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Termination by signal `n` is reported as `128 + n`.
pub type ExitCode = i32;

/// Object-safe trait for a command that runs inside the interpreter process.
///
/// Builtins implement it through a blanket impl; argument errors are
/// represented by a command that only prints a usage message.
pub trait ExecutableCommand {
    /// Executes the command, writing its output to `stdout`.
    ///
    /// The interpreter is handed over mutably so that commands such as `cd`,
    /// `exit` or `dry` can change its state.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Name the factory answers to.
    fn name(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}

/// Factory allows creating instances of a builtin `T`.
pub struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

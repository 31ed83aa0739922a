use nix::errno::Errno;
use thiserror::Error;

/// Failures of the executor. None of them is fatal for the interpreter:
/// the command or pipeline being set up is abandoned and the status becomes 1.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{target}: {source}")]
    Redirect {
        target: String,
        #[source]
        source: Errno,
    },

    #[error("failed to fork: {0}")]
    Fork(#[source] Errno),

    #[error("failed to create pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("failed to save standard descriptors: {0}")]
    SaveStdio(#[source] Errno),

    #[error("failed to wait for child {pid}: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),
}

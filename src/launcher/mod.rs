//! The points where a pipeline touches the operating system.
//!
//! The executor is written once against [`Launcher`]. [`RealLauncher`]
//! forks, pipes, redirects and execs; [`DryRun`] prints what each of those
//! steps would have done and touches nothing.

mod dry;
mod real;

pub use dry::DryRun;
pub use real::{RealLauncher, StdioGuard, exit_child};

use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ExecError;
use crate::expand::GlobReport;
use crate::external::{Program, find_command_path};
use crate::resolve::ResolvedCommand;

/// One command of a pipeline together with the program it will run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub command: ResolvedCommand,
    /// `None` when argv expanded to nothing.
    pub program: Option<Program>,
}

impl Stage {
    pub fn new(command: ResolvedCommand, env: &Environment) -> Self {
        let program = command.name().map(|name| find_command_path(name, env));
        Self { command, program }
    }

    /// First word of the command, used to label pipe links.
    pub fn label(&self) -> &str {
        self.command.name().unwrap_or_default()
    }
}

/// How a builtin should be invoked.
pub enum BuiltinScope {
    /// Run the builtin now. Standard streams are restored when the guard drops.
    Invoke(StdioGuard),
    /// Do not run it.
    Skip,
}

/// Outcome of launching a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFork {
    /// The caller is the interpreter; the job leader has this pid.
    Launched(i32),
    /// The caller is the job leader. It runs the pipeline and exits.
    Leader,
    /// No process was created; run the pipeline in place.
    Inline,
}

pub trait Launcher {
    /// A glob expansion took place while resolving a command.
    fn glob(&mut self, report: &GlobReport);

    /// The driver passed a `;`.
    fn sequence(&mut self);

    /// Prepare the standard streams of a builtin run in-process.
    fn enter_builtin(&mut self, cmd: &ResolvedCommand) -> Result<BuiltinScope, ExecError>;

    /// Run one external command and wait for it.
    fn run_external(&mut self, stage: &Stage) -> Result<ExitCode, ExecError>;

    /// Run two or more stages connected by pipes and wait for all of them.
    fn run_pipeline(&mut self, stages: &[Stage]) -> Result<ExitCode, ExecError>;

    /// Start the leader of a background job.
    fn fork_job(&mut self) -> Result<JobFork, ExecError>;
}

//! Runs one parsed pipeline through a [`Launcher`].
//!
//! Every command of the pipeline is resolved before anything is launched.
//! Then, depending on its shape:
//!
//! * nothing to run: no-op, the status is left alone;
//! * one builtin: invoked in-process, with its redirections applied around it;
//! * one external command: forked, exec'd and waited for;
//! * two or more commands: connected by pipes, all external;
//! * background: the above runs inside a job leader that is not waited for.

use crate::command::ExitCode;
use crate::error::ExecError;
use crate::interpreter::Interpreter;
use crate::launcher::{BuiltinScope, JobFork, Launcher, Stage, exit_child};
use crate::parser::CommandNode;
use crate::resolve::{ResolvedCommand, resolve};
use tracing::debug;

/// Execute `pipeline` and return its status, or `None` when nothing ran.
pub fn execute(
    sh: &mut Interpreter,
    launcher: &mut dyn Launcher,
    pipeline: &[CommandNode],
    background: bool,
) -> Option<ExitCode> {
    let commands: Vec<ResolvedCommand> = pipeline
        .iter()
        .map(|node| resolve(node, sh.expander.as_ref(), &sh.env))
        .collect();
    for glob in commands.iter().flat_map(|cmd| &cmd.globs) {
        launcher.glob(glob);
    }
    if commands.iter().all(ResolvedCommand::is_empty) {
        return None;
    }

    if !background {
        return Some(run_foreground(sh, launcher, commands));
    }

    let status = match launcher.fork_job() {
        Ok(JobFork::Launched(pid)) => {
            sh.job_started(pid);
            0
        }
        Ok(JobFork::Leader) => {
            let status = run_foreground(sh, launcher, commands);
            exit_child(status)
        }
        Ok(JobFork::Inline) => {
            run_foreground(sh, launcher, commands);
            0
        }
        Err(err) => report(&err),
    };
    Some(status)
}

fn run_foreground(
    sh: &mut Interpreter,
    launcher: &mut dyn Launcher,
    mut commands: Vec<ResolvedCommand>,
) -> ExitCode {
    let result = if commands.len() == 1 {
        let cmd = commands.remove(0);
        if cmd.name().is_some_and(|name| sh.is_builtin(name)) {
            run_builtin(sh, launcher, &cmd)
        } else {
            launcher.run_external(&Stage::new(cmd, &sh.env))
        }
    } else {
        let stages: Vec<Stage> = commands
            .into_iter()
            .map(|cmd| Stage::new(cmd, &sh.env))
            .collect();
        debug!(stages = stages.len(), "running pipeline");
        launcher.run_pipeline(&stages)
    };
    result.unwrap_or_else(|err| report(&err))
}

fn run_builtin(
    sh: &mut Interpreter,
    launcher: &mut dyn Launcher,
    cmd: &ResolvedCommand,
) -> Result<ExitCode, ExecError> {
    match launcher.enter_builtin(cmd)? {
        BuiltinScope::Skip => Ok(0),
        BuiltinScope::Invoke(guard) => {
            let status = sh.run_builtin(&cmd.argv);
            drop(guard);
            Ok(status)
        }
    }
}

/// Print `err` for the user and return the status it maps to.
fn report(err: &ExecError) -> ExitCode {
    debug!(%err, "command failed");
    match err {
        ExecError::Redirect { .. } => eprintln!("{err}"),
        _ => eprintln!("pipesh: {err}"),
    }
    1
}

use super::{BuiltinScope, JobFork, Launcher, Stage};
use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ExecError;
use crate::expand::GlobReport;
use crate::external::{Program, exec_failure_status};
use crate::resolve::{Redirect, RedirectKind, ResolvedCommand};
use crate::timeline::{EventKind, Timeline};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl, open};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup, dup2, execve, fork, pipe, setpgid};
use std::cell::RefCell;
use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use tracing::{debug, trace, warn};

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

/// Launcher that creates real processes.
pub struct RealLauncher {
    envp: Vec<CString>,
    timeline: Rc<RefCell<Timeline>>,
}

impl RealLauncher {
    pub fn new(env: &Environment, timeline: Rc<RefCell<Timeline>>) -> Self {
        let envp = env
            .vars
            .iter()
            .filter_map(|(key, value)| CString::new(format!("{key}={value}")).ok())
            .collect();
        Self { envp, timeline }
    }

    fn record(&self, pid: Pid, kind: EventKind) {
        self.timeline.borrow_mut().record(pid.as_raw(), kind);
    }

    fn record_launch(&self, pid: Pid, stage: &Stage) {
        self.record(pid, EventKind::Forked);
        for redirect in &stage.command.redirects {
            self.record(pid, EventKind::Redirected(redirect.clone()));
        }
    }

    /// Block until `pid` terminates and return its status.
    fn wait_child(&self, pid: Pid) -> Result<ExitCode, ExecError> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    debug!(pid = pid.as_raw(), status = code, "child exited");
                    self.record(pid, EventKind::Exited(code));
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    debug!(pid = pid.as_raw(), ?signal, "child killed by signal");
                    self.record(pid, EventKind::Signaled(signal as i32));
                    return Ok(128 + signal as i32);
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(source) => {
                    return Err(ExecError::Wait {
                        pid: pid.as_raw(),
                        source,
                    });
                }
            }
        }
    }

    /// Reap children that were started before a failure.
    fn reap(&self, pids: &[Pid]) {
        for &pid in pids {
            if let Err(err) = self.wait_child(pid) {
                warn!(%err, "failed to reap pipeline child");
            }
        }
    }
}

impl Launcher for RealLauncher {
    fn glob(&mut self, _report: &GlobReport) {}

    fn sequence(&mut self) {}

    fn enter_builtin(&mut self, cmd: &ResolvedCommand) -> Result<BuiltinScope, ExecError> {
        let guard = StdioGuard::redirect(&cmd.redirects)?;
        let me = Pid::this();
        for redirect in &cmd.redirects {
            self.record(me, EventKind::Redirected(redirect.clone()));
        }
        Ok(BuiltinScope::Invoke(guard))
    }

    fn run_external(&mut self, stage: &Stage) -> Result<ExitCode, ExecError> {
        let target = ExecTarget::prepare(stage)?;
        flush_stdout();

        // SAFETY: the child only touches descriptors and memory prepared
        // before the fork, then execs or calls `_exit`.
        match unsafe { fork() }.map_err(ExecError::Fork)? {
            ForkResult::Child => exec_child(&target, &stage.command.redirects, &self.envp),
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), program = %stage.label(), "forked command");
                self.record_launch(child, stage);
                self.wait_child(child)
            }
        }
    }

    fn run_pipeline(&mut self, stages: &[Stage]) -> Result<ExitCode, ExecError> {
        let targets = stages
            .iter()
            .map(ExecTarget::prepare)
            .collect::<Result<Vec<_>, _>>()?;

        let mut pipes = Vec::with_capacity(stages.len().saturating_sub(1));
        for _ in 1..stages.len() {
            pipes.push(pipe().map_err(ExecError::Pipe)?);
        }
        trace!(count = pipes.len(), "pipes created");
        flush_stdout();

        let last = stages.len().saturating_sub(1);
        let mut pids: Vec<Pid> = Vec::with_capacity(stages.len());
        for (i, (stage, target)) in stages.iter().zip(&targets).enumerate() {
            // SAFETY: see `run_external`.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    if i > 0 {
                        let _ = dup2(pipes[i - 1].0.as_raw_fd(), STDIN);
                    }
                    if i < last {
                        let _ = dup2(pipes[i].1.as_raw_fd(), STDOUT);
                    }
                    drop(std::mem::take(&mut pipes));
                    exec_child(target, &stage.command.redirects, &self.envp);
                }
                Ok(ForkResult::Parent { child }) => {
                    debug!(
                        pid = child.as_raw(),
                        stage = i,
                        program = %stage.label(),
                        "forked pipeline stage"
                    );
                    self.record_launch(child, stage);
                    if let Some(&prev) = pids.last() {
                        self.record(child, EventKind::Piped(prev.as_raw(), child.as_raw()));
                    }
                    pids.push(child);
                }
                Err(errno) => {
                    drop(pipes);
                    self.reap(&pids);
                    return Err(ExecError::Fork(errno));
                }
            }
        }
        drop(pipes);

        let mut status = 0;
        for pid in pids {
            status = match self.wait_child(pid) {
                Ok(code) => code,
                Err(err) => {
                    warn!(%err, "lost track of pipeline child");
                    1
                }
            };
        }
        Ok(status)
    }

    fn fork_job(&mut self) -> Result<JobFork, ExecError> {
        flush_stdout();
        // SAFETY: the job leader keeps running interpreter code until it
        // calls `exit_child`; it never returns into the driver loop.
        match unsafe { fork() }.map_err(ExecError::Fork)? {
            ForkResult::Child => {
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                Ok(JobFork::Leader)
            }
            ForkResult::Parent { child } => {
                let _ = setpgid(child, child);
                debug!(pid = child.as_raw(), "started background job");
                self.record(child, EventKind::Forked);
                Ok(JobFork::Launched(child.as_raw()))
            }
        }
    }
}

/// Terminate a forked child without running the parent's exit handlers.
pub fn exit_child(status: ExitCode) -> ! {
    flush_stdout();
    // SAFETY: `_exit` is async-signal-safe and never returns.
    unsafe { nix::libc::_exit(status) }
}

fn flush_stdout() {
    let _ = io::stdout().flush();
}

/// What a child execs, converted before forking so the child does not allocate.
enum ExecTarget {
    Exec {
        path: CString,
        argv: Vec<CString>,
        error_prefix: Vec<u8>,
    },
    Missing(Vec<u8>),
    Nothing,
}

impl ExecTarget {
    fn prepare(stage: &Stage) -> Result<Self, ExecError> {
        match &stage.program {
            None => Ok(ExecTarget::Nothing),
            Some(Program::Missing(name)) => Ok(ExecTarget::Missing(
                format!("{name}: command not found\n").into_bytes(),
            )),
            Some(Program::Found(path)) => {
                let path = path.to_string_lossy().into_owned();
                let error_prefix = format!("{path}: ").into_bytes();
                let path = c_string(path)?;
                let argv = stage
                    .command
                    .argv
                    .iter()
                    .map(|arg| c_string(arg.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ExecTarget::Exec {
                    path,
                    argv,
                    error_prefix,
                })
            }
        }
    }
}

fn c_string(s: String) -> Result<CString, ExecError> {
    CString::new(s).map_err(|err| {
        let bytes = err.into_vec();
        ExecError::NulByte(String::from_utf8_lossy(&bytes).into_owned())
    })
}

/// Body of every forked command: redirect, then exec or exit.
fn exec_child(target: &ExecTarget, redirects: &[Redirect], envp: &[CString]) -> ! {
    if let Err((redirect, errno)) = apply_redirects(redirects) {
        child_message(&[
            redirect.target.as_bytes(),
            b": ".as_slice(),
            errno.desc().as_bytes(),
            b"\n".as_slice(),
        ]);
        exit_child(1);
    }

    match target {
        ExecTarget::Nothing => exit_child(0),
        ExecTarget::Missing(message) => {
            child_message(&[message.as_slice()]);
            exit_child(crate::external::NOT_FOUND)
        }
        ExecTarget::Exec {
            path,
            argv,
            error_prefix,
        } => {
            let errno = match execve(path, argv, envp) {
                Ok(never) => match never {},
                Err(errno) => errno,
            };
            child_message(&[
                error_prefix.as_slice(),
                errno.desc().as_bytes(),
                b"\n".as_slice(),
            ]);
            exit_child(exec_failure_status(errno))
        }
    }
}

fn child_message(parts: &[&[u8]]) {
    for part in parts {
        let _ = nix::unistd::write(io::stderr(), part);
    }
}

/// Open each target and move it onto stdin or stdout, in order.
fn apply_redirects(redirects: &[Redirect]) -> Result<(), (&Redirect, Errno)> {
    for redirect in redirects {
        let (flags, stream) = match redirect.kind {
            RedirectKind::Input => (OFlag::O_RDONLY, STDIN),
            RedirectKind::Output => (OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, STDOUT),
            RedirectKind::Append => (OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND, STDOUT),
        };
        let fd = open(
            redirect.target.as_str(),
            flags | OFlag::O_CLOEXEC,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|errno| (redirect, errno))?;
        if fd == stream {
            // The stream was closed and `open` reused it; it must survive exec.
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map_err(|errno| (redirect, errno))?;
        } else {
            let moved = dup2(fd, stream);
            let _ = close(fd);
            moved.map_err(|errno| (redirect, errno))?;
        }
    }
    Ok(())
}

/// Redirects fds 0 and 1 of the interpreter itself for the lifetime of a
/// builtin, restoring them on drop.
pub struct StdioGuard {
    saved: Option<(RawFd, RawFd)>,
}

impl StdioGuard {
    /// A guard that leaves the standard streams alone.
    pub fn inherit() -> Self {
        Self { saved: None }
    }

    pub fn redirect(redirects: &[Redirect]) -> Result<Self, ExecError> {
        if redirects.is_empty() {
            return Ok(Self::inherit());
        }
        flush_stdout();

        let saved_stdin = dup(STDIN).map_err(ExecError::SaveStdio)?;
        let saved_stdout = match dup(STDOUT) {
            Ok(fd) => fd,
            Err(errno) => {
                let _ = close(saved_stdin);
                return Err(ExecError::SaveStdio(errno));
            }
        };
        let guard = Self {
            saved: Some((saved_stdin, saved_stdout)),
        };

        apply_redirects(redirects).map_err(|(redirect, source)| ExecError::Redirect {
            target: redirect.target.clone(),
            source,
        })?;
        Ok(guard)
    }
}

impl Drop for StdioGuard {
    fn drop(&mut self) {
        flush_stdout();
        if let Some((saved_stdin, saved_stdout)) = self.saved.take() {
            let _ = dup2(saved_stdin, STDIN);
            let _ = dup2(saved_stdout, STDOUT);
            let _ = close(saved_stdin);
            let _ = close(saved_stdout);
            trace!("standard streams restored");
        }
    }
}

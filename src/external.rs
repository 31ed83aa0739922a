//! Executable lookup and the mapping from child outcomes to exit statuses.

use crate::command::ExitCode;
use crate::env::Environment;
use nix::errno::Errno;
use nix::sys::wait::WaitStatus;
use std::fs;
use std::path::{Path, PathBuf};

/// Status of a program that could not be found.
pub const NOT_FOUND: ExitCode = 127;
/// Status of a program that was found but could not be executed.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// What `argv[0]` of an external command refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Path handed to `execve`.
    Found(PathBuf),
    /// Nothing on PATH matched this name.
    Missing(String),
}

impl Program {
    /// Text used when reporting the command: the path, or the bare name.
    pub fn display_name(&self) -> String {
        match self {
            Program::Found(path) => path.to_string_lossy().into_owned(),
            Program::Missing(name) => name.clone(),
        }
    }
}

/// Resolve a command name the way a typical shell would.
///
/// A name containing `/` is used as is, relative names being relative to the
/// current directory. Anything else is looked up with [`search_path`].
pub fn find_command_path(name: &str, env: &Environment) -> Program {
    if name.contains('/') {
        return Program::Found(PathBuf::from(name));
    }
    let path_var = env.get_var("PATH");
    match search_path(name, path_var.as_deref(), &env.current_dir) {
        Some(path) => Program::Found(path),
        None => Program::Missing(name.to_string()),
    }
}

/// Search the colon-separated `path_var` for a regular file called `name`.
///
/// Directories are tried in order and the first match wins. An empty segment
/// stands for `cwd`. An unset or empty PATH matches nothing.
pub fn search_path(name: &str, path_var: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    let path_var = path_var.filter(|p| !p.is_empty())?;
    if name.is_empty() {
        return None;
    }

    path_var.split(':').find_map(|dir| {
        let candidate = if dir.is_empty() {
            cwd.join(name)
        } else {
            Path::new(dir).join(name)
        };
        is_regular_file(&candidate).then_some(candidate)
    })
}

fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Status a child reports when `execve` fails with `errno`.
pub fn exec_failure_status(errno: Errno) -> ExitCode {
    match errno {
        Errno::ENOENT | Errno::ENOTDIR => NOT_FOUND,
        Errno::EACCES | Errno::ENOEXEC | Errno::EISDIR => NOT_EXECUTABLE,
        _ => 1,
    }
}

/// Exit status of a terminated child, `None` while it is still running.
pub fn terminated_status(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;
    use std::collections::HashMap;
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;

    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_empty_path_matches_nothing() {
        assert_eq!(search_path("sh", Some(""), Path::new("/")), None);
        assert_eq!(search_path("sh", None, Path::new("/")), None);
    }

    #[test]
    fn test_later_directory_is_searched() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let tool = make_executable(second.path(), "tool");

        let path_var = format!("{}:{}", first.path().display(), second.path().display());
        assert_eq!(search_path("tool", Some(&path_var), Path::new("/")), Some(tool));
    }

    #[test]
    fn test_first_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let winner = make_executable(first.path(), "tool");
        make_executable(second.path(), "tool");

        let path_var = format!("{}:{}", first.path().display(), second.path().display());
        assert_eq!(search_path("tool", Some(&path_var), Path::new("/")), Some(winner));
    }

    #[test]
    fn test_empty_segment_is_current_dir() {
        let cwd = tempfile::tempdir().unwrap();
        let tool = make_executable(cwd.path(), "tool");
        assert_eq!(search_path("tool", Some("/nonexistent:"), cwd.path()), Some(tool));
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tool")).unwrap();
        let path_var = dir.path().display().to_string();
        assert_eq!(search_path("tool", Some(&path_var), Path::new("/")), None);
    }

    #[test]
    fn test_single_component_found_in_bin() {
        let env = Environment::with_vars(
            HashMap::from([("PATH".to_string(), "/bin:/usr/bin".to_string())]),
            PathBuf::from("/"),
        );
        match find_command_path("sh", &env) {
            Program::Found(path) => assert!(path.ends_with("sh")),
            other => panic!("expected sh to be found, got {other:?}"),
        }
    }

    #[test]
    fn test_names_with_slash_are_used_directly() {
        let env = Environment::with_vars(HashMap::new(), PathBuf::from("/"));
        assert_eq!(
            find_command_path("./missing/tool", &env),
            Program::Found(PathBuf::from("./missing/tool"))
        );
        assert_eq!(
            find_command_path("tool", &env),
            Program::Missing("tool".to_string())
        );
    }

    #[test]
    fn test_exec_errors_map_to_shell_statuses() {
        assert_eq!(exec_failure_status(Errno::ENOENT), 127);
        assert_eq!(exec_failure_status(Errno::EACCES), 126);
        assert_eq!(exec_failure_status(Errno::ENOEXEC), 126);
        assert_eq!(exec_failure_status(Errno::E2BIG), 1);
    }

    #[test]
    fn test_signals_map_above_128() {
        let pid = Pid::from_raw(1);
        assert_eq!(terminated_status(WaitStatus::Exited(pid, 3)), Some(3));
        assert_eq!(
            terminated_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(137)
        );
        assert_eq!(terminated_status(WaitStatus::StillAlive), None);
    }
}

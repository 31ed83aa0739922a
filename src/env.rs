use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Which launcher the executor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Fork, pipe, redirect and exec for real.
    #[default]
    Real,
    /// Only report what would happen.
    Dry,
}

/// Shell state shared by the driver, the executor and the builtins.
///
/// `vars` is exported to every child as its environment. `last_status` is
/// `$?`; only the interpreter writes it and `mode`, the executor reads them.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    /// Directory children start in. Kept in step with the process cwd by `cd`.
    pub current_dir: PathBuf,
    /// Set by `exit`.
    pub should_exit: bool,
    pub last_status: ExitCode,
    pub mode: ExecMode,
}

impl Environment {
    /// Snapshot the variables and working directory of this process.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_vars(vars, current_dir)
    }

    /// Build an environment from an explicit variable map.
    pub fn with_vars(vars: HashMap<String, String>, current_dir: PathBuf) -> Self {
        Self {
            vars,
            current_dir,
            should_exit: false,
            last_status: 0,
            mode: ExecMode::Real,
        }
    }

    /// No fallback to the process environment: a removed variable stays
    /// hidden from children too.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn remove_var(&mut self, key: &str) {
        self.vars.remove(key);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::{Environment, ExecMode};
    use std::collections::HashMap;
    use std::env as stdenv;

    #[test]
    fn test_set_get_remove() {
        let mut env = Environment::with_vars(HashMap::new(), stdenv::current_dir().unwrap());

        assert_eq!(env.get_var("PIPESH_TEST_VAR"), None);

        env.set_var("PIPESH_TEST_VAR", "1");
        assert_eq!(env.get_var("PIPESH_TEST_VAR").as_deref(), Some("1"));

        env.remove_var("PIPESH_TEST_VAR");
        assert_eq!(env.get_var("PIPESH_TEST_VAR"), None);
    }

    #[test]
    fn test_new_snapshots_process() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
        assert_eq!(env.mode, ExecMode::Real);
        assert_eq!(env.last_status, 0);
    }
}

use super::{BuiltinScope, JobFork, Launcher, Stage};
use crate::command::ExitCode;
use crate::error::ExecError;
use crate::expand::GlobReport;
use crate::resolve::{Redirect, ResolvedCommand};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Launcher that reports every decision and performs none of them.
///
/// Output lines:
///
/// ```text
/// GLOB: <pattern> -> <matches...>
/// BACKGROUND:
/// PIPE: <first word> -> <first word>
/// REDIRECT: <stdin|stdout> -> <target>
/// EXEC: <path or name> <args...>
/// SEQUENCE:
/// ```
pub struct DryRun {
    out: Rc<RefCell<dyn Write>>,
}

impl DryRun {
    pub fn new(out: Rc<RefCell<dyn Write>>) -> Self {
        Self { out }
    }

    fn emit(&self, line: &str) {
        let _ = writeln!(self.out.borrow_mut(), "{line}");
    }

    fn emit_redirects(&self, redirects: &[Redirect]) {
        for redirect in redirects {
            self.emit(&format!(
                "REDIRECT: {} -> {}",
                redirect.kind.stream(),
                redirect.target
            ));
        }
    }

    fn emit_exec(&self, program: &str, args: &[String]) {
        let mut line = format!("EXEC: {program}");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.emit(&line);
    }

    fn emit_stage(&self, stage: &Stage) {
        self.emit_redirects(&stage.command.redirects);
        if let Some(program) = &stage.program {
            self.emit_exec(&program.display_name(), stage.command.args());
        }
    }
}

impl Launcher for DryRun {
    fn glob(&mut self, report: &GlobReport) {
        let mut line = format!("GLOB: {} ->", report.pattern);
        for path in &report.matches {
            line.push(' ');
            line.push_str(path);
        }
        self.emit(&line);
    }

    fn sequence(&mut self) {
        self.emit("SEQUENCE:");
    }

    fn enter_builtin(&mut self, cmd: &ResolvedCommand) -> Result<BuiltinScope, ExecError> {
        self.emit_redirects(&cmd.redirects);
        self.emit_exec(cmd.name().unwrap_or_default(), cmd.args());
        Ok(BuiltinScope::Skip)
    }

    fn run_external(&mut self, stage: &Stage) -> Result<ExitCode, ExecError> {
        self.emit_stage(stage);
        Ok(0)
    }

    fn run_pipeline(&mut self, stages: &[Stage]) -> Result<ExitCode, ExecError> {
        for pair in stages.windows(2) {
            self.emit(&format!("PIPE: {} -> {}", pair[0].label(), pair[1].label()));
        }
        for stage in stages {
            self.emit_stage(stage);
        }
        Ok(0)
    }

    fn fork_job(&mut self) -> Result<JobFork, ExecError> {
        self.emit("BACKGROUND:");
        Ok(JobFork::Inline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::external::Program;
    use crate::resolve::RedirectKind;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn setup() -> (DryRun, Rc<RefCell<Vec<u8>>>) {
        let buf = Rc::new(RefCell::new(Vec::new()));
        (DryRun::new(buf.clone()), buf)
    }

    fn stage(argv: &[&str], redirects: Vec<Redirect>) -> Stage {
        let env = Environment::with_vars(
            HashMap::from([("PATH".to_string(), "/bin:/usr/bin".to_string())]),
            PathBuf::from("/"),
        );
        Stage::new(
            ResolvedCommand {
                argv: argv.iter().map(|s| s.to_string()).collect(),
                redirects,
                globs: Vec::new(),
            },
            &env,
        )
    }

    fn text(buf: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(buf.borrow().clone()).unwrap()
    }

    #[test]
    fn test_pipeline_report_order() {
        let (mut dry, buf) = setup();
        let out = Redirect {
            kind: RedirectKind::Output,
            target: "out.txt".into(),
        };
        let stages = vec![
            stage(&["no-such-tool-xyz", "-l"], vec![]),
            stage(&["other-missing-xyz", "txt"], vec![out]),
        ];
        assert!(matches!(stages[0].program, Some(Program::Missing(_))));
        assert_eq!(dry.run_pipeline(&stages).unwrap(), 0);
        assert_eq!(
            text(&buf),
            "PIPE: no-such-tool-xyz -> other-missing-xyz\n\
             EXEC: no-such-tool-xyz -l\n\
             REDIRECT: stdout -> out.txt\n\
             EXEC: other-missing-xyz txt\n"
        );
    }

    #[test]
    fn test_found_program_reports_path() {
        let (mut dry, buf) = setup();
        let stage = stage(&["sh", "-c", "true"], vec![]);
        let Some(Program::Found(path)) = stage.program.clone() else {
            panic!("sh should be on PATH");
        };
        dry.run_external(&stage).unwrap();
        assert_eq!(text(&buf), format!("EXEC: {} -c true\n", path.display()));
    }

    #[test]
    fn test_builtin_is_skipped() {
        let (mut dry, buf) = setup();
        let cmd = ResolvedCommand {
            argv: vec!["cd".into(), "/tmp".into()],
            redirects: vec![Redirect {
                kind: RedirectKind::Input,
                target: "in".into(),
            }],
            globs: Vec::new(),
        };
        assert!(matches!(dry.enter_builtin(&cmd).unwrap(), BuiltinScope::Skip));
        assert_eq!(text(&buf), "REDIRECT: stdin -> in\nEXEC: cd /tmp\n");
    }

    #[test]
    fn test_glob_background_and_sequence() {
        let (mut dry, buf) = setup();
        dry.glob(&GlobReport {
            pattern: "*.c".into(),
            matches: vec!["a.c".into(), "b.c".into()],
        });
        assert_eq!(dry.fork_job().unwrap(), JobFork::Inline);
        dry.sequence();
        assert_eq!(text(&buf), "GLOB: *.c -> a.c b.c\nBACKGROUND:\nSEQUENCE:\n");
    }
}

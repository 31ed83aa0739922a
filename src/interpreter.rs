use crate::builtin::default_builtins;
use crate::command::{CommandFactory, ExitCode};
use crate::env::{Environment, ExecMode};
use crate::executor;
use crate::expand::{ShellExpander, WordExpander};
use crate::external::NOT_FOUND;
use crate::jobs::JobTable;
use crate::launcher::{DryRun, Launcher, RealLauncher};
use crate::lexer::{self, Operator, Token};
use crate::parser::{CommandNode, MAX_PIPELINE, ParseError, parse_simple_command};
use crate::source::{Source, push_continuation, strip_comment};
use crate::timeline::Timeline;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, trace};

/// A shell interpreter that parses command lines and runs them as builtins,
/// external programs, pipelines and background jobs.
///
/// The interpreter owns the [`Environment`], the builtin table and the table
/// of background jobs. Report output (dry-run lines, job announcements and
/// the timeline) goes to a shared writer, stdout unless replaced with
/// [`Interpreter::with_report`].
///
/// Example
/// ```no_run
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello world | tr a-z A-Z");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) expander: Box<dyn WordExpander>,
    builtins: Vec<Box<dyn CommandFactory>>,
    jobs: JobTable,
    report: Rc<RefCell<dyn Write>>,
    timeline: Rc<RefCell<Timeline>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtins.
    pub fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            expander: Box::new(ShellExpander),
            builtins,
            jobs: JobTable::default(),
            report: Rc::new(RefCell::new(io::stdout())),
            timeline: Rc::new(RefCell::new(Timeline::default())),
        }
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Send report output to `report` instead of stdout.
    pub fn with_report(mut self, report: Rc<RefCell<dyn Write>>) -> Self {
        self.report = report;
        self
    }

    pub fn with_expander(mut self, expander: Box<dyn WordExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Status of the last foreground pipeline.
    pub fn status(&self) -> ExitCode {
        self.env.last_status
    }

    /// Whether `exit` was run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn timeline_enabled(&self) -> bool {
        self.timeline.borrow().is_enabled()
    }

    pub fn set_timeline(&mut self, enabled: bool) {
        self.timeline.borrow_mut().set_enabled(enabled);
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|factory| factory.name() == name)
    }

    /// Run the builtin named by `argv[0]` in the current process.
    pub fn run_builtin(&mut self, argv: &[String]) -> ExitCode {
        let Some((name, args)) = argv.split_first() else {
            return 0;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let Some(cmd) = self
            .builtins
            .iter()
            .find_map(|factory| factory.try_create(name, &args))
        else {
            eprintln!("{name}: command not found");
            return NOT_FOUND;
        };

        let mut stdout = io::stdout();
        let status = match cmd.execute(&mut stdout, self) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("{name}: {err:#}");
                1
            }
        };
        let _ = stdout.flush();
        status
    }

    /// Run one logical command line and return the resulting status.
    ///
    /// Finished background jobs are reaped first. When the timeline is on,
    /// it is printed once the line is done.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        for job in self.jobs.reap() {
            trace!(job = job.id, pid = job.pid, "reaped background job");
        }
        self.timeline.borrow_mut().reset();

        let mut src = Source::new(strip_comment(line));
        self.parse_and_execute(&mut src);

        let _ = self.timeline.borrow_mut().print(&mut *self.report.borrow_mut());
        let _ = self.report.borrow_mut().flush();
        self.env.last_status
    }

    /// Run every line of `text`, joining backslash continuations, until the
    /// text ends or `exit` is run.
    pub fn run_script(&mut self, text: &str) -> ExitCode {
        let mut pending = String::new();
        for line in text.lines() {
            if push_continuation(&mut pending, line) {
                continue;
            }
            let command = std::mem::take(&mut pending);
            self.run_line(&command);
            if self.env.should_exit {
                break;
            }
        }
        if !pending.is_empty() && !self.env.should_exit {
            self.run_line(&pending);
        }
        self.env.last_status
    }

    /// Run `line` with every launch replaced by a report of what would
    /// happen. The previous execution mode is restored afterwards.
    pub fn run_dry(&mut self, line: &str) -> ExitCode {
        let saved = std::mem::replace(&mut self.env.mode, ExecMode::Dry);
        let mut src = Source::new(line);
        self.parse_and_execute(&mut src);
        self.env.mode = saved;
        0
    }

    fn launcher(&self) -> Box<dyn Launcher> {
        match self.env.mode {
            ExecMode::Real => Box::new(RealLauncher::new(&self.env, self.timeline.clone())),
            ExecMode::Dry => Box::new(DryRun::new(self.report.clone())),
        }
    }

    /// Announce a job leader started by the executor.
    pub(crate) fn job_started(&mut self, pid: i32) {
        let job = self.jobs.add(pid);
        let mut report = self.report.borrow_mut();
        let _ = writeln!(report, "[{}] {}", job.id, job.pid);
        let _ = report.flush();
    }

    /// Parse and execute pipelines from `src` until the line ends.
    ///
    /// After each pipeline the following operator decides what happens next:
    /// `;` and `&` continue, `&&` after a failure skips ahead to the next
    /// `||`, `||` after a success skips ahead to the next `&&`. A skip that
    /// reaches the end of the line ends it, and so does a newline.
    pub fn parse_and_execute(&mut self, src: &mut Source) {
        while !self.env.should_exit {
            src.skip_whitespace();
            if let Some(line) = self.take_dry_line(src) {
                self.env.last_status = self.run_dry(&line);
                break;
            }
            let (pipeline, follow) = match parse_pipeline(src) {
                Ok(parsed) => parsed,
                Err(err) => {
                    eprintln!("pipesh: {err}");
                    self.env.last_status = 1;
                    return;
                }
            };

            let background = follow == Token::Operator(Operator::Amp);
            let mut launcher = self.launcher();
            let status = executor::execute(self, launcher.as_mut(), &pipeline, background);
            if let Some(status) = status {
                self.env.last_status = status;
            }
            let status = self.env.last_status;

            match follow {
                Token::Operator(Operator::Semi) => launcher.sequence(),
                Token::Operator(Operator::AndIf) if status != 0 => {
                    if !skip_until(src, Operator::OrIf) {
                        break;
                    }
                }
                Token::Operator(Operator::OrIf) if status == 0 => {
                    if !skip_until(src, Operator::AndIf) {
                        break;
                    }
                }
                Token::Operator(_) => {}
                Token::Newline | Token::EndOfInput | Token::Word(_) => break,
            }
        }
    }

    /// If the next command is `dry` with arguments, consume the rest of the
    /// physical line and return it as the line to report on.
    ///
    /// Operators and redirections after `dry` belong to the reported line,
    /// so they must never reach the real parser. A lone quoted argument is
    /// unquoted and read as the whole line: `dry "ls > out"`.
    fn take_dry_line(&self, src: &mut Source) -> Option<String> {
        if !self.is_builtin("dry") {
            return None;
        }
        let start = src.position();
        if lexer::tokenize(src) != Token::Word("dry".to_string())
            || !matches!(src.peek(), Some(b' ' | b'\t'))
        {
            src.unget_n(src.position() - start);
            return None;
        }
        src.skip_whitespace();
        if matches!(src.peek(), None | Some(b'\n')) {
            src.unget_n(src.position() - start);
            return None;
        }

        let rest = src.take_line();
        let mut words = Source::new(rest.as_str());
        if let Token::Word(word) = lexer::tokenize(&mut words) {
            let quoted = matches!(word.as_bytes().first(), Some(b'\'' | b'"'));
            if quoted && lexer::tokenize(&mut words) == Token::EndOfInput {
                return Some(self.expander.expand(&word, &self.env).words.join(" "));
            }
        }
        debug!(line = %rest, "dry run of the rest of the line");
        Some(rest)
    }

    fn primary_prompt(&self) -> String {
        if let Some(ps1) = self.env.get_var("PS1") {
            return ps1;
        }
        let cwd = self.env.current_dir.to_string_lossy();
        let shown = match self.env.get_var("HOME").filter(|home| !home.is_empty()) {
            Some(home) => match cwd.strip_prefix(home.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{rest}"),
                _ => cwd.into_owned(),
            },
            None => cwd.into_owned(),
        };
        format!("{shown}:$ ")
    }

    fn secondary_prompt(&self) -> String {
        self.env.get_var("PS2").unwrap_or_else(|| "> ".to_string())
    }

    /// Interactive Read-Eval-Print Loop with line editing and history.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut pending = String::new();

        while !self.env.should_exit {
            let prompt = if pending.is_empty() {
                self.primary_prompt()
            } else {
                self.secondary_prompt()
            };
            match rl.readline(&prompt) {
                Ok(line) => {
                    if push_continuation(&mut pending, &line) {
                        continue;
                    }
                    let command = std::mem::take(&mut pending);
                    if command.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(command.as_str())?;
                    self.run_line(&command);
                }
                Err(ReadlineError::Interrupted) => {
                    pending.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default builtins: `cd`, `pwd`, `echo`,
    /// `exit`, `dry` and `timeline`.
    fn default() -> Self {
        Self::new(default_builtins())
    }
}

/// Collect simple commands separated by `|`.
///
/// Returns the commands and the token that ended the pipeline. Blank
/// commands between pipes are dropped.
fn parse_pipeline(src: &mut Source) -> Result<(Vec<CommandNode>, Token), ParseError> {
    let mut pipeline = Vec::new();
    loop {
        let first = lexer::tokenize(src);
        let cmd = parse_simple_command(first, src);
        if !cmd.is_empty() {
            if pipeline.len() == MAX_PIPELINE {
                return Err(ParseError::PipelineTooLong);
            }
            pipeline.push(cmd);
        }

        let follow = lexer::tokenize(src);
        if follow != Token::Operator(Operator::Pipe) {
            debug!(commands = pipeline.len(), follow = follow.text(), "parsed pipeline");
            return Ok((pipeline, follow));
        }
    }
}

/// Discard tokens up to and including the next `resume` operator.
///
/// Returns `false` if the line ended first.
fn skip_until(src: &mut Source, resume: Operator) -> bool {
    loop {
        match lexer::tokenize(src) {
            Token::Operator(op) if op == resume => return true,
            Token::Newline | Token::EndOfInput => return false,
            skipped => trace!(token = skipped.text(), "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn dry_shell() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
        let env = Environment::with_vars(
            HashMap::from([("PATH".to_string(), String::new())]),
            PathBuf::from("/"),
        );
        let report = Rc::new(RefCell::new(Vec::new()));
        let mut sh = Interpreter::default()
            .with_environment(env)
            .with_report(report.clone());
        sh.env.mode = ExecMode::Dry;
        (sh, report)
    }

    fn report_text(report: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(report.borrow().clone()).unwrap()
    }

    fn parse(line: &str) -> Result<(Vec<Vec<String>>, Token), ParseError> {
        let mut src = Source::new(line);
        let (pipeline, follow) = parse_pipeline(&mut src)?;
        let words = pipeline
            .iter()
            .map(|cmd| cmd.words().map(str::to_string).collect())
            .collect();
        Ok((words, follow))
    }

    #[test]
    fn test_parse_pipeline_stages() {
        let (stages, follow) = parse("ls -l | grep x | wc && echo").unwrap();
        assert_eq!(stages, vec![vec!["ls", "-l"], vec!["grep", "x"], vec!["wc"]]);
        assert_eq!(follow, Token::Operator(Operator::AndIf));
    }

    #[test]
    fn test_parse_pipeline_drops_blank_stages() {
        let (stages, follow) = parse("a | | b").unwrap();
        assert_eq!(stages, vec![vec!["a"], vec!["b"]]);
        assert_eq!(follow, Token::EndOfInput);
    }

    #[test]
    fn test_parse_pipeline_limit() {
        let at_limit = vec!["x"; MAX_PIPELINE].join(" | ");
        assert_eq!(parse(&at_limit).unwrap().0.len(), MAX_PIPELINE);

        let over_limit = vec!["x"; MAX_PIPELINE + 1].join(" | ");
        assert_eq!(parse(&over_limit), Err(ParseError::PipelineTooLong));
    }

    #[test]
    fn test_skip_until() {
        let mut src = Source::new("b ; c || d");
        assert!(skip_until(&mut src, Operator::OrIf));
        assert_eq!(lexer::tokenize(&mut src), Token::Word("d".into()));

        let mut src = Source::new("b ; c\nd || e");
        assert!(!skip_until(&mut src, Operator::OrIf));
    }

    #[test]
    fn test_dry_sequence_and_background() {
        let (mut sh, report) = dry_shell();
        sh.parse_and_execute(&mut Source::new("a x > out ; b & c < in"));
        assert_eq!(
            report_text(&report),
            "REDIRECT: stdout -> out\n\
             EXEC: a x\n\
             SEQUENCE:\n\
             BACKGROUND:\n\
             EXEC: b\n\
             REDIRECT: stdin -> in\n\
             EXEC: c\n"
        );
        assert!(sh.jobs().jobs().is_empty());
    }

    #[test]
    fn test_dry_pipeline_and_builtin() {
        let (mut sh, report) = dry_shell();
        sh.parse_and_execute(&mut Source::new("cd /tmp && ls | wc -l"));
        assert_eq!(
            report_text(&report),
            "EXEC: cd /tmp\n\
             PIPE: ls -> wc\n\
             EXEC: ls\n\
             EXEC: wc -l\n"
        );
        assert_eq!(sh.env.current_dir, PathBuf::from("/"));
        assert_eq!(sh.status(), 0);
    }

    #[test]
    fn test_or_after_success_skips_to_and() {
        let (mut sh, report) = dry_shell();
        sh.parse_and_execute(&mut Source::new("a || b ; c && d"));
        assert_eq!(report_text(&report), "EXEC: a\nEXEC: d\n");
    }

    #[test]
    fn test_failure_skips_and_chain() {
        let (mut sh, report) = dry_shell();
        sh.env.last_status = 1;
        // An empty pipeline leaves the failing status in place.
        sh.parse_and_execute(&mut Source::new("$EMPTY && a ; b || c"));
        assert_eq!(report_text(&report), "EXEC: c\n");
    }

    #[test]
    fn test_newline_ends_line() {
        let (mut sh, report) = dry_shell();
        sh.parse_and_execute(&mut Source::new("a\nb"));
        assert_eq!(report_text(&report), "EXEC: a\n");
    }

    #[test]
    fn test_pipeline_too_long_sets_status() {
        let (mut sh, report) = dry_shell();
        let line = format!("{} ; after", vec!["x"; MAX_PIPELINE + 1].join(" | "));
        sh.parse_and_execute(&mut Source::new(line));
        assert_eq!(sh.status(), 1);
        assert!(report_text(&report).is_empty());
    }

    #[test]
    fn test_run_dry_restores_real_mode() {
        let (mut sh, report) = dry_shell();
        sh.env.mode = ExecMode::Real;
        assert_eq!(sh.run_dry("frob a b"), 0);
        assert_eq!(sh.env.mode, ExecMode::Real);
        assert_eq!(report_text(&report), "EXEC: frob a b\n");
    }

    #[test]
    fn test_dry_takes_rest_of_line() {
        let (mut sh, report) = dry_shell();
        sh.env.mode = ExecMode::Real;
        sh.parse_and_execute(&mut Source::new("dry cat in > out ; frob | wc -l\nafter"));
        assert_eq!(
            report_text(&report),
            "REDIRECT: stdout -> out\n\
             EXEC: cat in\n\
             SEQUENCE:\n\
             PIPE: frob -> wc\n\
             EXEC: frob\n\
             EXEC: wc -l\n"
        );
        assert_eq!(sh.env.mode, ExecMode::Real);
        assert_eq!(sh.status(), 0);
    }

    #[test]
    fn test_dry_lone_quoted_argument_is_the_line() {
        let (mut sh, report) = dry_shell();
        sh.env.mode = ExecMode::Real;
        sh.parse_and_execute(&mut Source::new("dry 'a > out'"));
        assert_eq!(report_text(&report), "REDIRECT: stdout -> out\nEXEC: a\n");

        report.borrow_mut().clear();
        sh.parse_and_execute(&mut Source::new("dry echo 'x  y'"));
        assert_eq!(report_text(&report), "EXEC: echo x  y\n");
    }

    #[test]
    fn test_dry_prefix_is_not_dry() {
        let mut src = Source::new("dryer x");
        let (sh, _) = dry_shell();
        assert_eq!(sh.take_dry_line(&mut src), None);
        assert_eq!(src.position(), 0);

        let mut src = Source::new("dry   ");
        assert_eq!(sh.take_dry_line(&mut src), None);
        assert_eq!(src.position(), 0);
    }

    #[test]
    fn test_prompt_shortens_home() {
        let env = Environment::with_vars(
            HashMap::from([("HOME".to_string(), "/home/me".to_string())]),
            PathBuf::from("/home/me/src"),
        );
        let mut sh = Interpreter::default().with_environment(env);
        assert_eq!(sh.primary_prompt(), "~/src:$ ");
        assert_eq!(sh.secondary_prompt(), "> ");

        sh.env.current_dir = PathBuf::from("/home/meow");
        assert_eq!(sh.primary_prompt(), "/home/meow:$ ");

        sh.env.set_var("PS1", "% ");
        assert_eq!(sh.primary_prompt(), "% ");
    }
}

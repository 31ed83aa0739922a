use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory};
use crate::interpreter::Interpreter;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// A command run inside the shell process. Arguments go through argh.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    fn name() -> &'static str;

    /// An `Err` is printed on stderr and turns into status 1.
    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        match T::execute(*self, stdout, sh) {
            Ok(status) => Ok(status),
            Err(e) => {
                stdout.flush()?;
                writeln!(io::stderr(), "{e:#}")?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _sh: &mut Interpreter) -> Result<ExitCode> {
        if self.is_error {
            writeln!(io::stderr(), "{}", self.output)?;
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// The builtins every interpreter starts with, in lookup order.
pub(crate) fn default_builtins() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Dry>::default()),
        Box::new(Factory::<TimelineCmd>::default()),
    ]
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        writeln!(stdout, "{}", sh.env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, changes to $HOME; `cd -` changes to $OLDPWD and prints it.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory, or `-`.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            Some("-") => {
                let previous = sh
                    .env
                    .get_var("OLDPWD")
                    .filter(|dir| !dir.is_empty())
                    .ok_or_else(|| anyhow!("cd: OLDPWD not set"))?;
                writeln!(stdout, "{previous}")?;
                PathBuf::from(previous)
            }
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => sh
                .env
                .get_var("HOME")
                .filter(|home| !home.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("cd: HOME not set"))?,
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            sh.env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: {}", canonical.display()))?;

        let previous = std::mem::replace(&mut sh.env.current_dir, canonical);
        sh.env.set_var("OLDPWD", previous.to_string_lossy());
        sh.env.set_var("PWD", sh.env.current_dir.to_string_lossy().into_owned());
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell with the given status, or with the status of the last command.
pub struct Exit {
    #[argh(positional)]
    /// exit status, 0-255.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        sh.env.should_exit = true;
        Ok(self.code.unwrap_or(sh.env.last_status) & 0xff)
    }
}

#[derive(FromArgs)]
/// Print the arguments joined by single spaces, followed by a newline.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _sh: &mut Interpreter) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show what a command line would do without running it.
/// Quote lines containing operators: dry "ls | grep txt".
pub struct Dry {
    #[argh(positional, greedy)]
    /// the command line to inspect.
    pub command: Vec<String>,
}

impl BuiltinCommand for Dry {
    fn name() -> &'static str {
        "dry"
    }

    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        if self.command.is_empty() {
            writeln!(io::stderr(), "dry: usage: dry <command> [args...]")?;
            return Ok(1);
        }
        Ok(sh.run_dry(&self.command.join(" ")))
    }
}

#[derive(FromArgs)]
/// Turn the per-command process timeline on or off, or show its state.
pub struct TimelineCmd {
    #[argh(positional)]
    /// on or off.
    pub state: Option<String>,
}

impl BuiltinCommand for TimelineCmd {
    fn name() -> &'static str {
        "timeline"
    }

    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        match self.state.as_deref() {
            None => {
                let state = if sh.timeline_enabled() { "on" } else { "off" };
                writeln!(stdout, "timeline: {state}")?;
            }
            Some("on") => sh.set_timeline(true),
            Some("off") => sh.set_timeline(false),
            Some(other) => return Err(anyhow!("timeline: expected `on` or `off`, got `{other}`")),
        }
        Ok(0)
    }
}

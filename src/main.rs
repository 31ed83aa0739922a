use anyhow::{Context, Result};
use argh::FromArgs;
use pipesh::Interpreter;
use pipesh::env::ExecMode;
use std::path::PathBuf;

#[derive(FromArgs)]
/// A small Unix shell with pipelines, redirections, background jobs and a
/// dry-run mode.
struct Args {
    #[argh(option, short = 'c')]
    /// run this command string and exit.
    command: Option<String>,

    #[argh(switch)]
    /// report what every command would do instead of running it.
    dry_run: bool,

    #[argh(switch)]
    /// print a timeline of process events after each command line.
    timeline: bool,

    #[argh(switch, short = 'v')]
    /// log executor decisions to stderr.
    verbose: bool,

    #[argh(positional)]
    /// script to run instead of starting an interactive session.
    script: Option<PathBuf>,
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("PIPESH_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    setup_logging(args.verbose);

    let mut sh = Interpreter::default();
    sh.set_timeline(args.timeline);

    if args.dry_run {
        sh.env_mut().mode = ExecMode::Dry;
    }

    let status = if let Some(command) = &args.command {
        sh.run_script(command)
    } else if let Some(script) = &args.script {
        let text = std::fs::read_to_string(script)
            .with_context(|| format!("can't read {}", script.display()))?;
        sh.run_script(&text)
    } else {
        sh.repl().context("line editor failed")?;
        sh.status()
    };

    std::process::exit(status);
}

//! Turns a parsed command into an argument vector and a redirection list.

use crate::env::Environment;
use crate::expand::{GlobReport, WordExpander};
use crate::parser::CommandNode;
use std::fmt;
use tracing::trace;

/// Direction and open mode of a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`: read-only, replaces stdin.
    Input,
    /// `>`: create or truncate, replaces stdout.
    Output,
    /// `>>`: create or append, replaces stdout.
    Append,
}

impl RedirectKind {
    fn from_operator(word: &str) -> Option<Self> {
        match word {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        }
    }

    /// Stream the redirection replaces.
    pub fn stream(self) -> &'static str {
        match self {
            RedirectKind::Input => "stdin",
            RedirectKind::Output | RedirectKind::Append => "stdout",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RedirectKind::Input => "<",
            RedirectKind::Output => ">",
            RedirectKind::Append => ">>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.symbol(), self.target)
    }
}

/// A command ready to be launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub argv: Vec<String>,
    /// Applied in order, so the last redirection of a stream wins.
    pub redirects: Vec<Redirect>,
    /// Glob expansions that happened while resolving, in order.
    pub globs: Vec<GlobReport>,
}

impl ResolvedCommand {
    pub fn name(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

/// Expand the children of `node` into argv and redirections.
///
/// A redirection operator takes the first word of the next child's
/// expansion as its target. If that expansion is empty, the redirection is
/// dropped. A trailing operator without a target is ignored.
pub fn resolve(
    node: &CommandNode,
    expander: &dyn WordExpander,
    env: &Environment,
) -> ResolvedCommand {
    let mut cmd = ResolvedCommand::default();
    let mut pending: Option<RedirectKind> = None;

    for word in node.words() {
        if let Some(kind) = RedirectKind::from_operator(word) {
            pending = Some(kind);
            continue;
        }

        let expansion = expander.expand(word, env);
        cmd.globs.extend(expansion.glob);

        match pending.take() {
            Some(kind) => match expansion.words.into_iter().next() {
                Some(target) => cmd.redirects.push(Redirect { kind, target }),
                None => trace!(word, "redirection target expanded to nothing"),
            },
            None => cmd.argv.extend(expansion.words),
        }
    }

    cmd
}

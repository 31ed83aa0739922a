//! Word expansion.
//!
//! The executor treats expansion as an opaque transform from one raw token to
//! an ordered list of words. [`ShellExpander`] is the default implementation:
//! quote removal, `$NAME`, `${NAME}`, `$?`, `$$`, a leading `~`, and filename
//! globbing of unquoted `*`, `?` and `[`.

use crate::env::Environment;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("valid parameter-name pattern"));

/// A glob that ran during expansion, kept for dry-run reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobReport {
    /// The pattern after quote removal and parameter substitution.
    pub pattern: String,
    /// Matching paths in sorted order, empty when nothing matched.
    pub matches: Vec<String>,
}

/// Result of expanding one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Zero or more resulting words, in order.
    pub words: Vec<String>,
    pub glob: Option<GlobReport>,
}

impl Expansion {
    pub fn from_words(words: Vec<String>) -> Self {
        Self { words, glob: None }
    }
}

/// Turns a raw token into its expanded words.
///
/// Failures are not errors: an expander that cannot make sense of a token
/// returns an empty list and the token is dropped.
pub trait WordExpander {
    fn expand(&self, word: &str, env: &Environment) -> Expansion;
}

/// Default expander used by the interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExpander;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Unquoted,
    Single,
    Double,
}

/// Accumulates the expanded value and, in parallel, the glob pattern where
/// only unquoted metacharacters stay active.
#[derive(Default)]
struct WordBuilder {
    value: String,
    pattern: String,
    has_glob: bool,
    quoted: bool,
}

impl WordBuilder {
    fn push_active(&mut self, ch: char) {
        if matches!(ch, '*' | '?' | '[') {
            self.has_glob = true;
        }
        self.value.push(ch);
        self.pattern.push(ch);
    }

    fn push_inert(&mut self, text: &str) {
        self.value.push_str(text);
        self.pattern.push_str(&Pattern::escape(text));
    }
}

impl WordExpander for ShellExpander {
    fn expand(&self, word: &str, env: &Environment) -> Expansion {
        let mut out = WordBuilder::default();
        let mut state = QuoteState::Unquoted;
        let mut i = 0;

        if let Some(rest) = word.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with('/') {
                if let Some(home) = env.get_var("HOME") {
                    out.push_inert(&home);
                    i = 1;
                }
            }
        }

        while let Some(ch) = word[i..].chars().next() {
            i += ch.len_utf8();
            match (state, ch) {
                (QuoteState::Unquoted, '\'') => {
                    out.quoted = true;
                    state = QuoteState::Single;
                }
                (QuoteState::Unquoted, '"') => {
                    out.quoted = true;
                    state = QuoteState::Double;
                }
                (QuoteState::Single, '\'') | (QuoteState::Double, '"') => {
                    state = QuoteState::Unquoted;
                }
                (QuoteState::Single, c) => out.push_inert(c.encode_utf8(&mut [0; 4])),
                (QuoteState::Unquoted, '\\') => {
                    out.quoted = true;
                    if let Some(next) = word[i..].chars().next() {
                        i += next.len_utf8();
                        out.push_inert(next.encode_utf8(&mut [0; 4]));
                    }
                }
                (QuoteState::Double, '\\') => match word[i..].chars().next() {
                    Some(next @ ('$' | '"' | '\\' | '`')) => {
                        i += next.len_utf8();
                        out.push_inert(next.encode_utf8(&mut [0; 4]));
                    }
                    _ => out.push_inert("\\"),
                },
                (_, '$') => {
                    let (consumed, value) = expand_parameter(&word[i..], env);
                    i += consumed;
                    match value {
                        Some(v) => out.push_inert(&v),
                        None => out.push_inert("$"),
                    }
                }
                (QuoteState::Double, c) => out.push_inert(c.encode_utf8(&mut [0; 4])),
                (QuoteState::Unquoted, c) => out.push_active(c),
            }
        }

        if out.has_glob {
            return expand_glob(out);
        }
        if out.value.is_empty() && !out.quoted {
            return Expansion::default();
        }
        Expansion::from_words(vec![out.value])
    }
}

/// Expand the parameter following a `$`.
///
/// Returns how many bytes of `rest` were consumed and the substituted value;
/// `None` means the `$` is literal.
fn expand_parameter(rest: &str, env: &Environment) -> (usize, Option<String>) {
    if rest.starts_with('?') {
        return (1, Some(env.last_status.to_string()));
    }
    if rest.starts_with('$') {
        return (1, Some(std::process::id().to_string()));
    }
    if let Some(braced) = rest.strip_prefix('{') {
        return match braced.find('}') {
            Some(end) => {
                let name = &braced[..end];
                let value = match name {
                    "?" => env.last_status.to_string(),
                    _ => env.get_var(name).unwrap_or_default(),
                };
                (end + 2, Some(value))
            }
            None => (0, None),
        };
    }
    match PARAM_NAME.find(rest) {
        Some(m) => (m.end(), Some(env.get_var(m.as_str()).unwrap_or_default())),
        None => (0, None),
    }
}

fn expand_glob(word: WordBuilder) -> Expansion {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let matches: Vec<String> = match glob::glob_with(&word.pattern, options) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(err) => {
            trace!(pattern = %word.pattern, %err, "invalid glob pattern, keeping word literally");
            Vec::new()
        }
    };
    trace!(pattern = %word.value, count = matches.len(), "glob expanded");

    let words = if matches.is_empty() {
        vec![word.value.clone()]
    } else {
        matches.clone()
    };
    Expansion {
        words,
        glob: Some(GlobReport {
            pattern: word.value,
            matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::fs::File;

    fn env() -> Environment {
        let mut vars = HashMap::new();
        vars.insert("HOME".to_string(), "/home/user".to_string());
        vars.insert("NAME".to_string(), "world".to_string());
        let mut env = Environment::with_vars(vars, std::env::current_dir().unwrap());
        env.last_status = 3;
        env
    }

    fn words(word: &str) -> Vec<String> {
        ShellExpander.expand(word, &env()).words
    }

    #[test]
    fn test_plain_word() {
        assert_eq!(words("hello"), vec!["hello"]);
    }

    #[test]
    fn test_quote_removal() {
        assert_eq!(words("'a b'"), vec!["a b"]);
        assert_eq!(words("\"x  y\"z"), vec!["x  yz"]);
        assert_eq!(words(r"a\ b"), vec!["a b"]);
        assert_eq!(words(r#""a\"b""#), vec!["a\"b"]);
    }

    #[test]
    fn test_backslash_inside_single_quotes_is_literal() {
        assert_eq!(words(r"'a\b'"), vec![r"a\b"]);
        assert_eq!(words(r"'b\na\n'"), vec![r"b\na\n"]);
    }

    #[test]
    fn test_expansion_is_not_field_split() {
        let mut env = env();
        env.set_var("V", "a b");
        assert_eq!(ShellExpander.expand("$V", &env).words, vec!["a b"]);
    }

    #[test]
    fn test_parameters() {
        assert_eq!(words("$NAME"), vec!["world"]);
        assert_eq!(words("${NAME}!"), vec!["world!"]);
        assert_eq!(words("\"hi $NAME\""), vec!["hi world"]);
        assert_eq!(words("'$NAME'"), vec!["$NAME"]);
        assert_eq!(words("$?"), vec!["3"]);
        assert_eq!(words("$$"), vec![std::process::id().to_string()]);
        assert_eq!(words("cost$"), vec!["cost$"]);
    }

    #[test]
    fn test_unset_unquoted_is_dropped() {
        assert!(words("$NOT_SET_ANYWHERE").is_empty());
        assert_eq!(words("\"$NOT_SET_ANYWHERE\""), vec![""]);
        assert_eq!(words("''"), vec![""]);
    }

    #[test]
    fn test_tilde() {
        assert_eq!(words("~"), vec!["/home/user"]);
        assert_eq!(words("~/bin"), vec!["/home/user/bin"]);
        assert_eq!(words("~other"), vec!["~other"]);
    }

    #[test]
    #[serial]
    fn test_glob_matches_sorted_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log", ".hidden.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let pattern = format!("{}/*.txt", dir.path().display());

        let exp = ShellExpander.expand(&pattern, &env());
        let expected = vec![
            format!("{}/a.txt", dir.path().display()),
            format!("{}/b.txt", dir.path().display()),
        ];
        assert_eq!(exp.words, expected);
        let report = exp.glob.expect("glob report");
        assert_eq!(report.pattern, pattern);
        assert_eq!(report.matches, expected);
    }

    #[test]
    fn test_glob_without_match_keeps_word() {
        let exp = ShellExpander.expand("/nonexistent-dir-for-pipesh/*.zzz", &env());
        assert_eq!(exp.words, vec!["/nonexistent-dir-for-pipesh/*.zzz"]);
        assert_eq!(exp.glob.map(|g| g.matches), Some(vec![]));
    }

    #[test]
    fn test_quoted_glob_is_literal() {
        let exp = ShellExpander.expand("'*.txt'", &env());
        assert_eq!(exp.words, vec!["*.txt"]);
        assert!(exp.glob.is_none());
    }
}

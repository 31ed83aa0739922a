//! Tokenizer for command lines.
//!
//! The tokenizer is byte oriented: it recognizes operators and splits words,
//! but leaves quote removal and substitutions to the word expander. Quoted
//! regions and backslash escapes are kept inside the word they belong to so
//! that blanks or operators between quotes do not split it.

use crate::source::Source;
use std::fmt;

/// Control and redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `>>`
    Append,
    /// `|`
    Pipe,
    /// `&`
    Amp,
    /// `;`
    Semi,
    /// `<`
    Less,
    /// `>`
    Great,
}

impl Operator {
    /// Source text of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::AndIf => "&&",
            Operator::OrIf => "||",
            Operator::Append => ">>",
            Operator::Pipe => "|",
            Operator::Amp => "&",
            Operator::Semi => ";",
            Operator::Less => "<",
            Operator::Great => ">",
        }
    }

    /// Whether the operator ends a simple command.
    pub fn ends_command(self) -> bool {
        matches!(
            self,
            Operator::AndIf | Operator::OrIf | Operator::Pipe | Operator::Amp | Operator::Semi
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, still carrying its quotes and escapes.
    Word(String),
    /// One of the recognized operators.
    Operator(Operator),
    /// A literal newline.
    Newline,
    /// No more input.
    EndOfInput,
}

impl Token {
    /// Raw text of the token as it appeared in the input.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Operator(op) => op.as_str(),
            Token::Newline => "\n",
            Token::EndOfInput => "",
        }
    }

    /// Give the token back to the source so the next [`tokenize`] call
    /// yields it again.
    pub fn unread(&self, src: &mut Source) {
        src.unget_n(self.text().len());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordState {
    Unquoted,
    SingleQuote,
    DoubleQuote,
}

fn is_operator_start(ch: u8) -> bool {
    matches!(ch, b'&' | b'|' | b';' | b'<' | b'>')
}

/// Consume the next token from `src`.
pub fn tokenize(src: &mut Source) -> Token {
    src.skip_whitespace();

    let Some(ch) = src.advance() else {
        return Token::EndOfInput;
    };

    let op = match ch {
        b'\n' => return Token::Newline,
        b'&' => Some(double_or_single(src, b'&', Operator::AndIf, Operator::Amp)),
        b'|' => Some(double_or_single(src, b'|', Operator::OrIf, Operator::Pipe)),
        b'>' => Some(double_or_single(src, b'>', Operator::Append, Operator::Great)),
        b'<' => Some(Operator::Less),
        b';' => Some(Operator::Semi),
        _ => None,
    };
    if let Some(op) = op {
        return Token::Operator(op);
    }

    src.unget();
    Token::Word(read_word(src))
}

fn double_or_single(src: &mut Source, second: u8, double: Operator, single: Operator) -> Operator {
    if src.peek() == Some(second) {
        src.advance();
        double
    } else {
        single
    }
}

fn read_word(src: &mut Source) -> String {
    let mut bytes = Vec::new();
    let mut state = WordState::Unquoted;

    while let Some(ch) = src.peek() {
        match state {
            WordState::Unquoted => match ch {
                b' ' | b'\t' | b'\n' => break,
                c if is_operator_start(c) => break,
                b'\'' => state = WordState::SingleQuote,
                b'"' => state = WordState::DoubleQuote,
                b'\\' => {
                    push_escape(src, &mut bytes);
                    continue;
                }
                _ => {}
            },
            WordState::SingleQuote => {
                if ch == b'\'' {
                    state = WordState::Unquoted;
                }
            }
            WordState::DoubleQuote => match ch {
                b'"' => state = WordState::Unquoted,
                b'\\' => {
                    push_escape(src, &mut bytes);
                    continue;
                }
                _ => {}
            },
        }
        bytes.push(ch);
        src.advance();
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Copy a backslash and the byte it escapes, both verbatim.
fn push_escape(src: &mut Source, bytes: &mut Vec<u8>) {
    if let Some(backslash) = src.advance() {
        bytes.push(backslash);
    }
    if let Some(next) = src.advance() {
        bytes.push(next);
    }
}

//! Position-tracked view over one input line, plus the line pre-processing
//! (continuations and comments) that happens before a cursor is created.

/// A cursor over the bytes of one input line.
///
/// `consumed` counts the bytes already handed out, so it always lies in
/// `0..=len`. Zero means nothing has been consumed yet.
#[derive(Debug, Clone)]
pub struct Source {
    buffer: Vec<u8>,
    consumed: usize,
}

impl Source {
    /// Create a cursor positioned before the first byte of `line`.
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            buffer: line.into().into_bytes(),
            consumed: 0,
        }
    }

    /// Total length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Return the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.buffer.get(self.consumed).copied()
    }

    /// Consume and return the next byte. At end-of-input the cursor stays put.
    pub fn advance(&mut self) -> Option<u8> {
        let ch = self.buffer.get(self.consumed).copied();
        if ch.is_some() {
            self.consumed += 1;
        }
        ch
    }

    /// Undo the last `advance`. A no-op when nothing has been consumed.
    pub fn unget(&mut self) {
        self.consumed = self.consumed.saturating_sub(1);
    }

    /// Undo the last `n` advances.
    pub fn unget_n(&mut self, n: usize) {
        for _ in 0..n {
            self.unget();
        }
    }

    /// Consume everything up to, but not including, the next newline.
    pub fn take_line(&mut self) -> String {
        let rest = &self.buffer[self.consumed..];
        let len = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        let line = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.consumed += len;
        line
    }

    /// Skip spaces and tabs. Newlines are significant and stay in place.
    pub fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.advance();
        }
    }
}

/// Appends one physical line to a logical command line.
///
/// Returns `true` when `line` ends with a backslash, meaning the command
/// continues on the next physical line. The backslash itself is dropped.
pub fn push_continuation(buffer: &mut String, line: &str) -> bool {
    let line = line.strip_suffix('\n').unwrap_or(line);
    match line.strip_suffix('\\') {
        Some(head) => {
            buffer.push_str(head);
            true
        }
        None => {
            buffer.push_str(line);
            false
        }
    }
}

/// Cut the line at the first `#` that starts a word outside of quotes.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut at_word_start = true;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            at_word_start = false;
            continue;
        }
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => escaped = true,
            (Some(_), _) => {}
            (None, '\\') => escaped = true,
            (None, '\'' | '"') => quote = Some(ch),
            (None, '#') if at_word_start => return &line[..idx],
            _ => {}
        }
        at_word_start = quote.is_none() && matches!(ch, ' ' | '\t' | ';' | '&' | '|');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_stops_at_newline() {
        let mut src = Source::new("dry ls | wc\necho");
        src.advance();
        src.advance();
        src.advance();
        assert_eq!(src.take_line(), " ls | wc");
        assert_eq!(src.peek(), Some(b'\n'));

        src.advance();
        assert_eq!(src.take_line(), "echo");
        assert_eq!(src.take_line(), "");
        assert_eq!(src.peek(), None);
    }

    #[test]
    fn test_cursor_peek_advance_unget() {
        let mut src = Source::new("ab");
        assert_eq!(src.position(), 0);
        assert_eq!(src.peek(), Some(b'a'));
        assert_eq!(src.advance(), Some(b'a'));
        assert_eq!(src.advance(), Some(b'b'));
        assert_eq!(src.advance(), None);
        assert_eq!(src.position(), 2);

        src.unget();
        assert_eq!(src.peek(), Some(b'b'));
        src.unget_n(5);
        assert_eq!(src.position(), 0);
        assert_eq!(src.peek(), Some(b'a'));
    }

    #[test]
    fn test_unget_on_fresh_cursor_is_noop() {
        let mut src = Source::new("x");
        src.unget();
        assert_eq!(src.position(), 0);
        assert_eq!(src.advance(), Some(b'x'));
    }

    #[test]
    fn test_skip_whitespace_stops_at_newline() {
        let mut src = Source::new(" \t \nls");
        src.skip_whitespace();
        assert_eq!(src.peek(), Some(b'\n'));
    }

    #[test]
    fn test_continuation_joins_lines() {
        let mut buf = String::new();
        assert!(push_continuation(&mut buf, "echo foo \\\n"));
        assert!(!push_continuation(&mut buf, "bar\n"));
        assert_eq!(buf, "echo foo bar");
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("echo hi # note"), "echo hi ");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment("echo a#b"), "echo a#b");
        assert_eq!(strip_comment("echo '# not' \"#\""), "echo '# not' \"#\"");
        assert_eq!(strip_comment("ls;# trailing"), "ls;");
    }
}

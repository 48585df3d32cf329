//! A minimal lexer for Go source files.
//!
//! Only as much of the Go lexical grammar is recognised as is needed to find
//! `func <Identifier>` pairs reliably: comments and string/rune literals are
//! skipped so that text inside them can never look like a declaration, and
//! identifiers are separated from keywords. Operators are reported one byte
//! at a time since no consumer cares about their exact shape.

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// The `func` keyword.
    Func,
    /// Any keyword other than `func`.
    Keyword(&'a str),
    Ident(&'a str),
    /// Number, string, raw string or rune literal.
    Literal,
    Punct(u8),
    /// Bytes that cannot start any token, including identifiers that are not
    /// valid UTF-8.
    Illegal,
}

/// Iterator over the tokens of a Go source file. Comments and whitespace are
/// dropped.
pub struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        let pos = if src.starts_with(b"\xEF\xBB\xBF") { 3 } else { 0 };
        Self { src, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Skips whitespace and comments. Returns once the next byte starts a
    /// token or the input is exhausted.
    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Consumes a quoted literal whose opening quote has already been
    /// consumed. Interpreted strings and runes honour backslash escapes and
    /// stop at a newline; raw strings run until the closing backtick.
    fn skip_quoted(&mut self, quote: u8) {
        let escapes = quote != b'`';
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == quote {
                return;
            }
            if escapes && b == b'\\' {
                self.pos += 1;
            } else if escapes && b == b'\n' {
                return;
            }
        }
    }

    fn skip_number(&mut self) {
        let hex = self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X'));
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
                let exponent = matches!(b, b'p' | b'P') || (!hex && matches!(b, b'e' | b'E'));
                if exponent && matches!(self.peek(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn scan_word(&mut self) -> Token<'a> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_ident_byte(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        let Ok(word) = std::str::from_utf8(&self.src[start..self.pos]) else {
            return Token::Illegal;
        };
        if word == "func" {
            Token::Func
        } else if KEYWORDS.contains(&word) {
            Token::Keyword(word)
        } else {
            Token::Ident(word)
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_byte(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_trivia();
        let b = self.peek()?;
        let token = match b {
            b'"' | b'`' | b'\'' => {
                self.pos += 1;
                self.skip_quoted(b);
                Token::Literal
            }
            b'0'..=b'9' => {
                self.skip_number();
                Token::Literal
            }
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.skip_number();
                Token::Literal
            }
            b if is_ident_start(b) => self.scan_word(),
            b if b.is_ascii_punctuation() => {
                self.pos += 1;
                Token::Punct(b)
            }
            _ => {
                self.pos += 1;
                Token::Illegal
            }
        };
        Some(token)
    }
}

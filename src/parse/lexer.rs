//! Lexer for the textual IR format (SPEC_FULL.md §6). Grounded in
//! `backend/ir-parser.cc`'s token set and `common/parser-utils.h`'s
//! `PeekableStream`/`Token`.

use crate::diag::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    IntLiteral(i64),
    Ident(String),
    QuotedString(String),
    Percent,
    Comma,
    Colon,
    Equals,
    LBracket,
    RBracket,
    At,
    Plus,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

pub struct Lexer<'a> {
    filename: String,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(filename: impl Into<String>, input: &'a str) -> Self {
        Lexer {
            filename: filename.into(),
            chars: input.chars().peekable(),
            line: 1,
            col: 0,
        }
    }

    fn loc(&self) -> Location {
        Location::new(self.filename.clone(), self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 0;
            }
            Some(_) => {
                self.col += 1;
            }
            None => {}
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Skips spaces/tabs/carriage-returns and `#`-comments, but stops at (and
    /// does not consume) a newline -- newlines are significant tokens that
    /// separate BBs and statements.
    fn skip_insignificant(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_insignificant();
        let location = self.loc();
        let Some(c) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                location,
            };
        };

        let kind = match c {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '%' => {
                self.bump();
                TokenKind::Percent
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            '=' => {
                self.bump();
                TokenKind::Equals
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            '@' => {
                self.bump();
                TokenKind::At
            }
            '+' => {
                self.bump();
                TokenKind::Plus
            }
            '"' => {
                self.bump();
                let mut s = String::new();
                while let Some(c) = self.peek() {
                    if c == '"' {
                        break;
                    }
                    s.push(c);
                    self.bump();
                }
                self.bump();
                TokenKind::QuotedString(s)
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                if c == '0' {
                    s.push(c);
                    self.bump();
                    if self.peek() == Some('x') || self.peek() == Some('X') {
                        s.push(self.bump().unwrap());
                        while let Some(c) = self.peek() {
                            if c.is_ascii_hexdigit() {
                                s.push(c);
                                self.bump();
                            } else {
                                break;
                            }
                        }
                        let val = i64::from_str_radix(&s[2..], 16).unwrap_or(0);
                        return Token {
                            kind: TokenKind::IntLiteral(val),
                            location,
                        };
                    }
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        s.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                TokenKind::IntLiteral(s.parse().unwrap_or(0))
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        s.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(s)
            }
            _ => {
                self.bump();
                // Unknown character: represented as a zero-width ident so
                // the parser reports an error at its own level rather than
                // the lexer panicking.
                TokenKind::Ident(c.to_string())
            }
        };

        Token { kind, location }
    }
}

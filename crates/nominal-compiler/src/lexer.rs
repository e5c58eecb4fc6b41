//! The Lexer (spec.md §4.4): a character-level scanner producing a flat
//! token stream with source offsets, so parser errors can report a
//! position the way the teacher's `ParseError`/`Token` machinery does.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(Vec<u8>),
    Ident(String),
    Nil,
    True,
    False,
    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Assign,  // '='
    Declare, // ':='

    Comma,
    Dot,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Pipe,
    Arrow, // '->'
    Caret,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// A source position, carried by `ParseError` for display
/// (`line:column`, 1-indexed for user-facing messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, (String, Position)> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let (line, column, offset) = (self.line, self.column, self.pos);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                    line,
                    column,
                });
                break;
            };
            let kind = match c {
                b'0'..=b'9' => self.number(),
                b'"' => self.string(Position { line, column })?,
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.ident_or_keyword(),
                b'+' => {
                    self.advance();
                    TokenKind::Plus
                }
                b'-' => {
                    self.advance();
                    if self.peek() == Some(b'>') {
                        self.advance();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                }
                b'*' => {
                    self.advance();
                    TokenKind::Star
                }
                b'/' => {
                    self.advance();
                    TokenKind::Slash
                }
                b'<' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'=' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::EqEq
                    } else {
                        TokenKind::Assign
                    }
                }
                b'!' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::NotEq
                    } else {
                        return Err((
                            "unexpected character '!'".to_string(),
                            Position { line, column },
                        ));
                    }
                }
                b':' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::Declare
                    } else {
                        TokenKind::Colon
                    }
                }
                b',' => {
                    self.advance();
                    TokenKind::Comma
                }
                b'.' => {
                    self.advance();
                    TokenKind::Dot
                }
                b';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                b'(' => {
                    self.advance();
                    TokenKind::LParen
                }
                b')' => {
                    self.advance();
                    TokenKind::RParen
                }
                b'{' => {
                    self.advance();
                    TokenKind::LBrace
                }
                b'}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                b'[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                b']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                b'|' => {
                    self.advance();
                    TokenKind::Pipe
                }
                b'^' => {
                    self.advance();
                    TokenKind::Caret
                }
                other => {
                    return Err((
                        format!("unexpected character '{}'", other as char),
                        Position { line, column },
                    ));
                }
            };
            tokens.push(Token {
                kind,
                offset,
                line,
                column,
            });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, delta: usize) -> Option<u8> {
        self.src.get(self.pos + delta).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        TokenKind::Number(text.parse().expect("lexer only admits valid number syntax"))
    }

    fn string(&mut self, start_pos: Position) -> Result<TokenKind, (String, Position)> {
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None => return Err(("unterminated string literal".to_string(), start_pos)),
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'"') => bytes.push(b'"'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(other) => {
                        return Err((
                            format!("unsupported escape sequence '\\{}'", other as char),
                            start_pos,
                        ))
                    }
                    None => return Err(("unterminated string literal".to_string(), start_pos)),
                },
                Some(c) => bytes.push(c),
            }
        }
        Ok(TokenKind::String(bytes))
    }

    fn ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match text {
            "nil" => TokenKind::Nil,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Ident(text.to_string()),
        }
    }
}

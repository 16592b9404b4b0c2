//! Tokenizer for the bundled C subset (spec.md §4.H, SPEC_FULL.md §4.H
//! supplement): identifiers, integer/string/char literals, the keyword set
//! the subset grammar needs, and punctuation. Tracks source line numbers so
//! diagnostics can honor `#line` (spec.md §4.J step 4).

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLiteral(i64),
    StringLiteral(String),
    CharLiteral(u8),
    // Keywords.
    KwInt,
    KwChar,
    KwVoid,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwReturn,
    // Punctuation/operators.
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    Comma,
    Star,
    Amp,
    Plus,
    Minus,
    Slash,
    Percent,
    Assign,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        *self.src.get(self.pos + offset).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.peek() != b'\n' && self.peek() != 0 {
                        self.advance();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.advance();
                    self.advance();
                    while !(self.peek() == b'*' && self.peek_at(1) == b'/') && self.peek() != 0 {
                        self.advance();
                    }
                    self.advance();
                    self.advance();
                }
                b'#' => {
                    // `#line N "file"` and other directives: skip the line.
                    while self.peek() != b'\n' && self.peek() != 0 {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let line = self.line;
            let c = self.peek();
            if c == 0 {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                });
                break;
            }
            let kind = if c.is_ascii_digit() {
                self.lex_number()
            } else if c == b'"' {
                self.lex_string()
            } else if c == b'\'' {
                self.lex_char()
            } else if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_ident_or_keyword()
            } else {
                self.lex_operator()
            };
            tokens.push(Token { kind, line });
        }
        tokens
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.advance();
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            let text = core::str::from_utf8(&self.src[start + 2..self.pos]).unwrap_or("0");
            let v = i64::from_str_radix(text, 16).unwrap_or(0);
            return TokenKind::IntLiteral(v);
        }
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let text = core::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        TokenKind::IntLiteral(text.parse().unwrap_or(0))
    }

    fn lex_string(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let mut s = String::new();
        while self.peek() != b'"' && self.peek() != 0 {
            let c = self.advance();
            if c == b'\\' {
                s.push(unescape(self.advance()) as char);
            } else {
                s.push(c as char);
            }
        }
        self.advance(); // closing quote
        TokenKind::StringLiteral(s)
    }

    fn lex_char(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let c = self.advance();
        let value = if c == b'\\' {
            unescape(self.advance())
        } else {
            c
        };
        if self.peek() == b'\'' {
            self.advance();
        }
        TokenKind::CharLiteral(value)
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let text = core::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        match text {
            "int" => TokenKind::KwInt,
            "char" => TokenKind::KwChar,
            "void" => TokenKind::KwVoid,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "for" => TokenKind::KwFor,
            "return" => TokenKind::KwReturn,
            _ => TokenKind::Ident(String::from(text)),
        }
    }

    fn lex_operator(&mut self) -> TokenKind {
        let c = self.advance();
        match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'*' => TokenKind::Star,
            b'%' => TokenKind::Percent,
            b'&' if self.peek() == b'&' => {
                self.advance();
                TokenKind::AndAnd
            }
            b'&' => TokenKind::Amp,
            b'|' if self.peek() == b'|' => {
                self.advance();
                TokenKind::OrOr
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'/' => TokenKind::Slash,
            b'=' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Eq
            }
            b'=' => TokenKind::Assign,
            b'!' if self.peek() == b'=' => {
                self.advance();
                TokenKind::NotEq
            }
            b'!' => TokenKind::Bang,
            b'<' if self.peek() == b'=' => {
                self.advance();
                TokenKind::LtEq
            }
            b'<' => TokenKind::Lt,
            b'>' if self.peek() == b'=' => {
                self.advance();
                TokenKind::GtEq
            }
            b'>' => TokenKind::Gt,
            other => {
                // Unknown byte: surface it as its own "identifier" so the
                // parser produces a location-accurate syntax error instead
                // of the lexer silently eating input.
                TokenKind::Ident(String::from(other as char))
            }
        }
    }
}

fn unescape(c: u8) -> u8 {
    match c {
        b'n' => b'\n',
        b't' => b'\t',
        b'0' => 0,
        b'\\' => b'\\',
        b'"' => b'"',
        b'\'' => b'\'',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_return_statement() {
        let tokens = Lexer::new("return 42;").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::KwReturn);
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral(42));
        assert_eq!(tokens[2].kind, TokenKind::Semicolon);
    }

    #[test]
    fn line_directive_is_skipped_but_newline_still_counted() {
        let tokens = Lexer::new("#line 1 \"foo.c\"\nreturn 1;").tokenize();
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn string_literal_handles_escapes() {
        let tokens = Lexer::new("\"a\\nb\"").tokenize();
        match &tokens[0].kind {
            TokenKind::StringLiteral(s) => assert_eq!(s.as_str(), "a\nb"),
            other => panic!("expected string literal, got {other:?}"),
        }
    }
}

/// Lexer for CQL, the component query language.
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Exact,
    Contains,

    // Literals
    Ident(String),

    // Punctuation
    LParen,
    RParen,
    Comma,
    Bang,
    Amp,
    Pipe,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Exact => write!(f, "EXACT"),
            Token::Contains => write!(f, "CONTAINS"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Bang => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub col: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    /// 1-based column of `pos`, counted in characters.
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            col: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.token == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        self.col += 1;
        Some(c)
    }

    fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let col = self.col;
        let Some(c) = self.peek_char() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                col,
            });
        };

        let punct = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '!' => Some(Token::Bang),
            '&' => Some(Token::Amp),
            '|' => Some(Token::Pipe),
            _ => None,
        };

        if let Some(token) = punct {
            self.advance();
            return Ok(SpannedToken { token, col });
        }

        // Identifiers and keywords. Keywords are upper-case only, so
        // `exact` is an ordinary component name.
        if c.is_alphabetic() || c == '_' {
            let start = self.pos;
            while self
                .peek_char()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
            {
                self.advance();
            }
            let token = match &self.input[start..self.pos] {
                "EXACT" => Token::Exact,
                "CONTAINS" => Token::Contains,
                other => Token::Ident(other.to_string()),
            };
            return Ok(SpannedToken { token, col });
        }

        Err(LexError {
            col,
            message: format!("unexpected character: '{c}'"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub col: usize,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.col, self.message)
    }
}

impl std::error::Error for LexError {}

use crate::error::TokenizeError;
use crate::ops::Grammar;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Op(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Name(String),
    Semicolon,
}

impl TokenKind {
    /// Short human description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Op(s) => format!("operator {s:?}"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string {s:?}"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Name(s) => format!("name {s:?}"),
            TokenKind::Semicolon => "';'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub position: usize,
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    grammar: &'a Grammar,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, grammar: &'a Grammar) -> Self {
        Self {
            input,
            cursor: 0,
            grammar,
            done: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn token(&mut self, kind: TokenKind, start: usize, len: usize) -> Token {
        self.advance(len);
        Token {
            kind,
            position: start,
        }
    }

    /// Collects every token, ending with a single `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Returns the next token, `Eof` once at the end, then `None`.
    pub fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        if self.done {
            return Ok(None);
        }

        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let start = self.cursor;
        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            self.done = true;
            return Ok(Some(Token {
                kind: TokenKind::Eof,
                position: start,
            }));
        };

        let token = match first {
            '\'' | '"' => self.string(first)?,
            '(' => self.token(TokenKind::LParen, start, 1),
            ')' => self.token(TokenKind::RParen, start, 1),
            '[' => self.token(TokenKind::LBracket, start, 1),
            ']' => self.token(TokenKind::RBracket, start, 1),
            ',' => self.token(TokenKind::Comma, start, 1),
            ';' => self.token(TokenKind::Semicolon, start, 1),
            c if c.is_ascii_digit() => self.number()?,
            '.' if rest[1..].starts_with(|c: char| c.is_ascii_digit()) => self.number()?,
            _ => {
                if let Some(symbol) = self.operator() {
                    let len = symbol.len();
                    self.token(TokenKind::Op(symbol), start, len)
                } else if self.grammar.is_ident_start(first) {
                    let len: usize = rest
                        .chars()
                        .take_while(|c| self.grammar.is_ident_char(*c))
                        .map(char::len_utf8)
                        .sum();
                    let name = rest[..len].to_string();
                    self.token(TokenKind::Name(name), start, len)
                } else {
                    return Err(TokenizeError::UnexpectedChar {
                        found: first,
                        position: start,
                    });
                }
            }
        };
        Ok(Some(token))
    }

    /// Longest operator symbol at the cursor. Word operators (`and`, `sqrt`)
    /// only match on an identifier boundary.
    fn operator(&self) -> Option<String> {
        let rest = self.remaining();
        self.grammar
            .symbols()
            .iter()
            .find(|symbol| {
                if !rest.starts_with(symbol.as_str()) {
                    return false;
                }
                let wordy = symbol.chars().last().is_some_and(|c| self.grammar.is_ident_char(c));
                !wordy
                    || !rest[symbol.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| self.grammar.is_ident_char(c))
            })
            .cloned()
    }

    fn number(&mut self) -> Result<Token, TokenizeError> {
        let start = self.cursor;
        let rest = self.remaining();
        let bytes = rest.as_bytes();
        let malformed = TokenizeError::MalformedNumber { position: start };

        let radix = match (bytes.first(), bytes.get(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => Some(16),
            (Some(b'0'), Some(b'b' | b'B')) => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            let digits: usize = rest[2..]
                .chars()
                .take_while(|c| c.is_digit(radix))
                .count();
            if digits == 0 {
                return Err(malformed);
            }
            let value = u64::from_str_radix(&rest[2..2 + digits], radix).map_err(|_| malformed)?;
            return Ok(self.token(TokenKind::Number(value as f64), start, 2 + digits));
        }

        let count_digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();
        let mut len = count_digits(0);
        if bytes.get(len) == Some(&b'.') {
            len += 1;
            len += count_digits(len);
        }
        if matches!(bytes.get(len), Some(b'e' | b'E')) {
            let mut exp = len + 1;
            if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            let digits = count_digits(exp);
            if digits == 0 {
                return Err(malformed);
            }
            len = exp + digits;
        }

        let value: f64 = rest[..len].parse().map_err(|_| malformed)?;
        Ok(self.token(TokenKind::Number(value), start, len))
    }

    fn string(&mut self, quote: char) -> Result<Token, TokenizeError> {
        let start = self.cursor;
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);

        while let Some((idx, c)) = chars.next() {
            if c == quote {
                return Ok(self.token(TokenKind::Str(s), start, idx + c.len_utf8()));
            }
            if c != '\\' {
                s.push(c);
                continue;
            }
            let invalid = TokenizeError::InvalidEscape {
                position: start + idx,
            };
            let Some((_, esc)) = chars.next() else {
                break;
            };
            match esc {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                'b' => s.push('\u{8}'),
                'f' => s.push('\u{c}'),
                'v' => s.push('\u{b}'),
                '0' => s.push('\0'),
                '\\' | '\'' | '"' | '/' => s.push(esc),
                'u' => {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        let digit = chars
                            .next()
                            .and_then(|(_, h)| h.to_digit(16))
                            .ok_or(invalid.clone())?;
                        code = code * 16 + digit;
                    }
                    s.push(char::from_u32(code).ok_or(invalid)?);
                }
                _ => return Err(invalid),
            }
        }

        Err(TokenizeError::UnterminatedString { position: start })
    }
}

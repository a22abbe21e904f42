//! Tokenizer for the statement language.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword.
    Ident(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    Str(String),
    /// `$name` parameter.
    Param(String),
    /// Duration literal such as `1h30m`.
    Duration(Duration),
    /// `d"..."` datetime literal.
    Datetime(String),
    /// `u"..."` UUID literal.
    Uuid(String),
    /// `b"..."` hex byte literal.
    Bytes(Vec<u8>),
    /// Comparison or assignment operator.
    Op(&'static str),
    /// Single punctuation character.
    Punct(char),
}

impl Token {
    /// Returns true if this token is the given keyword (case-insensitive).
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }
}

/// Splits statement text into tokens.
pub fn tokenize(input: &str) -> CoreResult<Vec<Token>> {
    Lexer {
        chars: input.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> CoreResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }
            if c == '-' && self.peek_at(1) == Some('-') {
                self.skip_line();
                continue;
            }
            let token = match c {
                '\'' | '"' => {
                    self.pos += 1;
                    Token::Str(self.quoted(c)?)
                }
                '$' => {
                    self.pos += 1;
                    let name = self.word();
                    if name.is_empty() {
                        return Err(CoreError::parse("expected parameter name after `$`"));
                    }
                    Token::Param(name)
                }
                'd' | 'u' | 'b' if matches!(self.peek_at(1), Some('"' | '\'')) => {
                    let quote = self.chars[self.pos + 1];
                    self.pos += 2;
                    let body = self.quoted(quote)?;
                    match c {
                        'd' => Token::Datetime(body),
                        'u' => Token::Uuid(body),
                        _ => Token::Bytes(decode_hex(&body)?),
                    }
                }
                c if c.is_ascii_digit() => self.number(false)?,
                '-' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => {
                    self.pos += 1;
                    self.number(true)?
                }
                c if c.is_alphabetic() || c == '_' => Token::Ident(self.word()),
                '!' if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    Token::Op("!=")
                }
                '<' | '>' => {
                    self.pos += 1;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                        Token::Op(if c == '<' { "<=" } else { ">=" })
                    } else {
                        Token::Op(if c == '<' { "<" } else { ">" })
                    }
                }
                '=' => {
                    self.pos += 1;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                    }
                    Token::Op("=")
                }
                ';' | ',' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '*' | '.' => {
                    self.pos += 1;
                    Token::Punct(c)
                }
                other => {
                    return Err(CoreError::parse(format!("unexpected character `{other}`")));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn quoted(&mut self, quote: char) -> CoreResult<String> {
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(CoreError::parse("unterminated string literal"));
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some(esc) = self.peek() else {
                        return Err(CoreError::parse("unterminated string literal"));
                    };
                    self.pos += 1;
                    out.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }

    /// Reads a number or duration; the sign has already been consumed.
    fn number(&mut self, negative: bool) -> CoreResult<Token> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let int_part: String = self.chars[start..self.pos].iter().collect();

        if !negative && self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            if let Some(d) = self.duration_tail(&int_part)? {
                return Ok(Token::Duration(d));
            }
        }

        let mut text = if negative {
            format!("-{int_part}")
        } else {
            int_part
        };
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.pos += 1;
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && self
                .peek_at(1)
                .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            is_float = true;
            text.push('e');
            self.pos += 1;
            if let Some(sign @ ('-' | '+')) = self.peek() {
                text.push(sign);
                self.pos += 1;
            }
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.pos += 1;
            }
        }
        if self.peek() == Some('f')
            && !self
                .peek_at(1)
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            is_float = true;
            self.pos += 1;
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| CoreError::parse(format!("invalid float `{text}`: {e}")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|e| CoreError::parse(format!("invalid integer `{text}`: {e}")))
        }
    }

    /// Tries to continue `digits` as a duration; rewinds and returns None otherwise.
    fn duration_tail(&mut self, digits: &str) -> CoreResult<Option<Duration>> {
        let rewind = self.pos;
        let mut total = Duration::ZERO;
        let mut amount = digits.to_string();
        loop {
            let unit_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == 'µ') {
                self.pos += 1;
            }
            let unit: String = self.chars[unit_start..self.pos].iter().collect();
            let Some(scale) = unit_nanos(&unit) else {
                self.pos = rewind;
                return Ok(None);
            };
            let count: u128 = amount
                .parse()
                .map_err(|e| CoreError::parse(format!("invalid duration amount: {e}")))?;
            let nanos = count
                .checked_mul(scale)
                .and_then(|n| u64::try_from(n / 1_000_000_000).ok().map(|s| (s, n)))
                .ok_or_else(|| CoreError::parse("duration out of range"))?;
            #[allow(clippy::cast_possible_truncation)]
            let part = Duration::new(nanos.0, (nanos.1 % 1_000_000_000) as u32);
            total = total
                .checked_add(part)
                .ok_or_else(|| CoreError::parse("duration out of range"))?;

            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.pos = rewind;
                    return Ok(None);
                }
                return Ok(Some(total));
            }
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            amount = self.chars[start..self.pos].iter().collect();
        }
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        "d" => 86_400 * 1_000_000_000,
        "w" => 7 * 86_400 * 1_000_000_000,
        "y" => 365 * 86_400 * 1_000_000_000,
        _ => return None,
    })
}

fn decode_hex(s: &str) -> CoreResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(CoreError::parse("byte literal must have an even number of hex digits"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CoreError::parse(format!("invalid hex in byte literal `{s}`")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_create() {
        let tokens = tokenize("CREATE foo:1 SET val = 42;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("CREATE".into()),
                Token::Ident("foo".into()),
                Token::Punct(':'),
                Token::Int(1),
                Token::Ident("SET".into()),
                Token::Ident("val".into()),
                Token::Op("="),
                Token::Int(42),
                Token::Punct(';'),
            ]
        );
    }

    #[test]
    fn numbers_keep_their_kind() {
        assert_eq!(tokenize("23").unwrap(), vec![Token::Int(23)]);
        assert_eq!(tokenize("23.0").unwrap(), vec![Token::Float(23.0)]);
        assert_eq!(tokenize("23f").unwrap(), vec![Token::Float(23.0)]);
        assert_eq!(tokenize("-7").unwrap(), vec![Token::Int(-7)]);
        assert_eq!(tokenize("1e3").unwrap(), vec![Token::Float(1000.0)]);
    }

    #[test]
    fn durations() {
        assert_eq!(
            tokenize("1h30m").unwrap(),
            vec![Token::Duration(Duration::from_secs(5400))]
        );
        assert_eq!(
            tokenize("250ms").unwrap(),
            vec![Token::Duration(Duration::from_millis(250))]
        );
    }

    #[test]
    fn semicolon_inside_string_is_not_a_separator() {
        let tokens = tokenize("RETURN 'a;b';").unwrap();
        assert_eq!(tokens[1], Token::Str("a;b".into()));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn prefixed_literals() {
        let tokens = tokenize("d\"2024-01-01T00:00:00Z\" b\"00ff\"").unwrap();
        assert_eq!(tokens[0], Token::Datetime("2024-01-01T00:00:00Z".into()));
        assert_eq!(tokens[1], Token::Bytes(vec![0x00, 0xff]));
    }

    #[test]
    fn identifiers_starting_with_prefix_letters() {
        let tokens = tokenize("db delete user").unwrap();
        assert_eq!(tokens[0], Token::Ident("db".into()));
        assert_eq!(tokens[1], Token::Ident("delete".into()));
        assert_eq!(tokens[2], Token::Ident("user".into()));
    }

    #[test]
    fn unterminated_string() {
        assert!(tokenize("RETURN 'abc").is_err());
    }

    mod kinds {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn integers_lex_as_int(n in any::<i64>()) {
                prop_assert_eq!(tokenize(&n.to_string()).unwrap(), vec![Token::Int(n)]);
            }

            #[test]
            fn finite_floats_lex_as_float(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
                let text = crate::value::Value::from(f).to_string();
                prop_assert_eq!(tokenize(&text).unwrap(), vec![Token::Float(f)]);
            }

            #[test]
            fn rendered_durations_lex_as_duration(secs in 0u64..100_000_000_000, nanos in 0u32..1_000_000_000) {
                let d = Duration::new(secs, nanos);
                let text = crate::value::Value::Duration(d).to_string();
                prop_assert_eq!(tokenize(&text).unwrap(), vec![Token::Duration(d)]);
            }
        }
    }
}

//! Permissive literal evaluation for dict-like model output.
//!
//! Accepts a superset of JSON that small models produce when they drift into
//! Python syntax: single-quoted strings, `True`/`False`/`None`, trailing
//! commas, tuples written with parentheses, and bare identifier keys. Bare
//! identifiers are never accepted as values, so prose does not parse.

use serde_json::{Map, Number, Value};

/// Parse `text` as a permissive literal. Trailing non-whitespace input is a
/// failure.
pub fn parse_loose(text: &str) -> Option<Value> {
    let mut parser = LooseParser::new(text);
    let value = parser.value()?;
    parser.skip_ws();
    if parser.peek().is_some() {
        return None;
    }
    Some(value)
}

struct LooseParser {
    chars: Vec<char>,
    pos: usize,
}

impl LooseParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '{' => self.object(),
            '[' => self.sequence(']'),
            '(' => self.sequence(')'),
            '"' | '\'' => self.string().map(Value::String),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() => match self.identifier().as_str() {
                "true" | "True" => Some(Value::Bool(true)),
                "false" | "False" => Some(Value::Bool(false)),
                "null" | "None" => Some(Value::Null),
                _ => None,
            },
            _ => None,
        }
    }

    fn object(&mut self) -> Option<Value> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Some(Value::Object(map));
            }
            let key = self.key()?;
            self.skip_ws();
            if !self.eat(':') {
                return None;
            }
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.skip_ws();
            return if self.eat('}') {
                Some(Value::Object(map))
            } else {
                None
            };
        }
    }

    fn key(&mut self) -> Option<String> {
        match self.peek()? {
            '"' | '\'' => self.string(),
            c if c.is_alphanumeric() || c == '_' => {
                let ident = self.identifier();
                (!ident.is_empty()).then_some(ident)
            }
            _ => None,
        }
    }

    fn sequence(&mut self, close: char) -> Option<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Some(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.skip_ws();
            return if self.eat(close) {
                Some(Value::Array(items))
            } else {
                None
            };
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{0008}'),
                    'f' => out.push('\u{000C}'),
                    'u' => out.push(self.unicode_escape()?),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Option<char> {
        let hex: String = (0..4).map(|_| self.bump()).collect::<Option<String>>()?;
        let code = u32::from_str_radix(&hex, 16).ok()?;
        Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Option<Value> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                raw.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        let trimmed = raw.trim_start_matches('+');
        if let Ok(int) = trimmed.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
        let float = trimmed.parse::<f64>().ok()?;
        Number::from_f64(float).map(Value::Number)
    }
}

//! Decoder for the Lua table literals embedded in lobby detail payloads, e.g.
//! `return { day=12, dayselapsedinseason=3 }`. Only literal syntax is
//! understood: tables, strings, numbers, booleans and `nil`.

use std::collections::HashMap;

/// Deepest table nesting accepted.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum LuaValue {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Table(LuaTable),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LuaTable {
    /// Positional entries, in order.
    pub array: Vec<LuaValue>,
    pub fields: HashMap<String, LuaValue>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("malformed Lua literal at byte {offset}: {message}")]
pub struct LuaError {
    pub offset: usize,
    pub message: String,
}

impl LuaValue {
    pub fn as_table(&self) -> Option<&LuaTable> {
        match self {
            LuaValue::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl LuaTable {
    pub fn get(&self, key: &str) -> Option<&LuaValue> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> String {
        match self.get(key) {
            Some(LuaValue::Str(s)) => s.clone(),
            Some(LuaValue::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn get_number(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(LuaValue::Number(n)) => *n,
            _ => 0.0,
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(LuaValue::Bool(true)))
    }
}

/// Parses a whole chunk. A blank chunk decodes to `nil`.
pub fn parse(src: &str) -> Result<LuaValue, LuaError> {
    let mut parser = Parser { src, off: 0, depth: 0 };
    parser.skip_whitespace();
    if parser.rest().is_empty() {
        return Ok(LuaValue::Nil);
    }
    if parser.eat_keyword("return") {
        parser.skip_whitespace();
    }
    let value = parser.value()?;
    parser.skip_whitespace();
    if !parser.rest().is_empty() {
        return Err(parser.error("trailing input"));
    }
    Ok(value)
}

struct Parser<'s> {
    src: &'s str,
    /// Bytes consumed so far.
    off: usize,
    /// Tables currently open.
    depth: usize,
}

impl<'s> Parser<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.off..]
    }

    fn peek(&self) -> Option<u8> {
        self.rest().as_bytes().first().copied()
    }

    fn error(&self, message: impl Into<String>) -> LuaError {
        LuaError {
            offset: self.off,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.off += rest.len() - trimmed.len();
            // `--` line comments
            if trimmed.starts_with("--") {
                self.off += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                return;
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LuaError> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.off += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix(keyword) else {
            return false;
        };
        if after.chars().next().map_or(true, |c| !is_ident_char(c)) {
            self.off += keyword.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, p: impl Fn(char) -> bool) -> &'s str {
        let rest = self.rest();
        let len = rest.find(|c: char| !p(c)).unwrap_or(rest.len());
        self.off += len;
        &rest[..len]
    }

    fn value(&mut self) -> Result<LuaValue, LuaError> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => self.table().map(LuaValue::Table),
            Some(b'"' | b'\'') => self.string().map(LuaValue::Str),
            Some(b'-' | b'.' | b'0'..=b'9') => self.number().map(LuaValue::Number),
            Some(_) if self.eat_keyword("true") => Ok(LuaValue::Bool(true)),
            Some(_) if self.eat_keyword("false") => Ok(LuaValue::Bool(false)),
            Some(_) if self.eat_keyword("nil") => Ok(LuaValue::Nil),
            Some(_) => Err(self.error("unexpected token")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn table(&mut self) -> Result<LuaTable, LuaError> {
        self.expect(b'{')?;
        if self.depth == MAX_DEPTH {
            return Err(self.error(format!("tables nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let table = self.table_entries();
        self.depth -= 1;
        table
    }

    fn table_entries(&mut self) -> Result<LuaTable, LuaError> {
        let mut table = LuaTable::default();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.off += 1;
                    return Ok(table);
                }
                None => return Err(self.error("unterminated table")),
                _ => {}
            }

            if self.peek() == Some(b'[') {
                self.off += 1;
                let key = match self.value()? {
                    LuaValue::Str(s) => s,
                    LuaValue::Number(n) => n.to_string(),
                    _ => return Err(self.error("unsupported table key")),
                };
                self.expect(b']')?;
                self.expect(b'=')?;
                let value = self.value()?;
                table.fields.insert(key, value);
            } else if let Some(key) = self.field_name() {
                self.expect(b'=')?;
                let value = self.value()?;
                table.fields.insert(key.to_string(), value);
            } else {
                table.array.push(self.value()?);
            }

            self.skip_whitespace();
            match self.peek() {
                Some(b',' | b';') => self.off += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    /// Consumes `name =` lookahead; leaves the input untouched otherwise.
    fn field_name(&mut self) -> Option<&'s str> {
        let start = self.off;
        let first = self.rest().chars().next()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let name = self.take_while(is_ident_char);
        if matches!(name, "true" | "false" | "nil") {
            self.off = start;
            return None;
        }
        self.skip_whitespace();
        if self.peek() == Some(b'=') && self.rest().as_bytes().get(1) != Some(&b'=') {
            Some(name)
        } else {
            self.off = start;
            None
        }
    }

    fn string(&mut self) -> Result<String, LuaError> {
        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        self.off += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c as u32 == quote as u32 => {
                    self.off += i + 1;
                    return Ok(out);
                }
                '\\' => {
                    let (_, escaped) = chars.next().ok_or_else(|| self.error("unterminated escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0'..='9' => {
                            let mut code = escaped.to_digit(10).unwrap_or_default();
                            for _ in 0..2 {
                                match chars.clone().next() {
                                    Some((_, d)) if d.is_ascii_digit() => {
                                        code = code * 10 + d.to_digit(10).unwrap_or_default();
                                        chars.next();
                                    }
                                    _ => break,
                                }
                            }
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        other => out.push(other),
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn number(&mut self) -> Result<f64, LuaError> {
        let start = self.off;
        if self.peek() == Some(b'-') {
            self.off += 1;
        }
        self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'));
        let raw = &self.src[start..self.off];
        raw.parse::<f64>().map_err(|_| LuaError {
            offset: start,
            message: format!("invalid number '{raw}'"),
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn day_info() {
        let value = parse("return {  day=54, dayselapsedinseason=8, daysleftinseason=12 }").unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.get_number("day"), 54.0);
        assert_eq!(table.get_number("daysleftinseason"), 12.0);
        assert_eq!(table.get_number("missing"), 0.0);
    }

    #[test]
    fn player_list() {
        let src = r#"return {
  {
    colour="E8E8E8",
    eventlevel=0,
    name="Wendy \"the\" bold",
    netid="KU_abc",
    prefab="wendy"
  },
  { colour='ff0000', eventlevel=2, name="x", netid="KU_def", prefab="" },
}"#;
        let value = parse(src).unwrap();
        let players = &value.as_table().unwrap().array;
        assert_eq!(players.len(), 2);
        let first = players[0].as_table().unwrap();
        assert_eq!(first.get_str("name"), "Wendy \"the\" bold");
        assert_eq!(first.get_str("prefab"), "wendy");
        assert_eq!(players[1].as_table().unwrap().get_number("eventlevel"), 2.0);
    }

    #[test]
    fn bracket_keys_and_scalars() {
        let value = parse(r#"{ ["a key"]=true, [3]=-1.5, nil, false }"#).unwrap();
        let table = value.as_table().unwrap();
        assert!(table.get_bool("a key"));
        assert_eq!(table.get_number("3"), -1.5);
        assert_eq!(table.array, vec![LuaValue::Nil, LuaValue::Bool(false)]);
    }

    #[test]
    fn blank_is_nil() {
        assert_eq!(parse("  ").unwrap(), LuaValue::Nil);
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |depth: usize| format!("return {}{}", "{".repeat(depth), "}".repeat(depth));
        assert!(parse(&nested(MAX_DEPTH)).is_ok());

        let err = parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert_eq!(err.offset, MAX_DEPTH + 8);
        assert!(err.message.contains("nested deeper"));

        assert!(parse(&nested(200_000)).is_err());
    }

    #[test]
    fn malformed_input_reports_offset() {
        let err = parse("return { day=1").unwrap_err();
        assert_eq!(err.offset, 14);
        assert!(parse("return { day= }").is_err());
    }
}

//! Parsed Python literal values.
//!
//! Responses rendered with the `!r` conversion are reprs of plain Python
//! values. This module parses that surface back into a [`Literal`] and can
//! render a CPython-compatible repr again, so recovered attributes survive a
//! source round trip (`a = 1` evaluates back to the recovered value).
//!
//! The parser accepts exactly the literal surface: `None`, booleans,
//! integers (including over-i64 ones), floats, strings, bytes, `...`, and
//! tuples/lists/sets/dicts of those. Names, calls (`set()`,
//! `frozenset({…})`) and complex numbers are not literals and fail to
//! parse, matching the strictness of the original channel.

use std::fmt::{self, Write};

use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// A parsed Python literal value.
///
/// `Int` holds values that fit `i64`; anything larger lands in `BigInt`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    /// Python's `None` singleton.
    None,
    /// Python's `Ellipsis` singleton (`...`).
    Ellipsis,
    /// Python boolean (`True` or `False`).
    Bool(bool),
    /// Python integer (64-bit signed).
    Int(i64),
    /// Python arbitrary-precision integer (larger than i64).
    BigInt(BigInt),
    /// Python float (64-bit IEEE 754).
    Float(f64),
    /// Python string (UTF-8).
    Str(String),
    /// Python bytes object.
    Bytes(Vec<u8>),
    /// Python tuple (immutable sequence).
    Tuple(Vec<Self>),
    /// Python list (mutable sequence).
    List(Vec<Self>),
    /// Python set.
    Set(Vec<Self>),
    /// Python dictionary (insertion-ordered mapping).
    Dict(Vec<(Self, Self)>),
}

impl Literal {
    /// The Python type name, as `type(x).__name__` would report it.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Ellipsis => "ellipsis",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::BigInt(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
        }
    }

    /// Renders the CPython `repr()` of this value.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        self.py_repr_fmt(&mut out).expect("writing to a String never fails");
        out
    }

    fn py_repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Ellipsis => f.write_str("Ellipsis"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Str(v) => string_repr_fmt(v, f),
            Self::Bytes(v) => bytes_repr_fmt(v, f),
            Self::Tuple(items) => {
                f.write_char('(')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.py_repr_fmt(f)?;
                }
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.py_repr_fmt(f)?;
                }
                f.write_char(']')
            }
            Self::Set(items) => {
                if items.is_empty() {
                    return f.write_str("set()");
                }
                f.write_char('{')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.py_repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Dict(pairs) => {
                f.write_char('{')?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    key.py_repr_fmt(f)?;
                    f.write_str(": ")?;
                    value.py_repr_fmt(f)?;
                }
                f.write_char('}')
            }
        }
    }

    /// Asserts this value is an int and returns it.
    pub fn expect_int(&self) -> Result<i64, TypeFault> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::BigInt(v) => v.to_i64().ok_or(TypeFault {
                expected: "int",
                found: "int (out of range)",
            }),
            other => Err(other.fault("int")),
        }
    }

    /// Asserts this value is a str and returns it.
    pub fn expect_str(&self) -> Result<&str, TypeFault> {
        match self {
            Self::Str(v) => Ok(v),
            other => Err(other.fault("str")),
        }
    }

    /// Asserts this value is bytes and returns them.
    pub fn expect_bytes(&self) -> Result<&[u8], TypeFault> {
        match self {
            Self::Bytes(v) => Ok(v),
            other => Err(other.fault("bytes")),
        }
    }

    /// Asserts this value is a tuple of strings and returns the strings.
    pub fn expect_str_tuple(&self) -> Result<Vec<String>, TypeFault> {
        let Self::Tuple(items) = self else {
            return Err(self.fault("tuple of str"));
        };
        items
            .iter()
            .map(|item| match item {
                Self::Str(v) => Ok(v.clone()),
                other => Err(other.fault("tuple of str")),
            })
            .collect()
    }

    fn fault(&self, expected: &'static str) -> TypeFault {
        TypeFault {
            expected,
            found: self.type_name(),
        }
    }
}

/// A typed-accessor mismatch: the literal parsed, but is not the type the
/// reader required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFault {
    /// The type the caller required.
    pub expected: &'static str,
    /// The type that was actually parsed.
    pub found: &'static str,
}

impl fmt::Display for TypeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {} but got {}", self.expected, self.found)
    }
}

impl std::error::Error for TypeFault {}

/// A failure to parse response text as a Python literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralParseError {
    message: String,
    offset: usize,
}

impl LiteralParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for LiteralParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid literal at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for LiteralParseError {}

/// Parses repr-rendered text into a [`Literal`].
pub fn parse_literal(text: &str) -> Result<Literal, LiteralParseError> {
    let mut parser = Parser { text, pos: 0 };
    parser.skip_ws();
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != parser.text.len() {
        return Err(LiteralParseError::new("trailing data after literal", parser.pos));
    }
    Ok(value)
}

struct Parser<'t> {
    text: &'t str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.text[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralParseError {
        LiteralParseError::new(message, self.pos)
    }

    fn parse_value(&mut self) -> Result<Literal, LiteralParseError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('N') => {
                if self.eat("None") {
                    Ok(Literal::None)
                } else {
                    Err(self.error("expected None"))
                }
            }
            Some('T') => {
                if self.eat("True") {
                    Ok(Literal::Bool(true))
                } else {
                    Err(self.error("expected True"))
                }
            }
            Some('F') => {
                if self.eat("False") {
                    Ok(Literal::Bool(false))
                } else {
                    Err(self.error("expected False"))
                }
            }
            Some('.') if self.text[self.pos..].starts_with("...") => {
                self.pos += 3;
                Ok(Literal::Ellipsis)
            }
            Some('\'' | '"') => self.parse_string(StringPrefix::default()),
            Some('b' | 'B' | 'r' | 'R') => {
                let prefix = self.parse_string_prefix()?;
                self.parse_string(prefix)
            }
            Some('(') => self.parse_sequence('(', ')').map(Literal::Tuple),
            Some('[') => self.parse_sequence('[', ']').map(Literal::List),
            Some('{') => self.parse_braced(),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.parse_number(),
            Some(c) => Err(self.error(format!("unexpected character {c:?}"))),
        }
    }

    fn parse_string_prefix(&mut self) -> Result<StringPrefix, LiteralParseError> {
        let mut prefix = StringPrefix::default();
        for _ in 0..2 {
            match self.peek() {
                Some('b' | 'B') if !prefix.bytes => {
                    prefix.bytes = true;
                    self.pos += 1;
                }
                Some('r' | 'R') if !prefix.raw => {
                    prefix.raw = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        match self.peek() {
            Some('\'' | '"') => Ok(prefix),
            _ => Err(self.error("expected quote after string prefix")),
        }
    }

    fn parse_string(&mut self, prefix: StringPrefix) -> Result<Literal, LiteralParseError> {
        let quote = self.bump().expect("caller checked for a quote");
        let mut text = String::new();
        let mut data = Vec::new();

        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if c == quote {
                break;
            }
            if c == '\\' && !prefix.raw {
                self.parse_escape(prefix.bytes, &mut text, &mut data)?;
                continue;
            }
            if prefix.bytes {
                if !c.is_ascii() {
                    return Err(self.error("bytes literal contains non-ASCII character"));
                }
                data.push(c as u8);
            } else {
                text.push(c);
            }
        }

        if prefix.bytes {
            Ok(Literal::Bytes(data))
        } else {
            Ok(Literal::Str(text))
        }
    }

    fn parse_escape(
        &mut self,
        is_bytes: bool,
        text: &mut String,
        data: &mut Vec<u8>,
    ) -> Result<(), LiteralParseError> {
        let push = |is_bytes: bool, c: char, text: &mut String, data: &mut Vec<u8>| {
            if is_bytes {
                data.push(c as u8);
            } else {
                text.push(c);
            }
        };

        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match c {
            '\\' => push(is_bytes, '\\', text, data),
            '\'' => push(is_bytes, '\'', text, data),
            '"' => push(is_bytes, '"', text, data),
            'n' => push(is_bytes, '\n', text, data),
            'r' => push(is_bytes, '\r', text, data),
            't' => push(is_bytes, '\t', text, data),
            'a' => push(is_bytes, '\x07', text, data),
            'b' => push(is_bytes, '\x08', text, data),
            'f' => push(is_bytes, '\x0c', text, data),
            'v' => push(is_bytes, '\x0b', text, data),
            '\n' => {}
            '0'..='7' => {
                let mut value = c as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ '0'..='7') => {
                            value = value * 8 + (d as u32 - '0' as u32);
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                if is_bytes {
                    data.push((value & 0xff) as u8);
                } else {
                    text.push(char::from_u32(value).expect("3-digit octal is always a valid scalar"));
                }
            }
            'x' => {
                let value = self.parse_hex_digits(2)?;
                if is_bytes {
                    data.push(value as u8);
                } else {
                    text.push(char::from_u32(value).expect("two hex digits are always a valid scalar"));
                }
            }
            'u' if !is_bytes => {
                let value = self.parse_hex_digits(4)?;
                let decoded =
                    char::from_u32(value).ok_or_else(|| self.error("invalid \\u escape value"))?;
                text.push(decoded);
            }
            'U' if !is_bytes => {
                let value = self.parse_hex_digits(8)?;
                let decoded =
                    char::from_u32(value).ok_or_else(|| self.error("invalid \\U escape value"))?;
                text.push(decoded);
            }
            other => {
                // CPython leaves unknown escapes in place, backslash included.
                push(is_bytes, '\\', text, data);
                if is_bytes && !other.is_ascii() {
                    return Err(self.error("bytes literal contains non-ASCII character"));
                }
                push(is_bytes, other, text, data);
            }
        }
        Ok(())
    }

    fn parse_hex_digits(&mut self, count: usize) -> Result<u32, LiteralParseError> {
        let mut value = 0u32;
        for _ in 0..count {
            let Some(digit) = self.peek().and_then(|c| c.to_digit(16)) else {
                return Err(self.error("truncated hex escape"));
            };
            value = value * 16 + digit;
            self.pos += 1;
        }
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<Literal, LiteralParseError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        self.skip_ws();

        // Radix-prefixed integers only ever come from literal_eval-style
        // input; repr itself always renders decimal.
        for (prefix, radix) in [("0x", 16u32), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
            if self.eat(prefix) {
                let digits = self.take_while(|c| c.is_digit(radix) || c == '_');
                return int_from_digits(&digits, radix, negative)
                    .ok_or_else(|| self.error("invalid radix-prefixed integer"));
            }
        }

        let digits = self.take_while(|c| c.is_ascii_digit() || c == '_');
        let mut is_float = false;
        let mut tail = String::new();
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            tail.push('.');
            tail.push_str(&self.take_while(|c| c.is_ascii_digit() || c == '_'));
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.pos += 1;
            tail.push('e');
            if matches!(self.peek(), Some('-' | '+')) {
                tail.push(self.bump().expect("sign was just peeked"));
            }
            let exponent = self.take_while(|c| c.is_ascii_digit() || c == '_');
            if exponent.is_empty() {
                return Err(self.error("missing exponent digits"));
            }
            tail.push_str(&exponent);
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(self.error("complex literals are not supported"));
        }

        if digits.is_empty() && (!is_float || tail == ".") {
            return Err(LiteralParseError::new("expected a number", start));
        }

        if is_float {
            let mut rendered = String::new();
            if negative {
                rendered.push('-');
            }
            rendered.push_str(&digits.replace('_', ""));
            rendered.push_str(&tail.replace('_', ""));
            let value: f64 = rendered
                .parse()
                .map_err(|_| LiteralParseError::new("invalid float literal", start))?;
            return Ok(Literal::Float(value));
        }

        int_from_digits(&digits, 10, negative).ok_or_else(|| self.error("invalid integer literal"))
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if keep(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.text[start..self.pos].to_owned()
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<Vec<Literal>, LiteralParseError> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => {}
                _ => return Err(self.error(format!("expected ',' or {close:?}"))),
            }
        }
    }

    fn parse_braced(&mut self) -> Result<Literal, LiteralParseError> {
        debug_assert_eq!(self.peek(), Some('{'));
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Literal::Dict(Vec::new()));
        }

        let first = self.parse_value()?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ws();
            let value = self.parse_value()?;
            let mut pairs = vec![(first, value)];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Literal::Dict(pairs));
                    }
                    Some(',') => {
                        self.pos += 1;
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.pos += 1;
                            return Ok(Literal::Dict(pairs));
                        }
                        let key = self.parse_value()?;
                        self.skip_ws();
                        if self.bump() != Some(':') {
                            return Err(self.error("expected ':' in dict literal"));
                        }
                        self.skip_ws();
                        let value = self.parse_value()?;
                        pairs.push((key, value));
                    }
                    _ => return Err(self.error("expected ',' or '}' in dict literal")),
                }
            }
        }

        let mut items = vec![first];
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Literal::Set(items));
                }
                Some(',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Ok(Literal::Set(items));
                    }
                    items.push(self.parse_value()?);
                }
                _ => return Err(self.error("expected ',' or '}' in set literal")),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StringPrefix {
    bytes: bool,
    raw: bool,
}

fn int_from_digits(digits: &str, radix: u32, negative: bool) -> Option<Literal> {
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    let rendered = if negative { format!("-{cleaned}") } else { cleaned };
    if let Ok(small) = i64::from_str_radix(&rendered, radix) {
        return Some(Literal::Int(small));
    }
    BigInt::parse_bytes(rendered.as_bytes(), radix).map(Literal::BigInt)
}

/// Returns a string representation of a float matching CPython's `repr()`.
///
/// Uses `ryu` for the shortest decimal representation that round-trips
/// through `f64` parsing, then patches the two spots where ryu and CPython
/// disagree: positive exponents get an explicit `+`, and integral values
/// keep a `.0` suffix.
fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }

    let mut buffer = ryu::Buffer::new();
    let rendered = buffer.format(value);

    if let Some(e_pos) = rendered.find('e') {
        let (mantissa, exponent) = rendered.split_at(e_pos);
        let exponent = &exponent[1..];
        if exponent.starts_with('-') {
            return rendered.to_owned();
        }
        return format!("{mantissa}e+{exponent}");
    }
    if !rendered.contains('.') {
        return format!("{rendered}.0");
    }
    rendered.to_owned()
}

/// Writes a CPython-compatible repr for a string.
///
/// Single quotes by default, double quotes when the text contains `'` but
/// not `"`. Control characters are escaped; printable text (including
/// non-ASCII) is kept verbatim, which is what CPython does for strings
/// whose characters are printable.
fn string_repr_fmt(text: &str, f: &mut impl Write) -> fmt::Result {
    let has_single = text.contains('\'');
    let has_double = text.contains('"');
    let quote = if has_single && !has_double { '"' } else { '\'' };

    f.write_char(quote)?;
    for c in text.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\t' => f.write_str("\\t")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            '\x00'..='\x1f' | '\x7f' => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

/// Writes a CPython-compatible repr for bytes.
///
/// Format: `b'…'` or `b"…"` depending on content, `\xNN` for anything
/// outside printable ASCII.
fn bytes_repr_fmt(bytes: &[u8], f: &mut impl Write) -> fmt::Result {
    let has_single = bytes.contains(&b'\'');
    let has_double = bytes.contains(&b'"');
    let quote = if has_single && !has_double { '"' } else { '\'' };

    f.write_char('b')?;
    f.write_char(quote)?;
    for &byte in bytes {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\t' => f.write_str("\\t")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\'' if quote == '\'' => f.write_str("\\'")?,
            b'"' if quote == '"' => f.write_str("\\\"")?,
            0x20..=0x7e => f.write_char(byte as char)?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_char(quote)
}

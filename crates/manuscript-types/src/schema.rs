//! Logical column types reported by the streaming runtime.
//!
//! The runtime describes every view as an ordered list of columns whose
//! types are rendered as SQL type strings (`BIGINT NOT NULL`,
//! `DECIMAL(10, 2)`, `TIMESTAMP_LTZ(3) *PROCTIME*`, `ROW<`a` INT>`).
//! [`parse_column_type`] turns those strings into [`LogicalType`] values.
//! Types outside the supported domain are preserved verbatim as
//! [`LogicalType::Unsupported`] so that the type mapper can reject them
//! with the original spelling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column-name fragment marking synthetic processing-time columns.
pub const PROC_TIME_MARKER: &str = "proc_time";

/// Length the runtime uses to spell unbounded `STRING`/`BYTES`.
const MAX_LENGTH: u32 = 2_147_483_647;

/// Errors produced while parsing a runtime type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed type '{raw}': {reason}")]
    Malformed { raw: String, reason: String },
}

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicalType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal { precision: u8, scale: u8 },
    Float,
    Double,
    Boolean,
    Date,
    Time { precision: Option<u8> },
    Timestamp { precision: Option<u8> },
    /// Timestamp with local time zone.
    TimestampLtz { precision: Option<u8> },
    Char { length: u32 },
    /// `None` is the unbounded `STRING`.
    Varchar { length: Option<u32> },
    Binary { length: u32 },
    /// `None` is the unbounded `BYTES`.
    Varbinary { length: Option<u32> },
    Array { element: Box<LogicalType> },
    Row { fields: Vec<RowField> },
    /// Anything the engine does not know how to carry (MAP, MULTISET,
    /// INTERVAL, RAW, ...). Holds the type as the runtime spelled it.
    Unsupported { raw: String },
}

/// Named field of a `ROW` type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowField {
    pub name: String,
    pub data_type: LogicalType,
}

impl LogicalType {
    /// Structured types (`ARRAY`, `ROW`) that are flattened to JSON text
    /// when leaving the runtime.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::Row { .. })
    }

    /// First unsupported type found in this type, including nested ones.
    #[must_use]
    pub fn find_unsupported(&self) -> Option<&str> {
        match self {
            Self::Unsupported { raw } => Some(raw),
            Self::Array { element } => element.find_unsupported(),
            Self::Row { fields } => fields.iter().find_map(|f| f.data_type.find_unsupported()),
            _ => None,
        }
    }
}

fn write_precision(f: &mut fmt::Formatter<'_>, name: &str, precision: Option<u8>) -> fmt::Result {
    match precision {
        Some(p) => write!(f, "{name}({p})"),
        None => f.write_str(name),
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TinyInt => f.write_str("TINYINT"),
            Self::SmallInt => f.write_str("SMALLINT"),
            Self::Int => f.write_str("INT"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            Self::Float => f.write_str("FLOAT"),
            Self::Double => f.write_str("DOUBLE"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Date => f.write_str("DATE"),
            Self::Time { precision } => write_precision(f, "TIME", *precision),
            Self::Timestamp { precision } => write_precision(f, "TIMESTAMP", *precision),
            Self::TimestampLtz { precision } => write_precision(f, "TIMESTAMP_LTZ", *precision),
            Self::Char { length } => write!(f, "CHAR({length})"),
            Self::Varchar { length: Some(n) } => write!(f, "VARCHAR({n})"),
            Self::Varchar { length: None } => f.write_str("STRING"),
            Self::Binary { length } => write!(f, "BINARY({length})"),
            Self::Varbinary { length: Some(n) } => write!(f, "VARBINARY({n})"),
            Self::Varbinary { length: None } => f.write_str("BYTES"),
            Self::Array { element } => write!(f, "ARRAY<{element}>"),
            Self::Row { fields } => {
                f.write_str("ROW<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "`{}` {}", field.name.replace('`', "``"), field.data_type)?;
                }
                f.write_str(">")
            }
            Self::Unsupported { raw } => f.write_str(raw),
        }
    }
}

/// Time attribute marker attached by the runtime to a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAttribute {
    ProcTime,
    RowTime,
}

/// Parsed type string: the type, its nullability and any time attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub data_type: LogicalType,
    pub nullable: bool,
    pub time_attribute: Option<TimeAttribute>,
}

/// A resolved view column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: LogicalType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_attribute: Option<TimeAttribute>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            time_attribute: None,
        }
    }

    /// Build a column from a runtime type string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the type string cannot be parsed.
    pub fn from_type_string(name: impl Into<String>, raw: &str) -> Result<Self, SchemaError> {
        let parsed = parse_column_type(raw)?;
        Ok(Self {
            name: name.into(),
            data_type: parsed.data_type,
            nullable: parsed.nullable,
            time_attribute: parsed.time_attribute,
        })
    }

    /// Synthetic processing-time column that must not leave a transform.
    #[must_use]
    pub fn is_processing_time(&self) -> bool {
        self.name.contains(PROC_TIME_MARKER) || self.time_attribute == Some(TimeAttribute::ProcTime)
    }
}

// ── Type string parser ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Ident(String),
    Number(u32),
    Str,
    Marker(String),
    LParen,
    RParen,
    Comma,
    Lt,
    Gt,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

fn malformed(raw: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Malformed {
        raw: raw.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(raw: &str) -> Result<Vec<Token>, SchemaError> {
    let bytes = raw.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        let tok = match c {
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            ',' => {
                i += 1;
                Tok::Comma
            }
            '<' => {
                i += 1;
                Tok::Lt
            }
            '>' => {
                i += 1;
                Tok::Gt
            }
            '`' => {
                let mut name = String::new();
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(malformed(raw, "unterminated quoted identifier")),
                        Some(b'`') if bytes.get(i + 1) == Some(&b'`') => {
                            name.push('`');
                            i += 2;
                        }
                        Some(b'`') => {
                            i += 1;
                            break;
                        }
                        Some(_) => {
                            let ch = raw[i..].chars().next().unwrap_or('`');
                            name.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                Tok::Ident(name)
            }
            '\'' => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(malformed(raw, "unterminated string literal")),
                        Some(b'\'') if bytes.get(i + 1) == Some(&b'\'') => i += 2,
                        Some(b'\'') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                Tok::Str
            }
            '*' => {
                let close = raw[i + 1..]
                    .find('*')
                    .ok_or_else(|| malformed(raw, "unterminated time attribute marker"))?;
                let marker = raw[i + 1..i + 1 + close].to_ascii_uppercase();
                i += close + 2;
                Tok::Marker(marker)
            }
            c if c.is_ascii_digit() => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let n = raw[start..i]
                    .parse::<u32>()
                    .map_err(|e| malformed(raw, format!("invalid number: {e}")))?;
                Tok::Number(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                Tok::Word(raw[start..i].to_ascii_uppercase())
            }
            other => return Err(malformed(raw, format!("unexpected character '{other}'"))),
        };
        tokens.push(Token {
            tok,
            start,
            end: i,
        });
    }

    Ok(tokens)
}

struct TypeParser<'a> {
    raw: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w == word)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Tok) -> Result<(), SchemaError> {
        match self.bump() {
            Some(t) if &t.tok == expected => Ok(()),
            Some(t) => Err(malformed(
                self.raw,
                format!("expected {expected:?}, found {:?}", t.tok),
            )),
            None => Err(malformed(self.raw, format!("expected {expected:?}, found end"))),
        }
    }

    fn expect_words(&mut self, words: &[&str]) -> Result<(), SchemaError> {
        for word in words {
            self.expect(&Tok::Word((*word).to_string()))?;
        }
        Ok(())
    }

    fn number(&mut self) -> Result<u32, SchemaError> {
        match self.bump() {
            Some(Token {
                tok: Tok::Number(n),
                ..
            }) => Ok(n),
            _ => Err(malformed(self.raw, "expected a number")),
        }
    }

    fn small(&self, n: u32) -> Result<u8, SchemaError> {
        u8::try_from(n).map_err(|_| malformed(self.raw, format!("precision {n} out of range")))
    }

    /// `(n)` if present.
    fn opt_length(&mut self) -> Result<Option<u32>, SchemaError> {
        if self.peek() != Some(&Tok::LParen) {
            return Ok(None);
        }
        self.bump();
        let n = self.number()?;
        self.expect(&Tok::RParen)?;
        Ok(Some(n))
    }

    fn opt_precision(&mut self) -> Result<Option<u8>, SchemaError> {
        self.opt_length()?.map(|n| self.small(n)).transpose()
    }

    /// Optional `NOT NULL` / `NULL` suffix; returns nullability.
    fn nullability(&mut self) -> Result<bool, SchemaError> {
        if self.peek_word("NOT") {
            self.bump();
            self.expect_words(&["NULL"])?;
            return Ok(false);
        }
        if self.peek_word("NULL") {
            self.bump();
        }
        Ok(true)
    }

    fn parse_type(&mut self) -> Result<LogicalType, SchemaError> {
        let token = self
            .bump()
            .ok_or_else(|| malformed(self.raw, "expected a type name"))?;
        let Tok::Word(word) = &token.tok else {
            return Err(malformed(
                self.raw,
                format!("expected a type name, found {:?}", token.tok),
            ));
        };

        let ty = match word.as_str() {
            "TINYINT" => LogicalType::TinyInt,
            "SMALLINT" => LogicalType::SmallInt,
            "INT" | "INTEGER" => LogicalType::Int,
            "BIGINT" => LogicalType::BigInt,
            "DECIMAL" | "DEC" | "NUMERIC" => {
                let (precision, scale) = if self.peek() == Some(&Tok::LParen) {
                    self.bump();
                    let p = self.number()?;
                    let s = if self.peek() == Some(&Tok::Comma) {
                        self.bump();
                        self.number()?
                    } else {
                        0
                    };
                    self.expect(&Tok::RParen)?;
                    (p, s)
                } else {
                    (10, 0)
                };
                LogicalType::Decimal {
                    precision: self.small(precision)?,
                    scale: self.small(scale)?,
                }
            }
            "FLOAT" | "REAL" => LogicalType::Float,
            "DOUBLE" => {
                if self.peek_word("PRECISION") {
                    self.bump();
                }
                LogicalType::Double
            }
            "BOOLEAN" => LogicalType::Boolean,
            "DATE" => LogicalType::Date,
            "TIME" => {
                let precision = self.opt_precision()?;
                if self.peek_word("WITHOUT") {
                    self.bump();
                    self.expect_words(&["TIME", "ZONE"])?;
                }
                LogicalType::Time { precision }
            }
            "TIMESTAMP" => {
                let precision = self.opt_precision()?;
                if self.peek_word("WITHOUT") {
                    self.bump();
                    self.expect_words(&["TIME", "ZONE"])?;
                    LogicalType::Timestamp { precision }
                } else if self.peek_word("WITH") {
                    self.bump();
                    if self.peek_word("LOCAL") {
                        self.bump();
                        self.expect_words(&["TIME", "ZONE"])?;
                        LogicalType::TimestampLtz { precision }
                    } else {
                        self.expect_words(&["TIME", "ZONE"])?;
                        LogicalType::Unsupported {
                            raw: self.raw[token.start..self.tokens[self.pos - 1].end].to_string(),
                        }
                    }
                } else {
                    LogicalType::Timestamp { precision }
                }
            }
            "TIMESTAMP_LTZ" => LogicalType::TimestampLtz {
                precision: self.opt_precision()?,
            },
            "CHAR" => LogicalType::Char {
                length: self.opt_length()?.unwrap_or(1),
            },
            "VARCHAR" => match self.opt_length()?.unwrap_or(1) {
                MAX_LENGTH => LogicalType::Varchar { length: None },
                n => LogicalType::Varchar { length: Some(n) },
            },
            "STRING" => LogicalType::Varchar { length: None },
            "BINARY" => LogicalType::Binary {
                length: self.opt_length()?.unwrap_or(1),
            },
            "VARBINARY" => match self.opt_length()?.unwrap_or(1) {
                MAX_LENGTH => LogicalType::Varbinary { length: None },
                n => LogicalType::Varbinary { length: Some(n) },
            },
            "BYTES" => LogicalType::Varbinary { length: None },
            "ARRAY" => {
                self.expect(&Tok::Lt)?;
                let element = self.parse_type()?;
                self.nullability()?;
                self.expect(&Tok::Gt)?;
                LogicalType::Array {
                    element: Box::new(element),
                }
            }
            "ROW" => self.parse_row()?,
            _ => self.parse_unsupported(token.start),
        };

        Ok(ty)
    }

    fn parse_row(&mut self) -> Result<LogicalType, SchemaError> {
        let close = match self.bump().map(|t| t.tok) {
            Some(Tok::Lt) => Tok::Gt,
            Some(Tok::LParen) => Tok::RParen,
            _ => return Err(malformed(self.raw, "expected '<' or '(' after ROW")),
        };

        let mut fields = Vec::new();
        if self.peek() == Some(&close) {
            self.bump();
            return Ok(LogicalType::Row { fields });
        }

        loop {
            let name = match self.bump().map(|t| t.tok) {
                Some(Tok::Ident(name)) => name,
                Some(Tok::Word(_)) => {
                    let t = &self.tokens[self.pos - 1];
                    self.raw[t.start..t.end].to_string()
                }
                _ => return Err(malformed(self.raw, "expected a ROW field name")),
            };
            let data_type = self.parse_type()?;
            self.nullability()?;
            if self.peek() == Some(&Tok::Str) {
                self.bump();
            }
            fields.push(RowField { name, data_type });

            match self.bump().map(|t| t.tok) {
                Some(Tok::Comma) => continue,
                Some(t) if t == close => break,
                _ => return Err(malformed(self.raw, "unterminated ROW type")),
            }
        }

        Ok(LogicalType::Row { fields })
    }

    /// Consume an unknown type up to the next separator at depth zero.
    fn parse_unsupported(&mut self, start: usize) -> LogicalType {
        let mut end = self.tokens[self.pos - 1].end;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Lt | Tok::LParen => depth += 1,
                Tok::Gt | Tok::RParen if depth == 0 => break,
                Tok::Gt | Tok::RParen => depth -= 1,
                Tok::Comma if depth == 0 => break,
                Tok::Marker(_) if depth == 0 => break,
                Tok::Word(w) if depth == 0 && (w == "NOT" || w == "NULL") => break,
                _ => {}
            }
            end = self.tokens[self.pos].end;
            self.pos += 1;
        }
        LogicalType::Unsupported {
            raw: self.raw[start..end].to_string(),
        }
    }
}

/// Parse a runtime column type string.
///
/// # Errors
///
/// Returns [`SchemaError::Malformed`] when the string is not a well-formed
/// type expression. Unknown but well-formed types parse successfully as
/// [`LogicalType::Unsupported`].
pub fn parse_column_type(raw: &str) -> Result<ColumnType, SchemaError> {
    let mut parser = TypeParser {
        raw,
        tokens: tokenize(raw)?,
        pos: 0,
    };

    let data_type = parser.parse_type()?;
    let nullable = parser.nullability()?;

    let mut time_attribute = None;
    while let Some(Tok::Marker(marker)) = parser.peek().cloned() {
        parser.bump();
        time_attribute = match marker.as_str() {
            "PROCTIME" => Some(TimeAttribute::ProcTime),
            "ROWTIME" => Some(TimeAttribute::RowTime),
            other => return Err(malformed(raw, format!("unknown marker '*{other}*'"))),
        };
    }

    if let Some(extra) = parser.peek() {
        return Err(malformed(raw, format!("unexpected trailing {extra:?}")));
    }

    Ok(ColumnType {
        data_type,
        nullable,
        time_attribute,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("INT", LogicalType::Int)]
    #[case("INTEGER", LogicalType::Int)]
    #[case("bigint", LogicalType::BigInt)]
    #[case("DECIMAL(10, 2)", LogicalType::Decimal { precision: 10, scale: 2 })]
    #[case("DECIMAL", LogicalType::Decimal { precision: 10, scale: 0 })]
    #[case("DOUBLE PRECISION", LogicalType::Double)]
    #[case("STRING", LogicalType::Varchar { length: None })]
    #[case("VARCHAR(2147483647)", LogicalType::Varchar { length: None })]
    #[case("VARCHAR(42)", LogicalType::Varchar { length: Some(42) })]
    #[case("BYTES", LogicalType::Varbinary { length: None })]
    #[case("TIMESTAMP(3)", LogicalType::Timestamp { precision: Some(3) })]
    #[case("TIMESTAMP(6) WITHOUT TIME ZONE", LogicalType::Timestamp { precision: Some(6) })]
    #[case("TIMESTAMP(3) WITH LOCAL TIME ZONE", LogicalType::TimestampLtz { precision: Some(3) })]
    #[case("TIME", LogicalType::Time { precision: None })]
    fn parses_scalar_types(#[case] raw: &str, #[case] expected: LogicalType) {
        let parsed = parse_column_type(raw).unwrap();
        assert_eq!(parsed.data_type, expected);
        assert!(parsed.nullable);
        assert_eq!(parsed.time_attribute, None);
    }

    #[test]
    fn parses_not_null_suffix() {
        let parsed = parse_column_type("DECIMAL(38, 18) NOT NULL").unwrap();
        assert!(!parsed.nullable);
        assert_eq!(
            parsed.data_type,
            LogicalType::Decimal {
                precision: 38,
                scale: 18
            }
        );
    }

    #[test]
    fn parses_proctime_marker() {
        let parsed = parse_column_type("TIMESTAMP_LTZ(3) NOT NULL *PROCTIME*").unwrap();
        assert_eq!(parsed.time_attribute, Some(TimeAttribute::ProcTime));
        assert_eq!(
            parsed.data_type,
            LogicalType::TimestampLtz { precision: Some(3) }
        );
    }

    #[test]
    fn parses_nested_structured_types() {
        let parsed = parse_column_type("ARRAY<ROW<`from` STRING, value DECIMAL(20, 0) NOT NULL>>")
            .unwrap();
        let LogicalType::Array { element } = parsed.data_type else {
            panic!("expected array");
        };
        let LogicalType::Row { fields } = *element else {
            panic!("expected row");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "from");
        assert_eq!(fields[1].name, "value");
    }

    #[test]
    fn keeps_unknown_types_verbatim() {
        let parsed = parse_column_type("MAP<STRING, INT> NOT NULL").unwrap();
        assert_eq!(
            parsed.data_type,
            LogicalType::Unsupported {
                raw: "MAP<STRING, INT>".into()
            }
        );
        assert!(!parsed.nullable);
    }

    #[test]
    fn finds_unsupported_inside_array() {
        let parsed = parse_column_type("ARRAY<MULTISET<INT>>").unwrap();
        assert_eq!(parsed.data_type.find_unsupported(), Some("MULTISET<INT>"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_column_type("DECIMAL(10, ").is_err());
        assert!(parse_column_type("INT )").is_err());
        assert!(parse_column_type("").is_err());
    }

    #[test]
    fn display_matches_runtime_spelling() {
        let ty = parse_column_type("ROW<a INT, `b c` ARRAY<STRING>>").unwrap().data_type;
        assert_eq!(ty.to_string(), "ROW<`a` INT, `b c` ARRAY<STRING>>");
        assert_eq!(
            LogicalType::Decimal {
                precision: 10,
                scale: 2
            }
            .to_string(),
            "DECIMAL(10, 2)"
        );
    }

    #[test]
    fn processing_time_detection() {
        let by_name = Column::new("proc_time", LogicalType::BigInt, true);
        assert!(by_name.is_processing_time());

        let by_marker = Column::from_type_string("pt", "TIMESTAMP_LTZ(3) *PROCTIME*").unwrap();
        assert!(by_marker.is_processing_time());

        let rowtime = Column::from_type_string("ts", "TIMESTAMP(3) *ROWTIME*").unwrap();
        assert!(!rowtime.is_processing_time());
    }
}

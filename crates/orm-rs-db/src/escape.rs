//! Scalar escaping.
//!
//! The query builder never binds parameters; every argument is rendered into
//! the SQL text through an [`Escaper`]. [`AnsiEscaper`] is the default
//! implementation and is configured from
//! [`EscapingSettings`](orm_rs_core::settings::EscapingSettings).
//!
//! Literal formats:
//!
//! | Value | Literal |
//! |---|---|
//! | `Null` | `NULL` |
//! | `Bool` | configured true/false literal (`1`/`0` by default) |
//! | `Int`, `Float` | decimal |
//! | `String`, `Uuid`, `Json` | single quoted, `'` doubled |
//! | `Date` | `'YYYY-MM-DD'` |
//! | `DateTime` | `'YYYY-MM-DDTHH:MM:SS.ffffff'` |
//! | `DateTimeTz` | `'YYYY-MM-DDTHH:MM:SS.ffffffZ'` (UTC) |
//! | `Time` | `'HH:MM:SS.ffffff'` |
//! | `Bytes` | `X'0A1B'` |

use std::fmt::Write;

use orm_rs_core::settings::EscapingSettings;
use orm_rs_core::{OrmError, OrmResult};

use crate::value::{Value, ValueKind};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const DATETIME_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";
const TIME_PARSE_FORMAT: &str = "%H:%M:%S%.f";

/// Renders values and identifiers into SQL text.
pub trait Escaper {
    /// Renders a scalar value as an SQL literal.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NotScalar`] for lists and
    /// [`OrmError::InvalidArgument`] for values with no literal form.
    fn escape_value(&self, value: &Value) -> OrmResult<String>;

    /// Quotes an identifier. Dotted names are quoted part by part and `*`
    /// is left alone, so `t0.*` becomes `"t0".*`.
    fn escape_identifier(&self, identifier: &str) -> String;
}

/// The default ANSI SQL escaper.
///
/// # Examples
///
/// ```
/// use orm_rs_core::settings::EscapingSettings;
/// use orm_rs_db::escape::{AnsiEscaper, Escaper};
/// use orm_rs_db::value::Value;
///
/// let escaper = AnsiEscaper::new(EscapingSettings::default());
/// assert_eq!(escaper.escape_value(&Value::from("O'Brien")).unwrap(), "'O''Brien'");
/// assert_eq!(escaper.escape_identifier("t0.id"), "\"t0\".\"id\"");
/// ```
#[derive(Debug, Clone, Default)]
pub struct AnsiEscaper {
    settings: EscapingSettings,
}

impl AnsiEscaper {
    /// Creates an escaper with the given settings.
    pub const fn new(settings: EscapingSettings) -> Self {
        Self { settings }
    }

    /// Reads a literal produced by [`Escaper::escape_value`] back into a value.
    ///
    /// `NULL` reads back as [`Value::Null`] for every kind.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidArgument`] if the literal is not in the
    /// format this escaper writes for `kind`, and [`OrmError::NotScalar`]
    /// when asked for a list.
    pub fn read_literal(&self, literal: &str, kind: ValueKind) -> OrmResult<Value> {
        let literal = literal.trim();
        if literal.eq_ignore_ascii_case("NULL") {
            return Ok(Value::Null);
        }
        let invalid =
            |detail: String| OrmError::InvalidArgument(format!("Invalid {kind} literal {literal}: {detail}"));

        match kind {
            ValueKind::Null => Err(invalid("expected NULL".to_string())),
            ValueKind::Bool => {
                if literal == self.settings.boolean_true {
                    Ok(Value::Bool(true))
                } else if literal == self.settings.boolean_false {
                    Ok(Value::Bool(false))
                } else {
                    Err(invalid("unknown boolean literal".to_string()))
                }
            }
            ValueKind::Int => literal
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| invalid(e.to_string())),
            ValueKind::Float => literal
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| invalid(e.to_string())),
            ValueKind::String => unquote(literal).map(Value::String).ok_or_else(|| invalid("not quoted".to_string())),
            ValueKind::Bytes => {
                let hex = literal
                    .strip_prefix("X'")
                    .or_else(|| literal.strip_prefix("x'"))
                    .and_then(|rest| rest.strip_suffix('\''))
                    .ok_or_else(|| invalid("expected X'..'".to_string()))?;
                decode_hex(hex).map(Value::Bytes).ok_or_else(|| invalid("bad hex digits".to_string()))
            }
            ValueKind::Date => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                chrono::NaiveDate::parse_from_str(&text, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::DateTime => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                chrono::NaiveDateTime::parse_from_str(&text, DATETIME_PARSE_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::DateTimeTz => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                let naive = text.strip_suffix('Z').ok_or_else(|| invalid("missing Z".to_string()))?;
                chrono::NaiveDateTime::parse_from_str(naive, DATETIME_PARSE_FORMAT)
                    .map(|dt| Value::DateTimeTz(dt.and_utc()))
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::Time => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                chrono::NaiveTime::parse_from_str(&text, TIME_PARSE_FORMAT)
                    .map(Value::Time)
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::Uuid => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                text.parse::<uuid::Uuid>()
                    .map(Value::Uuid)
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::Json => {
                let text = unquote(literal).ok_or_else(|| invalid("not quoted".to_string()))?;
                serde_json::from_str(&text)
                    .map(Value::Json)
                    .map_err(|e| invalid(e.to_string()))
            }
            ValueKind::List => Err(OrmError::NotScalar(format!(
                "Lists have no literal form: {literal}"
            ))),
        }
    }
}

impl Escaper for AnsiEscaper {
    fn escape_value(&self, value: &Value) -> OrmResult<String> {
        Ok(match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => self.settings.boolean_true.clone(),
            Value::Bool(false) => self.settings.boolean_false.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(OrmError::InvalidArgument(format!(
                        "{f} can not be written as an SQL literal"
                    )));
                }
                f.to_string()
            }
            Value::String(s) => quote(s),
            Value::Bytes(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 2 + 3);
                out.push_str("X'");
                for byte in bytes {
                    let _ = write!(out, "{byte:02X}");
                }
                out.push('\'');
                out
            }
            Value::Date(d) => quote(&d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => quote(&dt.format(DATETIME_FORMAT).to_string()),
            Value::DateTimeTz(dt) => {
                quote(&format!("{}Z", dt.naive_utc().format(DATETIME_FORMAT)))
            }
            Value::Time(t) => quote(&t.format(TIME_FORMAT).to_string()),
            Value::Uuid(u) => quote(&u.to_string()),
            Value::Json(j) => quote(&j.to_string()),
            Value::List(_) => {
                return Err(OrmError::NotScalar(format!(
                    "Only scalar values can be escaped, got {value}"
                )))
            }
        })
    }

    fn escape_identifier(&self, identifier: &str) -> String {
        let q = self.settings.identifier_quote.as_str();
        if q.is_empty() {
            return identifier.to_string();
        }
        identifier
            .split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    format!("{q}{}{q}", part.replace(q, &q.repeat(2)))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

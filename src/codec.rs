//! Marshaling between GraphQL values and dialect-native database values.
//!
//! Both directions are pure functions over `(dialect, logical type)`:
//! [`marshal_in`] turns a GraphQL input value into a [`DbValue`] for the
//! executor, [`marshal_out`] turns an executor value into the GraphQL form.
//! Every violation of a logical-type constraint (unknown enum variant,
//! vector length mismatch, non-finite number, null for a non-null column)
//! is a `CodecError`.
//!
//! Dialect differences live here and nowhere else: timestamp precision,
//! and the guard that rejects types a dialect does not have at all.

use async_graphql::{Name, Number, Value};
use base64::{Engine as _, engine::general_purpose};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use indexmap::IndexMap;

use crate::error::ResolveError;
use crate::executor::DbValue;
use crate::schema::{Dialect, LogicalType};

const DATE_FORMAT: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

fn codec_err(message: impl Into<String>) -> ResolveError {
    ResolveError::codec(message)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ResolveError> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| codec_err(format!("invalid timestamp `{raw}`")))
}

fn format_timestamp(ts: NaiveDateTime, millis: bool) -> String {
    if millis {
        ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    } else {
        let truncated = ts.with_nanosecond(0).unwrap_or(ts);
        truncated.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn is_decimal_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() {
        return false;
    }
    match digits.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => digits.chars().all(|c| c.is_ascii_digit()),
    }
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn number_f64(n: &Number) -> Result<f64, ResolveError> {
    let f = n
        .as_f64()
        .ok_or_else(|| codec_err(format!("`{n}` is not representable as a float")))?;
    if f.is_finite() {
        Ok(f)
    } else {
        Err(codec_err("non-finite number"))
    }
}

fn finite_number(f: f64) -> Result<Value, ResolveError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| codec_err("non-finite number"))
}

/// Marshals a GraphQL input value into the executor representation.
pub fn marshal_in(
    dialect: Dialect,
    ty: &LogicalType,
    nullable: bool,
    value: &Value,
) -> Result<DbValue, ResolveError> {
    if !dialect.supports_type(ty) {
        return Err(codec_err(format!(
            "column type {ty:?} is not available in this dialect"
        )));
    }

    if matches!(value, Value::Null) {
        return if nullable {
            Ok(DbValue::Null)
        } else {
            Err(codec_err("null is not allowed for a non-null column"))
        };
    }

    match ty {
        LogicalType::Int32 => match value {
            Value::Number(n) => {
                let i = n
                    .as_i64()
                    .ok_or_else(|| codec_err(format!("`{n}` is not an integer")))?;
                i32::try_from(i)
                    .map(|_| DbValue::Int(i))
                    .map_err(|_| codec_err(format!("`{i}` is out of range for int32")))
            }
            other => Err(codec_err(format!("expected an integer, got {other}"))),
        },
        LogicalType::Int64 => match value {
            Value::Number(n) => n
                .as_i64()
                .map(DbValue::Int)
                .ok_or_else(|| codec_err(format!("`{n}` is not an integer"))),
            Value::String(s) => s
                .parse::<i64>()
                .map(DbValue::Int)
                .map_err(|_| codec_err(format!("`{s}` is not a decimal integer string"))),
            other => Err(codec_err(format!(
                "expected a decimal integer string, got {other}"
            ))),
        },
        LogicalType::BigInt => match value {
            Value::String(s) if is_integer_literal(s) => Ok(DbValue::Text(s.clone())),
            Value::String(s) => Err(codec_err(format!("`{s}` is not a decimal integer string"))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(DbValue::Text(i.to_string())),
                None => Err(codec_err(format!("`{n}` is not an integer"))),
            },
            other => Err(codec_err(format!(
                "expected a decimal integer string, got {other}"
            ))),
        },
        LogicalType::Float => match value {
            Value::Number(n) => number_f64(n).map(DbValue::Float),
            other => Err(codec_err(format!("expected a number, got {other}"))),
        },
        LogicalType::Decimal => match value {
            Value::String(s) if is_decimal_literal(s) => Ok(DbValue::Text(s.clone())),
            Value::String(s) => Err(codec_err(format!("`{s}` is not a decimal string"))),
            Value::Number(n) => Ok(DbValue::Text(n.to_string())),
            other => Err(codec_err(format!("expected a decimal string, got {other}"))),
        },
        LogicalType::Boolean => match value {
            Value::Boolean(b) => Ok(DbValue::Bool(*b)),
            other => Err(codec_err(format!("expected a boolean, got {other}"))),
        },
        LogicalType::String | LogicalType::Text => match value {
            Value::String(s) => Ok(DbValue::Text(s.clone())),
            other => Err(codec_err(format!("expected a string, got {other}"))),
        },
        LogicalType::Char(n) | LogicalType::Varchar(n) => match value {
            Value::String(s) => {
                if s.chars().count() > *n as usize {
                    Err(codec_err(format!("string exceeds declared length {n}")))
                } else {
                    Ok(DbValue::Text(s.clone()))
                }
            }
            other => Err(codec_err(format!("expected a string, got {other}"))),
        },
        LogicalType::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(|d| DbValue::Text(d.format(DATE_FORMAT).to_string()))
                .map_err(|_| codec_err(format!("invalid date `{s}`"))),
            other => Err(codec_err(format!("expected a date string, got {other}"))),
        },
        LogicalType::Timestamp | LogicalType::TimestampMs => match value {
            Value::String(s) => {
                let ts = parse_timestamp(s)?;
                let millis = dialect.timestamp_millis(ty);
                Ok(DbValue::Text(format_timestamp(ts, millis)))
            }
            other => Err(codec_err(format!(
                "expected a timestamp string, got {other}"
            ))),
        },
        LogicalType::Json => match value {
            Value::String(s) => serde_json::from_str(s)
                .map(DbValue::Json)
                .map_err(|_| codec_err(format!("invalid JSON string `{s}`"))),
            other => other
                .clone()
                .into_json()
                .map(DbValue::Json)
                .map_err(|e| codec_err(format!("invalid JSON value: {e}"))),
        },
        LogicalType::Enum(variants) => {
            let name = match value {
                Value::Enum(name) => name.as_str(),
                Value::String(s) => s.as_str(),
                other => return Err(codec_err(format!("expected an enum value, got {other}"))),
            };
            if variants.iter().any(|v| v == name) {
                Ok(DbValue::Text(name.to_string()))
            } else {
                Err(codec_err(format!("unknown enum variant `{name}`")))
            }
        }
        LogicalType::Array(inner) => match value {
            Value::List(items) => items
                .iter()
                .map(|item| marshal_in(dialect, inner, true, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DbValue::Array),
            other => Err(codec_err(format!("expected a list, got {other}"))),
        },
        LogicalType::Vector(n) => match value {
            Value::List(items) => {
                if items.len() != *n as usize {
                    return Err(codec_err(format!(
                        "vector length mismatch: expected {n}, got {}",
                        items.len()
                    )));
                }
                items
                    .iter()
                    .map(|item| match item {
                        Value::Number(num) => number_f64(num).map(DbValue::Float),
                        other => Err(codec_err(format!("expected a number, got {other}"))),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(DbValue::Array)
            }
            other => Err(codec_err(format!("expected a list, got {other}"))),
        },
        LogicalType::PointXy => match value {
            Value::Object(map) => {
                let coord = |key: &str| match map.get(key) {
                    Some(Value::Number(n)) => number_f64(n),
                    _ => Err(codec_err(format!("point is missing numeric `{key}`"))),
                };
                Ok(DbValue::Array(vec![
                    DbValue::Float(coord("x")?),
                    DbValue::Float(coord("y")?),
                ]))
            }
            other => Err(codec_err(format!(
                "expected an object with x and y, got {other}"
            ))),
        },
        LogicalType::PointTuple => match value {
            Value::List(items) if items.len() == 2 => items
                .iter()
                .map(|item| match item {
                    Value::Number(n) => number_f64(n).map(DbValue::Float),
                    other => Err(codec_err(format!("expected a number, got {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(DbValue::Array),
            other => Err(codec_err(format!(
                "expected a two-element list, got {other}"
            ))),
        },
        LogicalType::Blob => match value {
            Value::String(s) => general_purpose::STANDARD
                .decode(s)
                .map(DbValue::Bytes)
                .map_err(|_| codec_err("invalid base64 string")),
            Value::Binary(bytes) => Ok(DbValue::Bytes(bytes.to_vec())),
            other => Err(codec_err(format!("expected a base64 string, got {other}"))),
        },
    }
}

/// Marshals an executor value into the GraphQL output form.
pub fn marshal_out(
    dialect: Dialect,
    ty: &LogicalType,
    nullable: bool,
    value: &DbValue,
) -> Result<Value, ResolveError> {
    if !dialect.supports_type(ty) {
        return Err(codec_err(format!(
            "column type {ty:?} is not available in this dialect"
        )));
    }

    if matches!(value, DbValue::Null) {
        return if nullable {
            Ok(Value::Null)
        } else {
            Err(codec_err("executor returned null for a non-null column"))
        };
    }

    match ty {
        LogicalType::Int32 => match value {
            DbValue::Int(i) => i32::try_from(*i)
                .map(|_| Value::from(*i))
                .map_err(|_| codec_err(format!("`{i}` is out of range for int32"))),
            other => Err(codec_err(format!("expected an integer, got {other:?}"))),
        },
        LogicalType::Int64 => match value {
            DbValue::Int(i) => Ok(Value::String(i.to_string())),
            other => Err(codec_err(format!("expected an integer, got {other:?}"))),
        },
        LogicalType::BigInt => match value {
            DbValue::Int(i) => Ok(Value::String(i.to_string())),
            DbValue::Text(s) if is_integer_literal(s) => Ok(Value::String(s.clone())),
            other => Err(codec_err(format!(
                "expected a wide integer, got {other:?}"
            ))),
        },
        LogicalType::Float => match value {
            DbValue::Float(f) => finite_number(*f),
            DbValue::Int(i) => finite_number(*i as f64),
            other => Err(codec_err(format!("expected a number, got {other:?}"))),
        },
        LogicalType::Decimal => match value {
            DbValue::Text(s) if is_decimal_literal(s) => Ok(Value::String(s.clone())),
            DbValue::Int(i) => Ok(Value::String(i.to_string())),
            other => Err(codec_err(format!("expected a decimal, got {other:?}"))),
        },
        LogicalType::Boolean => match value {
            DbValue::Bool(b) => Ok(Value::Boolean(*b)),
            DbValue::Int(0) => Ok(Value::Boolean(false)),
            DbValue::Int(1) => Ok(Value::Boolean(true)),
            other => Err(codec_err(format!("expected a boolean, got {other:?}"))),
        },
        LogicalType::String | LogicalType::Text | LogicalType::Char(_) | LogicalType::Varchar(_) => {
            match value {
                DbValue::Text(s) => Ok(Value::String(s.clone())),
                other => Err(codec_err(format!("expected a string, got {other:?}"))),
            }
        }
        LogicalType::Date => match value {
            DbValue::Text(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
                .map_err(|_| codec_err(format!("invalid date `{s}`"))),
            other => Err(codec_err(format!("expected a date, got {other:?}"))),
        },
        LogicalType::Timestamp | LogicalType::TimestampMs => match value {
            DbValue::Text(s) => {
                let ts = parse_timestamp(s)?;
                let millis = dialect.timestamp_millis(ty);
                Ok(Value::String(format_timestamp(ts, millis)))
            }
            other => Err(codec_err(format!("expected a timestamp, got {other:?}"))),
        },
        LogicalType::Json => match value {
            DbValue::Json(json) => Value::from_json(json.clone())
                .map_err(|e| codec_err(format!("invalid JSON value: {e}"))),
            DbValue::Text(s) => {
                let json: serde_json::Value = serde_json::from_str(s)
                    .map_err(|_| codec_err(format!("invalid JSON string `{s}`")))?;
                Value::from_json(json).map_err(|e| codec_err(format!("invalid JSON value: {e}")))
            }
            other => Err(codec_err(format!("expected JSON, got {other:?}"))),
        },
        LogicalType::Enum(variants) => match value {
            DbValue::Text(s) if variants.iter().any(|v| v == s) => Ok(Value::Enum(Name::new(s))),
            DbValue::Text(s) => Err(codec_err(format!("unknown enum variant `{s}`"))),
            other => Err(codec_err(format!("expected an enum value, got {other:?}"))),
        },
        LogicalType::Array(inner) => match value {
            DbValue::Array(items) => items
                .iter()
                .map(|item| marshal_out(dialect, inner, true, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(codec_err(format!("expected an array, got {other:?}"))),
        },
        LogicalType::Vector(n) => match value {
            DbValue::Array(items) => {
                if items.len() != *n as usize {
                    return Err(codec_err(format!(
                        "vector length mismatch: expected {n}, got {}",
                        items.len()
                    )));
                }
                items
                    .iter()
                    .map(|item| match item {
                        DbValue::Float(f) => finite_number(*f),
                        DbValue::Int(i) => finite_number(*i as f64),
                        other => Err(codec_err(format!("expected a number, got {other:?}"))),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            other => Err(codec_err(format!("expected a vector, got {other:?}"))),
        },
        LogicalType::PointXy => match value {
            DbValue::Array(items) if items.len() == 2 => {
                let coord = |item: &DbValue| match item {
                    DbValue::Float(f) => finite_number(*f),
                    DbValue::Int(i) => finite_number(*i as f64),
                    other => Err(codec_err(format!("expected a number, got {other:?}"))),
                };
                let mut map = IndexMap::new();
                map.insert(Name::new("x"), coord(&items[0])?);
                map.insert(Name::new("y"), coord(&items[1])?);
                Ok(Value::Object(map))
            }
            other => Err(codec_err(format!("expected a point, got {other:?}"))),
        },
        LogicalType::PointTuple => match value {
            DbValue::Array(items) if items.len() == 2 => items
                .iter()
                .map(|item| match item {
                    DbValue::Float(f) => finite_number(*f),
                    DbValue::Int(i) => finite_number(*i as f64),
                    other => Err(codec_err(format!("expected a number, got {other:?}"))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(codec_err(format!("expected a point, got {other:?}"))),
        },
        LogicalType::Blob => match value {
            DbValue::Bytes(bytes) => Ok(Value::String(general_purpose::STANDARD.encode(bytes))),
            other => Err(codec_err(format!("expected bytes, got {other:?}"))),
        },
    }
}

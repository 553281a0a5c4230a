//! Row decoding
//!
//! Columns are decoded by their reported type name. `BIGINT` values of
//! either signedness become decimal strings so callers never lose precision
//! on 64-bit keys; narrower integers stay numbers.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{Column, Row, TypeInfo, mysql::MySqlRow};

use datagate_core::{Error, Record, Result};

pub fn row_to_record(row: &MySqlRow) -> Result<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

pub fn rows_to_records(rows: &[MySqlRow]) -> Result<Vec<Record>> {
    rows.iter().map(row_to_record).collect()
}

/// How a column is read, keyed by its reported type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Bool,
    BigInt,
    BigIntUnsigned,
    Int,
    IntUnsigned,
    Float,
    Double,
    Decimal,
    Json,
    DateTime,
    Timestamp,
    Date,
    Time,
    Binary,
    Text,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "NULL" => ColumnKind::Null,
        "BOOLEAN" => ColumnKind::Bool,
        "BIGINT" => ColumnKind::BigInt,
        "BIGINT UNSIGNED" => ColumnKind::BigIntUnsigned,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" => ColumnKind::Int,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "YEAR" => ColumnKind::IntUnsigned,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DECIMAL" => ColumnKind::Decimal,
        "JSON" => ColumnKind::Json,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => ColumnKind::Binary,
        _ => ColumnKind::Text,
    }
}

/// 64-bit integers always travel as decimal strings
fn wide_integer(value: impl ToString) -> Value {
    Value::String(value.to_string())
}

fn millis(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    let value = match column_kind(type_name) {
        ColumnKind::Null => None,
        ColumnKind::Bool => opt(row.try_get::<Option<bool>, _>(index))?.map(Value::Bool),
        ColumnKind::BigInt => opt(row.try_get::<Option<i64>, _>(index))?.map(wide_integer),
        ColumnKind::BigIntUnsigned => opt(row.try_get::<Option<u64>, _>(index))?.map(wide_integer),
        ColumnKind::Int => opt(row.try_get::<Option<i64>, _>(index))?.map(Value::from),
        ColumnKind::IntUnsigned => {
            opt(row.try_get_unchecked::<Option<u64>, _>(index))?.map(Value::from)
        }
        ColumnKind::Float => {
            opt(row.try_get::<Option<f32>, _>(index))?.map(|v| Value::from(f64::from(v)))
        }
        ColumnKind::Double => opt(row.try_get::<Option<f64>, _>(index))?.map(Value::from),
        ColumnKind::Decimal => {
            opt(row.try_get_unchecked::<Option<String>, _>(index))?.map(Value::String)
        }
        ColumnKind::Json => opt(row.try_get::<Option<Value>, _>(index))?,
        ColumnKind::DateTime => {
            opt(row.try_get::<Option<NaiveDateTime>, _>(index))?.map(|v| millis(v.and_utc()))
        }
        ColumnKind::Timestamp => opt(row.try_get::<Option<DateTime<Utc>>, _>(index))?.map(millis),
        ColumnKind::Date => {
            opt(row.try_get::<Option<NaiveDate>, _>(index))?.map(|v| Value::String(v.to_string()))
        }
        ColumnKind::Time => {
            opt(row.try_get::<Option<NaiveTime>, _>(index))?.map(|v| Value::String(v.to_string()))
        }
        ColumnKind::Binary => opt(row.try_get_unchecked::<Option<Vec<u8>>, _>(index))?
            .map(|v| Value::String(STANDARD.encode(v))),
        ColumnKind::Text => {
            opt(row.try_get_unchecked::<Option<String>, _>(index))?.map(Value::String)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn opt<T>(result: std::result::Result<Option<T>, sqlx::Error>) -> Result<Option<T>> {
    result.map_err(|e| Error::Backend(format!("Failed to decode column: {}", e)))
}

/// Interpret a scalar count result
pub fn count_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bigint_columns_become_strings() {
        assert_eq!(column_kind("BIGINT"), ColumnKind::BigInt);
        assert_eq!(column_kind("BIGINT UNSIGNED"), ColumnKind::BigIntUnsigned);
        assert_eq!(column_kind("INT"), ColumnKind::Int);

        assert_eq!(wide_integer(9_007_199_254_740_993i64), json!("9007199254740993"));
        assert_eq!(wide_integer(i64::MIN), json!("-9223372036854775808"));
        assert_eq!(wide_integer(u64::MAX), json!("18446744073709551615"));
        assert_eq!(wide_integer(5i64), json!("5"));
    }

    #[test]
    fn test_column_kinds() {
        assert_eq!(column_kind("JSON"), ColumnKind::Json);
        assert_eq!(column_kind("LONGBLOB"), ColumnKind::Binary);
        assert_eq!(column_kind("VARCHAR"), ColumnKind::Text);
        assert_eq!(column_kind("YEAR"), ColumnKind::IntUnsigned);
    }

    #[test]
    fn test_datetime_millis() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(millis(at), json!("2024-01-01T00:00:00.123Z"));
    }

    #[test]
    fn test_count_value() {
        assert_eq!(count_value(&json!("25")), 25);
        assert_eq!(count_value(&json!(7)), 7);
        assert_eq!(count_value(&Value::Null), 0);
    }
}

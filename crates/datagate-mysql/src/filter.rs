//! Equality-map filters and parameter binding

use sqlx::{MySql, mysql::MySqlArguments, query::Query};
use serde_json::Value;

use datagate_core::{Error, Result};

use crate::identifiers::TableSchema;

/// A WHERE clause with its bound values, in placeholder order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Clause {
    /// ` WHERE ...`, or empty when there are no conditions
    pub fn where_sql(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }

    /// Append a condition, joined with AND
    pub fn and(&mut self, condition: &str, binds: impl IntoIterator<Item = Value>) {
        if !self.sql.is_empty() {
            self.sql.push_str(" AND ");
        }
        self.sql.push_str(condition);
        self.binds.extend(binds);
    }
}

/// Translate `{column: value}` into a clause. `null` becomes `IS NULL`,
/// arrays become `IN (...)`; an empty array matches nothing.
///
/// # Errors
/// - `ValidationError::MalformedBody` if the filter is not an object, names an
///   unknown column, or holds a nested object
pub fn equality_clause(schema: &TableSchema, filter: &Value) -> Result<Clause> {
    let mut clause = Clause::default();
    let map = match filter {
        Value::Null => return Ok(clause),
        Value::Object(map) => map,
        _ => return Err(Error::malformed("filter must be an object")),
    };

    for (field, value) in map {
        let column = schema.require(field)?;
        match value {
            Value::Null => clause.and(&format!("{} IS NULL", column), []),
            Value::Array(items) if items.is_empty() => clause.and("1 = 0", []),
            Value::Array(items) => {
                if items.iter().any(|v| v.is_object() || v.is_array()) {
                    return Err(Error::malformed(format!(
                        "Unsupported filter value for {}",
                        field
                    )));
                }
                let placeholders = vec!["?"; items.len()].join(", ");
                clause.and(
                    &format!("{} IN ({})", column, placeholders),
                    items.iter().cloned(),
                );
            }
            Value::Object(_) => {
                return Err(Error::malformed(format!(
                    "Unsupported filter value for {}",
                    field
                )));
            }
            scalar => clause.and(&format!("{} = ?", column), [scalar.clone()]),
        }
    }
    Ok(clause)
}

/// Bind one JSON value. Objects and arrays are sent as JSON text.
pub fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

pub fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

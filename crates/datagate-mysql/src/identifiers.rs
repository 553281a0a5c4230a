//! Identifier validation
//!
//! Identifiers cannot be bound as parameters, so every table and column
//! name is checked twice before it is quoted into statement text: against a
//! strict character set, then against the live catalog.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{MySqlPool, Row};

use datagate_core::{Error, NotFound, Result};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_$]{1,64}$").expect("IDENTIFIER is a valid regex pattern")
});

/// Character-set check only; membership is checked by [`resolve_table`]
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Backtick-quote an identifier that passed validation
pub fn quote(name: &str) -> String {
    format!("`{}`", name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// `information_schema` data type, lower case (`varchar`, `json`, ...)
    pub data_type: String,
}

/// Columns of a table that exists right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn quoted(&self) -> String {
        quote(&self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Quoted column name
    ///
    /// # Errors
    /// - `ValidationError::MalformedBody` if the table has no such column
    pub fn require(&self, name: &str) -> Result<String> {
        match self.column(name) {
            Some(column) => Ok(quote(&column.name)),
            None => Err(Error::malformed(format!(
                "Unknown column '{}' in table {}",
                name, self.name
            ))),
        }
    }
}

/// Tables in the connection's current database
pub async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(Error::backend)?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(Error::backend))
        .collect()
}

/// Validate a caller-supplied table name against the live table list and
/// load its columns
///
/// # Errors
/// - `NotFound::Table` if the name is malformed or no such table exists
pub async fn resolve_table(pool: &MySqlPool, name: &str) -> Result<TableSchema> {
    if !is_valid_identifier(name) {
        return Err(NotFound::Table(name.to_string()).into());
    }

    let rows = sqlx::query(
        r#"
        SELECT CAST(COLUMN_NAME AS CHAR) AS name, CAST(DATA_TYPE AS CHAR) AS data_type
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#,
    )
    .bind(name)
    .fetch_all(pool)
    .await
    .map_err(Error::backend)?;

    if rows.is_empty() {
        return Err(NotFound::Table(name.to_string()).into());
    }

    let columns = rows
        .iter()
        .map(|row| {
            Ok(Column {
                name: row.try_get::<String, _>("name").map_err(Error::backend)?,
                data_type: row
                    .try_get::<String, _>("data_type")
                    .map_err(Error::backend)?
                    .to_lowercase(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TableSchema {
        name: name.to_string(),
        columns,
    })
}

/// Column lists of the table's FULLTEXT indexes, in index order
pub async fn fulltext_indexes(pool: &MySqlPool, table: &str) -> Result<Vec<Vec<String>>> {
    let rows = sqlx::query(
        r#"
        SELECT CAST(INDEX_NAME AS CHAR) AS index_name, CAST(COLUMN_NAME AS CHAR) AS column_name
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_TYPE = 'FULLTEXT'
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(Error::backend)?;

    let mut indexes: Vec<(String, Vec<String>)> = Vec::new();
    for row in &rows {
        let index: String = row.try_get("index_name").map_err(Error::backend)?;
        let column: String = row.try_get("column_name").map_err(Error::backend)?;
        match indexes.last_mut() {
            Some((name, columns)) if *name == index => columns.push(column),
            _ => indexes.push((index, vec![column])),
        }
    }
    Ok(indexes.into_iter().map(|(_, columns)| columns).collect())
}

/// Index name for a FULLTEXT index over `columns`, within the 64 character limit
pub fn fulltext_index_name(columns: &[String]) -> String {
    let mut name = format!("ft_{}", columns.join("_"));
    name.truncate(64);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_charset() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("order_items_2024"));
        assert!(!is_valid_identifier("users; DROP TABLE x"));
        assert!(!is_valid_identifier("a`b"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"a".repeat(65)));
    }

    #[test]
    fn test_schema_require() {
        let schema = TableSchema {
            name: "users".to_string(),
            columns: vec![
                Column {
                    name: "_id".to_string(),
                    data_type: "varchar".to_string(),
                },
                Column {
                    name: "email".to_string(),
                    data_type: "varchar".to_string(),
                },
            ],
        };
        assert_eq!(schema.require("email").unwrap(), "`email`");
        assert!(schema.require("password").is_err());
        assert_eq!(schema.quoted(), "`users`");
    }

    #[test]
    fn test_fulltext_index_name() {
        assert_eq!(
            fulltext_index_name(&["title".to_string(), "body".to_string()]),
            "ft_title_body"
        );
        assert_eq!(fulltext_index_name(&["x".repeat(80)]).len(), 64);
    }
}

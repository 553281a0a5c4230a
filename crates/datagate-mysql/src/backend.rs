//! MySqlBackend: the generic CRUD contract over a MySQL database
//!
//! Tables use an explicit `_id` primary key. `createdAt` and `updatedAt`
//! are stamped when the table has those columns.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{debug, info};

use datagate_core::{
    Backend, Capabilities, Conflict, Error, NotFound, Record, Result, clock,
    options::{ArrayMutation, InsertOptions, JoinSpec, UpdateOptions, apply_field_types},
    query::{FindQuery, FindResult, Method, Operation, SqlQuery, SqlResult},
    record::{apply_array_mutation, strip_hidden},
};

use crate::{
    filter::{Clause, bind_all, equality_clause},
    identifiers::{
        TableSchema, fulltext_index_name, fulltext_indexes, list_tables, quote, resolve_table,
    },
    row::{count_value, row_to_record, rows_to_records},
};

const ID: &str = "_id";
const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

const METHODS: &[Method] = &[Method::Find, Method::FindOne, Method::Count];

/// Largest row count MySQL accepts in LIMIT, used when only an offset is given
const NO_LIMIT: u64 = u64::MAX;

pub struct MySqlBackend {
    pool: MySqlPool,
    allow_raw_sql: bool,
}

/// MySQL DATETIME literal with millisecond precision
fn sql_timestamp() -> Value {
    Value::String(clock::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

/// Arrays and objects are stored as JSON text
fn storable(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other,
    }
}

fn id_clause(id: &str) -> Clause {
    let mut clause = Clause::default();
    clause.and("`_id` = ?", [Value::String(id.to_string())]);
    clause
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool, allow_raw_sql: bool) -> Self {
        Self {
            pool,
            allow_raw_sql,
        }
    }

    async fn select(
        &self,
        schema: &TableSchema,
        clause: &Clause,
        window: Option<(u64, u64)>,
    ) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT * FROM {}{}", schema.quoted(), clause.where_sql());
        let mut binds = clause.binds.clone();
        if let Some((limit, offset)) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(Value::from(limit));
            binds.push(Value::from(offset));
        }
        debug!("{}", sql);

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::backend)?;
        rows_to_records(&rows)
    }

    async fn select_one(&self, schema: &TableSchema, clause: &Clause) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT * FROM {}{} LIMIT 1",
            schema.quoted(),
            clause.where_sql()
        );
        let row = bind_all(sqlx::query(&sql), &clause.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::backend)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn exists(&self, schema: &TableSchema, clause: &Clause) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {}{} LIMIT 1",
            schema.quoted(),
            clause.where_sql()
        );
        let row = bind_all(sqlx::query(&sql), &clause.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::backend)?;
        Ok(row.is_some())
    }

    async fn count_where(&self, schema: &TableSchema, clause: &Clause) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {}{}",
            schema.quoted(),
            clause.where_sql()
        );
        let row = bind_all(sqlx::query(&sql), &clause.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::backend)?;
        let record = row_to_record(&row)?;
        Ok(record.get("total").map(count_value).unwrap_or(0))
    }

    /// Condition matching `field = value`, or `field IS NULL`
    fn field_clause(schema: &TableSchema, field: &str, value: &Value) -> Result<Clause> {
        let column = schema.require(field)?;
        let mut clause = Clause::default();
        if value.is_null() {
            clause.and(&format!("{} IS NULL", column), []);
        } else {
            clause.and(&format!("{} = ?", column), [storable(value.clone())]);
        }
        Ok(clause)
    }

    async fn ensure_fulltext(&self, schema: &TableSchema, fields: &[String]) -> Result<()> {
        let columns = fields
            .iter()
            .map(|f| schema.require(f))
            .collect::<Result<Vec<_>>>()?;

        let existing = fulltext_indexes(&self.pool, &schema.name).await?;
        if existing.iter().any(|index| index.as_slice() == fields) {
            return Ok(());
        }

        let sql = format!(
            "ALTER TABLE {} ADD FULLTEXT INDEX {} ({})",
            schema.quoted(),
            quote(&fulltext_index_name(fields)),
            columns.join(", ")
        );
        info!("Creating FULLTEXT index on {}", schema.name);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;
        Ok(())
    }

    async fn fetch_by_id(&self, schema: &TableSchema, id: &str) -> Result<Option<Record>> {
        schema.require(ID)?;
        self.select_one(schema, &id_clause(id)).await
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    async fn list_all(&self, collection: &str, filter: Option<Value>) -> Result<Vec<Record>> {
        let schema = resolve_table(&self.pool, collection).await?;
        let clause = equality_clause(&schema, &filter.unwrap_or(Value::Null))?;
        self.select(&schema, &clause, None).await
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
        join: Option<&JoinSpec>,
    ) -> Result<Record> {
        if join.is_some() {
            return Err(Error::unsupported("join"));
        }
        let schema = resolve_table(&self.pool, collection).await?;
        self.fetch_by_id(&schema, id)
            .await?
            .ok_or_else(|| NotFound::Document.into())
    }

    async fn insert(
        &self,
        collection: &str,
        mut data: Record,
        options: &InsertOptions,
    ) -> Result<Record> {
        let schema = resolve_table(&self.pool, collection).await?;
        schema.require(ID)?;
        apply_field_types(&mut data, &options.field_type);

        let mut duplicates = Vec::new();
        for field in options.unique_candidate_fields(&data) {
            let value = data.get(&field).cloned().unwrap_or(Value::Null);
            if self
                .exists(&schema, &Self::field_clause(&schema, &field, &value)?)
                .await?
            {
                duplicates.push(field);
            }
        }
        if !duplicates.is_empty() {
            return Err(Conflict::DuplicateFields(duplicates).into());
        }

        if !options.text_index_fields.is_empty() {
            self.ensure_fulltext(&schema, &options.text_index_fields)
                .await?;
        }

        let id = match data.get(ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        data.insert(ID.to_string(), Value::String(id.clone()));
        if schema.has_column(CREATED_AT) {
            data.insert(CREATED_AT.to_string(), sql_timestamp());
        }

        let mut columns = Vec::with_capacity(data.len());
        let mut binds = Vec::with_capacity(data.len());
        for (field, value) in data {
            columns.push(schema.require(&field)?);
            binds.push(storable(value));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.quoted(),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        debug!("{}", sql);
        bind_all(sqlx::query(&sql), &binds)
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;

        self.fetch_by_id(&schema, &id)
            .await?
            .ok_or_else(|| Error::Backend(format!("Inserted row {} could not be read back", id)))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut data: Record,
        options: &UpdateOptions,
    ) -> Result<Record> {
        let schema = resolve_table(&self.pool, collection).await?;
        schema.require(ID)?;
        if !self.exists(&schema, &id_clause(id)).await? {
            return Err(NotFound::Record.into());
        }

        if let Some(field) = &options.unique
            && let Some(value) = data.get(field)
        {
            let mut clause = Self::field_clause(&schema, field, value)?;
            clause.and("`_id` <> ?", [Value::String(id.to_string())]);
            if self.exists(&schema, &clause).await? {
                return Err(Conflict::DuplicateUnique(field.clone()).into());
            }
        }

        data.remove(ID);
        if schema.has_column(UPDATED_AT) {
            data.insert(UPDATED_AT.to_string(), sql_timestamp());
        }

        if !data.is_empty() {
            let mut assignments = Vec::with_capacity(data.len());
            let mut binds = Vec::with_capacity(data.len() + 1);
            for (field, value) in data {
                assignments.push(format!("{} = ?", schema.require(&field)?));
                binds.push(storable(value));
            }
            binds.push(Value::String(id.to_string()));

            let sql = format!(
                "UPDATE {} SET {} WHERE `_id` = ?",
                schema.quoted(),
                assignments.join(", ")
            );
            debug!("{}", sql);
            bind_all(sqlx::query(&sql), &binds)
                .execute(&self.pool)
                .await
                .map_err(Error::backend)?;
        }

        self.fetch_by_id(&schema, id)
            .await?
            .ok_or_else(|| NotFound::Record.into())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let schema = resolve_table(&self.pool, collection).await?;
        schema.require(ID)?;
        let sql = format!("DELETE FROM {} WHERE `_id` = ?", schema.quoted());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;
        if result.rows_affected() == 0 {
            return Err(NotFound::Record.into());
        }
        Ok(())
    }

    async fn mutate_array(
        &self,
        collection: &str,
        id: &str,
        mutation: &ArrayMutation,
    ) -> Result<Record> {
        let schema = resolve_table(&self.pool, collection).await?;
        let column = schema.require(&mutation.field)?;
        let mut record = self
            .fetch_by_id(&schema, id)
            .await?
            .ok_or(NotFound::Document)?;

        // Text columns hold the array as JSON text
        let parsed = match record.get(&mutation.field) {
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .ok()
                .filter(Value::is_array),
            _ => None,
        };
        if let Some(items) = parsed {
            record.insert(mutation.field.clone(), items);
        }

        apply_array_mutation(&mut record, mutation)?;
        let items = record
            .remove(&mutation.field)
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let mut assignments = vec![format!("{} = ?", column)];
        let mut binds = vec![storable(items)];
        if schema.has_column(UPDATED_AT) {
            assignments.push("`updatedAt` = ?".to_string());
            binds.push(sql_timestamp());
        }
        binds.push(Value::String(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE `_id` = ?",
            schema.quoted(),
            assignments.join(", ")
        );
        bind_all(sqlx::query(&sql), &binds)
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;

        self.fetch_by_id(&schema, id)
            .await?
            .ok_or_else(|| NotFound::Document.into())
    }

    async fn count(&self, collection: &str, filter: Value) -> Result<u64> {
        let schema = resolve_table(&self.pool, collection).await?;
        let clause = equality_clause(&schema, &filter)?;
        self.count_where(&schema, &clause).await
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<FindResult> {
        let schema = resolve_table(&self.pool, collection).await?;
        let clause = equality_clause(&schema, &query.filter)?;

        let window = match (query.limit, query.skip) {
            (Some(limit), skip) => Some((limit, skip)),
            (None, 0) => None,
            (None, skip) => Some((NO_LIMIT, skip)),
        };
        let mut records = self.select(&schema, &clause, window).await?;
        for record in &mut records {
            strip_hidden(record, &query.hidden);
        }

        let total = self.count_where(&schema, &clause).await?;
        Ok(FindResult { records, total })
    }

    async fn invoke(&self, collection: &str, operation: &Operation) -> Result<Value> {
        let schema = resolve_table(&self.pool, collection).await?;
        match operation {
            Operation::Find { filter } => {
                let clause = equality_clause(&schema, filter)?;
                let records = self.select(&schema, &clause, None).await?;
                Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
            }
            Operation::FindOne { filter } => {
                let clause = equality_clause(&schema, filter)?;
                Ok(self
                    .select_one(&schema, &clause)
                    .await?
                    .map(Value::Object)
                    .unwrap_or(Value::Null))
            }
            Operation::Count { filter } => {
                let clause = equality_clause(&schema, filter)?;
                Ok(Value::from(self.count_where(&schema, &clause).await?))
            }
            other => Err(Error::unsupported(other.method().as_str())),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        list_tables(&self.pool).await
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let schema = resolve_table(&self.pool, name).await?;
        let sql = format!("DROP TABLE {}", schema.quoted());
        info!("Dropping table {}", schema.name);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;
        Ok(())
    }

    async fn execute_sql(&self, query: &SqlQuery) -> Result<SqlResult> {
        if !self.allow_raw_sql {
            return Err(Error::unsupported("query"));
        }

        let rows = sqlx::query(&query.main_query)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::backend)?;
        let rows = rows_to_records(&rows)?;

        let total = match &query.count_query {
            Some(count_query) => {
                let row = sqlx::query(count_query)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(Error::backend)?;
                row_to_record(&row)?
                    .values()
                    .next()
                    .map(count_value)
                    .unwrap_or(0)
            }
            None => rows.len() as u64,
        };
        Ok(SqlResult { rows, total })
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            methods: METHODS,
            supports_join: false,
            supports_sql: self.allow_raw_sql,
            supports_drop: true,
        }
    }
}

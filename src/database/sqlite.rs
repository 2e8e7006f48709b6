// file: src/database/sqlite.rs
// description: Durable conditional store on SQLite with conditions compiled to SQL
// reference: https://docs.rs/sqlx and https://www.sqlite.org/json1.html

use crate::database::condition::{Changes, Condition, Key, Record, check_attribute_name};
use crate::database::context::RequestContext;
use crate::database::memory::check_changes;
use crate::database::schema::TableSchema;
use crate::database::store::{BatchFailure, BatchOutcome, ConditionalStore, QueryRequest};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Open a pool on a SQLite file, creating the file and its directory if needed.
pub async fn open_pool(path: &Path, max_connections: u32) -> StoreResult<SqlitePool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StoreError::ConnectionFailure(format!(
                "Failed to create {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    info!("Opening SQLite store at {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Private in-memory database, one connection so every handle sees the same data.
pub async fn open_memory_pool() -> StoreResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_all<'q>(mut query: SqliteQuery<'q>, binds: &[Bind]) -> SqliteQuery<'q> {
    for bind in binds {
        query = match bind {
            Bind::Null => query.bind(Option::<String>::None),
            Bind::Int(value) => query.bind(*value),
            Bind::Real(value) => query.bind(*value),
            Bind::Text(value) => query.bind(value.clone()),
        };
    }
    query
}

fn path(attribute: &str) -> StoreResult<String> {
    check_attribute_name(attribute)?;
    Ok(format!("'$.{}'", attribute))
}

/// Compiles a condition into a boolean SQL expression over the `record` column.
///
/// The expression assumes the row exists; behaviour for an absent row is
/// decided by evaluating the condition against `None` before issuing SQL.
/// Every leaf yields 0 or 1, never NULL, so `NOT` behaves for absent attributes.
#[derive(Debug, Default)]
struct SqlCondition {
    sql: String,
    binds: Vec<Bind>,
}

impl SqlCondition {
    fn compile(condition: &Condition) -> StoreResult<Self> {
        let mut compiled = Self::default();
        compiled.push(condition)?;
        Ok(compiled)
    }

    fn push(&mut self, condition: &Condition) -> StoreResult<()> {
        match condition {
            Condition::Exists => self.sql.push('1'),
            Condition::NotExists => self.sql.push('0'),
            Condition::AttributeExists(name) => {
                self.sql
                    .push_str(&format!("(json_type(record, {}) IS NOT NULL)", path(name)?));
            }
            Condition::AttributeNotExists(name) => {
                self.sql
                    .push_str(&format!("(json_type(record, {}) IS NULL)", path(name)?));
            }
            Condition::Equals(name, value) => self.push_equals(name, value)?,
            Condition::NotEquals(name, value) => {
                self.sql.push_str("(NOT ");
                self.push_equals(name, value)?;
                self.sql.push(')');
            }
            Condition::In(name, values) => {
                if values.is_empty() {
                    self.sql.push('0');
                    return Ok(());
                }
                self.sql.push('(');
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(" OR ");
                    }
                    self.push_equals(name, value)?;
                }
                self.sql.push(')');
            }
            Condition::And(parts) => self.push_joined(parts, " AND ", '1')?,
            Condition::Or(parts) => self.push_joined(parts, " OR ", '0')?,
            Condition::Not(inner) => {
                self.sql.push_str("(NOT ");
                self.push(inner)?;
                self.sql.push(')');
            }
        }
        Ok(())
    }

    fn push_joined(&mut self, parts: &[Condition], separator: &str, empty: char) -> StoreResult<()> {
        if parts.is_empty() {
            self.sql.push(empty);
            return Ok(());
        }
        self.sql.push('(');
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            self.push(part)?;
        }
        self.sql.push(')');
        Ok(())
    }

    fn push_equals(&mut self, name: &str, value: &Value) -> StoreResult<()> {
        let path = path(name)?;
        let kind = format!("json_type(record, {})", path);
        let extract = format!("json_extract(record, {})", path);

        let expr = match value {
            Value::Null => format!("{} = 'null'", kind),
            Value::Bool(true) => format!("{} = 'true'", kind),
            Value::Bool(false) => format!("{} = 'false'", kind),
            Value::Number(number) => {
                self.binds.push(match number.as_i64() {
                    Some(int) => Bind::Int(int),
                    None => Bind::Real(number.as_f64().unwrap_or(f64::NAN)),
                });
                format!("{} IN ('integer', 'real') AND {} = ?", kind, extract)
            }
            Value::String(text) => {
                self.binds.push(Bind::Text(text.clone()));
                format!("{} = 'text' AND {} = ?", kind, extract)
            }
            Value::Array(_) | Value::Object(_) => {
                self.binds.push(Bind::Text(value.to_string()));
                format!("{} IN ('array', 'object') AND {} = json(?)", kind, extract)
            }
        };

        self.sql.push_str(&format!("COALESCE(({}), 0)", expr));
        Ok(())
    }
}

/// One SQLite table per logical table. Rows hold the primary key columns and
/// the whole record as JSON text; secondary indexes are expression indexes.
pub struct SqliteStore {
    pool: SqlitePool,
    schema: TableSchema,
    table: String,
}

impl SqliteStore {
    pub async fn new(pool: SqlitePool, schema: TableSchema) -> StoreResult<Self> {
        if !schema
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StoreError::InvalidRequest(format!(
                "Invalid table name: {}",
                schema.name
            )));
        }

        let store = Self {
            pool,
            table: format!("\"{}\"", schema.name),
            schema,
        };
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_table(&self) -> StoreResult<()> {
        debug!("Ensuring table {}", self.schema.name);

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL DEFAULT '',
                record TEXT NOT NULL,
                PRIMARY KEY (pk, sk)
            )",
            self.table
        );
        sqlx::query(&create).execute(&self.pool).await?;

        for index in &self.schema.indexes {
            let mut columns = vec![format!(
                "json_extract(record, {})",
                path(&index.partition_key)?
            )];
            if let Some(sort) = &index.sort_key {
                columns.push(format!("json_extract(record, {})", path(sort)?));
            }
            let statement = format!(
                "CREATE INDEX IF NOT EXISTS \"{}__{}\" ON {} ({})",
                self.schema.name,
                index.name,
                self.table,
                columns.join(", ")
            );
            sqlx::query(&statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn key_columns(&self, key: &Key) -> StoreResult<(String, String)> {
        self.schema.check_key(key)?;
        Ok((key.partition.clone(), key.sort.clone().unwrap_or_default()))
    }

    async fn exists(&self, pk: &str, sk: &str) -> StoreResult<bool> {
        let statement = format!("SELECT 1 FROM {} WHERE pk = ? AND sk = ?", self.table);
        let row = sqlx::query(&statement)
            .bind(pk)
            .bind(sk)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn write_record(&self, record: &Record, condition: Option<&Condition>) -> StoreResult<()> {
        let key = self.schema.key_of(record)?;
        let (pk, sk) = self.key_columns(&key)?;
        let body = serde_json::to_string(record)?;

        let upsert = format!(
            "INSERT INTO {} (pk, sk, record) VALUES (?, ?, ?)
             ON CONFLICT(pk, sk) DO UPDATE SET record = excluded.record",
            self.table
        );

        let Some(condition) = condition else {
            bind_all(sqlx::query(&upsert), &[Bind::Text(pk), Bind::Text(sk), Bind::Text(body)])
                .execute(&self.pool)
                .await?;
            return Ok(());
        };

        let compiled = SqlCondition::compile(condition)?;
        let result = if condition.evaluate(None) {
            let statement = format!("{} WHERE {}", upsert, compiled.sql);
            let mut binds = vec![Bind::Text(pk), Bind::Text(sk), Bind::Text(body)];
            binds.extend(compiled.binds);
            bind_all(sqlx::query(&statement), &binds)
                .execute(&self.pool)
                .await?
        } else {
            let statement = format!(
                "UPDATE {} SET record = ? WHERE pk = ? AND sk = ? AND {}",
                self.table, compiled.sql
            );
            let mut binds = vec![Bind::Text(body), Bind::Text(pk), Bind::Text(sk)];
            binds.extend(compiled.binds);
            bind_all(sqlx::query(&statement), &binds)
                .execute(&self.pool)
                .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::ConditionFailed);
        }
        Ok(())
    }

    async fn remove_record(&self, key: &Key, condition: Option<&Condition>) -> StoreResult<()> {
        let (pk, sk) = self.key_columns(key)?;
        let mut statement = format!("DELETE FROM {} WHERE pk = ? AND sk = ?", self.table);
        let mut binds = vec![Bind::Text(pk.clone()), Bind::Text(sk.clone())];

        let Some(condition) = condition else {
            bind_all(sqlx::query(&statement), &binds)
                .execute(&self.pool)
                .await?;
            return Ok(());
        };

        let compiled = SqlCondition::compile(condition)?;
        statement.push_str(&format!(" AND {}", compiled.sql));
        binds.extend(compiled.binds);

        let result = bind_all(sqlx::query(&statement), &binds)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0
            && (self.exists(&pk, &sk).await? || !condition.evaluate(None))
        {
            return Err(StoreError::ConditionFailed);
        }
        Ok(())
    }
}

fn decode(body: &str) -> StoreResult<Record> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(record) => Ok(record),
        other => Err(StoreError::Corrupt(format!(
            "Expected a JSON object, found {}",
            other
        ))),
    }
}

fn decode_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> StoreResult<Vec<Record>> {
    rows.iter()
        .map(|row| {
            let body: String = row.try_get("record")?;
            decode(&body)
        })
        .collect()
}

#[async_trait]
impl ConditionalStore for SqliteStore {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn get(&self, ctx: &RequestContext, key: &Key) -> StoreResult<Option<Record>> {
        let (pk, sk) = self.key_columns(key)?;
        let statement = format!("SELECT record FROM {} WHERE pk = ? AND sk = ?", self.table);

        ctx.run("get", async {
            let row = sqlx::query(&statement)
                .bind(&pk)
                .bind(&sk)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => {
                    let body: String = row.try_get("record")?;
                    Ok(Some(decode(&body)?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        record: Record,
        condition: Option<&Condition>,
    ) -> StoreResult<()> {
        ctx.run("put", self.write_record(&record, condition)).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        key: &Key,
        changes: &Changes,
        condition: Option<&Condition>,
    ) -> StoreResult<Record> {
        let (pk, sk) = self.key_columns(key)?;
        check_changes(&self.schema, changes)?;

        let mut binds = Vec::new();
        let mut expr = "record".to_string();
        if !changes.sets().is_empty() {
            let mut args = Vec::new();
            for (name, value) in changes.sets() {
                args.push(format!("{}, json(?)", path(name)?));
                binds.push(Bind::Text(value.to_string()));
            }
            expr = format!("json_set({}, {})", expr, args.join(", "));
        }
        if !changes.removals().is_empty() {
            let paths = changes
                .removals()
                .iter()
                .map(|name| path(name))
                .collect::<StoreResult<Vec<_>>>()?;
            expr = format!("json_remove({}, {})", expr, paths.join(", "));
        }

        let mut statement = format!(
            "UPDATE {} SET record = {} WHERE pk = ? AND sk = ?",
            self.table, expr
        );
        binds.push(Bind::Text(pk.clone()));
        binds.push(Bind::Text(sk.clone()));
        if let Some(condition) = condition {
            let compiled = SqlCondition::compile(condition)?;
            statement.push_str(&format!(" AND {}", compiled.sql));
            binds.extend(compiled.binds);
        }
        statement.push_str(" RETURNING record");

        ctx.run("update", async {
            let row = bind_all(sqlx::query(&statement), &binds)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = row {
                let body: String = row.try_get("record")?;
                return decode(&body);
            }

            if self.exists(&pk, &sk).await? {
                return Err(StoreError::ConditionFailed);
            }
            match condition {
                Some(condition) if !condition.evaluate(None) => Err(StoreError::ConditionFailed),
                _ => Err(StoreError::NotFound(key.to_string())),
            }
        })
        .await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &Key,
        condition: Option<&Condition>,
    ) -> StoreResult<()> {
        ctx.run("delete", self.remove_record(key, condition)).await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        request: &QueryRequest,
    ) -> StoreResult<Vec<Record>> {
        let (partition_expr, sort_attr) = match &request.index {
            Some(name) => {
                let index = self.schema.index(name)?;
                (
                    format!("json_extract(record, {})", path(&index.partition_key)?),
                    index.sort_key.clone(),
                )
            }
            None => ("pk".to_string(), self.schema.sort_key.clone()),
        };

        let mut statement = format!(
            "SELECT record FROM {} WHERE {} = ?",
            self.table, partition_expr
        );
        let mut binds = vec![Bind::Text(request.partition_value.clone())];

        if let Some(value) = &request.sort_value {
            let Some(attr) = &sort_attr else {
                return Err(StoreError::InvalidRequest(
                    "Sort value given for an access path without a sort key".to_string(),
                ));
            };
            let compiled = SqlCondition::compile(&Condition::Equals(attr.clone(), value.clone()))?;
            statement.push_str(&format!(" AND {}", compiled.sql));
            binds.extend(compiled.binds);
        }
        if let Some(filter) = &request.filter {
            let compiled = SqlCondition::compile(filter)?;
            statement.push_str(&format!(" AND {}", compiled.sql));
            binds.extend(compiled.binds);
        }

        let direction = if request.ascending { "ASC" } else { "DESC" };
        let mut order = Vec::new();
        match (&request.index, &sort_attr) {
            (Some(_), Some(attr)) => {
                order.push(format!("json_extract(record, {}) {}", path(attr)?, direction))
            }
            (None, Some(_)) => order.push(format!("sk {}", direction)),
            _ => {}
        }
        order.push(format!("pk {}", direction));
        order.push(format!("sk {}", direction));
        statement.push_str(&format!(" ORDER BY {}", order.join(", ")));

        if let Some(limit) = request.limit {
            statement.push_str(" LIMIT ?");
            binds.push(Bind::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        ctx.run("query", async {
            let rows = bind_all(sqlx::query(&statement), &binds)
                .fetch_all(&self.pool)
                .await?;
            decode_rows(rows)
        })
        .await
    }

    async fn scan(
        &self,
        ctx: &RequestContext,
        filter: Option<&Condition>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        let mut statement = format!("SELECT record FROM {}", self.table);
        let mut binds = Vec::new();
        if let Some(filter) = filter {
            let compiled = SqlCondition::compile(filter)?;
            statement.push_str(&format!(" WHERE {}", compiled.sql));
            binds.extend(compiled.binds);
        }
        statement.push_str(" ORDER BY pk, sk");
        if let Some(limit) = limit {
            statement.push_str(" LIMIT ?");
            binds.push(Bind::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        ctx.run("scan", async {
            let rows = bind_all(sqlx::query(&statement), &binds)
                .fetch_all(&self.pool)
                .await?;
            decode_rows(rows)
        })
        .await
    }

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        puts: Vec<Record>,
        deletes: Vec<Key>,
    ) -> StoreResult<BatchOutcome> {
        ctx.run("batch_write", async {
            let mut outcome = BatchOutcome::default();

            for record in &puts {
                match self.write_record(record, None).await {
                    Ok(()) => outcome.written += 1,
                    Err(err) => outcome.failures.push(BatchFailure::Put {
                        key: self.schema.key_of(record).ok(),
                        reason: err.to_string(),
                    }),
                }
            }

            for key in deletes {
                match self.remove_record(&key, None).await {
                    Ok(()) => outcome.deleted += 1,
                    Err(err) => outcome.failures.push(BatchFailure::Delete {
                        key,
                        reason: err.to_string(),
                    }),
                }
            }

            debug!(
                table = %self.schema.name,
                written = outcome.written,
                deleted = outcome.deleted,
                failed = outcome.failures.len(),
                "Batch write finished"
            );
            Ok(outcome)
        })
        .await
    }

    async fn purge_expired(&self, ctx: &RequestContext, now: DateTime<Utc>) -> StoreResult<usize> {
        let Some(ttl_attr) = &self.schema.ttl_attribute else {
            return Ok(0);
        };
        let ttl_path = path(ttl_attr)?;
        let statement = format!(
            "DELETE FROM {} WHERE json_type(record, {}) IN ('integer', 'real')
             AND json_extract(record, {}) <= ?",
            self.table, ttl_path, ttl_path
        );

        ctx.run("purge_expired", async {
            let result = sqlx::query(&statement)
                .bind(now.timestamp())
                .execute(&self.pool)
                .await?;
            Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
        })
        .await
    }

    async fn ping(&self, ctx: &RequestContext) -> StoreResult<()> {
        ctx.run("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_compiles_to_null_safe_sql() {
        let condition = Condition::Exists.and(Condition::not_equals("deleted", true));
        let compiled = SqlCondition::compile(&condition).unwrap();
        assert_eq!(
            compiled.sql,
            "(1 AND (NOT COALESCE((json_type(record, '$.deleted') = 'true'), 0)))"
        );
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn test_string_equality_binds_value() {
        let compiled = SqlCondition::compile(&Condition::equals("status", "READY")).unwrap();
        assert_eq!(compiled.binds, vec![Bind::Text("READY".to_string())]);
        assert!(compiled.sql.contains("= 'text'"));
    }

    #[test]
    fn test_unsafe_attribute_rejected() {
        let result = SqlCondition::compile(&Condition::attribute_exists("x') OR 1=1 --"));
        assert!(matches!(result, Err(StoreError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_memory_pool_connection_is_never_recycled() {
        let pool = open_memory_pool().await.unwrap();
        assert_eq!(pool.options().get_max_connections(), 1);
        assert_eq!(pool.options().get_idle_timeout(), None);
        assert_eq!(pool.options().get_max_lifetime(), None);
    }

    #[tokio::test]
    async fn test_upsert_and_conditional_update() {
        let pool = open_memory_pool().await.unwrap();
        let store = SqliteStore::new(pool, TableSchema::repositories("test"))
            .await
            .unwrap();
        let ctx = RequestContext::new();

        let record = json!({"repo_id": "repo-1", "status": "READY", "updated_at": "a"})
            .as_object()
            .cloned()
            .unwrap();
        store.put(&ctx, record, Some(&Condition::NotExists)).await.unwrap();

        let updated = store
            .update(
                &ctx,
                &Key::partition("repo-1"),
                &Changes::new().set("status", "PARSING").set("metadata", json!({"a": 1})),
                Some(&Condition::equals("status", "READY")),
            )
            .await
            .unwrap();
        assert_eq!(updated.get("status"), Some(&json!("PARSING")));
        assert_eq!(updated.get("metadata"), Some(&json!({"a": 1})));

        let stale = store
            .update(
                &ctx,
                &Key::partition("repo-1"),
                &Changes::new().set("status", "FAILED"),
                Some(&Condition::equals("status", "READY")),
            )
            .await;
        assert!(matches!(stale, Err(StoreError::ConditionFailed)));
    }
}

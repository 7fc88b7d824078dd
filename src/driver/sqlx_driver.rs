// driver/sqlx_driver.rs - Real databases through sqlx's Any driver
//
// The connection url picks the backend: `postgres://` or `sqlite:`.
// Username and password from a descriptor are written into the url
// before connecting.
//
// Every statement goes through `AnyConnection`, so only the value types
// Any understands are bound: bool, i64, f64 and strings. NULL cells are
// written as a literal NULL instead of a bound parameter.
//
// On Postgres a text parameter is not implicitly converted to date,
// timestamp, uuid, jsonb, numeric and the like. Before the first insert
// into a table the session reads the column types from
// information_schema and wraps text parameters in `CAST($n AS <type>)`.

use std::collections::HashMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use sqlx::{AnyConnection, Connection as _, Row};
use url::Url;

use crate::dataset::CellValue;
use crate::driver::{Connection, Credentials, Driver, Session};
use crate::error::{FixtureError, Result};

const SCHEMES: &[&str] = &["postgres://", "postgresql://", "sqlite:"];

/// Lowercased column name -> quoted Postgres type to cast text into
type ColumnTypes = HashMap<String, String>;

/// Which SQL dialect details to use for a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn from_backend(name: &str) -> Self {
        match name {
            "SQLite" => Dialect::Sqlite,
            _ => Dialect::Postgres,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One-row INSERT. `types`, when known, casts the text parameters.
fn insert_sql(table: &str, columns: &[String], values: &[CellValue], types: Option<&ColumnTypes>) -> String {
    let mut sql = format!("INSERT INTO {table} ({}) VALUES (", columns.join(", "));
    let mut bound = 0;
    for (i, (column, value)) in columns.iter().zip(values).enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        if value.is_null() {
            sql.push_str("NULL");
            continue;
        }
        bound += 1;
        let cast = match value {
            CellValue::Text(_) => types.and_then(|types| types.get(&column.to_ascii_lowercase())),
            _ => None,
        };
        match cast {
            Some(ty) => {
                let _ = write!(sql, "CAST(${bound} AS {ty})");
            }
            None => {
                let _ = write!(sql, "${bound}");
            }
        }
    }
    sql.push(')');
    sql
}

/// Driver for urls sqlx can open
#[derive(Clone, Debug, Default)]
pub struct SqlxDriver;

impl SqlxDriver {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        SqlxDriver
    }
}

/// Writes credentials into a url-style connection string
fn url_with_credentials(url: &str, credentials: &Credentials) -> Result<String> {
    if credentials.is_empty() {
        return Ok(url.to_string());
    }
    let mut parsed = Url::parse(url)
        .map_err(|e| FixtureError::configuration(format!("cannot parse connection url: {e}")))?;
    if parsed.cannot_be_a_base() {
        return Err(FixtureError::configuration(
            "connection url cannot carry a username or password",
        ));
    }
    if let Some(username) = &credentials.username {
        parsed
            .set_username(username)
            .map_err(|_| FixtureError::configuration("connection url rejects a username"))?;
    }
    if let Some(password) = &credentials.password {
        parsed
            .set_password(Some(password))
            .map_err(|_| FixtureError::configuration("connection url rejects a password"))?;
    }
    Ok(parsed.into())
}

/// Strips the password part of a url for logging
fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.into()
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    fn accepts(&self, url: &str) -> bool {
        SCHEMES.iter().any(|scheme| url.starts_with(scheme))
    }

    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<Connection> {
        let full_url = url_with_credentials(url, credentials)?;
        let conn = AnyConnection::connect(&full_url)
            .await
            .map_err(|e| FixtureError::driver(format!("connecting to {}", redact(&full_url)), e))?;
        tracing::debug!(url = %redact(&full_url), backend = conn.backend_name(), "Opened connection");
        Ok(Connection::from_session(SqlxSession::new(conn)))
    }
}

/// Session over a single sqlx `AnyConnection`
pub struct SqlxSession {
    conn: AnyConnection,
    dialect: Dialect,
    // per qualified table name, filled on first insert (Postgres only)
    column_types: HashMap<String, ColumnTypes>,
}

impl SqlxSession {
    /// Wraps a connection opened elsewhere
    pub fn new(conn: AnyConnection) -> Self {
        let dialect = Dialect::from_backend(conn.backend_name());
        SqlxSession {
            conn,
            dialect,
            column_types: HashMap::new(),
        }
    }

    /// Column types of `table` (`table` or `schema.table`) as seen through
    /// the search path. Empty when the table is unknown.
    async fn postgres_column_types(&mut self, table: &str) -> Result<ColumnTypes> {
        let fail = self.fail(format!("reading column types of `{table}`"));
        let query = match table.split_once('.') {
            Some((schema, name)) => sqlx::query(
                "SELECT column_name::text, udt_schema::text, udt_name::text \
                 FROM information_schema.columns \
                 WHERE LOWER(table_schema) = LOWER($1) AND LOWER(table_name) = LOWER($2)",
            )
            .bind(schema.to_string())
            .bind(name.to_string()),
            None => sqlx::query(
                "SELECT column_name::text, udt_schema::text, udt_name::text \
                 FROM information_schema.columns \
                 WHERE LOWER(table_name) = LOWER($1) \
                   AND table_schema::name = ANY (current_schemas(false)) \
                 ORDER BY array_position(current_schemas(false), table_schema::name)",
            )
            .bind(table.to_string()),
        };
        let rows = query.fetch_all(&mut self.conn).await.map_err(fail)?;

        let context = format!("postgres: decoding column types of `{table}`");
        let decode = |e: sqlx::Error| FixtureError::driver(context.clone(), e);
        let mut types = ColumnTypes::new();
        for row in rows {
            let column: String = row.try_get(0).map_err(decode)?;
            let udt_schema: String = row.try_get(1).map_err(decode)?;
            let udt_name: String = row.try_get(2).map_err(decode)?;
            // first hit on the search path shadows later schemas
            types
                .entry(column.to_ascii_lowercase())
                .or_insert_with(|| format!("{}.{}", quote_identifier(&udt_schema), quote_identifier(&udt_name)));
        }
        tracing::debug!(table, columns = types.len(), "Read column types");
        Ok(types)
    }

    fn fail(&self, what: String) -> impl FnOnce(sqlx::Error) -> FixtureError {
        let context = format!("{}: {what}", self.dialect.label());
        move |e| FixtureError::driver(context, e)
    }
}

#[async_trait]
impl Session for SqlxSession {
    fn backend_name(&self) -> &'static str {
        self.dialect.label()
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let fail = self.fail("executing raw SQL".to_string());
        let result = sqlx::Executor::execute(&mut self.conn, sql).await.map_err(fail)?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        let fail = self.fail(format!("deleting rows of `{table}`"));
        let sql = format!("DELETE FROM {table}");
        let result = sqlx::query(&sql).execute(&mut self.conn).await.map_err(fail)?;
        Ok(result.rows_affected())
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[CellValue]) -> Result<()> {
        if self.dialect == Dialect::Postgres && !self.column_types.contains_key(table) {
            let types = self.postgres_column_types(table).await?;
            if !types.is_empty() {
                self.column_types.insert(table.to_string(), types);
            }
        }
        let sql = insert_sql(table, columns, values, self.column_types.get(table));

        let fail = self.fail(format!("inserting into `{table}`"));
        let mut query = sqlx::query(&sql);
        for value in values {
            query = match value {
                CellValue::Null => query,
                CellValue::Bool(b) => query.bind(*b),
                CellValue::Int(i) => query.bind(*i),
                CellValue::Float(f) => query.bind(*f),
                CellValue::Text(s) => query.bind(s.clone()),
            };
        }
        query.execute(&mut self.conn).await.map_err(fail)?;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        let fail = self.fail(format!("counting rows of `{table}`"));
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let row = sqlx::query(&sql).fetch_one(&mut self.conn).await.map_err(fail)?;
        let count: i64 = row.try_get(0).map_err(self.fail(format!("reading count of `{table}`")))?;
        Ok(count.max(0) as u64)
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        let fail = self.fail(format!("looking up schema `{schema}`"));
        let sql = match self.dialect {
            Dialect::Sqlite => "SELECT COUNT(*) FROM pragma_database_list WHERE name = $1".to_string(),
            Dialect::Postgres => {
                "SELECT COUNT(*) FROM information_schema.schemata WHERE LOWER(schema_name) = LOWER($1)".to_string()
            }
        };
        let row = sqlx::query(&sql)
            .bind(schema.to_string())
            .fetch_one(&mut self.conn)
            .await
            .map_err(fail)?;
        let count: i64 = row.try_get(0).map_err(self.fail(format!("reading schema `{schema}`")))?;
        Ok(count > 0)
    }
}

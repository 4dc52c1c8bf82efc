// Database Adapter Traits
// Defines the dialect-independent contract every database adapter implements

use crate::db::dialect::{Dialect, Statement};
use crate::db::query::{
    coerce_record, plan_listing, primary_key_column, require_columns, QueryOptions,
};
use crate::db::types::{map_column_type, CanonicalType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgresql,
    Mysql,
    Mssql,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 3] =
        [DatabaseType::Postgresql, DatabaseType::Mysql, DatabaseType::Mssql];

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseType::Postgresql => "PostgreSQL",
            DatabaseType::Mysql => "MySQL",
            DatabaseType::Mssql => "Microsoft SQL Server",
        }
    }

    /// Name used in configuration and connection detection
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Mssql => "mssql",
        }
    }

    /// Default port for the database type
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Postgresql => 5432,
            DatabaseType::Mysql => 3306,
            DatabaseType::Mssql => 1433,
        }
    }

    /// SQL syntax rules for this database type
    pub fn dialect(&self) -> &'static dyn Dialect {
        crate::db::dialect::for_type(*self)
    }

    fn allowed_names() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseType::Postgresql),
            "mysql" => Ok(DatabaseType::Mysql),
            "mssql" => Ok(DatabaseType::Mssql),
            _ => Err(DatabaseError::UnsupportedDialect {
                name: s.to_string(),
                allowed: Self::allowed_names(),
            }),
        }
    }
}

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Adapter is not connected; call connect() first")]
    NotConnected,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No record in {table} with {key} = {id}")]
    NotFound { table: String, key: String, id: String },

    #[error("Unsupported dialect '{name}' (supported: {allowed})")]
    UnsupportedDialect { name: String, allowed: String },

    #[error("Could not detect the database dialect from the connection string; specify it explicitly")]
    DialectDetection,

    #[error("{operation} failed on {table}: {message}")]
    QueryError {
        operation: &'static str,
        table: String,
        message: String,
    },

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl DatabaseError {
    /// HTTP status the route layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            DatabaseError::NotFound { .. } => 404,
            DatabaseError::Validation(_) => 400,
            _ => 500,
        }
    }

    pub fn not_found(table: &str, key: &str, id: &CellValue) -> Self {
        DatabaseError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
            id: id.to_string(),
        }
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for DatabaseError {
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::TimedOut => {
                DatabaseError::PoolError("timed out waiting for a connection".to_string())
            }
            bb8::RunError::User(e) => DatabaseError::PoolError(e.to_string()),
        }
    }
}

/// Attaches the failing operation and table to driver errors
pub trait QueryContext<T> {
    fn query_context(self, operation: &'static str, table: &str) -> Result<T, DatabaseError>;
}

impl<T, E: std::fmt::Display> QueryContext<T> for Result<T, E> {
    fn query_context(self, operation: &'static str, table: &str) -> Result<T, DatabaseError> {
        self.map_err(|e| DatabaseError::QueryError {
            operation,
            table: table.to_string(),
            message: e.to_string(),
        })
    }
}

/// Column information from schema introspection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Native type as reported by the database catalog
    pub data_type: String,
    #[serde(rename = "type")]
    pub column_type: CanonicalType,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool, is_primary_key: bool) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            column_type: map_column_type(&data_type),
            data_type,
            is_nullable,
            is_primary_key,
        }
    }
}

/// Cell value in a result set or mutation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(String),
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert textual input into the typed value a column of `target` expects.
    /// Values that do not parse are left untouched for the database to judge.
    /// Only integers that fit `i64` become `Int`; decimal text stays textual so
    /// exact NUMERIC values are never routed through `f64`.
    pub fn coerce_to(self, target: CanonicalType) -> CellValue {
        let CellValue::String(text) = self else {
            return self;
        };
        let trimmed = text.trim();
        match target {
            CanonicalType::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "1" | "t" | "yes" => CellValue::Bool(true),
                "false" | "0" | "f" | "no" => CellValue::Bool(false),
                _ => CellValue::String(text),
            },
            CanonicalType::Number => match trimmed.parse::<i64>() {
                Ok(v) => CellValue::Int(v),
                Err(_) => CellValue::String(text),
            },
            _ => CellValue::String(text),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::String(v) | CellValue::DateTime(v) => f.write_str(v),
            CellValue::Json(v) => write!(f, "{}", v),
            CellValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::String(v)
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => n.as_f64().map(CellValue::Float).unwrap_or(CellValue::Null),
            },
            serde_json::Value::String(s) => CellValue::String(s),
            other => CellValue::Json(other),
        }
    }
}

/// A row keyed by column name, in result column order
pub type Record = IndexMap<String, CellValue>;

/// One page of rows plus the filtered row count
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordSet {
    pub data: Vec<Record>,
    pub total: u64,
}

/// Database adapter trait - every dialect implements this against its native driver.
///
/// Listing, lookup, update and delete are written once on top of the statement
/// primitives (`fetch_rows`, `execute_statement`) and the dialect's SQL builder.
/// Insert is dialect-specific because each backend reports generated keys differently.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    // --- Metadata ---
    /// Get the database type this adapter talks to
    fn database_type(&self) -> DatabaseType;

    /// Get the display name for this adapter
    fn driver_name(&self) -> &'static str {
        self.database_type().display_name()
    }

    // --- Connection Management ---
    /// Open the connection pool; fails with `ConnectionFailed` on auth/network errors
    async fn connect(&self) -> Result<(), DatabaseError>;

    /// Release the connection pool. Calling it again is a no-op.
    async fn disconnect(&self) -> Result<(), DatabaseError>;

    async fn is_connected(&self) -> bool;

    // --- Statement primitives ---
    /// Run a statement and collect its rows
    async fn fetch_rows(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<Vec<Record>, DatabaseError>;

    /// Run a statement and report the number of affected rows
    async fn execute_statement(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<u64, DatabaseError>;

    // --- Schema Metadata ---
    /// Base tables of the default schema, alphabetically
    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError>;

    /// Columns of a table in physical order; empty when the table does not exist
    async fn get_table_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>, DatabaseError>;

    // --- Query Execution ---
    /// Execute a raw statement written with the dialect's native placeholders
    async fn query(&self, sql: &str, params: &[CellValue]) -> Result<Vec<Record>, DatabaseError> {
        let statement = Statement::new(sql, params.to_vec());
        self.fetch_rows("query", "<raw sql>", &statement).await
    }

    // --- Records ---
    /// Filtered, sorted page of rows plus the filtered total
    async fn get_records(
        &self,
        table_name: &str,
        options: &QueryOptions,
    ) -> Result<RecordSet, DatabaseError> {
        let columns = self.get_table_columns(table_name).await?;
        let plan = plan_listing(table_name, &columns, options)?;
        let dialect = self.database_type().dialect();

        let count = dialect.count(table_name, &plan.filters);
        let count_rows = self.fetch_rows("count records", table_name, &count).await?;
        let total = count_rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(CellValue::as_i64)
            .unwrap_or(0)
            .max(0) as u64;

        let select = dialect.select_page(table_name, &plan);
        let data = self.fetch_rows("list records", table_name, &select).await?;

        Ok(RecordSet { data, total })
    }

    /// Insert a row and return it as stored
    async fn create_record(&self, table_name: &str, data: &Record) -> Result<Record, DatabaseError>;

    /// Update the row with primary key `id` and return it as stored
    async fn update_record(
        &self,
        table_name: &str,
        id: &CellValue,
        data: &Record,
    ) -> Result<Record, DatabaseError> {
        if data.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "no values supplied to update in {}",
                table_name
            )));
        }
        let columns = self.get_table_columns(table_name).await?;
        require_columns(table_name, &columns)?;
        let data = coerce_record(table_name, &columns, data)?;
        let key = primary_key_column(&columns);
        let dialect = self.database_type().dialect();

        let update = dialect.update(table_name, &key, id, &data);
        let matched = self.execute_statement("update record", table_name, &update).await?;
        if matched == 0 {
            return Err(DatabaseError::not_found(table_name, &key, id));
        }

        // The key itself may have been changed by this update
        let current_id = data.get(&key).filter(|v| !v.is_null()).unwrap_or(id);
        let select = dialect.select_by_key(table_name, &key, current_id);
        self.fetch_rows("update record", table_name, &select)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::not_found(table_name, &key, current_id))
    }

    /// Delete the row with primary key `id`
    async fn delete_record(&self, table_name: &str, id: &CellValue) -> Result<(), DatabaseError> {
        let columns = self.get_table_columns(table_name).await?;
        require_columns(table_name, &columns)?;
        let key = primary_key_column(&columns);

        let delete = self.database_type().dialect().delete(table_name, &key, id);
        let affected = self.execute_statement("delete record", table_name, &delete).await?;
        if affected == 0 {
            return Err(DatabaseError::not_found(table_name, &key, id));
        }
        Ok(())
    }

    /// Fetch the row with primary key `id`
    async fn get_record_by_id(&self, table_name: &str, id: &CellValue) -> Result<Record, DatabaseError> {
        let columns = self.get_table_columns(table_name).await?;
        require_columns(table_name, &columns)?;
        let key = primary_key_column(&columns);

        let select = self.database_type().dialect().select_by_key(table_name, &key, id);
        self.fetch_rows("get record", table_name, &select)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::not_found(table_name, &key, id))
    }
}

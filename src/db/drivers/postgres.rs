// PostgreSQL Adapter
// Implements DatabaseAdapter for PostgreSQL using tokio-postgres behind a bb8 pool

use crate::db::connection::AdapterConfig;
use crate::db::dialect::Statement;
use crate::db::query::{coerce_record, require_columns};
use crate::db::traits::{
    CellValue, ColumnInfo, DatabaseAdapter, DatabaseError, DatabaseType, QueryContext, Record,
};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::net::IpAddr;
use std::str::FromStr;
use tokio::sync::RwLock;
use tokio_postgres::{NoTls, Row};

pub type PostgresPool = Pool<PostgresConnectionManager<NoTls>>;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

// NUMERIC wire format sign words
const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

// inet/cidr address families as sent by the server
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

const LIST_TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT
        c.column_name::text,
        c.data_type::text,
        c.is_nullable = 'YES' AS is_nullable,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_primary_key
    FROM information_schema.columns c
    WHERE c.table_schema = 'public' AND c.table_name = $1::text
    ORDER BY c.ordinal_position
"#;

/// PostgreSQL adapter
pub struct PostgresAdapter {
    config: AdapterConfig,
    pool: RwLock<Option<PostgresPool>>,
}

impl PostgresAdapter {
    /// Create an adapter for a `postgres://` connection string (not connected yet)
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Postgresql, connection_string),
            pool: RwLock::new(None),
        }
    }

    pub fn from_config(config: AdapterConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        Ok(Self {
            config,
            pool: RwLock::new(None),
        })
    }

    /// Wrap a pool owned by the caller; the adapter starts out connected
    pub fn with_pool(pool: PostgresPool) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Postgresql, String::new()),
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Build a pool from configuration without attaching it to an adapter
    pub async fn build_pool(config: &AdapterConfig) -> Result<PostgresPool, DatabaseError> {
        let manager = PostgresConnectionManager::new_from_stringlike(&config.connection_string, NoTls)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool.max_size)
            .min_idle(config.pool.min_idle)
            .connection_timeout(config.pool.connection_timeout())
            .build(manager)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        // Surface bad credentials now instead of on the first query
        pool.get()
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(pool)
    }

    async fn pool(&self) -> Result<PostgresPool, DatabaseError> {
        self.pool.read().await.clone().ok_or(DatabaseError::NotConnected)
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgresql
    }

    async fn connect(&self) -> Result<(), DatabaseError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let pool = Self::build_pool(&self.config).await?;
        log::info!("[Postgres] Connected to {}", self.config.redacted());
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DatabaseError> {
        if self.pool.write().await.take().is_some() {
            log::info!("[Postgres] Disconnected");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    async fn fetch_rows(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<Vec<Record>, DatabaseError> {
        let pool = self.pool().await?;
        let conn = pool.get().await?;
        let params = param_refs(&statement.params);

        log::debug!("[Postgres] {}: {}", operation, statement.sql);
        let rows = conn
            .query(statement.sql.as_str(), &params)
            .await
            .query_context(operation, table)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn execute_statement(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<u64, DatabaseError> {
        let pool = self.pool().await?;
        let conn = pool.get().await?;
        let params = param_refs(&statement.params);

        log::debug!("[Postgres] {}: {}", operation, statement.sql);
        conn.execute(statement.sql.as_str(), &params)
            .await
            .query_context(operation, table)
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let pool = self.pool().await?;
        let conn = pool.get().await?;

        let rows = conn
            .query(LIST_TABLES_SQL, &[])
            .await
            .query_context("list tables", "information_schema.tables")?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()
            .query_context("list tables", "information_schema.tables")
    }

    async fn get_table_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let pool = self.pool().await?;
        let conn = pool.get().await?;

        let rows = conn
            .query(TABLE_COLUMNS_SQL, &[&table_name])
            .await
            .query_context("describe table", table_name)?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, tokio_postgres::Error> {
                Ok(ColumnInfo::new(
                    row.try_get::<_, String>(0)?,
                    row.try_get::<_, String>(1)?,
                    row.try_get::<_, bool>(2)?,
                    row.try_get::<_, bool>(3)?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()
            .query_context("describe table", table_name)
    }

    async fn create_record(&self, table_name: &str, data: &Record) -> Result<Record, DatabaseError> {
        if data.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "no values supplied to insert into {}",
                table_name
            )));
        }
        let columns = self.get_table_columns(table_name).await?;
        require_columns(table_name, &columns)?;
        let data = coerce_record(table_name, &columns, data)?;

        // INSERT ... RETURNING * hands back the stored row in one round trip
        let insert = self.database_type().dialect().insert(table_name, &data);
        self.fetch_rows("create record", table_name, &insert)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::QueryError {
                operation: "create record",
                table: table_name.to_string(),
                message: "INSERT ... RETURNING produced no row".to_string(),
            })
    }
}

fn param_refs(params: &[CellValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn record_from_row(row: &Row) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            (
                column.name().to_string(),
                cell_value_from_row(row, idx, column.type_()),
            )
        })
        .collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value,
        Err(e) => {
            let name = row.columns().get(idx).map(|c| c.name()).unwrap_or("?");
            log::warn!("[Postgres] Could not decode column {}: {}", name, e);
            None
        }
    }
}

/// Extract cell value from row
fn cell_value_from_row(row: &Row, idx: usize, ty: &Type) -> CellValue {
    if let Kind::Array(member) = ty.kind() {
        return array_value(row, idx, member).unwrap_or(CellValue::Null);
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx).map(CellValue::Bool),
        Type::INT2 => get::<i16>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::INT4 => get::<i32>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::INT8 => get::<i64>(row, idx).map(CellValue::Int),
        Type::OID => get::<u32>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| CellValue::Float(v as f64)),
        Type::FLOAT8 => get::<f64>(row, idx).map(CellValue::Float),
        Type::NUMERIC => get::<NumericText>(row, idx).map(|n| numeric_value(n.0)),
        Type::MONEY => get::<Money>(row, idx).map(|m| CellValue::Float(m.0 as f64 / 100.0)),
        Type::INTERVAL => get::<Interval>(row, idx).map(|i| CellValue::String(i.to_string())),
        Type::INET | Type::CIDR => get::<Inet>(row, idx).map(|i| CellValue::String(i.0)),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx).map(CellValue::Json),
        Type::DATE => get::<NaiveDate>(row, idx).map(|d| CellValue::DateTime(d.to_string())),
        Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, idx).map(|dt| CellValue::DateTime(dt.to_string()))
        }
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx).map(|dt| CellValue::DateTime(dt.to_rfc3339()))
        }
        Type::TIME => get::<NaiveTime>(row, idx).map(|t| CellValue::String(t.to_string())),
        Type::UUID => get::<uuid::Uuid>(row, idx).map(|u| CellValue::String(u.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx).map(CellValue::Binary),
        _ => get::<TextValue>(row, idx).map(|t| CellValue::String(t.0)),
    };
    value.unwrap_or(CellValue::Null)
}

/// One-dimensional arrays become JSON arrays; NULL elements stay `null`
fn array_value(row: &Row, idx: usize, member: &Type) -> Option<CellValue> {
    let items = match *member {
        Type::BOOL => json_items(get::<Vec<Option<bool>>>(row, idx)?),
        Type::INT2 => json_items(get::<Vec<Option<i16>>>(row, idx)?),
        Type::INT4 => json_items(get::<Vec<Option<i32>>>(row, idx)?),
        Type::INT8 => json_items(get::<Vec<Option<i64>>>(row, idx)?),
        Type::FLOAT4 => json_items(get::<Vec<Option<f32>>>(row, idx)?),
        Type::FLOAT8 => json_items(get::<Vec<Option<f64>>>(row, idx)?),
        Type::JSON | Type::JSONB => json_items(get::<Vec<Option<serde_json::Value>>>(row, idx)?),
        Type::NUMERIC => get::<Vec<Option<NumericText>>>(row, idx)?
            .into_iter()
            .map(|item| match item.map(|n| numeric_value(n.0)) {
                Some(CellValue::Float(v)) => serde_json::Value::from(v),
                Some(CellValue::String(v)) => serde_json::Value::String(v),
                _ => serde_json::Value::Null,
            })
            .collect(),
        _ => json_items(
            get::<Vec<Option<TextValue>>>(row, idx)?
                .into_iter()
                .map(|item| item.map(|t| t.0))
                .collect(),
        ),
    };
    Some(CellValue::Json(serde_json::Value::Array(items)))
}

fn json_items<T: Into<serde_json::Value>>(items: Vec<Option<T>>) -> Vec<serde_json::Value> {
    items
        .into_iter()
        .map(|item| item.map_or(serde_json::Value::Null, Into::into))
        .collect()
}

/// NUMERIC within rust_decimal's range is a `Float`; anything wider keeps its exact text
fn numeric_value(text: String) -> CellValue {
    match Decimal::from_str(&text).ok().and_then(|d| d.to_f64()) {
        Some(v) => CellValue::Float(v),
        None => CellValue::String(text),
    }
}

/// Text-like values, including enum labels which arrive as plain UTF-8
struct TextValue(String);

impl<'a> FromSql<'a> for TextValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(TextValue(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
            || *ty == Type::XML
            || <String as FromSql>::accepts(ty)
    }
}

/// NUMERIC rendered as its exact decimal text
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() < 8 {
            return Err("truncated numeric value".into());
        }
        let ndigits = raw.get_i16();
        let weight = raw.get_i16() as i32;
        let sign = raw.get_u16();
        let dscale = raw.get_u16() as usize;
        if ndigits < 0 || raw.len() != ndigits as usize * 2 {
            return Err("malformed numeric value".into());
        }
        let digits: Vec<i16> = (0..ndigits).map(|_| raw.get_i16()).collect();

        match sign {
            NUMERIC_NAN => return Ok(NumericText("NaN".to_string())),
            NUMERIC_PINF => return Ok(NumericText("Infinity".to_string())),
            NUMERIC_NINF => return Ok(NumericText("-Infinity".to_string())),
            _ => {}
        }

        // digits[i] is the base-10000 group at position weight - i
        let digit = |idx: i32| -> i16 {
            usize::try_from(idx)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut text = String::new();
        if sign == NUMERIC_NEG {
            text.push('-');
        }
        if weight < 0 {
            text.push('0');
        } else {
            text.push_str(&digit(0).to_string());
            for idx in 1..=weight {
                text.push_str(&format!("{:04}", digit(idx)));
            }
        }
        if dscale > 0 {
            let mut fraction = String::new();
            for group in 0..(dscale as i32 + 3) / 4 {
                fraction.push_str(&format!("{:04}", digit(weight + 1 + group)));
            }
            fraction.truncate(dscale);
            text.push('.');
            text.push_str(&fraction);
        }
        Ok(NumericText(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// MONEY as integer cents
struct Money(i64);

impl<'a> FromSql<'a> for Money {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let cents: [u8; 8] = raw.try_into().map_err(|_| "malformed money value")?;
        Ok(Money(i64::from_be_bytes(cents)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

struct Interval {
    micros: i64,
    days: i32,
    months: i32,
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() != 16 {
            return Err("malformed interval value".into());
        }
        Ok(Interval {
            micros: raw.get_i64(),
            days: raw.get_i32(),
            months: raw.get_i32(),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// Rendered the way the server prints intervals by default, e.g. `1 year 2 mons 3 days 04:05:06`
impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        let units = [
            (self.months as i64 / 12, "year"),
            (self.months as i64 % 12, "mon"),
            (self.days as i64, "day"),
        ];
        for (n, unit) in units {
            if n != 0 {
                parts.push(format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" }));
            }
        }
        if self.micros != 0 || parts.is_empty() {
            let sign = if self.micros < 0 { "-" } else { "" };
            let total = self.micros.unsigned_abs();
            let secs = total / 1_000_000;
            let mut time = format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            let fraction = total % 1_000_000;
            if fraction != 0 {
                time.push_str(format!(".{:06}", fraction).trim_end_matches('0'));
            }
            parts.push(time);
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// inet/cidr as `addr` or `addr/bits`
struct Inet(String);

impl<'a> FromSql<'a> for Inet {
    fn from_sql(ty: &Type, mut raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() < 4 {
            return Err("truncated inet value".into());
        }
        let family = raw.get_u8();
        let bits = raw.get_u8();
        let _is_cidr = raw.get_u8();
        let len = raw.get_u8() as usize;
        if raw.len() != len {
            return Err("malformed inet value".into());
        }
        let addr = match family {
            PGSQL_AF_INET => IpAddr::from(<[u8; 4]>::try_from(raw)?),
            PGSQL_AF_INET6 => IpAddr::from(<[u8; 16]>::try_from(raw)?),
            other => return Err(format!("unknown inet family {}", other).into()),
        };
        let full = (len * 8) as u8;
        if *ty == Type::CIDR || bits != full {
            Ok(Inet(format!("{}/{}", addr, bits)))
        } else {
            Ok(Inet(addr.to_string()))
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::INET | Type::CIDR)
    }
}

/// Parameters are encoded for whatever type the server inferred for the
/// placeholder, so `"30"` can be bound to an `int4` column and `30` to `text`.
impl ToSql for CellValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 | Type::NUMERIC => {
                    encode_int(*v as i64, ty, out)
                }
                _ => encode_text(&v.to_string(), ty, out),
            },
            CellValue::Int(v) => encode_int(*v, ty, out),
            CellValue::Float(v) => encode_float(*v, ty, out),
            CellValue::String(v) | CellValue::DateTime(v) => encode_text(v, ty, out),
            CellValue::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                _ => encode_text(&v.to_string(), ty, out),
            },
            CellValue::Binary(v) => v.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => encode_numeric(&v.to_string(), out),
        Type::MONEY => encode_money(Decimal::from(v), out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        _ => encode_text(&v.to_string(), ty, out),
    }
}

fn encode_float(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        // Display gives the shortest text that round-trips, so 19.99 stays 19.99
        Type::NUMERIC => encode_numeric(&v.to_string(), out),
        Type::MONEY => encode_money(Decimal::from_str(&v.to_string())?, out),
        Type::INT2 | Type::INT4 | Type::INT8 if v.fract() == 0.0 => encode_int(v as i64, ty, out),
        _ => encode_text(&v.to_string(), ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let trimmed = s.trim();
    match *ty {
        Type::BOOL => parse_bool(trimmed)?.to_sql(ty, out),
        Type::INT2 => trimmed.parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => trimmed.parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => trimmed.parse::<i64>()?.to_sql(ty, out),
        Type::OID => trimmed.parse::<u32>()?.to_sql(ty, out),
        Type::FLOAT4 => trimmed.parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => trimmed.parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => encode_numeric(trimmed, out),
        Type::MONEY => encode_money(Decimal::from_str(trimmed.trim_start_matches('$'))?, out),
        Type::INET | Type::CIDR => encode_inet(trimmed, ty, out),
        Type::DATE => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIMESTAMP => parse_naive_datetime(trimmed)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_datetime_utc(trimmed)?.to_sql(ty, out),
        Type::TIME => NaiveTime::from_str(trimmed)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(trimmed)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.to_string()))
            .to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

/// Write decimal text in NUMERIC wire format without going through a binary float
fn encode_numeric(s: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if s.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_u16(0);
        return Ok(IsNull::No);
    }

    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit());
    if !all_digits || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(format!("invalid numeric literal '{}'", s).into());
    }
    let dscale = u16::try_from(frac_part.len())?;
    let int_part = int_part.trim_start_matches('0');

    // Pad both halves out to whole base-10000 groups around the decimal point
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let padded = "0".repeat(int_pad) + int_part + frac_part + &"0".repeat(frac_pad);
    let mut groups: Vec<i16> = padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0i16, |acc, b| acc * 10 + (b - b'0') as i16))
        .collect();
    let mut weight = ((int_pad + int_part.len()) / 4) as i32 - 1;

    let leading = groups.iter().take_while(|&&g| g == 0).count();
    groups.drain(..leading);
    weight -= leading as i32;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }
    let sign = if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS };

    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(i16::try_from(weight)?);
    out.put_u16(sign);
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}

fn encode_money(amount: Decimal, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let cents = (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or("money value out of range")?;
    out.put_i64(cents);
    Ok(IsNull::No)
}

fn encode_inet(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let (addr, bits) = match s.split_once('/') {
        Some((addr, bits)) => (addr, Some(bits.parse::<u8>()?)),
        None => (s, None),
    };
    let (family, octets) = match addr.parse::<IpAddr>()? {
        IpAddr::V4(a) => (PGSQL_AF_INET, a.octets().to_vec()),
        IpAddr::V6(a) => (PGSQL_AF_INET6, a.octets().to_vec()),
    };
    let full = (octets.len() * 8) as u8;
    let bits = bits.unwrap_or(full);
    if bits > full {
        return Err(format!("invalid network mask in '{}'", s).into());
    }
    out.put_u8(family);
    out.put_u8(bits);
    out.put_u8((*ty == Type::CIDR) as u8);
    out.put_u8(octets.len() as u8);
    out.put_slice(&octets);
    Ok(IsNull::No)
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Ok(true),
        "false" | "f" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid boolean literal '{}'", s).into()),
    }
}

fn parse_naive_datetime(s: &str) -> Result<NaiveDateTime, BoxError> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid timestamp '{}'", s).into())
}

fn parse_datetime_utc(s: &str) -> Result<DateTime<Utc>, BoxError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => Ok(parse_naive_datetime(s)?.and_utc()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &CellValue, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut out = BytesMut::new();
        value.to_sql(ty, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn test_driver_type() {
        let adapter = PostgresAdapter::new("postgres://localhost/app");
        assert_eq!(adapter.database_type(), DatabaseType::Postgresql);
        assert_eq!(adapter.driver_name(), "PostgreSQL");
    }

    #[test]
    fn test_from_config_validates() {
        let config = AdapterConfig::new(DatabaseType::Postgresql, "");
        assert!(PostgresAdapter::from_config(config).is_err());
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let adapter = PostgresAdapter::new("postgres://localhost/app");
        assert!(!adapter.is_connected().await);
        assert!(matches!(adapter.list_tables().await, Err(DatabaseError::NotConnected)));
        assert!(matches!(
            adapter.get_table_columns("users").await,
            Err(DatabaseError::NotConnected)
        ));
        assert!(matches!(adapter.query("SELECT 1", &[]).await, Err(DatabaseError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let adapter = PostgresAdapter::new("postgres://localhost/app");
        assert!(adapter.disconnect().await.is_ok());
        assert!(adapter.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_record_rejects_empty_payload() {
        let adapter = PostgresAdapter::new("postgres://localhost/app");
        let err = adapter.create_record("users", &Record::new()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[test]
    fn test_int_encoding_follows_target_type() {
        assert_eq!(encode(&CellValue::Int(30), &Type::INT4).unwrap(), 30i32.to_be_bytes());
        assert_eq!(encode(&CellValue::Int(30), &Type::INT8).unwrap(), 30i64.to_be_bytes());
        assert_eq!(encode(&CellValue::Int(30), &Type::TEXT).unwrap(), b"30");
        assert!(encode(&CellValue::Int(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn test_text_encoding_parses_for_typed_columns() {
        assert_eq!(encode(&CellValue::from("30"), &Type::INT4).unwrap(), 30i32.to_be_bytes());
        assert_eq!(encode(&CellValue::from("true"), &Type::BOOL).unwrap(), vec![1u8]);
        assert_eq!(encode(&CellValue::from("Ann"), &Type::VARCHAR).unwrap(), b"Ann");
        assert!(encode(&CellValue::from("abc"), &Type::INT4).is_err());
    }

    #[test]
    fn test_null_encoding() {
        let mut out = BytesMut::new();
        let is_null = CellValue::Null.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_float_encoding() {
        assert_eq!(encode(&CellValue::Float(1.5), &Type::FLOAT8).unwrap(), 1.5f64.to_be_bytes());
        assert_eq!(encode(&CellValue::Float(2.0), &Type::INT4).unwrap(), 2i32.to_be_bytes());
    }

    #[test]
    fn test_numeric_encoding_is_exact() {
        // 19.99 = 19 * 10000^0 + 9900 * 10000^-1
        let expected = vec![0, 2, 0, 0, 0, 0, 0, 2, 0, 19, 0x26, 0xAC];
        assert_eq!(encode(&CellValue::from("19.99"), &Type::NUMERIC).unwrap(), expected);
        assert_eq!(encode(&CellValue::Float(19.99), &Type::NUMERIC).unwrap(), expected);

        assert_eq!(
            encode(&CellValue::Int(-10_000), &Type::NUMERIC).unwrap(),
            vec![0, 1, 0, 1, 0x40, 0, 0, 0, 0, 1]
        );
        assert_eq!(
            encode(&CellValue::from("0.00001"), &Type::NUMERIC).unwrap(),
            vec![0, 1, 0xFF, 0xFE, 0, 0, 0, 5, 0x03, 0xE8]
        );
        assert!(encode(&CellValue::from("98765432109876543210987654321"), &Type::NUMERIC).is_ok());
        assert!(encode(&CellValue::from("12abc"), &Type::NUMERIC).is_err());
        assert!(encode(&CellValue::Float(f64::INFINITY), &Type::NUMERIC).is_err());
    }

    #[test]
    fn test_numeric_decoding() {
        let raw = [0, 2, 0, 0, 0, 0, 0, 2, 0, 19, 0x26, 0xAC];
        assert_eq!(NumericText::from_sql(&Type::NUMERIC, &raw).unwrap().0, "19.99");

        let wide = "123456789012345678901234567890.5";
        let bytes = encode(&CellValue::from(wide), &Type::NUMERIC).unwrap();
        let text = NumericText::from_sql(&Type::NUMERIC, &bytes).unwrap().0;
        assert_eq!(text, wide);
        // Too wide for rust_decimal, so it stays text instead of turning into NULL
        assert_eq!(numeric_value(text), CellValue::from(wide));
        assert_eq!(numeric_value("12.50".to_string()), CellValue::Float(12.5));

        let bytes = encode(&CellValue::from("-0.05"), &Type::NUMERIC).unwrap();
        assert_eq!(NumericText::from_sql(&Type::NUMERIC, &bytes).unwrap().0, "-0.05");

        let nan = [0, 0, 0, 0, 0xC0, 0, 0, 0];
        assert_eq!(NumericText::from_sql(&Type::NUMERIC, &nan).unwrap().0, "NaN");
        assert!(NumericText::from_sql(&Type::NUMERIC, &[0, 1]).is_err());
    }

    #[test]
    fn test_money_round_trip_in_cents() {
        let bytes = encode(&CellValue::from("12.50"), &Type::MONEY).unwrap();
        assert_eq!(bytes, 1250i64.to_be_bytes());
        assert_eq!(Money::from_sql(&Type::MONEY, &bytes).unwrap().0, 1250);
        assert_eq!(encode(&CellValue::Int(3), &Type::MONEY).unwrap(), 300i64.to_be_bytes());
    }

    #[test]
    fn test_interval_display() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&14_706_000_000i64.to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        let interval = Interval::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(interval.to_string(), "1 year 2 mons 3 days 04:05:06");

        let one_day = Interval { micros: 0, days: 1, months: 0 };
        assert_eq!(one_day.to_string(), "1 day");
        let zero = Interval { micros: 0, days: 0, months: 0 };
        assert_eq!(zero.to_string(), "00:00:00");
        let negative = Interval { micros: -1_500_000, days: 0, months: 0 };
        assert_eq!(negative.to_string(), "-00:00:01.5");
    }

    #[test]
    fn test_inet_decoding() {
        let host = [PGSQL_AF_INET, 32, 0, 4, 10, 0, 0, 1];
        assert_eq!(Inet::from_sql(&Type::INET, &host).unwrap().0, "10.0.0.1");

        let network = [PGSQL_AF_INET, 24, 1, 4, 192, 168, 1, 0];
        assert_eq!(Inet::from_sql(&Type::CIDR, &network).unwrap().0, "192.168.1.0/24");

        let bytes = encode(&CellValue::from("::1"), &Type::INET).unwrap();
        assert_eq!(Inet::from_sql(&Type::INET, &bytes).unwrap().0, "::1");
        assert!(encode(&CellValue::from("10.0.0.1/40"), &Type::INET).is_err());
    }

    #[test]
    fn test_text_value_accepts_xml_and_enums() {
        assert!(<TextValue as FromSql>::accepts(&Type::XML));
        assert!(<TextValue as FromSql>::accepts(&Type::TEXT));
        assert!(!<TextValue as FromSql>::accepts(&Type::INTERVAL));
    }

    #[test]
    fn test_parse_datetimes() {
        assert!(parse_naive_datetime("2024-03-01T10:20:30").is_ok());
        assert!(parse_naive_datetime("2024-03-01 10:20:30.123").is_ok());
        assert!(parse_naive_datetime("2024-03-01").is_ok());
        assert!(parse_naive_datetime("yesterday").is_err());
        let utc = parse_datetime_utc("2024-03-01T10:20:30+02:00").unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-03-01T08:20:30+00:00");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}

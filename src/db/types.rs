// Column Type Mapping
// Maps native column type names from every supported dialect onto a small canonical set

use serde::{Deserialize, Serialize};

/// Semantic column type shared by all dialects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    Json,
}

impl CanonicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::String => "string",
            CanonicalType::Number => "number",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Date => "date",
            CanonicalType::Datetime => "datetime",
            CanonicalType::Json => "json",
        }
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a native column type (e.g. `varchar(255)`, `timestamp with time zone`,
/// `tinyint(1)`) to its canonical type. Unknown types are treated as strings.
pub fn map_column_type(raw_type: &str) -> CanonicalType {
    let normalized = raw_type.trim().to_lowercase();

    // Width-sensitive synonyms must be checked before the suffix is stripped
    if let Some(canonical) = lookup(&normalized) {
        return canonical;
    }

    let stripped = strip_modifiers(&normalized);
    lookup(&stripped).unwrap_or(CanonicalType::String)
}

fn lookup(name: &str) -> Option<CanonicalType> {
    let canonical = match name {
        "character varying" | "varchar" | "nvarchar" | "char" | "nchar" | "character"
        | "bpchar" | "text" | "ntext" | "tinytext" | "mediumtext" | "longtext" | "uuid"
        | "uniqueidentifier" | "citext" | "enum" | "set" | "xml" | "time"
        | "time without time zone" | "time with time zone" => CanonicalType::String,

        "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "bigserial" | "smallserial" | "real" | "float4"
        | "float8" | "double precision" | "double" | "numeric" | "decimal" | "float"
        | "money" | "smallmoney" => CanonicalType::Number,

        "boolean" | "bool" | "bit" | "bit(1)" | "tinyint(1)" => CanonicalType::Boolean,

        "date" => CanonicalType::Date,

        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => {
            CanonicalType::Datetime
        }

        // information_schema reports every Postgres array as `ARRAY`; values list as JSON arrays
        "json" | "jsonb" | "array" => CanonicalType::Json,

        _ => return None,
    };
    Some(canonical)
}

/// Remove `(...)` length/precision suffixes and MySQL display modifiers
fn strip_modifiers(name: &str) -> String {
    let mut without_parens = String::with_capacity(name.len());
    let mut depth = 0usize;
    for ch in name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => without_parens.push(ch),
            _ => {}
        }
    }

    without_parens
        .split_whitespace()
        .filter(|word| !matches!(*word, "unsigned" | "signed" | "zerofill"))
        .collect::<Vec<_>>()
        .join(" ")
}

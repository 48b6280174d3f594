//! Type catalog: bidirectional, lossy mapping between the two engines'
//! concrete column types through an engine-agnostic category.
//!
//! Translation is best-effort: a `decimal(18,2)` source column does not
//! round-trip to `decimal(18,2)`; it rounds to whatever the destination
//! engine's preferred concrete type for NUMERIC is.

use serde::{Deserialize, Serialize};

/// Engine-agnostic type bucket used to translate concrete column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    Text,
    Integer,
    Real,
    Numeric,
    Blob,
    Other,
}

impl TypeCategory {
    /// The SQL keyword for this category (also SQLite's concrete spelling).
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeCategory::Text => "TEXT",
            TypeCategory::Integer => "INTEGER",
            TypeCategory::Real => "REAL",
            TypeCategory::Numeric => "NUMERIC",
            TypeCategory::Blob => "BLOB",
            TypeCategory::Other => "OTHER",
        }
    }
}

/// The two engines the catalog knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    SqlServer,
    Sqlite,
}

/// SQL Server concrete types grouped by category. Lookup is a linear scan;
/// the first list containing the type wins.
const MSSQL_CATEGORIES: &[(TypeCategory, &[&str])] = &[
    (
        TypeCategory::Text,
        &["varchar", "nvarchar", "char", "nchar", "text", "ntext"],
    ),
    (
        TypeCategory::Integer,
        &["tinyint", "smallint", "int", "bigint", "bit"],
    ),
    (
        TypeCategory::Real,
        &[
            "date",
            "time",
            "datetime",
            "datetime2",
            "datetimeoffset",
            "smalldatetime",
            "float",
            "real",
        ],
    ),
    (
        TypeCategory::Numeric,
        &["decimal", "numeric", "money", "smallmoney"],
    ),
    (TypeCategory::Blob, &["binary", "varbinary", "image"]),
    (
        TypeCategory::Other,
        &[
            "cursor",
            "geography",
            "geometry",
            "hierarchyid",
            "json",
            "vector",
            "rowversion",
            "sql_variant",
            "table",
            "uniqueidentifier",
            "xml",
        ],
    ),
];

/// Preferred SQL Server concrete types per category. The first entry is the
/// canonical representation returned by [`concrete_for`].
const MSSQL_PREFERRED: &[(TypeCategory, &[&str])] = &[
    (TypeCategory::Text, &["nvarchar(max)"]),
    (TypeCategory::Integer, &["int"]),
    (TypeCategory::Real, &["datetime2(7)"]),
    (TypeCategory::Numeric, &["decimal(18,2)"]),
    (TypeCategory::Blob, &["varbinary(max)"]),
];

/// Look up the category of a concrete type as declared by the given engine.
///
/// Returns `None` for an unmapped type; callers surface that as
/// [`crate::error::MigrateError::UnmappedType`] with column context.
pub fn category_of(data_type: &str, engine: Engine) -> Option<TypeCategory> {
    let normalized = normalize(data_type);

    match engine {
        Engine::SqlServer => MSSQL_CATEGORIES
            .iter()
            .find(|(_, types)| types.contains(&normalized.as_str()))
            .map(|(category, _)| *category),
        Engine::Sqlite => match normalized.to_uppercase().as_str() {
            "TEXT" => Some(TypeCategory::Text),
            "INTEGER" => Some(TypeCategory::Integer),
            "REAL" => Some(TypeCategory::Real),
            "NUMERIC" => Some(TypeCategory::Numeric),
            "BLOB" => Some(TypeCategory::Blob),
            "OTHER" => Some(TypeCategory::Other),
            _ => None,
        },
    }
}

/// The canonical concrete type for a category in the target engine.
///
/// Deterministically the first type registered for that category. `None`
/// means the target engine has no registered representation (SQL Server has
/// none for OTHER).
pub fn concrete_for(category: TypeCategory, engine: Engine) -> Option<&'static str> {
    match engine {
        Engine::Sqlite => Some(category.keyword()),
        Engine::SqlServer => MSSQL_PREFERRED
            .iter()
            .find(|(c, _)| *c == category)
            .and_then(|(_, types)| types.first().copied()),
    }
}

/// Whether an SQL Server type stores calendar timestamps. Drives the
/// column-type-directed decode during embedded-to-server transfer.
pub fn is_datetime_type(data_type: &str) -> bool {
    matches!(
        normalize(data_type).as_str(),
        "date" | "time" | "datetime" | "datetime2" | "datetimeoffset" | "smalldatetime"
    )
}

/// Whether an SQL Server type stores arbitrary-precision decimals.
pub fn is_decimal_type(data_type: &str) -> bool {
    matches!(
        normalize(data_type).as_str(),
        "decimal" | "numeric" | "money" | "smallmoney"
    )
}

/// Lowercase and strip a parenthesized length/precision suffix, so that
/// `nvarchar(max)` and `datetime2(7)` resolve like their base types.
fn normalize(data_type: &str) -> String {
    let lower = data_type.trim().to_lowercase();
    match lower.find('(') {
        Some(idx) => lower[..idx].trim_end().to_string(),
        None => lower,
    }
}

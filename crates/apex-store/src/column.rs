// column.rs — Column helpers for row mapping.
//
// Identifiers are stored as hyphenated UUID text and payloads as JSON text,
// so the database stays readable with the sqlite3 shell. These helpers
// parse them back inside `query_row`/`query_map` closures, reporting bad
// text as a conversion failure on the offending column.

use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use crate::error::StoreError;

/// Encode a JSON value for a TEXT column.
pub fn to_json(value: &serde_json::Value) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Read a non-null JSON TEXT column.
pub fn json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable JSON TEXT column.
pub fn opt_json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a non-null UUID column.
pub fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    parse(idx, &raw)
}

/// Read a nullable UUID column.
pub fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse(idx, &raw)).transpose()
}

fn parse(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

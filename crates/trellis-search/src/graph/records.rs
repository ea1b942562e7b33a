//! Normalization of raw store values into the canonical shapes.
//!
//! Both dialects project scalar columns only, so normalization reduces to
//! parsing strings: identifiers, RFC 3339 instants (with or without an
//! offset, since the Redis-family store strips timezones), and JSON
//! attribute blobs. Missing optionals become `None`; malformed records
//! surface as [`GraphError::MalformedRecord`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use super::error::{GraphError, GraphResult};

/// Parses an identifier column.
pub fn parse_uuid(raw: &str) -> GraphResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| GraphError::MalformedRecord {
        message: format!("bad uuid '{raw}': {e}"),
    })
}

/// Parses a required instant column.
pub fn parse_datetime(raw: &str) -> GraphResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // Offset-less form written by the Redis-family store.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(GraphError::MalformedRecord {
        message: format!("bad datetime '{raw}'"),
    })
}

/// Parses an optional instant column; empty strings are `None`.
pub fn parse_optional_datetime(raw: Option<&str>) -> GraphResult<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_datetime(s).map(Some),
    }
}

/// Parses a JSON attribute blob into the scalar map; non-objects become
/// an empty map rather than an error, matching how ingestion writes them.
pub fn parse_attributes(raw: Option<&str>) -> BTreeMap<String, serde_json::Value> {
    let Some(raw) = raw else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

/// Parses a list of identifier strings, skipping empties.
pub fn parse_uuid_list(raw: &[String]) -> GraphResult<Vec<Uuid>> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_uuid(s))
        .collect()
}

/// Renders an instant the way responses expect it: RFC 3339 UTC with a
/// trailing `Z`.
pub fn render_datetime(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

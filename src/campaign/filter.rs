use std::collections::HashMap;

use serde_json::Value;

use super::{ResultRow, HOST_COLUMN};

/// Keep the rows matching every non-empty column filter.
///
/// Matching is a case-insensitive substring test on the cell's text. The
/// filter key `hostname` also matches the `host_hostname` column. A filter on
/// a column the row lacks never matches.
pub fn filter_rows<'a>(
    rows: &'a [ResultRow],
    filters: &HashMap<String, String>,
) -> Vec<&'a ResultRow> {
    let active: Vec<(&str, String)> = filters
        .iter()
        .filter(|(_, needle)| !needle.trim().is_empty())
        .map(|(column, needle)| (column_for(column), needle.to_lowercase()))
        .collect();

    rows.iter()
        .filter(|row| {
            active
                .iter()
                .all(|(column, needle)| matches(row.get(column), needle))
        })
        .collect()
}

fn column_for(key: &str) -> &str {
    if key == "hostname" {
        HOST_COLUMN
    } else {
        key
    }
}

fn matches(value: Option<&Value>, needle: &str) -> bool {
    let haystack = match value {
        None | Some(Value::Null) => return false,
        Some(Value::String(text)) => text.to_lowercase(),
        Some(other) => other.to_string().to_lowercase(),
    };
    haystack.contains(needle)
}

//! CSV export of a campaign's result rows.

use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use super::Campaign;
use crate::error::{ErrorContext, KestrelResult};

/// moment.js `MM-DD-YY hh-mm-ss`: 12-hour clock, no meridiem.
pub const EXPORT_TIMESTAMP_FORMAT: &str = "%m-%d-%y %I-%M-%S";

/// A rendered export ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub contents: String,
}

impl ExportedFile {
    pub const CONTENT_TYPE: &'static str = "text/csv";

    /// Write the file into `directory`, returning the full path.
    pub fn save_to(&self, directory: impl AsRef<Path>) -> KestrelResult<PathBuf> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory).with_export_context()?;

        let path = directory.join(&self.filename);
        std::fs::write(&path, self.contents.as_bytes()).with_export_context()?;

        info!(
            path = %path.display(),
            bytes = self.contents.len(),
            "Saved query results export"
        );
        Ok(path)
    }
}

/// Render `campaign` as CSV named `"{filename_base} ({timestamp}).csv"`.
///
/// The column set is fixed by the first row: `host_hostname` first, then the
/// first row's other columns in order. Columns that only appear in later rows
/// are not exported; cells missing from a row are left empty.
pub fn export(
    campaign: &Campaign,
    filename_base: &str,
    timestamp: NaiveDateTime,
) -> KestrelResult<ExportedFile> {
    let columns = campaign.columns();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for row in &campaign.query_results {
        writer.write_record(columns.iter().map(|column| cell(row.get(column))))?;
    }

    let bytes = writer.into_inner().with_export_context()?;
    let contents = String::from_utf8(bytes).with_export_context()?;

    Ok(ExportedFile {
        filename: format!(
            "{} ({}).csv",
            filename_base,
            timestamp.format(EXPORT_TIMESTAMP_FORMAT)
        ),
        contents,
    })
}

/// [`export`] stamped with the local wall clock.
pub fn export_now(campaign: &Campaign, filename_base: &str) -> KestrelResult<ExportedFile> {
    export(campaign, filename_base, Local::now().naive_local())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

//! Inspect-cache command implementation.

use super::{print_record_table, CliError};
use rostersync_protocol::Record;
use rostersync_storage::FileCache;
use serde::Serialize;
use std::path::Path;

/// Cache inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Cache directory.
    pub path: String,
    /// Version of the last full snapshot, if any.
    pub global_version: Option<u64>,
    /// Number of records.
    pub record_count: usize,
    /// Records ordered by roll number.
    pub records: Vec<Record>,
}

/// Reads a cache directory without taking its lock.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(CliError::NoCache(path.to_path_buf()).into());
    }

    let snapshot = FileCache::read_snapshot(path)?;
    let records = snapshot.sorted_records();
    Ok(InspectResult {
        path: path.display().to_string(),
        global_version: snapshot.version.map(|v| v.get()),
        record_count: records.len(),
        records,
    })
}

/// Runs the inspect-cache command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Cache: {}", result.path);
    match result.global_version {
        Some(v) => println!("Snapshot version: v{v}"),
        None => println!("Snapshot version: none"),
    }
    println!("Records: {}", result.record_count);
    if !result.records.is_empty() {
        println!();
        print_record_table(&result.records);
    }
}

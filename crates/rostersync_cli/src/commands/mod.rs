//! CLI command implementations.

pub mod inspect_cache;
pub mod seed;
pub mod simulate;

use rostersync_protocol::{EditableField, Record};
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No cache snapshot at the given directory.
    #[error("no cache found at {}", .0.display())]
    NoCache(PathBuf),

    /// A simulation needs at least one client.
    #[error("simulate needs at least one client")]
    NoClients,

    /// The simulated record does not exist.
    #[error("record {0} is not in the roster")]
    UnknownRecord(String),
}

/// Parses a field name for clap.
pub fn parse_field(raw: &str) -> Result<EditableField, String> {
    raw.parse::<EditableField>().map_err(|e| e.message)
}

/// Prints records as an aligned table.
pub(crate) fn print_record_table(records: &[Record]) {
    println!(
        "{:<8} {:<6} {:<16} {:<4} {:<5} {:<3} {:>4}  {}",
        "ID", "ROLL", "NAME", "BG", "CLASS", "SEC", "ATT", "UPDATED"
    );
    for r in records {
        println!(
            "{:<8} {:<6} {:<16} {:<4} {:<5} {:<3} {:>3}%  {}",
            r.id, r.roll_number, r.name, r.blood_group, r.class, r.section, r.attendance, r.last_updated
        );
    }
}

//! Seed command implementation.

use super::print_record_table;
use rostersync_server::default_roster;

/// Runs the seed command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let roster = default_roster();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&roster)?),
        _ => {
            println!("Default roster ({} records, server starts at v1)", roster.len());
            println!();
            print_record_table(&roster);
        }
    }

    Ok(())
}

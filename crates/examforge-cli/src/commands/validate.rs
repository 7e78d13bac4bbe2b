//! The `examforge validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_core::ingest::{ingest_records, load_bank_dir, load_bank_file};
use examforge_core::model::ExamType;

pub fn execute(bank: PathBuf) -> Result<()> {
    let records = if bank.is_dir() {
        load_bank_dir(&bank)?
    } else {
        load_bank_file(&bank)?
    };
    let total = records.len();

    // The exam type does not affect validation; any default works here.
    let report = ingest_records(records, ExamType::JeeMain);

    println!("Bank: {} ({total} records)", bank.display());
    for w in &report.warnings {
        let prefix = w
            .record_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if report.warnings.is_empty() {
        println!("All {} records valid.", report.admitted());
    } else {
        println!(
            "\n{} admitted, {} rejected.",
            report.admitted(),
            report.rejected()
        );
    }

    Ok(())
}

//! The `examforge ingest` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::Table;

use crate::state::CliContext;

pub async fn execute(ctx: &CliContext, bank: PathBuf, exam: Option<String>) -> Result<()> {
    let exam_type = ctx.default_exam(exam)?;
    let load = ctx.build_repository(&bank, exam_type).await?;

    println!(
        "Indexed {} question(s) ({} rejected) from {}",
        load.admitted,
        load.warnings.len(),
        bank.display()
    );

    let stats = load.repository.stats(exam_type).await;
    let mut table = Table::new();
    table.set_header(vec!["Collection", "Questions", "Subjects", "Chapters", "Topics"]);
    table.add_row(vec![
        exam_type.to_string(),
        stats.total_questions.to_string(),
        stats.subjects.join(", "),
        stats.chapters.len().to_string(),
        stats.topics.len().to_string(),
    ]);
    println!("{table}");

    Ok(())
}

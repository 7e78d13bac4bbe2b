//! The `examforge generate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::selector::{AdaptiveSelector, SelectionRequest, SelectorConfig};

use crate::state::CliContext;

pub async fn execute(
    ctx: &CliContext,
    bank: PathBuf,
    user: String,
    questions: usize,
    subjects: String,
    exam: Option<String>,
    seed: Option<u64>,
) -> Result<()> {
    anyhow::ensure!(questions >= 1, "questions must be at least 1");
    let subjects: Vec<String> = subjects
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    anyhow::ensure!(!subjects.is_empty(), "at least one subject is required");

    let exam_type = ctx.default_exam(exam)?;
    let load = ctx.build_repository(&bank, exam_type).await?;
    let store = ctx.load_store()?;

    let selector = AdaptiveSelector::new(
        load.repository,
        SelectorConfig {
            rng_seed: seed,
            ..SelectorConfig::default()
        },
    );

    let request = SelectionRequest {
        user_id: user.clone(),
        exam_type,
        total_questions: questions,
        subjects,
    };

    let profile = store.profile(&user).await;
    let response = {
        let mut guard = profile.lock().await;
        selector.select(&mut guard, &request).await?
    };

    store.put_session(response.session.clone()).await;
    ctx.save_store(&store).await?;

    println!("Test {} for {user}", response.session.id);

    let mut table = Table::new();
    table.set_header(vec!["#", "Subject", "Topic", "Variant", "Reason"]);
    for (i, selected) in response.questions.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&selected.question.subject),
            Cell::new(&selected.question.topic),
            Cell::new(selected.question.variant.to_string()),
            Cell::new(selected.selection_reason.to_string()),
        ]);
    }
    println!("{table}");

    let g = &response.guarantee;
    println!(
        "No-repetition guarantee: {}/{} unique, {} previously seen, repetition_free={}",
        g.unique, g.total, g.previously_seen, g.repetition_free
    );

    Ok(())
}

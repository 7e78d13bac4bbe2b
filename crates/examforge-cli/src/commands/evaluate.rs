//! The `examforge evaluate` command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use uuid::Uuid;

use examforge_core::analysis::{analyze_or_fallback, fallback_analysis, PerformanceSummary};
use examforge_core::error::ExamError;
use examforge_core::evaluate::{evaluate_session, update_profile};
use examforge_core::model::Question;
use examforge_core::traits::QuestionSource;
use examforge_providers::create_analyzer;
use examforge_report::{render_markdown, TestReport};

use crate::state::CliContext;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    ctx: &CliContext,
    bank: PathBuf,
    user: String,
    test: Uuid,
    answers_path: PathBuf,
    report_path: Option<PathBuf>,
    analyze: bool,
    exam: Option<String>,
) -> Result<()> {
    let exam_type = ctx.default_exam(exam)?;
    let load = ctx.build_repository(&bank, exam_type).await?;
    let store = ctx.load_store()?;

    let answers_json = std::fs::read_to_string(&answers_path)
        .with_context(|| format!("failed to read answers from {}", answers_path.display()))?;
    let answers: HashMap<usize, String> =
        serde_json::from_str(&answers_json).context("failed to parse answers JSON")?;

    // The per-user lock serializes concurrent submissions for one learner.
    let profile = store.profile(&user).await;
    let mut guard = profile.lock().await;

    let mut session = store.begin_evaluation(test).await?;
    if session.user_id != user {
        return Err(ExamError::InvalidRequest(format!(
            "session {test} belongs to a different learner"
        ))
        .into());
    }

    let mut questions: Vec<Question> = Vec::with_capacity(session.entries.len());
    for entry in &session.entries {
        let question = load
            .repository
            .get(session.exam_type, &entry.question_id)
            .await
            .ok_or_else(|| ExamError::UnknownQuestion(entry.question_id.clone()))?;
        questions.push(question);
    }

    let result = evaluate_session(&mut session, &questions, &answers)?;
    update_profile(&mut guard, &result);
    drop(guard);

    store.finish_evaluation(session).await;
    ctx.save_store(&store).await?;

    println!(
        "Score: {:.1} / {:.1} ({:.1}%)",
        result.score.total_score, result.score.max_possible_score, result.score.percentage
    );
    println!(
        "Correct: {}  Incorrect: {}  Unattempted: {}",
        result.summary.correct, result.summary.incorrect, result.summary.unattempted
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Topic", "Answer", "Correct", "Status", "Score"]);
    for detail in &result.detailed_results {
        table.add_row(vec![
            Cell::new(detail.question_number),
            Cell::new(format!("{}:{}", detail.subject, detail.topic)),
            Cell::new(&detail.submitted),
            Cell::new(&detail.correct_answer),
            Cell::new(format!("{:?}", detail.status).to_lowercase()),
            Cell::new(format!("{:+.1}", detail.score)),
        ]);
    }
    println!("{table}");

    for insight in &result.insights {
        println!("- {insight}");
    }

    let analysis = if analyze {
        let summary = PerformanceSummary::from_result(&result);
        let report = match &ctx.config.analysis {
            Some(config) => {
                let analyzer = create_analyzer(config);
                analyze_or_fallback(
                    analyzer.as_ref(),
                    &summary,
                    Duration::from_secs(config.timeout_secs),
                )
                .await
            }
            None => fallback_analysis(&summary),
        };
        println!(
            "Analysis ({}): {} — {}",
            report.metadata.model, report.overall.performance_level, report.overall.summary
        );
        Some(report)
    } else {
        None
    };

    if let Some(path) = report_path {
        let markdown = render_markdown(&result, analysis.as_ref());
        std::fs::write(&path, markdown)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    // Keep the scored outcome alongside the session state.
    let saved = TestReport::new(result, analysis);
    saved.save_json(&ctx.state_dir.join("reports").join(format!("{test}.json")))?;

    Ok(())
}

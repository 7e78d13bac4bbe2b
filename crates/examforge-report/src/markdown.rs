//! Markdown rendering of evaluation outcomes.

use examforge_core::analysis::AnalysisReport;
use examforge_core::evaluate::{AnswerStatus, EvaluationResult};

/// Render an evaluation result (and its analysis, when present) as
/// markdown.
pub fn render_markdown(result: &EvaluationResult, analysis: Option<&AnalysisReport>) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Test report — {}\n\n", result.test_id));
    md.push_str(&format!(
        "**Score:** {:.1} / {:.1} ({:.1}%)\n\n",
        result.score.total_score, result.score.max_possible_score, result.score.percentage
    ));
    md.push_str(&format!(
        "**Summary:** {} correct, {} incorrect, {} unattempted of {}\n\n",
        result.summary.correct,
        result.summary.incorrect,
        result.summary.unattempted,
        result.summary.total
    ));

    if !result.insights.is_empty() {
        md.push_str("## Insights\n\n");
        for insight in &result.insights {
            md.push_str(&format!("- {insight}\n"));
        }
        md.push('\n');
    }

    if !result.chapter_performance.is_empty() {
        md.push_str("## Chapter performance\n\n");
        md.push_str("| Subject | Chapter | Correct | Attempted | Accuracy |\n");
        md.push_str("|---------|---------|---------|-----------|----------|\n");
        let mut chapters: Vec<_> = result.chapter_performance.values().collect();
        chapters.sort_by(|a, b| (&a.subject, &a.chapter).cmp(&(&b.subject, &b.chapter)));
        for stat in chapters {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {:.1}% |\n",
                stat.subject,
                stat.chapter,
                stat.correct,
                stat.attempts,
                stat.accuracy()
            ));
        }
        md.push('\n');
    }

    if !result.mistake_analysis.is_empty() {
        md.push_str("## Mistakes\n\n");
        md.push_str("| # | Topic | Your answer | Correct | Picked because |\n");
        md.push_str("|---|-------|-------------|---------|----------------|\n");
        for (i, mistake) in result.mistake_analysis.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {}:{} | {} | {} | {} |\n",
                i + 1,
                mistake.subject,
                mistake.topic,
                mistake.submitted,
                mistake.correct_answer,
                mistake.selection_reason
            ));
        }
        md.push('\n');
    }

    let unattempted: Vec<_> = result
        .detailed_results
        .iter()
        .filter(|r| r.status == AnswerStatus::Unattempted)
        .collect();
    if !unattempted.is_empty() {
        md.push_str(&format!(
            "## Unattempted\n\n{} question(s) left blank: {}\n\n",
            unattempted.len(),
            unattempted
                .iter()
                .map(|r| format!("#{}", r.question_number))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if let Some(analysis) = analysis {
        md.push_str("## Analysis\n\n");
        md.push_str(&format!(
            "**{}** — {}\n\n",
            analysis.overall.performance_level, analysis.overall.summary
        ));
        let mut subjects: Vec<_> = analysis.subjects.iter().collect();
        subjects.sort_by_key(|(name, _)| name.as_str());
        for (subject, detail) in subjects {
            md.push_str(&format!("### {subject} ({:.1}%)\n\n", detail.accuracy));
            for rec in &detail.recommendations {
                md.push_str(&format!("- {rec}\n"));
            }
            md.push('\n');
        }
        if analysis.is_fallback() {
            md.push_str("_Detailed AI analysis was unavailable; this is a generated summary._\n");
        }
    }

    md
}

//! Test report bundling with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use examforge_core::analysis::AnalysisReport;
use examforge_core::evaluate::EvaluationResult;

/// An evaluation outcome plus its optional collaborator analysis, as
/// persisted for the learner's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub result: EvaluationResult,
    #[serde(default)]
    pub analysis: Option<AnalysisReport>,
    pub saved_at: DateTime<Utc>,
}

impl TestReport {
    pub fn new(result: EvaluationResult, analysis: Option<AnalysisReport>) -> Self {
        Self {
            result,
            analysis,
            saved_at: Utc::now(),
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: TestReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::evaluate::{CountSummary, ScoreSummary};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn result() -> EvaluationResult {
        EvaluationResult {
            user_id: "u1".into(),
            test_id: Uuid::nil(),
            score: ScoreSummary {
                total_score: 10.0,
                max_possible_score: 20.0,
                percentage: 50.0,
            },
            summary: CountSummary { correct: 3, incorrect: 1, unattempted: 1, total: 5 },
            chapter_performance: HashMap::new(),
            topic_performance: HashMap::new(),
            detailed_results: vec![],
            mistake_analysis: vec![],
            insights: vec!["Most mistakes in Physics (1 errors)".into()],
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn json_roundtrip() {
        let report = TestReport::new(result(), None);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("test.json");

        report.save_json(&path).unwrap();
        let loaded = TestReport::load_json(&path).unwrap();

        assert_eq!(loaded.result.user_id, "u1");
        assert_eq!(loaded.result.summary.total, 5);
        assert!(loaded.analysis.is_none());
    }

    #[test]
    fn load_missing_file_errors() {
        let err = TestReport::load_json(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}

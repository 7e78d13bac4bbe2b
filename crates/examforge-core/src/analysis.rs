//! Structured summary and report types for the analysis collaborator.
//!
//! The collaborator (an external LLM) consumes a [`PerformanceSummary`] and
//! returns an [`AnalysisReport`]. The call is always bounded:
//! [`analyze_or_fallback`] applies a deadline and substitutes a
//! deterministic fallback report on timeout, transport failure, or a
//! malformed reply, so the caller never sees an error.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluate::{CountSummary, EvaluationResult, ScoreSummary};
use crate::profile::{ChapterStat, MistakeRecord};
use crate::traits::AnalysisProvider;

/// Shape version stamped into report metadata.
pub const ANALYSIS_VERSION: &str = "1.0";

/// Aggregated per-subject accuracy within one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectPerformance {
    pub attempts: u32,
    pub correct: u32,
    pub accuracy: f64,
}

/// The structured performance summary handed to the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub user_id: String,
    pub test_id: Uuid,
    pub score: ScoreSummary,
    pub summary: CountSummary,
    pub subject_performance: HashMap<String, SubjectPerformance>,
    /// Keyed by `subject:chapter`.
    pub chapter_performance: HashMap<String, ChapterStat>,
    pub detailed_mistakes: Vec<MistakeRecord>,
    pub insights: Vec<String>,
}

impl PerformanceSummary {
    /// Build the collaborator input from one evaluation result.
    pub fn from_result(result: &EvaluationResult) -> Self {
        let mut subject_performance: HashMap<String, SubjectPerformance> = HashMap::new();
        for stat in result.chapter_performance.values() {
            let entry = subject_performance
                .entry(stat.subject.clone())
                .or_insert(SubjectPerformance { attempts: 0, correct: 0, accuracy: 0.0 });
            entry.attempts += stat.attempts;
            entry.correct += stat.correct;
        }
        for perf in subject_performance.values_mut() {
            perf.accuracy = if perf.attempts == 0 {
                0.0
            } else {
                f64::from(perf.correct) / f64::from(perf.attempts) * 100.0
            };
        }

        Self {
            user_id: result.user_id.clone(),
            test_id: result.test_id,
            score: result.score.clone(),
            summary: result.summary.clone(),
            subject_performance,
            chapter_performance: result.chapter_performance.clone(),
            detailed_mistakes: result.mistake_analysis.clone(),
            insights: result.insights.clone(),
        }
    }
}

/// Overall verdict section of an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallAnalysis {
    pub score_percentage: f64,
    pub performance_level: String,
    pub summary: String,
}

/// Per-subject section of an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectAnalysis {
    pub accuracy: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Provenance of an analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub generated_at: DateTime<Utc>,
    /// Model that produced the report, or "fallback".
    pub model: String,
    pub version: String,
}

/// The structured analysis object the caller receives: from the
/// collaborator on success, from [`fallback_analysis`] otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub overall: OverallAnalysis,
    pub subjects: HashMap<String, SubjectAnalysis>,
    pub metadata: AnalysisMetadata,
}

impl AnalysisReport {
    pub fn is_fallback(&self) -> bool {
        self.metadata.model == "fallback"
    }
}

/// Call the collaborator with a deadline; degrade to the fallback report on
/// any failure. The fallback is cheap and deterministic, so this function
/// always returns promptly once the deadline passes.
pub async fn analyze_or_fallback(
    provider: &dyn AnalysisProvider,
    summary: &PerformanceSummary,
    deadline: Duration,
) -> AnalysisReport {
    match tokio::time::timeout(deadline, provider.analyze(summary)).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            tracing::warn!("analysis provider '{}' failed: {e:#}", provider.name());
            fallback_analysis(summary)
        }
        Err(_) => {
            tracing::warn!(
                "analysis provider '{}' exceeded {}s deadline",
                provider.name(),
                deadline.as_secs()
            );
            fallback_analysis(summary)
        }
    }
}

/// Deterministic stand-in report built purely from the summary.
pub fn fallback_analysis(summary: &PerformanceSummary) -> AnalysisReport {
    let percentage = summary.score.percentage;
    let subjects = summary
        .subject_performance
        .iter()
        .map(|(subject, perf)| {
            let mut recommendations = Vec::new();
            if perf.accuracy < 65.0 {
                recommendations.push(format!("Revisit fundamentals in {subject}"));
                recommendations.push(format!("Practice more {subject} questions"));
            } else {
                recommendations.push(format!("Maintain current preparation in {subject}"));
            }
            (
                subject.clone(),
                SubjectAnalysis { accuracy: perf.accuracy, recommendations },
            )
        })
        .collect();

    AnalysisReport {
        overall: OverallAnalysis {
            score_percentage: percentage,
            performance_level: performance_level(percentage).to_string(),
            summary:
                "Your test performance is being analyzed. Detailed insights will be available shortly."
                    .to_string(),
        },
        subjects,
        metadata: AnalysisMetadata {
            generated_at: Utc::now(),
            model: "fallback".to_string(),
            version: ANALYSIS_VERSION.to_string(),
        },
    }
}

fn performance_level(percentage: f64) -> &'static str {
    if percentage >= 80.0 {
        "Excellent"
    } else if percentage >= 60.0 {
        "Good"
    } else if percentage >= 40.0 {
        "Fair"
    } else {
        "Needs work"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn summary_with(percentage: f64, physics_accuracy: f64) -> PerformanceSummary {
        let mut subject_performance = HashMap::new();
        subject_performance.insert(
            "Physics".to_string(),
            SubjectPerformance {
                attempts: 10,
                correct: (physics_accuracy / 10.0) as u32,
                accuracy: physics_accuracy,
            },
        );
        PerformanceSummary {
            user_id: "u1".into(),
            test_id: Uuid::nil(),
            score: ScoreSummary {
                total_score: percentage,
                max_possible_score: 100.0,
                percentage,
            },
            summary: CountSummary { correct: 5, incorrect: 3, unattempted: 2, total: 10 },
            subject_performance,
            chapter_performance: HashMap::new(),
            detailed_mistakes: vec![],
            insights: vec![],
        }
    }

    struct StallingProvider;

    #[async_trait]
    impl AnalysisProvider for StallingProvider {
        fn name(&self) -> &str {
            "stalling"
        }
        async fn analyze(&self, _: &PerformanceSummary) -> anyhow::Result<AnalysisReport> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep never returns within the deadline")
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AnalysisProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn analyze(&self, _: &PerformanceSummary) -> anyhow::Result<AnalysisReport> {
            anyhow::bail!("backend unavailable")
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl AnalysisProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn analyze(&self, summary: &PerformanceSummary) -> anyhow::Result<AnalysisReport> {
            let mut report = fallback_analysis(summary);
            report.metadata.model = "echo-model".to_string();
            Ok(report)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_to_fallback() {
        let summary = summary_with(55.0, 50.0);
        let report =
            analyze_or_fallback(&StallingProvider, &summary, Duration::from_secs(30)).await;
        assert!(report.is_fallback());
        assert_eq!(report.overall.score_percentage, 55.0);
    }

    #[tokio::test]
    async fn provider_error_resolves_to_fallback() {
        let summary = summary_with(55.0, 50.0);
        let report =
            analyze_or_fallback(&FailingProvider, &summary, Duration::from_secs(30)).await;
        assert!(report.is_fallback());
        // Weak subject gets actionable recommendations.
        let physics = report.subjects.get("Physics").unwrap();
        assert!(physics.recommendations.len() >= 2);
    }

    #[tokio::test]
    async fn healthy_provider_passes_through() {
        let summary = summary_with(85.0, 90.0);
        let report = analyze_or_fallback(&EchoProvider, &summary, Duration::from_secs(30)).await;
        assert!(!report.is_fallback());
        assert_eq!(report.metadata.model, "echo-model");
    }

    #[test]
    fn performance_levels() {
        assert_eq!(performance_level(85.0), "Excellent");
        assert_eq!(performance_level(65.0), "Good");
        assert_eq!(performance_level(45.0), "Fair");
        assert_eq!(performance_level(10.0), "Needs work");
    }

    #[test]
    fn summary_aggregates_subjects_from_chapters() {
        let mut result_chapters = HashMap::new();
        result_chapters.insert(
            "Physics:Optics".to_string(),
            ChapterStat { subject: "Physics".into(), chapter: "Optics".into(), attempts: 4, correct: 1 },
        );
        result_chapters.insert(
            "Physics:Waves".to_string(),
            ChapterStat { subject: "Physics".into(), chapter: "Waves".into(), attempts: 6, correct: 4 },
        );

        let result = EvaluationResult {
            user_id: "u1".into(),
            test_id: Uuid::nil(),
            score: ScoreSummary { total_score: 10.0, max_possible_score: 40.0, percentage: 25.0 },
            summary: CountSummary { correct: 5, incorrect: 5, unattempted: 0, total: 10 },
            chapter_performance: result_chapters,
            topic_performance: HashMap::new(),
            detailed_results: vec![],
            mistake_analysis: vec![],
            insights: vec![],
            completed_at: Utc::now(),
        };

        let summary = PerformanceSummary::from_result(&result);
        let physics = summary.subject_performance.get("Physics").unwrap();
        assert_eq!(physics.attempts, 10);
        assert_eq!(physics.correct, 5);
        assert!((physics.accuracy - 50.0).abs() < f64::EPSILON);
    }
}

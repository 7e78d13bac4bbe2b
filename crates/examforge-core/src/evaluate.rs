//! Answer evaluation and test scoring.
//!
//! [`evaluate_answer`] applies the per-variant marking rules to one
//! submission; [`evaluate_session`] scores a whole session, builds the
//! chapter/topic rollups and mistake list, and [`update_profile`] folds the
//! result back into the learner's performance state.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExamError;
use crate::model::{AnswerSpec, Question, SelectionReason, SessionStatus, TestSession};
use crate::profile::{chapter_key, topic_key, ChapterStat, MistakeRecord, PerformanceProfile, TopicStat};

/// Penalty per wrongly selected identifier in the multi-choice scheme.
const MULTI_WRONG_PENALTY: f64 = 2.0;

/// Outcome classification of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Correct,
    Incorrect,
    Unattempted,
}

/// Marking outcome for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    pub score: f64,
    pub status: AnswerStatus,
}

impl Evaluation {
    fn unattempted() -> Self {
        Self {
            is_correct: false,
            score: 0.0,
            status: AnswerStatus::Unattempted,
        }
    }

    fn correct(score: f64) -> Self {
        Self {
            is_correct: true,
            score,
            status: AnswerStatus::Correct,
        }
    }

    fn incorrect(score: f64) -> Self {
        Self {
            is_correct: false,
            score,
            status: AnswerStatus::Incorrect,
        }
    }
}

/// Score one submission against a question's answer spec.
///
/// A blank submission is always unattempted with score 0, for every
/// variant, overriding negative marking. Parse failures for numeric and
/// integer variants are incorrect answers, never errors.
pub fn evaluate_answer(question: &Question, submitted: &str) -> Evaluation {
    let submitted = submitted.trim();
    if submitted.is_empty() {
        return Evaluation::unattempted();
    }

    match &question.answer_spec {
        AnswerSpec::Single { option } => {
            if submitted.eq_ignore_ascii_case(option) {
                Evaluation::correct(question.marks)
            } else {
                Evaluation::incorrect(-question.negative_marks)
            }
        }
        AnswerSpec::Multi { options } => evaluate_multi(question, submitted, options),
        AnswerSpec::Numeric { value, tolerance } => match submitted.parse::<f64>() {
            Ok(v) if (v - value).abs() <= *tolerance => Evaluation::correct(question.marks),
            _ => Evaluation::incorrect(-question.negative_marks),
        },
        AnswerSpec::Integer { value } => match submitted.parse::<i64>() {
            Ok(v) if v == *value => Evaluation::correct(question.marks),
            _ => Evaluation::incorrect(-question.negative_marks),
        },
        AnswerSpec::Text { value } => {
            if normalize_text(submitted) == normalize_text(value) {
                Evaluation::correct(question.marks)
            } else {
                Evaluation::incorrect(-question.negative_marks)
            }
        }
    }
}

/// Multi-choice scheme: all correct → full marks; any wrong identifier →
/// −2 per wrong pick; proper non-empty subset → no credit, no penalty.
fn evaluate_multi(question: &Question, submitted: &str, correct: &BTreeSet<String>) -> Evaluation {
    let picked = parse_identifiers(submitted);
    if picked.is_empty() {
        return Evaluation::unattempted();
    }

    let correct_upper: BTreeSet<String> = correct.iter().map(|c| c.to_uppercase()).collect();
    let wrong_count = picked.difference(&correct_upper).count();

    if picked == correct_upper {
        Evaluation::correct(question.marks)
    } else if wrong_count > 0 {
        Evaluation::incorrect(-MULTI_WRONG_PENALTY * wrong_count as f64)
    } else {
        Evaluation::incorrect(0.0)
    }
}

/// Split a multi-choice submission ("A,C" / "a c") into identifiers.
fn parse_identifiers(submitted: &str) -> BTreeSet<String> {
    submitted
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
        .collect()
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Scored outcome of one question within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    /// 1-based presentation position.
    pub question_number: usize,
    pub question_id: String,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub submitted: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub score: f64,
    pub status: AnswerStatus,
    pub selection_reason: SelectionReason,
}

/// Score totals of one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_score: f64,
    pub max_possible_score: f64,
    /// Floored at zero even when negative marking drives the raw score
    /// below it.
    pub percentage: f64,
}

/// Item counts of one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountSummary {
    pub correct: usize,
    pub incorrect: usize,
    pub unattempted: usize,
    pub total: usize,
}

/// The complete scored outcome of one session. Ephemeral: produced, folded
/// into the profile, then handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub user_id: String,
    pub test_id: Uuid,
    pub score: ScoreSummary,
    pub summary: CountSummary,
    /// Keyed by `subject:chapter`.
    pub chapter_performance: HashMap<String, ChapterStat>,
    /// Keyed by `subject:chapter:topic`.
    pub topic_performance: HashMap<String, TopicStat>,
    pub detailed_results: Vec<QuestionResult>,
    pub mistake_analysis: Vec<MistakeRecord>,
    pub insights: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Score a completed session. Marks it evaluated; a second call for the
/// same session is an error.
///
/// `questions` must be aligned with `session.entries`; `answers` maps the
/// 0-based presentation index to the submitted string, with missing keys
/// treated as unattempted.
pub fn evaluate_session(
    session: &mut TestSession,
    questions: &[Question],
    answers: &HashMap<usize, String>,
) -> Result<EvaluationResult, ExamError> {
    if session.status == SessionStatus::Evaluated {
        return Err(ExamError::SessionAlreadyEvaluated(session.id));
    }
    if questions.len() != session.entries.len() {
        return Err(ExamError::InvalidRequest(format!(
            "session has {} entries but {} questions were supplied",
            session.entries.len(),
            questions.len()
        )));
    }

    let completed_at = Utc::now();
    let mut total_score = 0.0;
    let mut counts = CountSummary {
        correct: 0,
        incorrect: 0,
        unattempted: 0,
        total: questions.len(),
    };
    let mut chapter_performance: HashMap<String, ChapterStat> = HashMap::new();
    let mut topic_performance: HashMap<String, TopicStat> = HashMap::new();
    let mut detailed_results = Vec::with_capacity(questions.len());
    let mut mistake_analysis = Vec::new();

    for (i, (question, entry)) in questions.iter().zip(&session.entries).enumerate() {
        let submitted = answers.get(&i).map(String::as_str).unwrap_or("");
        let evaluation = evaluate_answer(question, submitted);
        total_score += evaluation.score;

        match evaluation.status {
            AnswerStatus::Correct => counts.correct += 1,
            AnswerStatus::Incorrect => counts.incorrect += 1,
            AnswerStatus::Unattempted => counts.unattempted += 1,
        }

        let chapter = chapter_performance
            .entry(chapter_key(&question.subject, &question.chapter))
            .or_insert_with(|| ChapterStat {
                subject: question.subject.clone(),
                chapter: question.chapter.clone(),
                attempts: 0,
                correct: 0,
            });
        chapter.attempts += 1;
        if evaluation.is_correct {
            chapter.correct += 1;
        }

        let topic = topic_performance
            .entry(topic_key(&question.subject, &question.chapter, &question.topic))
            .or_insert_with(|| TopicStat {
                subject: question.subject.clone(),
                chapter: question.chapter.clone(),
                topic: question.topic.clone(),
                attempts: 0,
                correct: 0,
                last_attempted: Some(completed_at),
            });
        topic.attempts += 1;
        if evaluation.is_correct {
            topic.correct += 1;
        }
        topic.last_attempted = Some(completed_at);

        if evaluation.status == AnswerStatus::Incorrect {
            mistake_analysis.push(MistakeRecord {
                question_id: question.id.clone(),
                subject: question.subject.clone(),
                chapter: question.chapter.clone(),
                topic: question.topic.clone(),
                submitted: submitted.to_string(),
                correct_answer: question.answer_spec.display(),
                selection_reason: entry.selection_reason.clone(),
                content_preview: question.text.chars().take(100).collect(),
            });
        }

        detailed_results.push(QuestionResult {
            question_number: i + 1,
            question_id: question.id.clone(),
            subject: question.subject.clone(),
            chapter: question.chapter.clone(),
            topic: question.topic.clone(),
            submitted: submitted.to_string(),
            correct_answer: question.answer_spec.display(),
            is_correct: evaluation.is_correct,
            score: evaluation.score,
            status: evaluation.status,
            selection_reason: entry.selection_reason.clone(),
        });
    }

    let max_possible_score: f64 = questions.iter().map(|q| q.marks).sum();
    let percentage = if max_possible_score > 0.0 {
        (total_score / max_possible_score * 100.0).max(0.0)
    } else {
        0.0
    };

    let insights = generate_insights(&mistake_analysis, &topic_performance);

    session.status = SessionStatus::Evaluated;

    Ok(EvaluationResult {
        user_id: session.user_id.clone(),
        test_id: session.id,
        score: ScoreSummary {
            total_score,
            max_possible_score,
            percentage,
        },
        summary: counts,
        chapter_performance,
        topic_performance,
        detailed_results,
        mistake_analysis,
        insights,
        completed_at,
    })
}

/// Fold an evaluation result into the learner's profile.
///
/// Rollups merge additively into existing stats (never replace), so the
/// aggregate is independent of the order sessions are folded in. The caller
/// must hold the per-user profile lock.
pub fn update_profile(profile: &mut PerformanceProfile, result: &EvaluationResult) {
    for stat in result.chapter_performance.values() {
        profile.absorb_chapter(stat);
    }
    for stat in result.topic_performance.values() {
        profile.absorb_topic(stat);
    }

    // Velocity compares against the window as it stood before this test.
    profile.velocity = Some(profile.learning_velocity(result.score.percentage));

    profile.push_mistakes(result.mistake_analysis.iter().cloned());
    profile.push_score(result.score.percentage);
    profile.total_tests += 1;
    profile.total_score += result.score.percentage;

    // The ledger was already extended at selection time; re-recording here
    // keeps the invariant even for sessions imported from elsewhere.
    profile.record_seen(result.detailed_results.iter().map(|r| r.question_id.clone()));
    profile.updated_at = result.completed_at;
}

/// Derive insight strings from one test's mistakes and topic rollups.
fn generate_insights(
    mistakes: &[MistakeRecord],
    topic_performance: &HashMap<String, TopicStat>,
) -> Vec<String> {
    let mut insights = Vec::new();

    if !mistakes.is_empty() {
        let mut by_subject: HashMap<&str, usize> = HashMap::new();
        for mistake in mistakes {
            *by_subject.entry(mistake.subject.as_str()).or_default() += 1;
        }
        if let Some((subject, count)) = by_subject.into_iter().max_by_key(|(_, n)| *n) {
            insights.push(format!("Most mistakes in {subject} ({count} errors)"));
        }
    }

    let mut weak: Vec<String> = topic_performance
        .values()
        .filter(|stat| stat.accuracy() < 50.0)
        .map(|stat| format!("{}:{}", stat.subject, stat.topic))
        .collect();
    weak.sort();
    if !weak.is_empty() {
        let shown: Vec<String> = weak.into_iter().take(3).collect();
        insights.push(format!("Weak topics identified: {}", shown.join(", ")));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Difficulty, ExamType, PresentationHints, QuestionOption, SessionEntry, Variant,
    };

    fn base_question(id: &str, spec: AnswerSpec, variant: Variant) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            options: vec![
                QuestionOption { id: "A".into(), text: "a".into() },
                QuestionOption { id: "B".into(), text: "b".into() },
                QuestionOption { id: "C".into(), text: "c".into() },
                QuestionOption { id: "D".into(), text: "d".into() },
            ],
            answer_spec: spec,
            subject: "Physics".into(),
            chapter: "Optics".into(),
            topic: "Refraction".into(),
            difficulty: Difficulty::Medium,
            marks: 4.0,
            negative_marks: 1.0,
            variant,
            hints: PresentationHints::default(),
            exam_type: ExamType::JeeMain,
            year: None,
            explanation: String::new(),
            content_hash: format!("hash-{id}"),
            complexity: 3,
            topic_keywords: vec![],
        }
    }

    fn multi_question(correct: &[&str]) -> Question {
        base_question(
            "m1",
            AnswerSpec::Multi {
                options: correct.iter().map(|s| s.to_string()).collect(),
            },
            Variant::MultiChoice,
        )
    }

    #[test]
    fn single_choice_case_insensitive() {
        let q = base_question("s1", AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice);
        assert!(evaluate_answer(&q, "a").is_correct);
        assert_eq!(evaluate_answer(&q, "a").score, 4.0);
        let wrong = evaluate_answer(&q, "B");
        assert!(!wrong.is_correct);
        assert_eq!(wrong.score, -1.0);
    }

    #[test]
    fn multi_choice_exact_match_full_marks() {
        let q = multi_question(&["A", "B"]);
        let eval = evaluate_answer(&q, "A,B");
        assert!(eval.is_correct);
        assert_eq!(eval.score, 4.0);
    }

    #[test]
    fn multi_choice_wrong_pick_penalized_per_identifier() {
        let q = multi_question(&["A", "B"]);
        let eval = evaluate_answer(&q, "A,C");
        assert!(!eval.is_correct);
        assert_eq!(eval.score, -2.0);

        let two_wrong = evaluate_answer(&q, "C,D");
        assert_eq!(two_wrong.score, -4.0);
    }

    #[test]
    fn multi_choice_proper_subset_no_credit_no_penalty() {
        let q = multi_question(&["A", "B"]);
        let eval = evaluate_answer(&q, "A");
        assert!(!eval.is_correct);
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.status, AnswerStatus::Incorrect);
    }

    #[test]
    fn numeric_within_tolerance() {
        let q = base_question(
            "n1",
            AnswerSpec::Numeric { value: 3.14, tolerance: 0.01 },
            Variant::Numeric,
        );
        assert!(evaluate_answer(&q, "3.145").is_correct);
        assert!(!evaluate_answer(&q, "3.16").is_correct);
    }

    #[test]
    fn numeric_parse_failure_is_incorrect() {
        let q = base_question(
            "n2",
            AnswerSpec::Numeric { value: 3.14, tolerance: 0.01 },
            Variant::Numeric,
        );
        let eval = evaluate_answer(&q, "three point one four");
        assert_eq!(eval.status, AnswerStatus::Incorrect);
        assert_eq!(eval.score, -1.0);
    }

    #[test]
    fn integer_strict_parse() {
        let q = base_question("i1", AnswerSpec::Integer { value: 7 }, Variant::Integer);
        assert!(evaluate_answer(&q, "7").is_correct);
        // "7.0" does not parse as an integer and scores as incorrect.
        let float_form = evaluate_answer(&q, "7.0");
        assert!(!float_form.is_correct);
        assert_eq!(float_form.status, AnswerStatus::Incorrect);
    }

    #[test]
    fn text_fill_normalized_match() {
        let q = base_question(
            "t1",
            AnswerSpec::Text { value: "Kinetic  Energy".into() },
            Variant::TextFill,
        );
        assert!(evaluate_answer(&q, "  kinetic energy ").is_correct);
        assert!(!evaluate_answer(&q, "potential energy").is_correct);
    }

    #[test]
    fn unattempted_overrides_negative_marking() {
        for (spec, variant) in [
            (AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice),
            (AnswerSpec::Integer { value: 7 }, Variant::Integer),
            (AnswerSpec::Text { value: "x".into() }, Variant::TextFill),
        ] {
            let q = base_question("u1", spec, variant);
            let eval = evaluate_answer(&q, "   ");
            assert_eq!(eval.status, AnswerStatus::Unattempted);
            assert_eq!(eval.score, 0.0);
        }
    }

    fn make_session(questions: &[Question]) -> TestSession {
        TestSession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            exam_type: ExamType::JeeMain,
            subjects: vec!["Physics".into()],
            entries: questions
                .iter()
                .map(|q| SessionEntry {
                    question_id: q.id.clone(),
                    selection_reason: SelectionReason::GeneralCoverage,
                })
                .collect(),
            created_at: Utc::now(),
            status: SessionStatus::Active,
        }
    }

    fn answers(pairs: &[(usize, &str)]) -> HashMap<usize, String> {
        pairs.iter().map(|(i, s)| (*i, s.to_string())).collect()
    }

    #[test]
    fn session_scoring_and_rollups() {
        let questions = vec![
            base_question("q1", AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice),
            base_question("q2", AnswerSpec::Single { option: "B".into() }, Variant::SingleChoice),
            base_question("q3", AnswerSpec::Single { option: "C".into() }, Variant::SingleChoice),
        ];
        let mut session = make_session(&questions);
        // correct, incorrect, unattempted
        let result =
            evaluate_session(&mut session, &questions, &answers(&[(0, "A"), (1, "D")])).unwrap();

        assert_eq!(result.summary.correct, 1);
        assert_eq!(result.summary.incorrect, 1);
        assert_eq!(result.summary.unattempted, 1);
        assert_eq!(result.score.total_score, 3.0);
        assert_eq!(result.score.max_possible_score, 12.0);
        assert_eq!(result.mistake_analysis.len(), 1);
        assert_eq!(result.mistake_analysis[0].question_id, "q2");

        let topic = result
            .topic_performance
            .get(&topic_key("Physics", "Optics", "Refraction"))
            .unwrap();
        assert_eq!(topic.attempts, 3);
        assert_eq!(topic.correct, 1);
        assert_eq!(session.status, SessionStatus::Evaluated);
    }

    #[test]
    fn percentage_floored_at_zero() {
        let questions = vec![
            multi_question(&["A", "B"]),
            multi_question(&["A", "B"]),
        ];
        let mut session = make_session(&questions);
        // Both picks entirely wrong: raw −8 out of 8.
        let result =
            evaluate_session(&mut session, &questions, &answers(&[(0, "C,D"), (1, "C,D")]))
                .unwrap();
        assert_eq!(result.score.total_score, -8.0);
        assert_eq!(result.score.percentage, 0.0);
    }

    #[test]
    fn session_evaluated_exactly_once() {
        let questions =
            vec![base_question("q1", AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice)];
        let mut session = make_session(&questions);
        evaluate_session(&mut session, &questions, &HashMap::new()).unwrap();
        let second = evaluate_session(&mut session, &questions, &HashMap::new());
        assert!(matches!(second, Err(ExamError::SessionAlreadyEvaluated(_))));
    }

    #[test]
    fn profile_update_order_independent() {
        let qa =
            vec![base_question("q1", AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice)];
        let qb =
            vec![base_question("q2", AnswerSpec::Single { option: "B".into() }, Variant::SingleChoice)];

        let result_a = {
            let mut s = make_session(&qa);
            evaluate_session(&mut s, &qa, &answers(&[(0, "A")])).unwrap()
        };
        let result_b = {
            let mut s = make_session(&qb);
            evaluate_session(&mut s, &qb, &answers(&[(0, "C")])).unwrap()
        };

        let mut ab = PerformanceProfile::new("u1");
        update_profile(&mut ab, &result_a);
        update_profile(&mut ab, &result_b);

        let mut ba = PerformanceProfile::new("u1");
        update_profile(&mut ba, &result_b);
        update_profile(&mut ba, &result_a);

        let key = topic_key("Physics", "Optics", "Refraction");
        let stat_ab = ab.topics.get(&key).unwrap();
        let stat_ba = ba.topics.get(&key).unwrap();
        assert_eq!(stat_ab.attempts, stat_ba.attempts);
        assert_eq!(stat_ab.correct, stat_ba.correct);
        assert_eq!(ab.total_tests, ba.total_tests);
        assert_eq!(ab.seen_question_ids, ba.seen_question_ids);
    }

    #[test]
    fn insights_name_worst_subject() {
        let questions = vec![
            base_question("q1", AnswerSpec::Single { option: "A".into() }, Variant::SingleChoice),
            base_question("q2", AnswerSpec::Single { option: "B".into() }, Variant::SingleChoice),
        ];
        let mut session = make_session(&questions);
        let result =
            evaluate_session(&mut session, &questions, &answers(&[(0, "B"), (1, "A")])).unwrap();
        assert!(result.insights.iter().any(|i| i.contains("Physics")));
    }
}

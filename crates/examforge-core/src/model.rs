//! Core data model types for examforge.
//!
//! These are the fundamental types the entire examforge system uses to
//! represent questions, answer specifications, and test sessions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default tolerance for numeric answers.
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 0.01;

/// Exam families a question bank can belong to. Each gets its own
/// repository collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamType {
    JeeMain,
    JeeAdvanced,
    Neet,
    Bitsat,
}

impl ExamType {
    /// All supported exam types, in collection-initialization order.
    pub const ALL: [ExamType; 4] = [
        ExamType::JeeMain,
        ExamType::JeeAdvanced,
        ExamType::Neet,
        ExamType::Bitsat,
    ];
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamType::JeeMain => write!(f, "JEE_MAIN"),
            ExamType::JeeAdvanced => write!(f, "JEE_ADVANCED"),
            ExamType::Neet => write!(f, "NEET"),
            ExamType::Bitsat => write!(f, "BITSAT"),
        }
    }
}

impl FromStr for ExamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "JEE_MAIN" | "JEE-MAIN" => Ok(ExamType::JeeMain),
            "JEE_ADVANCED" | "JEE-ADVANCED" => Ok(ExamType::JeeAdvanced),
            "NEET" => Ok(ExamType::Neet),
            "BITSAT" => Ok(ExamType::Bitsat),
            other => Err(format!("unknown exam type: {other}")),
        }
    }
}

/// Ordinal question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" | "moderate" => Ok(Difficulty::Medium),
            "hard" | "difficult" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Answer-format variant of a question. Determines the marking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Exactly one correct option identifier.
    SingleChoice,
    /// Two or more correct option identifiers, partial-credit scheme.
    MultiChoice,
    /// Tolerance-bounded floating point answer.
    Numeric,
    /// Exact integer answer.
    Integer,
    /// Free text / fill-in-the-blank answer.
    TextFill,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::SingleChoice => write!(f, "single_choice"),
            Variant::MultiChoice => write!(f, "multi_choice"),
            Variant::Numeric => write!(f, "numeric"),
            Variant::Integer => write!(f, "integer"),
            Variant::TextFill => write!(f, "text_fill"),
        }
    }
}

/// Presentation-only classification flags. These never change evaluation
/// semantics; the rendering layer uses them to pick a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationHints {
    #[serde(default)]
    pub passage_based: bool,
    #[serde(default)]
    pub matrix_match: bool,
    #[serde(default)]
    pub assertion_reason: bool,
    #[serde(default)]
    pub image_based: bool,
}

/// The correct answer for a question, tagged by answer format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSpec {
    /// Single correct option identifier.
    Single { option: String },
    /// Set of correct option identifiers (two or more).
    Multi { options: BTreeSet<String> },
    /// Numeric target with tolerance.
    Numeric { value: f64, tolerance: f64 },
    /// Exact integer target.
    Integer { value: i64 },
    /// Free-text target, matched after normalization.
    Text { value: String },
}

impl AnswerSpec {
    /// Human-readable form, used in mistake records and reports.
    pub fn display(&self) -> String {
        match self {
            AnswerSpec::Single { option } => option.clone(),
            AnswerSpec::Multi { options } => {
                options.iter().cloned().collect::<Vec<_>>().join(",")
            }
            AnswerSpec::Numeric { value, .. } => value.to_string(),
            AnswerSpec::Integer { value } => value.to_string(),
            AnswerSpec::Text { value } => value.clone(),
        }
    }
}

/// A single answer option of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option identifier (e.g. "A").
    pub id: String,
    /// Option text.
    pub text: String,
}

/// A canonical question record. Immutable once admitted by ingestion.
///
/// The embedding vector for a question is owned exclusively by the
/// repository and never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier, assigned at ingestion.
    pub id: String,
    /// Normalized question text.
    pub text: String,
    /// Ordered options; empty for free-response variants.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// The correct answer and its marking parameters.
    pub answer_spec: AnswerSpec,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub difficulty: Difficulty,
    /// Marks awarded for a fully correct answer.
    pub marks: f64,
    /// Marks deducted for an incorrect answer (0 disables negative marking).
    pub negative_marks: f64,
    /// Answer-format variant, fixed at classification time.
    pub variant: Variant,
    #[serde(default)]
    pub hints: PresentationHints,
    pub exam_type: ExamType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub explanation: String,
    /// Hex SHA-256 of the normalized text; duplicate detection and
    /// embedding-cache key.
    pub content_hash: String,
    /// Derived complexity score, 0–5.
    pub complexity: u8,
    /// Retrieval keywords extracted at ingestion.
    #[serde(default)]
    pub topic_keywords: Vec<String>,
}

/// Why a question was placed in a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionReason {
    /// Drawn from one of the learner's weak topics.
    WeakTopic(String),
    /// Semantically similar to a past mistake in the named topic.
    MistakePattern(String),
    /// Breadth-preserving filler.
    GeneralCoverage,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::WeakTopic(topic) => write!(f, "weak_topic_{topic}"),
            SelectionReason::MistakePattern(topic) => write!(f, "mistake_pattern_{topic}"),
            SelectionReason::GeneralCoverage => write!(f, "general_coverage"),
        }
    }
}

impl FromStr for SelectionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(topic) = s.strip_prefix("weak_topic_") {
            Ok(SelectionReason::WeakTopic(topic.to_string()))
        } else if let Some(topic) = s.strip_prefix("mistake_pattern_") {
            Ok(SelectionReason::MistakePattern(topic.to_string()))
        } else if s == "general_coverage" {
            Ok(SelectionReason::GeneralCoverage)
        } else {
            Err(format!("unknown selection reason: {s}"))
        }
    }
}

impl Serialize for SelectionReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SelectionReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle state of a test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Evaluated,
}

/// One selected question within a session, with its provenance tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub question_id: String,
    pub selection_reason: SelectionReason,
}

/// A generated test, recorded at selection time. Transitions from
/// `Active` to `Evaluated` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub user_id: String,
    pub exam_type: ExamType,
    pub subjects: Vec<String>,
    /// Questions in presentation order.
    pub entries: Vec<SessionEntry>,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl TestSession {
    pub fn question_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.question_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_type_display_and_parse() {
        assert_eq!(ExamType::JeeMain.to_string(), "JEE_MAIN");
        assert_eq!("jee_main".parse::<ExamType>().unwrap(), ExamType::JeeMain);
        assert_eq!("NEET".parse::<ExamType>().unwrap(), ExamType::Neet);
        assert!("GRE".parse::<ExamType>().is_err());
    }

    #[test]
    fn difficulty_parse_aliases() {
        assert_eq!("moderate".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn selection_reason_roundtrip() {
        let reason = SelectionReason::WeakTopic("thermodynamics".into());
        assert_eq!(reason.to_string(), "weak_topic_thermodynamics");
        assert_eq!(
            "weak_topic_thermodynamics".parse::<SelectionReason>().unwrap(),
            reason
        );
        assert_eq!(
            "general_coverage".parse::<SelectionReason>().unwrap(),
            SelectionReason::GeneralCoverage
        );
        assert!("random_pick".parse::<SelectionReason>().is_err());
    }

    #[test]
    fn selection_reason_serializes_as_string() {
        let json =
            serde_json::to_string(&SelectionReason::MistakePattern("optics".into())).unwrap();
        assert_eq!(json, "\"mistake_pattern_optics\"");
        let back: SelectionReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SelectionReason::MistakePattern("optics".into()));
    }

    #[test]
    fn answer_spec_display() {
        let multi = AnswerSpec::Multi {
            options: ["B".to_string(), "A".to_string()].into_iter().collect(),
        };
        assert_eq!(multi.display(), "A,B");
        assert_eq!(AnswerSpec::Integer { value: 7 }.display(), "7");
    }

    #[test]
    fn question_serde_roundtrip() {
        let q = Question {
            id: "q-1".into(),
            text: "A ball is dropped from rest".into(),
            options: vec![
                QuestionOption { id: "A".into(), text: "9.8 m/s".into() },
                QuestionOption { id: "B".into(), text: "4.9 m/s".into() },
                QuestionOption { id: "C".into(), text: "19.6 m/s".into() },
                QuestionOption { id: "D".into(), text: "2.5 m/s".into() },
            ],
            answer_spec: AnswerSpec::Single { option: "A".into() },
            subject: "Physics".into(),
            chapter: "Kinematics".into(),
            topic: "Free Fall".into(),
            difficulty: Difficulty::Easy,
            marks: 4.0,
            negative_marks: 1.0,
            variant: Variant::SingleChoice,
            hints: PresentationHints::default(),
            exam_type: ExamType::JeeMain,
            year: Some(2024),
            explanation: String::new(),
            content_hash: "abc123".into(),
            complexity: 1,
            topic_keywords: vec!["kinematics".into()],
        };
        let json = serde_json::to_string(&q).unwrap();
        let back: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "q-1");
        assert_eq!(back.variant, Variant::SingleChoice);
        assert_eq!(back.options.len(), 4);
    }
}

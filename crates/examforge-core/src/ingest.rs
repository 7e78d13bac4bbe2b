//! Question-bank ingestion boundary.
//!
//! Accepts raw heterogeneous records (JSON files or directories of them),
//! validates and normalizes them into canonical [`Question`] values, and
//! reports what was rejected. A bad record is skipped with a warning; a
//! batch never aborts.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::classify::{classify, complexity_score, ClassifierInput};
use crate::model::{
    AnswerSpec, Difficulty, ExamType, Question, QuestionOption, Variant,
    DEFAULT_NUMERIC_TOLERANCE,
};

/// Content words too generic to be retrieval keywords.
const KEYWORD_STOPWORDS: [&str; 5] = ["question", "following", "given", "find", "calculate"];

/// One answer option as it appears in raw banks: either a bare string or an
/// `{identifier, content}` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawOption {
    Text(String),
    Structured {
        #[serde(alias = "id")]
        identifier: String,
        #[serde(alias = "text")]
        content: String,
    },
}

/// The heterogeneous ingestion-boundary record shape. Every field is
/// optional at parse time; validation decides admission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestionRecord {
    #[serde(default, alias = "id")]
    pub question_id: String,
    #[serde(default, alias = "question_text", alias = "text")]
    pub content: String,
    #[serde(default)]
    pub options: Vec<RawOption>,
    #[serde(default)]
    pub correct_options: Vec<String>,
    /// Free-response target; string or number in the wild.
    #[serde(default)]
    pub correct_answer: Option<serde_json::Value>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default, rename = "type")]
    pub question_type: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "chapterGroup")]
    pub chapter_group: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default, alias = "topicName", alias = "topic_name")]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub marks: Option<f64>,
    #[serde(default, alias = "negMarks")]
    pub negative_marks: Option<f64>,
    #[serde(default)]
    pub comprehension: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub exam_type: Option<String>,
}

/// A record-level rejection reason.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The record's id, if it had one.
    pub record_id: Option<String>,
    pub message: String,
}

/// Outcome of ingesting one batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub questions: Vec<Question>,
    pub warnings: Vec<ValidationWarning>,
}

impl IngestReport {
    pub fn admitted(&self) -> usize {
        self.questions.len()
    }

    pub fn rejected(&self) -> usize {
        self.warnings.len()
    }
}

/// Parse a JSON question-bank file (an array of raw records).
pub fn load_bank_file(path: &Path) -> Result<Vec<RawQuestionRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;
    let records: Vec<RawQuestionRecord> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse question bank: {}", path.display()))?;
    Ok(records)
}

/// Recursively load all `.json` bank files under a directory. Files that
/// fail to parse are skipped with a warning.
pub fn load_bank_dir(dir: &Path) -> Result<Vec<RawQuestionRecord>> {
    let mut records = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            records.extend(load_bank_dir(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            match load_bank_file(&path) {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(records)
}

/// Convert a batch of raw records into canonical questions.
///
/// Duplicate ids within the batch keep the first occurrence. Rejected
/// records are collected as warnings and logged; the batch always runs to
/// completion.
pub fn ingest_records(records: Vec<RawQuestionRecord>, default_exam: ExamType) -> IngestReport {
    let mut report = IngestReport::default();
    let mut seen_ids = HashSet::new();

    for record in records {
        let record_id = if record.question_id.is_empty() {
            None
        } else {
            Some(record.question_id.clone())
        };

        match convert_record(record, default_exam) {
            Ok(question) => {
                if !seen_ids.insert(question.id.clone()) {
                    tracing::warn!("duplicate question id {} in batch, skipping", question.id);
                    report.warnings.push(ValidationWarning {
                        record_id: Some(question.id),
                        message: "duplicate id within batch".into(),
                    });
                    continue;
                }
                report.questions.push(question);
            }
            Err(message) => {
                tracing::warn!(record_id = ?record_id, "rejected question record: {message}");
                report.warnings.push(ValidationWarning { record_id, message });
            }
        }
    }

    report
}

/// Validate and normalize one raw record.
fn convert_record(record: RawQuestionRecord, default_exam: ExamType) -> Result<Question, String> {
    if record.question_id.trim().is_empty() {
        return Err("missing question id".into());
    }

    let text = normalize_content(&record.content);
    if text.is_empty() {
        return Err("empty question text".into());
    }

    let options = parse_options(&record.options);
    let free_response = is_free_response(&record);
    if options.len() < 4 && !free_response {
        return Err(format!(
            "only {} options and not explicitly free-response",
            options.len()
        ));
    }

    let correct_options: Vec<String> = record
        .correct_options
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    let (variant, hints) = classify(ClassifierInput {
        declared_type: record.question_type.as_deref(),
        text: &text,
        options: if free_response { &[] } else { &options },
        correct_count: correct_options.len(),
        has_comprehension: record.comprehension.is_some(),
    });

    let answer_spec = build_answer_spec(&record, variant, &correct_options, &options)?;

    let subject = normalize_subject(&record.subject);
    if subject.is_empty() {
        return Err("missing subject".into());
    }
    let chapter = if record.chapter.is_empty() {
        record.chapter_group.clone()
    } else {
        record.chapter.clone()
    };
    if chapter.is_empty() {
        return Err("missing chapter".into());
    }
    let topic = if record.topic.is_empty() {
        chapter.clone()
    } else {
        record.topic.clone()
    };

    let difficulty = record
        .difficulty
        .as_deref()
        .and_then(|d| d.parse::<Difficulty>().ok())
        .unwrap_or(Difficulty::Medium);

    let exam_type = record
        .exam_type
        .as_deref()
        .and_then(|e| e.parse::<ExamType>().ok())
        .unwrap_or(default_exam);

    let marks = record.marks.unwrap_or(4.0);
    if marks <= 0.0 {
        return Err(format!("non-positive marks: {marks}"));
    }
    // Numeric answers conventionally carry no negative marking.
    let negative_marks = record
        .negative_marks
        .unwrap_or(if variant == Variant::Numeric { 0.0 } else { 1.0 });
    if negative_marks < 0.0 {
        return Err(format!("negative_marks below zero: {negative_marks}"));
    }

    let complexity = complexity_score(&text, &options);
    let content_hash = content_hash(&text);
    let topic_keywords = extract_topic_keywords(&text, &chapter, &topic);
    let kept_options = if free_response { Vec::new() } else { options };

    Ok(Question {
        id: record.question_id.trim().to_string(),
        text,
        options: kept_options,
        answer_spec,
        subject,
        chapter,
        topic,
        difficulty,
        marks,
        negative_marks,
        variant,
        hints,
        exam_type,
        year: record.year,
        explanation: normalize_content(&record.explanation),
        content_hash,
        complexity,
        topic_keywords,
    })
}

/// Whether the record explicitly declares a free-response format, or has a
/// free-response target and no options at all.
fn is_free_response(record: &RawQuestionRecord) -> bool {
    if let Some(declared) = record.question_type.as_deref() {
        if matches!(
            declared.to_lowercase().as_str(),
            "integer" | "integer_answer" | "numerical" | "numeric" | "numerical_answer"
                | "fill_blanks" | "fill" | "text"
        ) {
            return true;
        }
    }
    record.options.is_empty() && record.correct_answer.is_some()
}

fn build_answer_spec(
    record: &RawQuestionRecord,
    variant: Variant,
    correct_options: &[String],
    options: &[QuestionOption],
) -> Result<AnswerSpec, String> {
    match variant {
        Variant::SingleChoice => {
            let correct = correct_options
                .first()
                .cloned()
                .or_else(|| answer_as_string(record))
                .ok_or("single-choice record without a correct option")?;
            if !options.iter().any(|o| o.id.eq_ignore_ascii_case(&correct)) {
                return Err(format!("correct option {correct} not among options"));
            }
            Ok(AnswerSpec::Single { option: correct })
        }
        Variant::MultiChoice => {
            if correct_options.len() < 2 {
                return Err("multi-choice record with fewer than two correct options".into());
            }
            let known: HashSet<String> =
                options.iter().map(|o| o.id.to_uppercase()).collect();
            if let Some(bad) = correct_options.iter().find(|c| !known.contains(*c)) {
                return Err(format!("correct option {bad} not among options"));
            }
            Ok(AnswerSpec::Multi {
                options: correct_options.iter().cloned().collect(),
            })
        }
        Variant::Numeric => {
            let value = answer_as_f64(record).ok_or("numeric record without a parseable answer")?;
            Ok(AnswerSpec::Numeric {
                value,
                tolerance: record.tolerance.unwrap_or(DEFAULT_NUMERIC_TOLERANCE),
            })
        }
        Variant::Integer => {
            let value =
                answer_as_i64(record).ok_or("integer record without a parseable answer")?;
            Ok(AnswerSpec::Integer { value })
        }
        Variant::TextFill => {
            let value = answer_as_string(record)
                .or_else(|| correct_options.first().cloned())
                .ok_or("text record without an answer")?;
            Ok(AnswerSpec::Text { value })
        }
    }
}

fn answer_as_string(record: &RawQuestionRecord) -> Option<String> {
    match record.correct_answer.as_ref()? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn answer_as_f64(record: &RawQuestionRecord) -> Option<f64> {
    match record.correct_answer.as_ref()? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn answer_as_i64(record: &RawQuestionRecord) -> Option<i64> {
    match record.correct_answer.as_ref()? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_options(raw: &[RawOption]) -> Vec<QuestionOption> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, opt)| {
            let (id, text) = match opt {
                RawOption::Text(text) => {
                    (char::from(b'A' + (i % 26) as u8).to_string(), text.clone())
                }
                RawOption::Structured { identifier, content } => {
                    (identifier.clone(), content.clone())
                }
            };
            let text = normalize_content(&text);
            if text.is_empty() {
                None
            } else {
                Some(QuestionOption { id: id.to_uppercase(), text })
            }
        })
        .collect()
}

/// Collapse `<br>` tags, escaped newlines, and whitespace runs. Full
/// LaTeX/HTML normalization happens upstream of ingestion.
fn normalize_content(content: &str) -> String {
    let replaced = content
        .replace("<br/>", " ")
        .replace("<br />", " ")
        .replace("<br>", " ")
        .replace("\\n", " ")
        .replace(['\n', '\r', '\t'], " ");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_subject(subject: &str) -> String {
    let lower = subject.trim().to_lowercase();
    match lower.as_str() {
        "mathematics" | "math" | "maths" => "Mathematics".to_string(),
        "physics" => "Physics".to_string(),
        "chemistry" => "Chemistry".to_string(),
        "biology" => "Biology".to_string(),
        "" => String::new(),
        _ => {
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// Hex SHA-256 of a text. Questions carry this as `content_hash`; the
/// repository keys its embedding cache with it.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Chapter and topic names plus the first distinctive content terms.
fn extract_topic_keywords(text: &str, chapter: &str, topic: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    if !chapter.is_empty() {
        keywords.push(chapter.to_lowercase());
    }
    if !topic.is_empty() {
        keywords.push(topic.to_lowercase());
    }

    let mut content_terms = 0;
    for word in text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_lowercase())
    {
        if KEYWORD_STOPWORDS.contains(&word.as_str()) || keywords.contains(&word) {
            continue;
        }
        keywords.push(word);
        content_terms += 1;
        if content_terms == 5 {
            break;
        }
    }

    keywords
}

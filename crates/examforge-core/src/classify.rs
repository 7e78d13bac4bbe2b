//! Question-type classification.
//!
//! Determines a question's answer-format [`Variant`] and its
//! presentation-only hints from structure and content cues. Explicit type
//! metadata always wins; the content heuristics only run in its absence.

use crate::model::{PresentationHints, QuestionOption, Variant};

/// Content phrases that signal an integer answer for option-free questions.
const INTEGER_CUES: [&str; 3] = ["integer", "whole number", "find the value"];

/// Classifier input, extracted from a raw record before admission.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    /// Explicit type metadata, if the source carried any.
    pub declared_type: Option<&'a str>,
    /// Normalized question text.
    pub text: &'a str,
    /// Parsed answer options (empty for free-response questions).
    pub options: &'a [QuestionOption],
    /// Number of correct option identifiers.
    pub correct_count: usize,
    /// Whether the record carried a comprehension passage.
    pub has_comprehension: bool,
}

/// Classify a question into a variant plus presentation hints.
///
/// Precedence without explicit metadata:
/// 1. no options → numeric, unless the content signals an integer answer;
/// 2. structural cues (passage, assertion-reason, matrix-match, fill-blank)
///    checked in that fixed order; the first three only set hints,
///    fill-blank selects the text variant;
/// 3. image content sets a presentation flag only;
/// 4. more than one correct identifier forces multi-choice over other cues;
/// 5. default single-choice.
pub fn classify(input: ClassifierInput<'_>) -> (Variant, PresentationHints) {
    let hints = detect_hints(&input);

    if let Some(declared) = input.declared_type {
        if let Some(variant) = variant_from_declared(declared, input.correct_count) {
            return (variant, hints);
        }
    }

    let variant = if input.options.is_empty() {
        let content = input.text.to_lowercase();
        if INTEGER_CUES.iter().any(|cue| content.contains(cue)) {
            Variant::Integer
        } else {
            Variant::Numeric
        }
    } else if input.correct_count > 1 {
        Variant::MultiChoice
    } else if is_fill_blank(input.text) {
        Variant::TextFill
    } else {
        Variant::SingleChoice
    };

    (variant, hints)
}

/// Map explicit type metadata onto a variant. A declared "mcq" with
/// multiple correct identifiers is promoted to multi-choice.
fn variant_from_declared(declared: &str, correct_count: usize) -> Option<Variant> {
    match declared.to_lowercase().as_str() {
        "mcq" => {
            if correct_count > 1 {
                Some(Variant::MultiChoice)
            } else {
                Some(Variant::SingleChoice)
            }
        }
        "mcqm" => Some(Variant::MultiChoice),
        "integer" | "integer_answer" => Some(Variant::Integer),
        "numerical" | "numeric" | "numerical_answer" => Some(Variant::Numeric),
        "fill_blanks" | "fill" | "text" => Some(Variant::TextFill),
        _ => None,
    }
}

fn detect_hints(input: &ClassifierInput<'_>) -> PresentationHints {
    let content = input.text.to_lowercase();
    PresentationHints {
        passage_based: input.has_comprehension || content.contains("passage"),
        assertion_reason: content.contains("assertion") && content.contains("reason"),
        matrix_match: (content.contains("match") && content.contains("column"))
            || content.contains("list i"),
        image_based: has_images(input.text, input.options),
    }
}

fn is_fill_blank(text: &str) -> bool {
    let content = text.to_lowercase();
    content.contains("_____") || content.contains("fill")
}

fn has_images(text: &str, options: &[QuestionOption]) -> bool {
    let tagged = |s: &str| s.contains("<img") || s.contains("src=");
    tagged(text) || options.iter().any(|opt| tagged(&opt.text))
}

/// Derive a 0–5 complexity score from content length, dense notation, and
/// option verbosity. Drives the difficulty interleave at assembly time.
pub fn complexity_score(text: &str, options: &[QuestionOption]) -> u8 {
    let mut score = 0u8;

    if text.len() > 200 {
        score += 2;
    } else if text.len() > 100 {
        score += 1;
    }

    if text.contains('$') || text.to_lowercase().contains("equation") {
        score += 2;
    }

    if !options.is_empty() {
        let avg_len =
            options.iter().map(|o| o.text.len()).sum::<usize>() as f64 / options.len() as f64;
        if avg_len > 50.0 {
            score += 1;
        }
    }

    score.min(5)
}

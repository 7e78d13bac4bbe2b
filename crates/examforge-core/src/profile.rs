//! Per-learner performance state and its derivations.
//!
//! A [`PerformanceProfile`] aggregates topic/chapter statistics across every
//! evaluated session, keeps a bounded mistake history and recent-score
//! window, and owns the append-only ledger of question ids the learner has
//! ever been shown. Accuracy is always recomputed from attempts/correct,
//! never stored, so the two can not drift.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::SelectionReason;

/// Accuracy below this marks a topic as weak (percent).
pub const WEAK_ACCURACY_CEILING: f64 = 65.0;
/// Minimum attempts before a topic can be called weak.
pub const WEAK_MIN_ATTEMPTS: u32 = 2;
/// Accuracy below this marks a topic as a mistake pattern (percent).
pub const MISTAKE_ACCURACY_CEILING: f64 = 50.0;
/// Minimum attempts before a topic can be called a mistake pattern.
pub const MISTAKE_MIN_ATTEMPTS: u32 = 3;
/// Bounded mistake history capacity (FIFO).
pub const MISTAKE_HISTORY_CAP: usize = 50;
/// Bounded recent-score window capacity (FIFO).
pub const RECENT_SCORES_CAP: usize = 10;
/// Placeholder recency term in the weak-topic priority formula until a
/// timestamped decay replaces it.
pub const RECENCY_WEIGHT: f64 = 0.8;

/// Map key for a topic-level statistic.
pub fn topic_key(subject: &str, chapter: &str, topic: &str) -> String {
    format!("{subject}:{chapter}:{topic}")
}

/// Map key for a chapter-level statistic.
pub fn chapter_key(subject: &str, chapter: &str) -> String {
    format!("{subject}:{chapter}")
}

/// Attempt/correct counters for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicStat {
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub attempts: u32,
    pub correct: u32,
    #[serde(default)]
    pub last_attempted: Option<DateTime<Utc>>,
}

impl TopicStat {
    /// Accuracy in percent; 0 for an unattempted topic.
    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.attempts) * 100.0
        }
    }
}

/// Attempt/correct counters for one chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterStat {
    pub subject: String,
    pub chapter: String,
    pub attempts: u32,
    pub correct: u32,
}

impl ChapterStat {
    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.attempts) * 100.0
        }
    }
}

/// One incorrectly answered question, kept for pattern-driven selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistakeRecord {
    pub question_id: String,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub submitted: String,
    pub correct_answer: String,
    pub selection_reason: SelectionReason,
    /// First 100 characters of the question text, for similarity queries
    /// when the full record is no longer reachable.
    pub content_preview: String,
}

/// A weak topic with its remediation priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakTopic {
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub accuracy: f64,
    pub attempts: u32,
    pub priority: f64,
}

/// A recurring-error topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistakePattern {
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    pub error_rate: f64,
    pub attempts: u32,
}

/// Score trend over the recent-score window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Spread of the recent-score window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    High,
    Moderate,
    Low,
    Unknown,
}

/// How fast the learner is improving, derived after each evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningVelocity {
    pub trend: Trend,
    /// Current score minus the mean of the two most recent scores.
    pub improvement_rate: f64,
    pub consistency: Consistency,
}

/// Depth of personalization the selector can draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalizationLevel {
    Beginner,
    Moderate,
    High,
}

/// Aggregated performance state for one learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceProfile {
    pub user_id: String,
    /// Topic stats keyed by `subject:chapter:topic`.
    #[serde(default)]
    pub topics: HashMap<String, TopicStat>,
    /// Chapter stats keyed by `subject:chapter`.
    #[serde(default)]
    pub chapters: HashMap<String, ChapterStat>,
    /// Most recent mistakes, oldest first, capacity 50.
    #[serde(default)]
    pub mistake_history: VecDeque<MistakeRecord>,
    /// Every question id ever presented to this learner. Append-only.
    #[serde(default)]
    pub seen_question_ids: HashSet<String>,
    /// Most recent test percentages, oldest first, capacity 10.
    #[serde(default)]
    pub recent_scores: VecDeque<f64>,
    #[serde(default)]
    pub total_tests: u32,
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub velocity: Option<LearningVelocity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PerformanceProfile {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            topics: HashMap::new(),
            chapters: HashMap::new(),
            mistake_history: VecDeque::new(),
            seen_question_ids: HashSet::new(),
            recent_scores: VecDeque::new(),
            total_tests: 0,
            total_score: 0.0,
            velocity: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Weak topics for a subject: accuracy below 65% with at least two
    /// attempts, highest remediation priority first.
    pub fn weak_topics(&self, subject: &str) -> Vec<WeakTopic> {
        let mut weak: Vec<WeakTopic> = self
            .topics
            .values()
            .filter(|stat| {
                stat.subject == subject
                    && stat.attempts >= WEAK_MIN_ATTEMPTS
                    && stat.accuracy() < WEAK_ACCURACY_CEILING
            })
            .map(|stat| WeakTopic {
                subject: stat.subject.clone(),
                chapter: stat.chapter.clone(),
                topic: stat.topic.clone(),
                accuracy: stat.accuracy(),
                attempts: stat.attempts,
                priority: topic_priority(stat.accuracy(), stat.attempts),
            })
            .collect();
        weak.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        weak
    }

    /// Mistake patterns for a subject: accuracy below 50% with at least
    /// three attempts, highest error rate first.
    pub fn mistake_patterns(&self, subject: &str) -> Vec<MistakePattern> {
        let mut patterns: Vec<MistakePattern> = self
            .topics
            .values()
            .filter(|stat| {
                stat.subject == subject
                    && stat.attempts >= MISTAKE_MIN_ATTEMPTS
                    && stat.accuracy() < MISTAKE_ACCURACY_CEILING
            })
            .map(|stat| MistakePattern {
                subject: stat.subject.clone(),
                chapter: stat.chapter.clone(),
                topic: stat.topic.clone(),
                error_rate: 100.0 - stat.accuracy(),
                attempts: stat.attempts,
            })
            .collect();
        patterns.sort_by(|a, b| b.error_rate.total_cmp(&a.error_rate));
        patterns
    }

    /// Most recent mistakes within a subject, newest first.
    pub fn recent_mistakes(&self, subject: &str, limit: usize) -> Vec<&MistakeRecord> {
        self.mistake_history
            .iter()
            .rev()
            .filter(|m| m.subject == subject)
            .take(limit)
            .collect()
    }

    /// Velocity of `current` relative to the two most recent scores.
    /// Consistency is the spread over the window including `current`.
    pub fn learning_velocity(&self, current: f64) -> LearningVelocity {
        let recent: Vec<f64> = self.recent_scores.iter().rev().take(2).copied().collect();
        let improvement_rate = if recent.is_empty() {
            0.0
        } else {
            current - mean(&recent)
        };

        let trend = if recent.is_empty() {
            Trend::Stable
        } else if improvement_rate > 2.0 {
            Trend::Improving
        } else if improvement_rate < -2.0 {
            Trend::Declining
        } else {
            Trend::Stable
        };

        let mut window: Vec<f64> = self.recent_scores.iter().copied().collect();
        window.push(current);

        LearningVelocity {
            trend,
            improvement_rate,
            consistency: consistency(&window),
        }
    }

    /// Mark question ids as presented. The ledger only ever grows.
    pub fn record_seen<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.seen_question_ids.insert(id.into());
        }
        self.updated_at = Utc::now();
    }

    /// Append a test percentage, evicting the oldest past capacity.
    pub fn push_score(&mut self, score: f64) {
        self.recent_scores.push_back(score);
        while self.recent_scores.len() > RECENT_SCORES_CAP {
            self.recent_scores.pop_front();
        }
    }

    /// Append mistakes, evicting the oldest past capacity.
    pub fn push_mistakes<I>(&mut self, mistakes: I)
    where
        I: IntoIterator<Item = MistakeRecord>,
    {
        self.mistake_history.extend(mistakes);
        while self.mistake_history.len() > MISTAKE_HISTORY_CAP {
            self.mistake_history.pop_front();
        }
    }

    /// Additively merge one topic's counters.
    pub fn absorb_topic(&mut self, incoming: &TopicStat) {
        let key = topic_key(&incoming.subject, &incoming.chapter, &incoming.topic);
        let entry = self.topics.entry(key).or_insert_with(|| TopicStat {
            subject: incoming.subject.clone(),
            chapter: incoming.chapter.clone(),
            topic: incoming.topic.clone(),
            attempts: 0,
            correct: 0,
            last_attempted: None,
        });
        entry.attempts += incoming.attempts;
        entry.correct += incoming.correct;
        entry.last_attempted = incoming.last_attempted.or(entry.last_attempted);
    }

    /// Additively merge one chapter's counters.
    pub fn absorb_chapter(&mut self, incoming: &ChapterStat) {
        let key = chapter_key(&incoming.subject, &incoming.chapter);
        let entry = self.chapters.entry(key).or_insert_with(|| ChapterStat {
            subject: incoming.subject.clone(),
            chapter: incoming.chapter.clone(),
            attempts: 0,
            correct: 0,
        });
        entry.attempts += incoming.attempts;
        entry.correct += incoming.correct;
    }

    pub fn average_score(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.total_score / f64::from(self.total_tests)
        }
    }

    /// How much history the selector has to personalize from.
    pub fn personalization_level(&self) -> PersonalizationLevel {
        let weak_count = self
            .topics
            .values()
            .filter(|stat| {
                stat.attempts >= WEAK_MIN_ATTEMPTS && stat.accuracy() < WEAK_ACCURACY_CEILING
            })
            .count();
        if weak_count == 0 {
            PersonalizationLevel::Beginner
        } else if weak_count < 5 {
            PersonalizationLevel::Moderate
        } else {
            PersonalizationLevel::High
        }
    }
}

/// Priority score for topic remediation: lower accuracy and better-attested
/// weakness rank higher. The recency term is a fixed constant for now.
fn topic_priority(accuracy: f64, attempts: u32) -> f64 {
    let accuracy_score = (100.0 - accuracy) / 100.0;
    let attempt_score = (f64::from(attempts) / 10.0).min(1.0);
    accuracy_score * 0.5 + attempt_score * 0.3 + RECENCY_WEIGHT * 0.2
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation against the 5 / 15 thresholds; fewer than
/// three samples is not enough to judge.
fn consistency(scores: &[f64]) -> Consistency {
    if scores.len() < 3 {
        return Consistency::Unknown;
    }
    let m = mean(scores);
    let var = scores.iter().map(|s| (s - m) * (s - m)).sum::<f64>() / (scores.len() - 1) as f64;
    let std_dev = var.sqrt();

    if std_dev < 5.0 {
        Consistency::High
    } else if std_dev < 15.0 {
        Consistency::Moderate
    } else {
        Consistency::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(subject: &str, topic: &str, attempts: u32, correct: u32) -> TopicStat {
        TopicStat {
            subject: subject.into(),
            chapter: "Ch".into(),
            topic: topic.into(),
            attempts,
            correct,
            last_attempted: None,
        }
    }

    fn profile_with(stats: Vec<TopicStat>) -> PerformanceProfile {
        let mut profile = PerformanceProfile::new("u1");
        for s in stats {
            profile.absorb_topic(&s);
        }
        profile
    }

    #[test]
    fn accuracy_is_recomputed() {
        let mut s = stat("Physics", "Optics", 4, 1);
        assert!((s.accuracy() - 25.0).abs() < f64::EPSILON);
        s.attempts += 4;
        s.correct += 4;
        assert!((s.accuracy() - 62.5).abs() < f64::EPSILON);
    }

    #[test]
    fn weak_topics_filter_and_order() {
        let profile = profile_with(vec![
            stat("Physics", "Optics", 4, 1),        // 25%, weak
            stat("Physics", "Waves", 10, 5),        // 50%, weak, more attempts
            stat("Physics", "Units", 10, 9),        // 90%, strong
            stat("Physics", "Gravitation", 1, 0),   // 1 attempt, below threshold
            stat("Chemistry", "Bonding", 4, 0),     // other subject
        ]);

        let weak = profile.weak_topics("Physics");
        let names: Vec<&str> = weak.iter().map(|w| w.topic.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Optics"));
        assert!(names.contains(&"Waves"));
        // 25% with 4 attempts outranks 50% with 10 attempts:
        // 0.375+0.12+0.16 = 0.655 vs 0.25+0.3+0.16 = 0.71, so Waves first.
        assert_eq!(weak[0].topic, "Waves");
    }

    #[test]
    fn mistake_patterns_need_three_attempts() {
        let profile = profile_with(vec![
            stat("Physics", "Optics", 2, 0),  // only 2 attempts
            stat("Physics", "Waves", 4, 1),   // 25% over 4 attempts
        ]);
        let patterns = profile.mistake_patterns("Physics");
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].topic, "Waves");
        assert!((patterns[0].error_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn velocity_improving_and_declining() {
        let mut profile = PerformanceProfile::new("u1");
        profile.push_score(50.0);
        profile.push_score(52.0);

        let up = profile.learning_velocity(60.0);
        assert_eq!(up.trend, Trend::Improving);
        assert!((up.improvement_rate - 9.0).abs() < f64::EPSILON);

        let down = profile.learning_velocity(40.0);
        assert_eq!(down.trend, Trend::Declining);

        let flat = profile.learning_velocity(51.5);
        assert_eq!(flat.trend, Trend::Stable);
    }

    #[test]
    fn consistency_thresholds() {
        assert_eq!(consistency(&[70.0, 71.0, 69.0]), Consistency::High);
        assert_eq!(consistency(&[50.0, 60.0, 70.0]), Consistency::Moderate);
        assert_eq!(consistency(&[20.0, 60.0, 90.0]), Consistency::Low);
        assert_eq!(consistency(&[50.0, 60.0]), Consistency::Unknown);
    }

    #[test]
    fn seen_ledger_never_shrinks() {
        let mut profile = PerformanceProfile::new("u1");
        profile.record_seen(["q1", "q2"]);
        profile.record_seen(["q2", "q3"]);
        assert_eq!(profile.seen_question_ids.len(), 3);
    }

    #[test]
    fn bounded_buffers_evict_oldest() {
        let mut profile = PerformanceProfile::new("u1");
        for i in 0..15 {
            profile.push_score(f64::from(i));
        }
        assert_eq!(profile.recent_scores.len(), RECENT_SCORES_CAP);
        assert_eq!(*profile.recent_scores.front().unwrap(), 5.0);

        let mistake = |i: u32| MistakeRecord {
            question_id: format!("q{i}"),
            subject: "Physics".into(),
            chapter: "Ch".into(),
            topic: "T".into(),
            submitted: "A".into(),
            correct_answer: "B".into(),
            selection_reason: crate::model::SelectionReason::GeneralCoverage,
            content_preview: String::new(),
        };
        profile.push_mistakes((0..60).map(mistake));
        assert_eq!(profile.mistake_history.len(), MISTAKE_HISTORY_CAP);
        assert_eq!(profile.mistake_history.front().unwrap().question_id, "q10");
    }

    #[test]
    fn absorb_topic_is_additive() {
        let mut profile = PerformanceProfile::new("u1");
        profile.absorb_topic(&stat("Physics", "Optics", 3, 1));
        profile.absorb_topic(&stat("Physics", "Optics", 2, 2));
        let merged = profile
            .topics
            .get(&topic_key("Physics", "Ch", "Optics"))
            .unwrap();
        assert_eq!(merged.attempts, 5);
        assert_eq!(merged.correct, 3);
    }

    #[test]
    fn personalization_level_tiers() {
        let none = profile_with(vec![stat("Physics", "Units", 10, 9)]);
        assert_eq!(none.personalization_level(), PersonalizationLevel::Beginner);

        let some = profile_with(vec![stat("Physics", "Optics", 4, 1)]);
        assert_eq!(some.personalization_level(), PersonalizationLevel::Moderate);

        let many = profile_with(
            (0..6)
                .map(|i| stat("Physics", &format!("T{i}"), 4, 0))
                .collect(),
        );
        assert_eq!(many.personalization_level(), PersonalizationLevel::High);
    }
}

//! Adaptive test assembly.
//!
//! Composes the question source and a learner's profile into a
//! repetition-free, quota-partitioned test: a weak-topic tranche, a
//! mistake-similarity tranche, and a chapter-diverse general-coverage
//! tranche, interleaved by complexity so difficulty never ramps
//! monotonically.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExamError;
use crate::model::{
    ExamType, Question, SelectionReason, SessionEntry, SessionStatus, TestSession,
};
use crate::profile::PerformanceProfile;
use crate::traits::{QuestionSource, SearchRequest};

/// Configuration for the adaptive selector.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Hard cap on questions per test.
    pub max_questions: usize,
    /// Share of each subject's quota drawn from weak topics.
    pub weak_fraction: f64,
    /// Share of each subject's quota drawn from mistake similarity.
    pub mistake_fraction: f64,
    /// How many weak topics to target per subject.
    pub weak_topic_limit: usize,
    /// How many recent mistakes to seed similarity queries from.
    pub mistake_limit: usize,
    /// Fixed RNG seed for deterministic assembly (tests).
    pub rng_seed: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_questions: 90,
            weak_fraction: 0.6,
            mistake_fraction: 0.25,
            weak_topic_limit: 3,
            mistake_limit: 3,
            rng_seed: None,
        }
    }
}

/// A request to assemble one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub user_id: String,
    pub exam_type: ExamType,
    pub total_questions: usize,
    pub subjects: Vec<String>,
}

/// One selected question with its provenance tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedQuestion {
    pub question: Question,
    pub selection_reason: SelectionReason,
}

/// Proof-of-work section of the selection response: how the non-repetition
/// invariant held up for this assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetitionGuarantee {
    pub total: usize,
    pub unique: usize,
    pub previously_seen: usize,
    pub repetition_free: bool,
}

/// An assembled test plus its recorded session.
#[derive(Debug, Clone)]
pub struct SelectionResponse {
    pub session: TestSession,
    pub questions: Vec<SelectedQuestion>,
    pub guarantee: RepetitionGuarantee,
}

/// The adaptive selector. Holds an injected question source; per-call state
/// lives on the stack, so one instance serves all users.
pub struct AdaptiveSelector {
    source: Arc<dyn QuestionSource>,
    config: SelectorConfig,
}

impl AdaptiveSelector {
    pub fn new(source: Arc<dyn QuestionSource>, config: SelectorConfig) -> Self {
        Self { source, config }
    }

    /// Assemble a test for one learner and record it.
    ///
    /// The seen-question ledger is extended eagerly here, at session
    /// creation: a learner who is shown a paper and never submits it will
    /// still never see those questions again. On exhaustion the test
    /// shrinks rather than failing; only an entirely empty repository is an
    /// error.
    pub async fn select(
        &self,
        profile: &mut PerformanceProfile,
        request: &SelectionRequest,
    ) -> Result<SelectionResponse, ExamError> {
        if request.subjects.is_empty() {
            return Err(ExamError::InvalidRequest("no subjects requested".into()));
        }
        if request.total_questions == 0 {
            return Err(ExamError::InvalidRequest("zero questions requested".into()));
        }
        if self.source.count(request.exam_type).await == 0 {
            return Err(ExamError::RepositoryEmpty(request.exam_type.to_string()));
        }

        let total = request.total_questions.min(self.config.max_questions);
        let quotas = subject_quotas(total, request.subjects.len());
        let previously_seen = profile.seen_question_ids.len();

        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Running exclusion: everything ever seen plus everything chosen in
        // this call.
        let mut exclude: HashSet<String> = profile.seen_question_ids.clone();
        let mut chosen: Vec<SelectedQuestion> = Vec::with_capacity(total);

        for (subject, quota) in request.subjects.iter().zip(quotas) {
            let mut subject_chosen: Vec<SelectedQuestion> = Vec::with_capacity(quota);

            self.fill_weak_tranche(
                profile,
                request.exam_type,
                subject,
                quota,
                &mut exclude,
                &mut subject_chosen,
            )
            .await;

            self.fill_mistake_tranche(
                profile,
                request.exam_type,
                subject,
                quota,
                &mut exclude,
                &mut subject_chosen,
            )
            .await;

            self.fill_general_tranche(
                request.exam_type,
                subject,
                quota,
                &mut exclude,
                &mut subject_chosen,
                &mut rng,
            )
            .await;

            subject_chosen.truncate(quota);
            tracing::debug!(
                subject = %subject,
                selected = subject_chosen.len(),
                quota,
                "subject tranche assembly done"
            );
            chosen.extend(subject_chosen);
        }

        let mut ordered = interleave_by_complexity(chosen, &mut rng);
        ordered.truncate(total);

        let ids: Vec<String> = ordered.iter().map(|s| s.question.id.clone()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        let repetition_free = unique.len() == ids.len()
            && ids.iter().all(|id| !profile.seen_question_ids.contains(id));

        let guarantee = RepetitionGuarantee {
            total: ids.len(),
            unique: unique.len(),
            previously_seen,
            repetition_free,
        };

        let session = TestSession {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            exam_type: request.exam_type,
            subjects: request.subjects.clone(),
            entries: ordered
                .iter()
                .map(|s| SessionEntry {
                    question_id: s.question.id.clone(),
                    selection_reason: s.selection_reason.clone(),
                })
                .collect(),
            created_at: Utc::now(),
            status: SessionStatus::Active,
        };

        // Eager ledger update: shown means seen, submitted or not.
        profile.record_seen(ids);

        tracing::info!(
            user_id = %request.user_id,
            test_id = %session.id,
            questions = guarantee.total,
            previously_seen,
            "assembled test"
        );

        Ok(SelectionResponse { session, questions: ordered, guarantee })
    }

    /// Weak-topic tranche: up to `⌊weak_fraction × quota⌋` questions split
    /// evenly over the learner's top weak topics in this subject.
    async fn fill_weak_tranche(
        &self,
        profile: &PerformanceProfile,
        exam_type: ExamType,
        subject: &str,
        quota: usize,
        exclude: &mut HashSet<String>,
        out: &mut Vec<SelectedQuestion>,
    ) {
        let target = (quota as f64 * self.config.weak_fraction).floor() as usize;
        if target == 0 {
            return;
        }

        let weak = profile.weak_topics(subject);
        let top: Vec<_> = weak.into_iter().take(self.config.weak_topic_limit).collect();
        if top.is_empty() {
            return;
        }

        let per_topic = target / top.len();
        if per_topic == 0 {
            return;
        }

        for weak_topic in &top {
            let request = SearchRequest {
                exam_type: Some(exam_type),
                query: Some(format!("{subject} {}", weak_topic.topic)),
                subject: Some(subject.to_string()),
                exclude_ids: exclude.clone(),
                limit: per_topic,
                ..SearchRequest::default()
            };
            let hits = match self.source.search(&request).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(topic = %weak_topic.topic, "weak-topic search failed: {e:#}");
                    continue;
                }
            };
            for question in hits {
                if !exclude.insert(question.id.clone()) {
                    continue;
                }
                out.push(SelectedQuestion {
                    selection_reason: SelectionReason::WeakTopic(weak_topic.topic.clone()),
                    question,
                });
            }
        }
    }

    /// Mistake tranche: questions semantically close to the learner's most
    /// recent mistakes in this subject.
    async fn fill_mistake_tranche(
        &self,
        profile: &PerformanceProfile,
        exam_type: ExamType,
        subject: &str,
        quota: usize,
        exclude: &mut HashSet<String>,
        out: &mut Vec<SelectedQuestion>,
    ) {
        let target = (quota as f64 * self.config.mistake_fraction).floor() as usize;
        if target == 0 {
            return;
        }

        // Owned copies so the profile borrow ends before the async calls.
        let seeds: Vec<(String, String, String)> = profile
            .recent_mistakes(subject, self.config.mistake_limit)
            .into_iter()
            .map(|m| (m.question_id.clone(), m.topic.clone(), m.content_preview.clone()))
            .collect();

        let mut taken = 0usize;
        for (mistake_id, topic, preview) in seeds {
            if taken >= target {
                break;
            }

            // Query with the mistaken question's own text; fall back to the
            // stored preview if the record has left the repository.
            let query = match self.source.get(exam_type, &mistake_id).await {
                Some(q) => q.text.chars().take(200).collect::<String>(),
                None => preview,
            };
            if query.is_empty() {
                continue;
            }
            exclude.insert(mistake_id);

            let request = SearchRequest {
                exam_type: Some(exam_type),
                query: Some(query),
                subject: Some(subject.to_string()),
                exclude_ids: exclude.clone(),
                limit: target - taken,
                ..SearchRequest::default()
            };
            let hits = match self.source.search(&request).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!("mistake-similarity search failed: {e:#}");
                    continue;
                }
            };
            for question in hits {
                if !exclude.insert(question.id.clone()) {
                    continue;
                }
                out.push(SelectedQuestion {
                    selection_reason: SelectionReason::MistakePattern(topic.clone()),
                    question,
                });
                taken += 1;
            }
        }
    }

    /// General coverage fills whatever the first two tranches left open, so
    /// their shortfalls are backfilled here. Prefers chapter diversity: a
    /// chapter only repeats while fewer than half the open slots are
    /// filled.
    async fn fill_general_tranche(
        &self,
        exam_type: ExamType,
        subject: &str,
        quota: usize,
        exclude: &mut HashSet<String>,
        out: &mut Vec<SelectedQuestion>,
        rng: &mut StdRng,
    ) {
        let remaining = quota.saturating_sub(out.len());
        if remaining == 0 {
            return;
        }

        let request = SearchRequest {
            exam_type: Some(exam_type),
            subject: Some(subject.to_string()),
            exclude_ids: exclude.clone(),
            limit: remaining.saturating_mul(4),
            ..SearchRequest::default()
        };
        let mut pool = match self.source.search(&request).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(subject, "general-coverage lookup failed: {e:#}");
                return;
            }
        };
        if pool.is_empty() {
            tracing::warn!(subject, "no unseen questions left for general coverage");
            return;
        }

        pool.shuffle(rng);

        let mut chapters_used: HashSet<String> = HashSet::new();
        let mut passed_over: Vec<Question> = Vec::new();
        let mut taken = 0usize;
        for question in pool {
            if taken >= remaining {
                break;
            }
            let fresh_chapter = !chapters_used.contains(&question.chapter);
            if !fresh_chapter && taken >= remaining / 2 {
                passed_over.push(question);
                continue;
            }
            if !exclude.insert(question.id.clone()) {
                continue;
            }
            chapters_used.insert(question.chapter.clone());
            out.push(SelectedQuestion {
                selection_reason: SelectionReason::GeneralCoverage,
                question,
            });
            taken += 1;
        }

        // Diversity is a preference, not a cap: top up from the questions
        // the chapter rule passed over before reporting a shortfall.
        for question in passed_over {
            if taken >= remaining {
                break;
            }
            if !exclude.insert(question.id.clone()) {
                continue;
            }
            out.push(SelectedQuestion {
                selection_reason: SelectionReason::GeneralCoverage,
                question,
            });
            taken += 1;
        }
    }
}

/// Split `total` across subjects: integer division, with the remainder
/// granted one extra question each to the first subjects in input order.
fn subject_quotas(total: usize, subjects: usize) -> Vec<usize> {
    let base = total / subjects;
    let remainder = total % subjects;
    (0..subjects)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Partition by complexity, shuffle each bucket, and round-robin
/// easy→medium→hard so the paper neither ramps monotonically nor cliffs.
fn interleave_by_complexity(
    questions: Vec<SelectedQuestion>,
    rng: &mut StdRng,
) -> Vec<SelectedQuestion> {
    let mut easy = Vec::new();
    let mut medium = Vec::new();
    let mut hard = Vec::new();

    for q in questions {
        match q.question.complexity {
            0..=2 => easy.push(q),
            3 => medium.push(q),
            _ => hard.push(q),
        }
    }

    easy.shuffle(rng);
    medium.shuffle(rng);
    hard.shuffle(rng);

    let rounds = easy.len().max(medium.len()).max(hard.len());
    let mut easy = easy.into_iter();
    let mut medium = medium.into_iter();
    let mut hard = hard.into_iter();

    let mut result = Vec::new();
    for _ in 0..rounds {
        if let Some(q) = easy.next() {
            result.push(q);
        }
        if let Some(q) = medium.next() {
            result.push(q);
        }
        if let Some(q) = hard.next() {
            result.push(q);
        }
    }
    result
}

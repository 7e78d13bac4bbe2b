//! The question repository: per-exam-type collections with semantic
//! nearest-neighbor search.
//!
//! Questions are indexed together with an embedding of their text. Search
//! with a query ranks candidates by cosine distance ascending, then
//! post-filters by metadata and the exclusion set; without a query it is an
//! unranked filtered scan. When the embedding backend is unreachable the
//! ranked path degrades to the unranked one; a selection call never fails
//! because of the embedder.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, Semaphore};

use examforge_core::ingest::content_hash;
use examforge_core::model::{ExamType, Question};
use examforge_core::traits::{EmbeddingProvider, QuestionSource, SearchRequest};

use crate::cache::{EmbeddingCache, DEFAULT_CACHE_CEILING};

/// Repository tuning knobs.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Embedding cache ceiling (entries).
    pub cache_ceiling: usize,
    /// Concurrent embedding calls during batch ingestion.
    pub embed_concurrency: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_ceiling: DEFAULT_CACHE_CEILING,
            embed_concurrency: 4,
        }
    }
}

/// One indexed question. A missing embedding means the backend failed at
/// ingestion; the question still serves unranked lookups.
struct IndexedQuestion {
    question: Question,
    embedding: Option<Vec<f32>>,
}

#[derive(Default)]
struct Collection {
    entries: HashMap<String, IndexedQuestion>,
    /// Insertion order, for deterministic unranked scans.
    order: Vec<String>,
}

/// Distribution summary of one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub total_questions: usize,
    pub subjects: Vec<String>,
    pub chapters: Vec<String>,
    pub topics: Vec<String>,
    pub difficulties: Vec<String>,
}

/// In-memory semantic question index. Shared, read-mostly: writes happen at
/// ingestion and cache insertion only.
pub struct QuestionRepository {
    embedder: Arc<dyn EmbeddingProvider>,
    collections: RwLock<HashMap<ExamType, Collection>>,
    cache: Mutex<EmbeddingCache>,
    config: RepositoryConfig,
}

impl QuestionRepository {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: RepositoryConfig) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
            cache: Mutex::new(EmbeddingCache::new(config.cache_ceiling)),
            config,
        }
    }

    /// Index one question. Inserting an id that already exists is a no-op
    /// and leaves cardinality unchanged.
    pub async fn insert(&self, question: Question) -> bool {
        {
            let collections = self.collections.read().await;
            if collections
                .get(&question.exam_type)
                .is_some_and(|c| c.entries.contains_key(&question.id))
            {
                tracing::debug!(id = %question.id, "question already indexed, skipping");
                return false;
            }
        }

        let embedding = self.embed_cached(&question.content_hash, &question.text).await;
        self.store(question, embedding).await;
        true
    }

    /// Index a batch, embedding with bounded concurrency. A record whose
    /// embedding fails is indexed unranked-only; the batch never aborts.
    /// Returns how many records were newly indexed.
    pub async fn insert_batch(&self, questions: Vec<Question>) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.config.embed_concurrency.max(1)));
        let mut futures = FuturesUnordered::new();

        for question in questions {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let embedding =
                    self.embed_cached(&question.content_hash, &question.text).await;
                (question, embedding)
            });
        }

        let mut inserted = 0usize;
        while let Some((question, embedding)) = futures.next().await {
            let exam_type = question.exam_type;
            let fresh = {
                let collections = self.collections.read().await;
                !collections
                    .get(&exam_type)
                    .is_some_and(|c| c.entries.contains_key(&question.id))
            };
            if fresh {
                self.store(question, embedding).await;
                inserted += 1;
            }
        }

        tracing::info!(inserted, "batch ingestion complete");
        inserted
    }

    async fn store(&self, question: Question, embedding: Option<Vec<f32>>) {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(question.exam_type).or_default();
        let id = question.id.clone();
        if collection
            .entries
            .insert(id.clone(), IndexedQuestion { question, embedding })
            .is_none()
        {
            collection.order.push(id);
        }
    }

    /// Embed through the cache; `None` on backend failure.
    async fn embed_cached(&self, key: &str, text: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.cache.lock().await.get(key) {
            return Some(hit.clone());
        }
        match self.embedder.embed(text).await {
            Ok(embedding) => {
                self.cache
                    .lock()
                    .await
                    .insert(key.to_string(), embedding.clone());
                Some(embedding)
            }
            Err(e) => {
                tracing::warn!("embedding backend '{}' failed: {e:#}", self.embedder.name());
                None
            }
        }
    }

    /// Distribution stats for one collection.
    pub async fn stats(&self, exam_type: ExamType) -> CollectionStats {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(&exam_type) else {
            return CollectionStats {
                total_questions: 0,
                subjects: vec![],
                chapters: vec![],
                topics: vec![],
                difficulties: vec![],
            };
        };

        let mut subjects = std::collections::BTreeSet::new();
        let mut chapters = std::collections::BTreeSet::new();
        let mut topics = std::collections::BTreeSet::new();
        let mut difficulties = std::collections::BTreeSet::new();
        for indexed in collection.entries.values() {
            subjects.insert(indexed.question.subject.clone());
            chapters.insert(indexed.question.chapter.clone());
            topics.insert(indexed.question.topic.clone());
            difficulties.insert(indexed.question.difficulty.to_string());
        }

        CollectionStats {
            total_questions: collection.entries.len(),
            subjects: subjects.into_iter().collect(),
            chapters: chapters.into_iter().collect(),
            topics: topics.into_iter().collect(),
            difficulties: difficulties.into_iter().collect(),
        }
    }

    /// Current embedding-cache cardinality.
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    fn matches(question: &Question, request: &SearchRequest) -> bool {
        if request.subject.as_deref().is_some_and(|s| question.subject != s) {
            return false;
        }
        if request.chapter.as_deref().is_some_and(|c| question.chapter != c) {
            return false;
        }
        if request.topic.as_deref().is_some_and(|t| question.topic != t) {
            return false;
        }
        if request.difficulty.is_some_and(|d| question.difficulty != d) {
            return false;
        }
        !request.exclude_ids.contains(&question.id)
    }
}

#[async_trait]
impl QuestionSource for QuestionRepository {
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<Question>> {
        let Some(exam_type) = request.exam_type else {
            anyhow::bail!("search request is missing an exam type");
        };

        // Embed the query up front (cache-keyed by its hash) so the
        // collection lock is not held across the backend call.
        let query_embedding = match &request.query {
            Some(query) => self.embed_cached(&content_hash(query), query).await,
            None => None,
        };
        if request.query.is_some() && query_embedding.is_none() {
            tracing::warn!("semantic ranking unavailable, degrading to filtered lookup");
        }

        let collections = self.collections.read().await;
        let Some(collection) = collections.get(&exam_type) else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        match query_embedding {
            Some(query_vec) => {
                // Ranked path: cosine distance ascending; questions without
                // embeddings rank after every scored one.
                let mut scored: Vec<(f64, &IndexedQuestion)> = Vec::new();
                let mut unscored: Vec<&IndexedQuestion> = Vec::new();
                for id in &collection.order {
                    let indexed = &collection.entries[id];
                    if !Self::matches(&indexed.question, request) {
                        continue;
                    }
                    match indexed
                        .embedding
                        .as_deref()
                        .and_then(|e| cosine_similarity(&query_vec, e))
                    {
                        Some(similarity) => scored.push((1.0 - similarity, indexed)),
                        None => unscored.push(indexed),
                    }
                }
                scored.sort_by(|a, b| a.0.total_cmp(&b.0));
                results.extend(scored.into_iter().map(|(_, i)| i.question.clone()));
                results.extend(unscored.into_iter().map(|i| i.question.clone()));
            }
            None => {
                // Unranked path: insertion order, no relevance implied.
                for id in &collection.order {
                    let indexed = &collection.entries[id];
                    if Self::matches(&indexed.question, request) {
                        results.push(indexed.question.clone());
                    }
                }
            }
        }

        results.truncate(request.limit);
        Ok(results)
    }

    async fn get(&self, exam_type: ExamType, id: &str) -> Option<Question> {
        self.collections
            .read()
            .await
            .get(&exam_type)?
            .entries
            .get(id)
            .map(|i| i.question.clone())
    }

    async fn count(&self, exam_type: ExamType) -> usize {
        self.collections
            .read()
            .await
            .get(&exam_type)
            .map_or(0, |c| c.entries.len())
    }
}

/// Cosine similarity in f64 accumulation; `None` for mismatched or
/// degenerate vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::model::{
        AnswerSpec, Difficulty, PresentationHints, QuestionOption, Variant,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deterministic embedder: letter-frequency vector over a/b/c, so texts
    /// sharing letters land close together.
    struct LetterEmbedder {
        calls: AtomicU32,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self { calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn name(&self) -> &str {
            "letters"
        }

        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let count = |c: char| text.chars().filter(|&x| x == c).count() as f32;
            Ok(vec![count('a') + 1e-3, count('b'), count('c')])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("backend unreachable")
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn question(id: &str, text: &str, subject: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.into(),
            text: text.into(),
            options: vec![
                QuestionOption { id: "A".into(), text: "a".into() },
                QuestionOption { id: "B".into(), text: "b".into() },
                QuestionOption { id: "C".into(), text: "c".into() },
                QuestionOption { id: "D".into(), text: "d".into() },
            ],
            answer_spec: AnswerSpec::Single { option: "A".into() },
            subject: subject.into(),
            chapter: "Chapter".into(),
            topic: "Topic".into(),
            difficulty,
            marks: 4.0,
            negative_marks: 1.0,
            variant: Variant::SingleChoice,
            hints: PresentationHints::default(),
            exam_type: ExamType::JeeMain,
            year: None,
            explanation: String::new(),
            content_hash: content_hash(text),
            complexity: 3,
            topic_keywords: vec![],
        }
    }

    fn repo(embedder: Arc<dyn EmbeddingProvider>) -> QuestionRepository {
        QuestionRepository::new(embedder, RepositoryConfig::default())
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let repository = repo(Arc::new(LetterEmbedder::new()));
        let q = question("q1", "aaa", "Physics", Difficulty::Easy);
        assert!(repository.insert(q.clone()).await);
        assert!(!repository.insert(q).await);
        assert_eq!(repository.count(ExamType::JeeMain).await, 1);
    }

    #[tokio::test]
    async fn ranked_search_orders_by_similarity() {
        let repository = repo(Arc::new(LetterEmbedder::new()));
        repository.insert(question("far", "cccccc", "Physics", Difficulty::Easy)).await;
        repository.insert(question("near", "aaab", "Physics", Difficulty::Easy)).await;
        repository.insert(question("exact", "aaaa", "Physics", Difficulty::Easy)).await;

        let request = SearchRequest {
            query: Some("aaaa".into()),
            ..SearchRequest::for_exam(ExamType::JeeMain, 2)
        };
        let hits = repository.search(&request).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
    }

    #[tokio::test]
    async fn metadata_filter_and_exclusion() {
        let repository = repo(Arc::new(LetterEmbedder::new()));
        repository.insert(question("p1", "aaa", "Physics", Difficulty::Easy)).await;
        repository.insert(question("p2", "aab", "Physics", Difficulty::Hard)).await;
        repository.insert(question("c1", "abc", "Chemistry", Difficulty::Easy)).await;

        let mut request = SearchRequest::for_exam(ExamType::JeeMain, 10);
        request.subject = Some("Physics".into());
        request.exclude_ids.insert("p1".into());
        let hits = repository.search(&request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p2");

        request.difficulty = Some(Difficulty::Easy);
        let none = repository.search(&request).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn failing_embedder_degrades_to_filtered_lookup() {
        let repository = repo(Arc::new(FailingEmbedder));
        repository.insert(question("q1", "aaa", "Physics", Difficulty::Easy)).await;
        repository.insert(question("q2", "bbb", "Physics", Difficulty::Easy)).await;

        let request = SearchRequest {
            query: Some("aaa".into()),
            subject: Some("Physics".into()),
            ..SearchRequest::for_exam(ExamType::JeeMain, 10)
        };
        // No error, both questions reachable despite the dead backend.
        let hits = repository.search(&request).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn embedding_cache_hits_skip_backend() {
        let embedder = Arc::new(LetterEmbedder::new());
        let repository = repo(Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>);

        // Same text → same content hash → one backend call.
        repository.insert(question("q1", "shared text", "Physics", Difficulty::Easy)).await;
        repository.insert(question("q2", "shared text", "Physics", Difficulty::Easy)).await;
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 1);
        assert_eq!(repository.cache_len().await, 1);
    }

    #[tokio::test]
    async fn cache_prunes_past_ceiling() {
        let repository = QuestionRepository::new(
            Arc::new(LetterEmbedder::new()),
            RepositoryConfig { cache_ceiling: 8, embed_concurrency: 2 },
        );
        let batch: Vec<Question> = (0..9)
            .map(|i| question(&format!("q{i}"), &format!("text {i} {}", "a".repeat(i)), "Physics", Difficulty::Easy))
            .collect();
        repository.insert_batch(batch).await;
        // 9th distinct text crossed the ceiling of 8: 8 / 4 = 2 survivors.
        assert_eq!(repository.cache_len().await, 2);
        // All questions remain indexed regardless of cache pruning.
        assert_eq!(repository.count(ExamType::JeeMain).await, 9);
    }

    #[tokio::test]
    async fn batch_with_failing_embedder_indexes_everything() {
        let repository = repo(Arc::new(FailingEmbedder));
        let batch: Vec<Question> = (0..5)
            .map(|i| question(&format!("q{i}"), &format!("text {i}"), "Physics", Difficulty::Easy))
            .collect();
        let inserted = repository.insert_batch(batch).await;
        assert_eq!(inserted, 5);
        assert_eq!(repository.count(ExamType::JeeMain).await, 5);
    }

    #[tokio::test]
    async fn stats_reflect_distribution() {
        let repository = repo(Arc::new(LetterEmbedder::new()));
        repository.insert(question("q1", "aaa", "Physics", Difficulty::Easy)).await;
        repository.insert(question("q2", "bbb", "Chemistry", Difficulty::Hard)).await;

        let stats = repository.stats(ExamType::JeeMain).await;
        assert_eq!(stats.total_questions, 2);
        assert_eq!(stats.subjects, vec!["Chemistry".to_string(), "Physics".to_string()]);
        assert_eq!(stats.difficulties, vec!["easy".to_string(), "hard".to_string()]);

        let empty = repository.stats(ExamType::Neet).await;
        assert_eq!(empty.total_questions, 0);
    }

    #[test]
    fn cosine_similarity_edge_cases() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() > 0.999);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }
}

//! Mock providers for testing without real backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use examforge_core::analysis::{fallback_analysis, AnalysisReport, PerformanceSummary};
use examforge_core::traits::{AnalysisProvider, EmbeddingProvider};

/// A mock embedding provider: letter-frequency vectors, optional failure
/// mode, call counting.
pub struct MockEmbeddingProvider {
    dimension: usize,
    fail: bool,
    call_count: AtomicU32,
    last_text: Mutex<Option<String>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(4),
            fail: false,
            call_count: AtomicU32::new(0),
            last_text: Mutex::new(None),
        }
    }

    /// A mock that fails every call, for degraded-path tests.
    pub fn failing() -> Self {
        Self {
            dimension: 4,
            fail: true,
            call_count: AtomicU32::new(0),
            last_text: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_text.lock().unwrap() = Some(text.to_string());

        if self.fail {
            anyhow::bail!("mock embedder configured to fail");
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[(byte as usize + i) % self.dimension] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A mock analysis provider: returns the deterministic fallback shape under
/// its own model name, or fails on demand.
pub struct MockAnalysisProvider {
    fail: bool,
    call_count: AtomicU32,
}

impl MockAnalysisProvider {
    pub fn new() -> Self {
        Self {
            fail: false,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for MockAnalysisProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(&self, summary: &PerformanceSummary) -> anyhow::Result<AnalysisReport> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            anyhow::bail!("mock analyzer configured to fail");
        }
        let mut report = fallback_analysis(summary);
        report.metadata.model = "mock-analyst".to_string();
        Ok(report)
    }
}

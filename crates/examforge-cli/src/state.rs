//! CLI state handling: config resolution, the JSON state directory, and
//! repository construction from a question bank.
//!
//! Layout of the state directory:
//! - `profiles.json`: every learner profile
//! - `sessions/<test-id>.json`: one file per generated session

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use examforge_core::ingest::{ingest_records, load_bank_dir, load_bank_file, ValidationWarning};
use examforge_core::model::{ExamType, TestSession};
use examforge_core::profile::PerformanceProfile;
use examforge_core::store::{MemoryStore, StoreSnapshot};
use examforge_index::{QuestionRepository, RepositoryConfig};
use examforge_providers::{create_embedder, load_config_from, ExamforgeConfig};

pub struct CliContext {
    pub config: ExamforgeConfig,
    pub state_dir: PathBuf,
}

impl CliContext {
    pub fn new(config_path: Option<&Path>, state_override: Option<PathBuf>) -> Result<Self> {
        let config = load_config_from(config_path)?;
        let state_dir = state_override.unwrap_or_else(|| config.state_dir.clone());
        Ok(Self { config, state_dir })
    }

    /// Exam type for records that do not declare one: the `--exam` flag
    /// when given, otherwise the configured default.
    pub fn default_exam(&self, flag: Option<String>) -> Result<ExamType> {
        let name = flag.unwrap_or_else(|| self.config.default_exam.clone());
        name.parse()
            .map_err(|e: String| anyhow::anyhow!("{e}"))
    }

    /// Rebuild the store from the state directory (empty when absent).
    pub fn load_store(&self) -> Result<MemoryStore> {
        let mut snapshot = StoreSnapshot::default();

        let profiles_path = self.state_dir.join("profiles.json");
        if profiles_path.exists() {
            let content = std::fs::read_to_string(&profiles_path)
                .with_context(|| format!("failed to read {}", profiles_path.display()))?;
            snapshot.profiles = serde_json::from_str::<Vec<PerformanceProfile>>(&content)
                .context("failed to parse profiles.json")?;
        }

        let sessions_dir = self.state_dir.join("sessions");
        if sessions_dir.is_dir() {
            for entry in std::fs::read_dir(&sessions_dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    match serde_json::from_str::<TestSession>(&content) {
                        Ok(session) => snapshot.sessions.push(session),
                        Err(e) => tracing::warn!("skipping {}: {e}", path.display()),
                    }
                }
            }
        }

        Ok(MemoryStore::from_snapshot(snapshot))
    }

    /// Persist the store back to the state directory.
    pub async fn save_store(&self, store: &MemoryStore) -> Result<()> {
        let snapshot = store.snapshot().await;

        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("failed to create {}", self.state_dir.display()))?;
        let profiles_path = self.state_dir.join("profiles.json");
        std::fs::write(
            &profiles_path,
            serde_json::to_string_pretty(&snapshot.profiles)?,
        )
        .with_context(|| format!("failed to write {}", profiles_path.display()))?;

        let sessions_dir = self.state_dir.join("sessions");
        std::fs::create_dir_all(&sessions_dir)?;
        for session in &snapshot.sessions {
            let path = sessions_dir.join(format!("{}.json", session.id));
            std::fs::write(&path, serde_json::to_string_pretty(session)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        Ok(())
    }

    /// Load a bank and index it into a fresh repository.
    pub async fn build_repository(&self, bank: &Path, default_exam: ExamType) -> Result<BankLoad> {
        let records = if bank.is_dir() {
            load_bank_dir(bank)?
        } else {
            load_bank_file(bank)?
        };

        let report = ingest_records(records, default_exam);
        let admitted = report.admitted();
        let repository = Arc::new(QuestionRepository::new(
            create_embedder(&self.config.embedding),
            RepositoryConfig::default(),
        ));
        repository.insert_batch(report.questions).await;

        Ok(BankLoad {
            repository,
            admitted,
            warnings: report.warnings,
        })
    }
}

/// A bank loaded into a fresh repository.
pub struct BankLoad {
    pub repository: Arc<QuestionRepository>,
    pub admitted: usize,
    pub warnings: Vec<ValidationWarning>,
}

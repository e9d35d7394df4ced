//! The persistence collaborator contract.
//!
//! The pipeline never holds cross-entity shared mutable state; all
//! coordination happens by re-reading the entity's persisted state
//! through this trait. The sole concurrency control is
//! re-read-before-write at the start of each lint continuation.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! local runs. Production deployments plug a relational store in behind
//! the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::id::ApiId;
use crate::model::{ApiEntity, ArtifactRecord, LintResult};

/// Storage contract for catalog entities, artifacts, and lint history.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from
/// detached lint continuations and the refresh scheduler.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Reads an entity by ID. Used for the change gate and for
    /// re-verification inside the lint continuation.
    async fn get_api(&self, id: ApiId) -> Result<Option<ApiEntity>>;

    /// Lists every known entity ID. Drives the daily refresh pass.
    async fn list_api_ids(&self) -> Result<Vec<ApiId>>;

    /// Inserts or updates an entity's descriptive fields and fingerprint.
    async fn upsert_api(&self, entity: ApiEntity) -> Result<()>;

    /// Replaces the entity's whole artifact matrix.
    async fn replace_artifacts(&self, id: ApiId, artifacts: Vec<ArtifactRecord>) -> Result<()>;

    /// Returns the entity's current artifact set.
    async fn artifacts(&self, id: ApiId) -> Result<Vec<ArtifactRecord>>;

    /// Appends an immutable lint result and updates the entity's current
    /// score in the same operation.
    async fn append_lint_result(&self, result: LintResult, score: u8) -> Result<()>;

    /// Returns the entity's lint history, oldest first.
    async fn lint_results(&self, id: ApiId) -> Result<Vec<LintResult>>;
}

/// Internal store state protected by a single lock.
#[derive(Debug, Default)]
struct StoreState {
    apis: HashMap<ApiId, ApiEntity>,
    artifacts: HashMap<ApiId, Vec<ArtifactRecord>>,
    lint_results: HashMap<ApiId, Vec<LintResult>>,
}

/// In-memory catalog store for tests and local runs.
///
/// ## Limitations
///
/// - **NOT suitable for production**: No persistence, no distribution
/// - **Single-process only**: State is not visible across process boundaries
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    fail_writes: AtomicBool,
}

/// Converts a lock poison error to a persistence error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::persistence("catalog store lock poisoned")
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a persistence error.
    ///
    /// Lets tests exercise the continuation's abort-without-retry path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("store unavailable (injected failure)"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_api(&self, id: ApiId) -> Result<Option<ApiEntity>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.apis.get(&id).cloned())
    }

    async fn list_api_ids(&self) -> Result<Vec<ApiId>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut ids: Vec<ApiId> = state.apis.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn upsert_api(&self, entity: ApiEntity) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().map_err(poison_err)?;
        state.apis.insert(entity.id, entity);
        Ok(())
    }

    async fn replace_artifacts(&self, id: ApiId, artifacts: Vec<ArtifactRecord>) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().map_err(poison_err)?;
        state.artifacts.insert(id, artifacts);
        Ok(())
    }

    async fn artifacts(&self, id: ApiId) -> Result<Vec<ArtifactRecord>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.artifacts.get(&id).cloned().unwrap_or_default())
    }

    async fn append_lint_result(&self, result: LintResult, score: u8) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().map_err(poison_err)?;
        let api_id = result.api_id;
        let Some(entity) = state.apis.get_mut(&api_id) else {
            return Err(Error::not_found("api", api_id));
        };
        entity.score = Some(score);
        entity.updated_at = result.created_at;
        state.lint_results.entry(api_id).or_default().push(result);
        Ok(())
    }

    async fn lint_results(&self, id: ApiId) -> Result<Vec<LintResult>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.lint_results.get(&id).cloned().unwrap_or_default())
    }
}

//! Pipeline entry points and the change gate.
//!
//! Registration and refresh both funnel through [`IngestPipeline::apply`]:
//! fetch, validate, fingerprint, then compare against the stored
//! fingerprint. Equal fingerprints terminate with no writes and no
//! dispatch — the dominant steady-state path. A changed fingerprint
//! persists descriptive fields, replaces the artifact matrix, stores the
//! new fingerprint, and hands linting to the dispatcher.

use std::sync::Arc;

use canopy_core::clock::Clock;
use canopy_core::error::{Error, Result};
use canopy_core::fingerprint::Fingerprint;
use canopy_core::id::ApiId;
use canopy_core::model::{ApiEntity, Provenance, SpecDocument};
use canopy_core::observability::pipeline_span;
use canopy_core::store::CatalogStore;
use tracing::Instrument;

use crate::artifacts;
use crate::dispatch::spawn_detached;
use crate::document;
use crate::fetch::{RegistrationPayload, SourceFetcher, SpecSource};
use crate::lint::{self, LintRunner};

/// How the lint stage is executed after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LintMode {
    /// Fire-and-forget on a detached task (request path).
    Detached,
    /// Awaited inline (scheduler pass, already off any request path).
    Synchronous,
}

/// Outcome of a registration or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The fingerprint matched the stored one; nothing was written.
    Unchanged,
    /// The spec changed; artifacts were replaced and linting initiated.
    Updated {
        /// The newly stored fingerprint.
        fingerprint: Fingerprint,
    },
}

/// The ingestion pipeline with its injected collaborators.
pub struct IngestPipeline {
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn SourceFetcher>,
    runner: Arc<dyn LintRunner>,
    clock: Arc<dyn Clock>,
}

impl IngestPipeline {
    /// Creates a pipeline over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn SourceFetcher>,
        runner: Arc<dyn LintRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            fetcher,
            runner,
            clock,
        }
    }

    /// Registers or updates an API from an inbound payload.
    ///
    /// Runs synchronously through the change gate under the caller's
    /// cancellation context; linting is dispatched detached and never
    /// blocks the caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSource` for fetch/parse/validation
    /// failures, `Error::Conversion` when an artifact cannot round-trip,
    /// and `Error::Persistence` when the store rejects the writes.
    pub async fn register(
        &self,
        api_id: ApiId,
        payload: &RegistrationPayload,
    ) -> Result<RegistrationOutcome> {
        let span = pipeline_span("register", &api_id.to_string());
        async {
            let source = SpecSource::from_payload(payload)?;
            let doc = document::build_document(self.fetcher.as_ref(), &source).await?;

            let source_url = match &source {
                SpecSource::Url(url) => Some(url.clone()),
                SpecSource::Inline(_) => None,
            };
            self.apply(
                api_id,
                payload.name.clone(),
                payload.description.clone(),
                source_url,
                &doc,
                LintMode::Detached,
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// Re-runs the pipeline for an already-registered entity.
    ///
    /// Used by the daily refresh pass. Remote sources are refetched so
    /// silent upstream drift is detected; inline registrations are
    /// re-validated from their stored original artifact. Linting runs
    /// synchronously inside the pass.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown entity, plus everything
    /// [`IngestPipeline::register`] can return.
    pub async fn refresh(&self, api_id: ApiId) -> Result<RegistrationOutcome> {
        let span = pipeline_span("refresh", &api_id.to_string());
        async {
            let Some(entity) = self.store.get_api(api_id).await? else {
                return Err(Error::not_found("api", api_id));
            };

            let source = match &entity.source_url {
                Some(url) => SpecSource::Url(url.clone()),
                None => SpecSource::Inline(self.stored_original_body(api_id).await?),
            };
            let doc = document::build_document(self.fetcher.as_ref(), &source).await?;

            self.apply(
                api_id,
                entity.name,
                entity.description,
                entity.source_url,
                &doc,
                LintMode::Synchronous,
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// The change gate and everything behind it.
    async fn apply(
        &self,
        api_id: ApiId,
        name: String,
        description: Option<String>,
        source_url: Option<String>,
        doc: &SpecDocument,
        mode: LintMode,
    ) -> Result<RegistrationOutcome> {
        let fingerprint = doc.fingerprint();
        let existing = self.store.get_api(api_id).await?;

        if let Some(existing) = &existing {
            if existing.fingerprint.as_ref() == Some(&fingerprint) {
                tracing::debug!(api_id = %api_id, "fingerprint unchanged, skipping");
                return Ok(RegistrationOutcome::Unchanged);
            }
        }

        // Build the whole matrix before the first write so a conversion
        // failure aborts the registration without leaving partial state.
        let now = self.clock.now_utc();
        let records = artifacts::build_matrix(api_id, doc, now)?;

        // Write order: descriptive fields, then artifacts, fingerprint
        // last. The fingerprint is the commit point the change gate reads;
        // a failure anywhere earlier leaves the old fingerprint in place
        // so a retry or the daily sweep re-runs the whole change.
        let mut entity = ApiEntity {
            id: api_id,
            name,
            description,
            source_url,
            fingerprint: existing.as_ref().and_then(|e| e.fingerprint.clone()),
            score: existing.as_ref().and_then(|e| e.score),
            created_at: existing.as_ref().map_or(now, |e| e.created_at),
            updated_at: now,
        };
        self.store.upsert_api(entity.clone()).await?;
        self.store.replace_artifacts(api_id, records).await?;
        entity.fingerprint = Some(fingerprint.clone());
        self.store.upsert_api(entity).await?;

        tracing::info!(
            api_id = %api_id,
            fingerprint = %fingerprint,
            version = %doc.version,
            "spec change persisted"
        );

        match mode {
            LintMode::Detached => {
                let store = Arc::clone(&self.store);
                let runner = Arc::clone(&self.runner);
                let clock = Arc::clone(&self.clock);
                let expected = fingerprint.clone();
                spawn_detached("lint", async move {
                    lint::run_continuation(store, runner, clock, api_id, expected).await
                });
            }
            LintMode::Synchronous => {
                let outcome = lint::run_continuation(
                    Arc::clone(&self.store),
                    Arc::clone(&self.runner),
                    Arc::clone(&self.clock),
                    api_id,
                    fingerprint.clone(),
                )
                .await;
                if let Err(error) = outcome {
                    tracing::warn!(api_id = %api_id, error = %error, "inline lint failed");
                }
            }
        }

        Ok(RegistrationOutcome::Updated { fingerprint })
    }

    /// Loads the stored original artifact's bytes as text.
    async fn stored_original_body(&self, api_id: ApiId) -> Result<String> {
        let records = self.store.artifacts(api_id).await?;
        let original = records
            .into_iter()
            .find(|r| r.provenance == Provenance::Original)
            .ok_or_else(|| Error::not_found("original artifact", api_id))?;
        String::from_utf8(original.content.to_vec())
            .map_err(|_| Error::invalid_source("stored original artifact is not UTF-8"))
    }
}

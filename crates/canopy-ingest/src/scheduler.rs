//! Daily refresh scheduler.
//!
//! A long-running loop that alternates between two states: waiting for
//! the next local-time trigger, and running a refresh pass over every
//! catalogued API. A pass is time-capped; overruns are abandoned and the
//! loop returns to waiting for the next day's trigger. Trigger times that
//! elapse mid-pass are not queued — at most one pass per trigger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDateTime, NaiveTime};
use tokio::sync::watch;

use canopy_core::clock::Clock;
use canopy_core::observability::sweep_span;
use canopy_core::store::CatalogStore;
use tracing::Instrument;

use crate::config::SchedulerConfig;
use crate::pipeline::{IngestPipeline, RegistrationOutcome};

/// Computes the next trigger instant at or after `now`.
///
/// If today's trigger time has not yet passed (including exactly now),
/// it is today's; otherwise tomorrow's.
#[must_use]
pub fn next_trigger(now: NaiveDateTime, trigger: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(trigger);
    if now <= today {
        today
    } else {
        today
            .checked_add_days(Days::new(1))
            .unwrap_or(today)
    }
}

/// Counts gathered over one refresh pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Entities whose spec changed and were re-ingested.
    pub refreshed: usize,
    /// Entities whose fingerprint was unchanged.
    pub unchanged: usize,
    /// Entities whose refresh returned an error.
    pub failed: usize,
}

/// The daily refresh loop.
pub struct RefreshScheduler {
    pipeline: Arc<IngestPipeline>,
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    pass_counter: u64,
}

impl RefreshScheduler {
    /// Creates a scheduler over the given pipeline and store.
    #[must_use]
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        store: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            clock,
            config,
            pass_counter: 0,
        }
    }

    /// Runs the scheduler until `shutdown` flips to `true`.
    ///
    /// Each iteration sleeps until the next trigger, then runs one pass
    /// capped at the configured pass timeout. Shutdown is observed while
    /// waiting and between entities during a pass.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.clock.now_local();
            let trigger = next_trigger(now, self.config.trigger);
            let delay = (trigger - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            tracing::info!(
                next_trigger = %trigger,
                delay_secs = delay.as_secs(),
                "scheduler waiting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("scheduler shutting down");
                        return;
                    }
                    continue;
                }
            }

            self.pass_counter += 1;
            let pass = self.pass_counter;
            let cap = Duration::from_secs(self.config.pass_timeout_secs);
            let outcome = tokio::time::timeout(
                cap,
                self.run_pass(&shutdown).instrument(sweep_span(pass)),
            )
            .await;
            match outcome {
                Ok(summary) => {
                    tracing::info!(
                        pass,
                        refreshed = summary.refreshed,
                        unchanged = summary.unchanged,
                        failed = summary.failed,
                        "refresh pass complete"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        pass,
                        cap_secs = cap.as_secs(),
                        "refresh pass exceeded its time cap, abandoned"
                    );
                }
            }

            if *shutdown.borrow() {
                tracing::info!("scheduler shutting down");
                return;
            }
        }
    }

    /// Refreshes every catalogued entity once.
    ///
    /// A failing entity is logged and skipped; the pass keeps going.
    async fn run_pass(&self, shutdown: &watch::Receiver<bool>) -> PassSummary {
        let ids = match self.store.list_api_ids().await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::error!(error = %error, "could not list apis for refresh pass");
                return PassSummary::default();
            }
        };

        let mut summary = PassSummary::default();
        for api_id in ids {
            if *shutdown.borrow() {
                tracing::info!("refresh pass interrupted by shutdown");
                break;
            }
            match self.pipeline.refresh(api_id).await {
                Ok(RegistrationOutcome::Updated { .. }) => summary.refreshed += 1,
                Ok(RegistrationOutcome::Unchanged) => summary.unchanged += 1,
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(api_id = %api_id, error = %error, "refresh failed");
                }
            }
        }
        summary
    }
}

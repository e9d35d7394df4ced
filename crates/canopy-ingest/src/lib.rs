//! # canopy-ingest
//!
//! The Canopy ingestion pipeline. Turns a referenced or inline OpenAPI
//! document into validated, content-hashed, multi-format artifacts, and
//! decides via content-addressed change detection whether expensive
//! downstream work (external linting, score computation) is needed.
//!
//! ## Pipeline shape
//!
//! ```text
//! register(payload)
//!     │
//!     ├── fetch bytes (remote URL or inline body)
//!     ├── parse + validate + resolve external refs
//!     ├── canonicalize + fingerprint
//!     │
//!     ├── change gate: fingerprint unchanged? ── yes ──▶ done (no writes)
//!     │                      │ no
//!     ├── build 2×2 artifact matrix (3.0/3.1 × json/yaml)
//!     ├── persist entity + fingerprint + artifacts
//!     └── dispatch detached lint continuation (fire and forget)
//! ```
//!
//! The [`scheduler::RefreshScheduler`] re-drives the same pipeline for
//! every known entity once a day, compensating for dropped lint
//! dispatches and silent upstream document drift.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod artifacts;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod fetch;
pub mod lint;
pub mod pipeline;
pub mod scheduler;

pub use config::IngestConfig;
pub use pipeline::{IngestPipeline, RegistrationOutcome};

//! # canopy-core
//!
//! Core abstractions for the Canopy API catalog.
//!
//! This crate provides the foundational types and traits used across all
//! Canopy components:
//!
//! - **Identifiers**: Strongly-typed ULID-backed IDs for catalog entities
//! - **Data Model**: Spec documents, artifacts, lint results, and entities
//! - **Fingerprinting**: Canonical rendering and SHA-256 content hashing
//! - **Store Contract**: The persistence collaborator trait and an
//!   in-memory implementation for tests and local runs
//! - **Clock**: An injectable time source so wall-clock scheduling is
//!   testable without real sleeps
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `canopy-core` is the only crate allowed to define shared primitives.
//! The ingestion pipeline (`canopy-ingest`) depends on this crate and never
//! the other way around.
//!
//! ## Example
//!
//! ```rust
//! use canopy_core::prelude::*;
//!
//! let api_id = ApiId::generate();
//! let store = MemoryStore::new();
//! let _ = (api_id, store);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod model;
pub mod observability;
pub mod store;

pub use error::{Error, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::fingerprint::Fingerprint;
    pub use crate::id::{ApiId, LintRunId};
    pub use crate::model::{
        ApiEntity, ArtifactRecord, LintInfo, LintMessageGroup, LintResult, Provenance,
        SpecDocument, SpecFormat, SpecVersion, VersionFamily,
    };
    pub use crate::store::{CatalogStore, MemoryStore};
}

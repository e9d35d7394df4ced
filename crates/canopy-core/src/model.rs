//! The catalog data model.
//!
//! Spec documents, the version/format artifact matrix, lint results, and
//! the API entity that owns them. Lint results are append-only and
//! individually immutable; everything else is replaced wholesale when the
//! change gate detects a new fingerprint.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::id::{ApiId, LintRunId};

/// An OpenAPI major.minor family supported by the catalog.
///
/// The patch component is deliberately dropped: artifacts are keyed per
/// family, and 3.0.2 vs 3.0.3 never produce distinct matrix entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionFamily {
    /// OpenAPI 3.0.x.
    #[serde(rename = "3.0")]
    V3_0,
    /// OpenAPI 3.1.x.
    #[serde(rename = "3.1")]
    V3_1,
}

impl VersionFamily {
    /// All families the artifact matrix spans.
    pub const ALL: [Self; 2] = [Self::V3_0, Self::V3_1];

    /// Returns the family as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V3_0 => "3.0",
            Self::V3_1 => "3.1",
        }
    }

    /// Returns the canonical full version written into converted
    /// documents' `openapi` field.
    #[must_use]
    pub const fn canonical_version(&self) -> &'static str {
        match self {
            Self::V3_0 => "3.0.3",
            Self::V3_1 => "3.1.0",
        }
    }
}

impl fmt::Display for VersionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full OpenAPI version triple as declared in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecVersion {
    /// Major version component.
    pub major: u64,
    /// Minor version component.
    pub minor: u64,
    /// Patch version component.
    pub patch: u64,
}

impl SpecVersion {
    /// Returns the supported family for this version, if any.
    ///
    /// Only 3.0.x and 3.1.x documents are accepted by the catalog.
    #[must_use]
    pub const fn family(&self) -> Option<VersionFamily> {
        match (self.major, self.minor) {
            (3, 0) => Some(VersionFamily::V3_0),
            (3, 1) => Some(VersionFamily::V3_1),
            _ => None,
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SpecVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        let mut next = |name: &str| -> Result<u64> {
            parts
                .next()
                .ok_or_else(|| Error::invalid_source(format!("openapi version '{s}' missing {name}")))?
                .parse::<u64>()
                .map_err(|_| Error::invalid_source(format!("openapi version '{s}' has non-numeric {name}")))
        };
        Ok(Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        })
    }
}

/// A serialization format for stored artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    /// JSON serialization.
    Json,
    /// YAML serialization.
    Yaml,
}

impl SpecFormat {
    /// All formats the artifact matrix spans.
    pub const ALL: [Self; 2] = [Self::Json, Self::Yaml];

    /// Returns the format as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Returns the content type stored with artifacts of this format.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Yaml => "application/yaml",
        }
    }
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an artifact carries the submitter's bytes or a re-serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Verbatim bytes as submitted; exactly one per artifact set.
    Original,
    /// Re-serialized from the parsed model.
    Converted,
}

/// A parsed, validated OpenAPI document. Immutable once built.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    /// The parsed JSON model (YAML sources are converted on parse).
    pub model: Value,
    /// Version triple declared in the document's `openapi` field.
    pub version: SpecVersion,
    /// Raw bytes exactly as fetched or submitted.
    pub raw: Bytes,
    /// Serialization format of the raw bytes.
    pub format: SpecFormat,
}

impl SpecDocument {
    /// Returns the document's version family.
    ///
    /// Always `Some` for a built document; construction rejects
    /// unsupported versions.
    #[must_use]
    pub const fn family(&self) -> Option<VersionFamily> {
        self.version.family()
    }

    /// Computes the document's content fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.model, &self.raw)
    }
}

/// One stored byte representation of a spec.
///
/// Keyed by (`api_id`, `family`, `format`); exactly 4 records exist per
/// successfully processed change, exactly one of them [`Provenance::Original`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// The owning API registration.
    pub api_id: ApiId,
    /// Version family of this representation.
    pub family: VersionFamily,
    /// Serialization format of this representation.
    pub format: SpecFormat,
    /// The artifact bytes.
    pub content: Bytes,
    /// Content type matching `format`.
    pub content_type: String,
    /// Whether these are the submitter's bytes or a re-serialization.
    pub provenance: Provenance,
    /// When the artifact was created.
    pub created_at: DateTime<Utc>,
}

/// One occurrence of a lint rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintInfo {
    /// Human-readable message from the checker.
    pub message: String,
    /// JSON path the message refers to.
    pub path: String,
}

/// All occurrences of one rule code within a lint run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintMessageGroup {
    /// The rule code shared by every occurrence in this group.
    pub code: String,
    /// Severity of the first occurrence of this code.
    pub severity: String,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
    /// Occurrences in checker output order.
    pub infos: Vec<LintInfo>,
}

/// The outcome of one lint run. Append-only; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    /// Unique identifier of this run.
    pub id: LintRunId,
    /// The API this run linted.
    pub api_id: ApiId,
    /// True when the checker executed and its output was captured.
    ///
    /// Findings do NOT make a run unsuccessful; a non-zero checker exit
    /// is the expected outcome when violations exist.
    pub success: bool,
    /// Occurrences with error severity.
    pub error_count: usize,
    /// Occurrences with warning severity.
    pub warning_count: usize,
    /// Messages grouped by rule code.
    pub groups: Vec<LintMessageGroup>,
    /// When the run completed.
    pub created_at: DateTime<Utc>,
}

/// An API registration: the entity that owns a fingerprint, a score, and
/// an artifact set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntity {
    /// Unique identifier.
    pub id: ApiId,
    /// Display name from the registration metadata.
    pub name: String,
    /// Optional description from the registration metadata.
    pub description: Option<String>,
    /// Remote source URL, when the spec was registered by reference.
    pub source_url: Option<String>,
    /// Fingerprint of the currently stored spec. `None` before the first
    /// successful registration completes.
    pub fingerprint: Option<Fingerprint>,
    /// Compliance score (0-100) derived from the latest lint result.
    pub score: Option<u8>,
    /// When the entity was first registered.
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_triple() {
        let v: SpecVersion = "3.0.3".parse().unwrap();
        assert_eq!((v.major, v.minor, v.patch), (3, 0, 3));
        assert_eq!(v.family(), Some(VersionFamily::V3_0));
    }

    #[test]
    fn version_family_drops_patch() {
        let a: SpecVersion = "3.1.0".parse().unwrap();
        let b: SpecVersion = "3.1.2".parse().unwrap();
        assert_eq!(a.family(), b.family());
    }

    #[test]
    fn unsupported_versions_have_no_family() {
        let v: SpecVersion = "2.0.0".parse().unwrap();
        assert_eq!(v.family(), None);
        let v: SpecVersion = "3.2.0".parse().unwrap();
        assert_eq!(v.family(), None);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        assert!("3.0".parse::<SpecVersion>().is_err());
        assert!("three.oh.three".parse::<SpecVersion>().is_err());
        assert!("".parse::<SpecVersion>().is_err());
    }

    #[test]
    fn family_and_format_wire_strings() {
        assert_eq!(VersionFamily::V3_0.as_str(), "3.0");
        assert_eq!(VersionFamily::V3_1.as_str(), "3.1");
        assert_eq!(SpecFormat::Json.content_type(), "application/json");
        assert_eq!(SpecFormat::Yaml.content_type(), "application/yaml");
    }

    #[test]
    fn matrix_dimensions_are_two_by_two() {
        assert_eq!(VersionFamily::ALL.len() * SpecFormat::ALL.len(), 4);
    }
}

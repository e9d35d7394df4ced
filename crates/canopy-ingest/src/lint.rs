//! Linter invocation, output parsing, and compliance scoring.
//!
//! The continuation dispatched after a successful change: it re-verifies
//! the entity's fingerprint, runs the external rule checker, parses its
//! combined output, computes a compliance score against a fixed
//! measured-rule allow-list, and persists the run as immutable history.
//!
//! A non-zero checker exit is the expected outcome when violations exist
//! and is NOT a pipeline failure; only failure to execute the checker at
//! all is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;

use canopy_core::clock::Clock;
use canopy_core::error::{Error, Result};
use canopy_core::fingerprint::Fingerprint;
use canopy_core::id::{ApiId, LintRunId};
use canopy_core::model::{LintInfo, LintMessageGroup, LintResult};
use canopy_core::store::CatalogStore;

use crate::config::LinterConfig;

/// Rule codes that count toward the compliance score.
///
/// Deliberately independent of the checker's full rule set: adding rules
/// to the ruleset must not silently move every score.
pub const MEASURED_RULES: &[&str] = &[
    "info-contact",
    "info-description",
    "oas3-api-servers",
    "oas3-schema",
    "openapi-tags",
    "operation-description",
    "operation-operationId",
    "operation-operationId-unique",
    "operation-success-response",
    "operation-tags",
];

/// Combined output line format:
/// `LINE:COL  SEVERITY  CODE  MESSAGE<2+ spaces>PATH`.
static OUTPUT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+):(\d+)\s{2,}(\S+)\s{2,}(\S+)\s{2,}(.+?)\s{2,}(\S+)\s*$")
        .expect("lint output pattern is valid")
});

/// Combined checker output.
#[derive(Debug, Clone)]
pub struct LintOutput {
    /// stdout and stderr, concatenated.
    pub output: String,
}

/// Runs the external rule checker against a document URL.
///
/// Abstracted so tests can script checker output instead of spawning a
/// subprocess.
#[async_trait]
pub trait LintRunner: Send + Sync + 'static {
    /// Invokes the checker and captures its combined output.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` only when the checker could not be
    /// executed at all (missing binary, timeout). Findings are output,
    /// not errors.
    async fn run(&self, target_url: &str) -> Result<LintOutput>;
}

/// Production runner invoking the checker binary as a subprocess.
#[derive(Debug, Clone)]
pub struct SpectralRunner {
    config: LinterConfig,
}

impl SpectralRunner {
    /// Creates a runner with the given invocation settings.
    #[must_use]
    pub const fn new(config: LinterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LintRunner for SpectralRunner {
    async fn run(&self, target_url: &str) -> Result<LintOutput> {
        let invocation = Command::new(&self.config.binary)
            .arg("lint")
            .arg("--ruleset")
            .arg(&self.config.ruleset)
            .arg(target_url)
            .stdin(Stdio::null())
            .output();

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, invocation).await {
            Err(_) => {
                return Err(Error::execution(format!(
                    "linter '{}' timed out after {}s",
                    self.config.binary, self.config.timeout_secs
                )));
            }
            Ok(Err(e)) => {
                return Err(Error::execution_with_source(
                    format!("failed to run linter '{}'", self.config.binary),
                    e,
                ));
            }
            // A non-zero exit status is findings, not failure.
            Ok(Ok(output)) => output,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(LintOutput { output: combined })
    }
}

/// Scripted runner for tests: records targets and replays canned output.
#[derive(Debug, Default)]
pub struct ScriptedLintRunner {
    output: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLintRunner {
    /// Creates a runner that replays the given combined output.
    #[must_use]
    pub fn replaying(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns every target URL the runner was invoked with.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LintRunner for ScriptedLintRunner {
    async fn run(&self, target_url: &str) -> Result<LintOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target_url.to_string());
        Ok(LintOutput {
            output: self.output.clone(),
        })
    }
}

/// Parsed checker output.
#[derive(Debug, Clone)]
pub struct ParsedOutput {
    /// Messages grouped by rule code, in first-seen order.
    pub groups: Vec<LintMessageGroup>,
    /// Occurrences with error severity.
    pub error_count: usize,
    /// Occurrences with warning severity.
    pub warning_count: usize,
    /// Codes that produced at least one error-severity occurrence.
    pub failed_codes: BTreeSet<String>,
}

/// Parses combined checker output.
///
/// Lines that do not match the expected format are dropped defensively.
/// Messages sharing a code are grouped; severity is taken from the first
/// occurrence per group; each occurrence becomes one ordered entry.
#[must_use]
pub fn parse_output(text: &str, created_at: DateTime<Utc>) -> ParsedOutput {
    let mut groups: Vec<LintMessageGroup> = Vec::new();
    let mut index_by_code: HashMap<String, usize> = HashMap::new();
    let mut error_count = 0;
    let mut warning_count = 0;
    let mut failed_codes = BTreeSet::new();

    for line in text.lines() {
        let Some(captures) = OUTPUT_LINE.captures(line) else {
            continue;
        };
        let severity = &captures[3];
        let code = &captures[4];
        let info = LintInfo {
            message: captures[5].to_string(),
            path: captures[6].to_string(),
        };

        match severity {
            "error" => {
                error_count += 1;
                failed_codes.insert(code.to_string());
            }
            "warning" => warning_count += 1,
            // Other tiers (hint, information) are ignored for counting.
            _ => {}
        }

        if let Some(&idx) = index_by_code.get(code) {
            groups[idx].infos.push(info);
        } else {
            index_by_code.insert(code.to_string(), groups.len());
            groups.push(LintMessageGroup {
                code: code.to_string(),
                severity: severity.to_string(),
                created_at,
                infos: vec![info],
            });
        }
    }

    ParsedOutput {
        groups,
        error_count,
        warning_count,
        failed_codes,
    }
}

/// Computes the compliance score.
///
/// A rule counts against the score only if it produced at least one
/// error-severity occurrence AND is in the measured allow-list.
/// `score = round((1 - failed/total) * 100)`; an empty allow-list scores
/// 100.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compliance_score(failed_codes: &BTreeSet<String>, measured: &[&str]) -> u8 {
    if measured.is_empty() {
        return 100;
    }
    let failed = measured
        .iter()
        .filter(|rule| failed_codes.contains(**rule))
        .count();

    ((1.0 - failed as f64 / measured.len() as f64) * 100.0).round() as u8
}

/// The detached lint continuation.
///
/// Carries the fingerprint expected at dispatch time; if the stored one
/// no longer matches, a newer update raced ahead and this run aborts
/// with no side effects. Persistence failure is propagated to the
/// dispatcher, which logs it; there is no retry — the daily sweep
/// compensates.
///
/// # Errors
///
/// Returns `Error::Execution` when the checker could not run and
/// `Error::Persistence` when the result could not be stored.
pub async fn run_continuation(
    store: Arc<dyn CatalogStore>,
    runner: Arc<dyn LintRunner>,
    clock: Arc<dyn Clock>,
    api_id: ApiId,
    expected: Fingerprint,
) -> Result<()> {
    let Some(entity) = store.get_api(api_id).await? else {
        tracing::debug!(api_id = %api_id, "entity vanished before lint ran");
        return Ok(());
    };
    if entity.fingerprint.as_ref() != Some(&expected) {
        tracing::debug!(api_id = %api_id, "fingerprint changed since dispatch, skipping lint");
        return Ok(());
    }
    let Some(target_url) = entity.source_url else {
        tracing::debug!(api_id = %api_id, "inline registration has no lintable URL");
        return Ok(());
    };

    let checker_output = runner.run(&target_url).await?;

    let now = clock.now_utc();
    let parsed = parse_output(&checker_output.output, now);
    let score = compliance_score(&parsed.failed_codes, MEASURED_RULES);

    let result = LintResult {
        id: LintRunId::generate(),
        api_id,
        success: true,
        error_count: parsed.error_count,
        warning_count: parsed.warning_count,
        groups: parsed.groups,
        created_at: now,
    };
    store.append_lint_result(result, score).await?;

    tracing::info!(
        api_id = %api_id,
        score = score,
        errors = parsed.error_count,
        warnings = parsed.warning_count,
        "lint run persisted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn parses_and_groups_by_code() {
        let text = "12:3  error  CODE1  Oops  pathA\n5:1  warning  CODE1  Other  pathB\n";
        let parsed = parse_output(text, Utc::now());

        assert_eq!(parsed.groups.len(), 1);
        let group = &parsed.groups[0];
        assert_eq!(group.code, "CODE1");
        // Severity comes from the first occurrence.
        assert_eq!(group.severity, "error");
        assert_eq!(group.infos.len(), 2);
        assert_eq!(group.infos[0], LintInfo { message: "Oops".into(), path: "pathA".into() });
        assert_eq!(group.infos[1], LintInfo { message: "Other".into(), path: "pathB".into() });
        assert_eq!(parsed.error_count, 1);
        assert_eq!(parsed.warning_count, 1);
    }

    #[test]
    fn drops_non_matching_lines() {
        let text = "OpenAPI 3.x detected\n\n12:3  error  CODE1  Oops  pathA\nsome trailer\n";
        let parsed = parse_output(text, Utc::now());
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(parsed.error_count, 1);
    }

    #[test]
    fn single_space_separators_do_not_match() {
        let text = "12:3 error CODE1 Oops pathA\n";
        let parsed = parse_output(text, Utc::now());
        assert!(parsed.groups.is_empty());
    }

    #[test]
    fn messages_may_contain_single_spaces() {
        let text = "7:9  warning  operation-description  Operation should have a description  paths./a.get\n";
        let parsed = parse_output(text, Utc::now());
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(
            parsed.groups[0].infos[0].message,
            "Operation should have a description"
        );
        assert_eq!(parsed.groups[0].infos[0].path, "paths./a.get");
    }

    #[test]
    fn other_severities_are_not_counted() {
        let text = "1:1  hint  CODE2  Try this  pathC\n";
        let parsed = parse_output(text, Utc::now());
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(parsed.error_count, 0);
        assert_eq!(parsed.warning_count, 0);
        assert!(parsed.failed_codes.is_empty());
    }

    #[test]
    fn score_is_100_with_no_failing_rules() {
        assert_eq!(compliance_score(&failed(&[]), MEASURED_RULES), 100);
    }

    #[test]
    fn score_is_100_with_empty_allow_list() {
        assert_eq!(compliance_score(&failed(&["anything"]), &[]), 100);
    }

    #[test]
    fn score_is_0_with_all_measured_rules_failing() {
        let all: Vec<&str> = MEASURED_RULES.to_vec();
        assert_eq!(compliance_score(&failed(&all), MEASURED_RULES), 0);
    }

    #[test]
    fn unmeasured_rules_do_not_affect_the_score() {
        assert_eq!(
            compliance_score(&failed(&["custom-house-rule"]), MEASURED_RULES),
            100
        );
    }

    #[test]
    fn score_is_monotonic_in_failing_rules() {
        let mut previous = 100;
        let mut codes: Vec<&str> = Vec::new();
        for rule in MEASURED_RULES {
            codes.push(rule);
            let score = compliance_score(&failed(&codes), MEASURED_RULES);
            assert!(score <= previous, "adding a failing rule increased the score");
            previous = score;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn one_failing_rule_of_ten_scores_90() {
        assert_eq!(MEASURED_RULES.len(), 10);
        assert_eq!(compliance_score(&failed(&["oas3-schema"]), MEASURED_RULES), 90);
    }
}

//! Document building: parse, reference resolution, and validation.
//!
//! All failures on this path collapse into the single user-correctable
//! `InvalidSource` error carrying a human-readable detail; a partial
//! document is never returned.

use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeSet;

use canopy_core::error::{Error, Result};
use canopy_core::model::{SpecDocument, SpecFormat, SpecVersion, VersionFamily};

use crate::fetch::{SourceFetcher, SpecSource};

/// Upper bound on nested external reference resolution rounds.
///
/// A document whose external refs still contain external refs after this
/// many rounds is almost certainly cyclic.
const MAX_REF_ROUNDS: usize = 8;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Fetches, parses, resolves, and validates a spec source into an
/// immutable [`SpecDocument`].
///
/// # Errors
///
/// Returns `Error::InvalidSource` for any fetch, parse, reference, or
/// validation failure.
pub async fn build_document(
    fetcher: &dyn SourceFetcher,
    source: &SpecSource,
) -> Result<SpecDocument> {
    let raw = fetcher.fetch(source).await?;
    let (mut model, format) = parse_bytes(&raw)?;

    resolve_external_refs(fetcher, &mut model).await?;

    let version = declared_version(&model)?;
    let Some(family) = version.family() else {
        return Err(Error::invalid_source(format!(
            "unsupported OpenAPI version {version}; only 3.0.x and 3.1.x are accepted"
        )));
    };
    validate(&model, family)?;

    Ok(SpecDocument {
        model,
        version,
        raw,
        format,
    })
}

/// Parses raw bytes as JSON first, then YAML.
///
/// The declared format records which serialization the submitter used;
/// the parsed model is always a JSON tree.
///
/// # Errors
///
/// Returns `Error::InvalidSource` when the bytes parse as neither, or
/// when a YAML mapping uses non-string keys.
pub fn parse_bytes(raw: &Bytes) -> Result<(Value, SpecFormat)> {
    if let Ok(model) = serde_json::from_slice::<Value>(raw) {
        return Ok((model, SpecFormat::Json));
    }

    let yaml: serde_yaml::Value = serde_yaml::from_slice(raw)
        .map_err(|e| Error::invalid_source(format!("document is neither valid JSON nor YAML: {e}")))?;
    let model = serde_json::to_value(yaml)
        .map_err(|e| Error::invalid_source(format!("YAML document is not representable as JSON: {e}")))?;
    Ok((model, SpecFormat::Yaml))
}

/// Reads the version triple from the document's `openapi` field.
fn declared_version(model: &Value) -> Result<SpecVersion> {
    let Some(declared) = model.get("openapi").and_then(Value::as_str) else {
        return Err(Error::invalid_source(
            "document has no string 'openapi' version field",
        ));
    };
    declared.parse()
}

/// Resolves absolute-URL `$ref`s by fetching and inlining their targets.
///
/// Runs in rounds so references fetched from upstream may themselves
/// contain external references, up to [`MAX_REF_ROUNDS`] deep.
///
/// # Errors
///
/// Returns `Error::InvalidSource` when a reference cannot be fetched or
/// its fragment does not resolve, or when resolution fails to converge.
pub async fn resolve_external_refs(
    fetcher: &dyn SourceFetcher,
    model: &mut Value,
) -> Result<()> {
    for _ in 0..MAX_REF_ROUNDS {
        let refs = collect_external_refs(model);
        if refs.is_empty() {
            return Ok(());
        }

        for reference in refs {
            let (url, fragment) = match reference.split_once('#') {
                Some((url, fragment)) => (url.to_string(), Some(fragment.to_string())),
                None => (reference.clone(), None),
            };

            let raw = fetcher.fetch(&SpecSource::Url(url.clone())).await?;
            let (target, _) = parse_bytes(&raw)?;

            let resolved = match fragment.as_deref() {
                None | Some("") | Some("/") => target,
                Some(pointer) => target
                    .pointer(pointer)
                    .cloned()
                    .ok_or_else(|| {
                        Error::invalid_source(format!(
                            "external reference {reference}: fragment does not resolve"
                        ))
                    })?,
            };

            inline_reference(model, &reference, &resolved);
        }
    }

    Err(Error::invalid_source(format!(
        "external references did not resolve after {MAX_REF_ROUNDS} rounds (cycle?)"
    )))
}

fn is_external_ref(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn collect_external_refs(value: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_refs_into(value, &mut refs);
    refs
}

fn collect_refs_into(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(target) = map.get("$ref").and_then(Value::as_str) {
                if is_external_ref(target) {
                    refs.insert(target.to_string());
                }
            }
            for v in map.values() {
                collect_refs_into(v, refs);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_refs_into(v, refs);
            }
        }
        _ => {}
    }
}

/// Replaces every `{"$ref": reference, ...}` node with the resolved value.
fn inline_reference(value: &mut Value, reference: &str, resolved: &Value) {
    match value {
        Value::Object(map) => {
            if map.get("$ref").and_then(Value::as_str) == Some(reference) {
                *value = resolved.clone();
                return;
            }
            for v in map.values_mut() {
                inline_reference(v, reference, resolved);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                inline_reference(v, reference, resolved);
            }
        }
        _ => {}
    }
}

/// Runs schema and semantic validation over a parsed document.
///
/// # Errors
///
/// Returns `Error::InvalidSource` naming the first violation found.
pub fn validate(model: &Value, family: VersionFamily) -> Result<()> {
    let Some(root) = model.as_object() else {
        return Err(Error::invalid_source("document root must be an object"));
    };

    let Some(info) = root.get("info").and_then(Value::as_object) else {
        return Err(Error::invalid_source("document has no 'info' object"));
    };
    for field in ["title", "version"] {
        let present = info.get(field).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        if !present {
            return Err(Error::invalid_source(format!(
                "'info.{field}' must be a non-empty string"
            )));
        }
    }

    let paths = root.get("paths").and_then(Value::as_object);
    match family {
        VersionFamily::V3_0 => {
            if paths.is_none() {
                return Err(Error::invalid_source("3.0 document has no 'paths' object"));
            }
        }
        VersionFamily::V3_1 => {
            // 3.1 relaxes this: a document may describe only components
            // or webhooks.
            let has_any = paths.is_some()
                || root.get("components").is_some_and(Value::is_object)
                || root.get("webhooks").is_some_and(Value::is_object);
            if !has_any {
                return Err(Error::invalid_source(
                    "3.1 document needs at least one of paths, components, or webhooks",
                ));
            }
        }
    }

    if let Some(paths) = paths {
        let mut seen_operation_ids = BTreeSet::new();
        for (template, item) in paths {
            if !template.starts_with('/') {
                return Err(Error::invalid_source(format!(
                    "path '{template}' does not start with '/'"
                )));
            }
            let Some(item) = item.as_object() else {
                continue;
            };
            for method in HTTP_METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                if let Some(op_id) = operation.get("operationId").and_then(Value::as_str) {
                    if !seen_operation_ids.insert(op_id.to_string()) {
                        return Err(Error::invalid_source(format!(
                            "duplicate operationId '{op_id}'"
                        )));
                    }
                }
            }
        }
    }

    check_internal_refs(model, model)
}

/// Verifies that every internal `#/...` reference resolves.
fn check_internal_refs(root: &Value, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let Some(target) = map.get("$ref").and_then(Value::as_str) {
                if let Some(pointer) = target.strip_prefix('#') {
                    if root.pointer(pointer).is_none() {
                        return Err(Error::invalid_source(format!(
                            "unresolved reference '{target}'"
                        )));
                    }
                }
            }
            for v in map.values() {
                check_internal_refs(root, v)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for v in arr {
                check_internal_refs(root, v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use serde_json::json;

    fn minimal_30() -> String {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Payments", "version": "1.0.0"},
            "paths": {"/charges": {"get": {"operationId": "listCharges"}}}
        })
        .to_string()
    }

    async fn build_inline(body: String) -> Result<SpecDocument> {
        let fetcher = StaticFetcher::new();
        build_document(&fetcher, &SpecSource::Inline(body)).await
    }

    #[tokio::test]
    async fn builds_minimal_json_document() {
        let doc = build_inline(minimal_30()).await.expect("valid document");
        assert_eq!(doc.format, SpecFormat::Json);
        assert_eq!(doc.family(), Some(VersionFamily::V3_0));
        assert_eq!(doc.version.patch, 3);
    }

    #[tokio::test]
    async fn builds_yaml_document() {
        let yaml = "openapi: 3.1.0\ninfo:\n  title: Payments\n  version: 1.0.0\npaths:\n  /charges:\n    get:\n      operationId: listCharges\n";
        let doc = build_inline(yaml.to_string()).await.expect("valid yaml");
        assert_eq!(doc.format, SpecFormat::Yaml);
        assert_eq!(doc.family(), Some(VersionFamily::V3_1));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let result = build_inline(": not: [valid".to_string()).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_missing_version_field() {
        let body = json!({"info": {"title": "t", "version": "1"}, "paths": {}}).to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_unsupported_version() {
        let body = json!({
            "openapi": "2.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {}
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_missing_info_title() {
        let body = json!({
            "openapi": "3.0.3",
            "info": {"version": "1.0.0"},
            "paths": {}
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_duplicate_operation_ids() {
        let body = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"get": {"operationId": "dup"}},
                "/b": {"get": {"operationId": "dup"}}
            }
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_path_without_leading_slash() {
        let body = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {"charges": {}}
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn rejects_unresolved_internal_ref() {
        let body = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"get": {
                    "responses": {"200": {"$ref": "#/components/responses/Missing"}}
                }}
            }
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[tokio::test]
    async fn accepts_31_document_with_components_only() {
        let body = json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "components": {"schemas": {"Charge": {"type": "object"}}}
        })
        .to_string();
        let doc = build_inline(body).await.expect("components-only 3.1");
        assert_eq!(doc.family(), Some(VersionFamily::V3_1));
    }

    #[tokio::test]
    async fn resolves_external_reference() {
        let shared = json!({
            "components": {"schemas": {"Money": {"type": "integer"}}}
        })
        .to_string();
        let fetcher = StaticFetcher::new().with(
            "https://schemas.example.com/shared.json",
            Bytes::from(shared),
        );

        let body = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {"/a": {"get": {
                "responses": {"200": {
                    "description": "ok",
                    "content": {"application/json": {"schema": {
                        "$ref": "https://schemas.example.com/shared.json#/components/schemas/Money"
                    }}}
                }}
            }}}
        })
        .to_string();

        let doc = build_document(&fetcher, &SpecSource::Inline(body))
            .await
            .expect("external ref resolves");
        let schema = doc
            .model
            .pointer("/paths/~1a/get/responses/200/content/application~1json/schema")
            .expect("schema present");
        assert_eq!(schema, &json!({"type": "integer"}));
    }

    #[tokio::test]
    async fn unreachable_external_reference_fails() {
        let body = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {"/a": {"get": {
                "responses": {"200": {"$ref": "https://nowhere.example.com/x.json"}}
            }}}
        })
        .to_string();
        let result = build_inline(body).await;
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }
}

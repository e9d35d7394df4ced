//! The version/format artifact matrix.
//!
//! A successfully processed change stores exactly four artifacts: the
//! cross product of the two supported families (3.0, 3.1) and the two
//! serializations (JSON, YAML). The entry matching the source's native
//! family and format keeps the submitter's bytes verbatim and is marked
//! `Original`; every other entry is `Converted`, re-serialized from the
//! parsed model.
//!
//! Cross-family conversion applies the minimal reversible structural
//! mapping between the 3.0 and 3.1 nullability/bounds representations.
//! A construct that cannot round-trip fails the whole registration;
//! a lossy artifact is never stored.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use canopy_core::canonical_json;
use canopy_core::error::{Error, Result};
use canopy_core::id::ApiId;
use canopy_core::model::{ArtifactRecord, Provenance, SpecDocument, SpecFormat, VersionFamily};

/// Builds the full 2x2 artifact matrix for a validated document.
///
/// # Errors
///
/// Returns `Error::Conversion` when a cross-family mapping cannot round-trip
/// and `Error::Internal` when serialization fails.
pub fn build_matrix(
    api_id: ApiId,
    doc: &SpecDocument,
    created_at: DateTime<Utc>,
) -> Result<Vec<ArtifactRecord>> {
    let Some(native_family) = doc.family() else {
        return Err(Error::internal(format!(
            "document version {} has no supported family",
            doc.version
        )));
    };

    let mut records = Vec::with_capacity(4);
    for family in VersionFamily::ALL {
        let model = convert_model(&doc.model, native_family, family)?;
        for format in SpecFormat::ALL {
            let native = family == native_family && format == doc.format;
            let (content, provenance) = if native {
                (doc.raw.clone(), Provenance::Original)
            } else {
                (render(&model, format)?, Provenance::Converted)
            };
            records.push(ArtifactRecord {
                api_id,
                family,
                format,
                content,
                content_type: format.content_type().to_string(),
                provenance,
                created_at,
            });
        }
    }
    Ok(records)
}

/// Converts a parsed model between version families.
///
/// Same-family conversion returns the model unchanged (so the document's
/// declared patch version survives re-serialization). Cross-family
/// conversion rewrites the `openapi` field to the target family's
/// canonical version and maps nullability and exclusive bounds.
///
/// # Errors
///
/// Returns `Error::Conversion` for constructs that cannot round-trip.
pub fn convert_model(model: &Value, from: VersionFamily, to: VersionFamily) -> Result<Value> {
    if from == to {
        return Ok(model.clone());
    }

    let mut converted = model.clone();
    if let Some(version) = converted.get_mut("openapi") {
        *version = Value::String(to.canonical_version().to_string());
    }
    match (from, to) {
        (VersionFamily::V3_0, VersionFamily::V3_1) => {
            walk_document(&mut converted, &upgrade_schema)?;
        }
        (VersionFamily::V3_1, VersionFamily::V3_0) => {
            walk_document(&mut converted, &downgrade_schema)?;
        }
        _ => {}
    }
    Ok(converted)
}

/// Serializes a model in the given format, deterministically.
///
/// JSON uses the canonical sorted-key pretty renderer; YAML serializes a
/// recursively key-sorted copy so map order cannot leak into the bytes.
/// Regenerating an artifact for an unchanged fingerprint is therefore
/// byte-identical.
///
/// # Errors
///
/// Returns `Error::Internal` when the model cannot be serialized.
pub fn render(model: &Value, format: SpecFormat) -> Result<Bytes> {
    match format {
        SpecFormat::Json => canonical_json::to_canonical_bytes(model)
            .map(Bytes::from)
            .map_err(|e| Error::internal(format!("JSON artifact rendering failed: {e}"))),
        SpecFormat::Yaml => {
            let sorted = canonical_json::sort_keys(model);
            serde_yaml::to_string(&sorted)
                .map(Bytes::from)
                .map_err(|e| Error::internal(format!("YAML artifact rendering failed: {e}")))
        }
    }
}

/// Applies a schema transform to every schema position in a document.
///
/// Only the document's schema locations are rewritten: the value of any
/// `schema` key (media types, parameters, headers) and the entries of a
/// `schemas` map (components). Non-schema objects that merely resemble
/// schemas, such as `example` payloads and vendor extensions, pass
/// through untouched.
fn walk_document<F>(node: &mut Value, transform: &F) -> Result<()>
where
    F: Fn(&mut serde_json::Map<String, Value>) -> Result<()>,
{
    match node {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                match key.as_str() {
                    // Example payloads can carry arbitrary JSON, including
                    // keys named "schema"; never descend into them.
                    "example" | "examples" => {}
                    "schema" => walk_schema(value, transform)?,
                    "schemas" => {
                        if let Value::Object(schemas) = value {
                            for schema in schemas.values_mut() {
                                walk_schema(schema, transform)?;
                            }
                        }
                    }
                    _ => walk_document(value, transform)?,
                }
            }
            Ok(())
        }
        Value::Array(arr) => {
            for v in arr {
                walk_document(v, transform)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Applies a transform to a schema and its subschemas, children first.
///
/// Descends only through the keyword positions that hold schemas; data
/// keywords (`example`, `default`, `enum`, `const`) hold arbitrary values
/// and are skipped.
fn walk_schema<F>(node: &mut Value, transform: &F) -> Result<()>
where
    F: Fn(&mut serde_json::Map<String, Value>) -> Result<()>,
{
    let Value::Object(map) = node else {
        return Ok(());
    };
    for (key, value) in map.iter_mut() {
        match key.as_str() {
            "example" | "examples" | "default" | "enum" | "const" => {}
            "items" | "additionalProperties" | "not" | "contains" | "propertyNames" | "if"
            | "then" | "else" => walk_schema(value, transform)?,
            "properties" | "patternProperties" | "$defs" | "definitions" => {
                if let Value::Object(children) = value {
                    for child in children.values_mut() {
                        walk_schema(child, transform)?;
                    }
                }
            }
            "allOf" | "anyOf" | "oneOf" | "prefixItems" => {
                if let Value::Array(items) = value {
                    for item in items {
                        walk_schema(item, transform)?;
                    }
                }
            }
            _ => {}
        }
    }
    transform(map)
}

/// 3.0 -> 3.1: `nullable: true` becomes a `["T", "null"]` type array and
/// boolean exclusive bounds become numeric bounds.
fn upgrade_schema(map: &mut serde_json::Map<String, Value>) -> Result<()> {
    match map.remove("nullable") {
        None | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => match map.get("type") {
            Some(Value::String(t)) => {
                let widened = json!([t, "null"]);
                map.insert("type".to_string(), widened);
            }
            // A typeless 3.0 schema already admits null in 3.1.
            None => {}
            Some(other) => {
                return Err(Error::conversion(format!(
                    "nullable schema has non-string type {other}"
                )));
            }
        },
        Some(other) => {
            return Err(Error::conversion(format!(
                "'nullable' must be a boolean, found {other}"
            )));
        }
    }

    upgrade_exclusive_bound(map, "exclusiveMinimum", "minimum")?;
    upgrade_exclusive_bound(map, "exclusiveMaximum", "maximum")
}

fn upgrade_exclusive_bound(
    map: &mut serde_json::Map<String, Value>,
    exclusive_key: &str,
    bound_key: &str,
) -> Result<()> {
    match map.get(exclusive_key) {
        Some(Value::Bool(true)) => {
            let Some(bound) = map.remove(bound_key) else {
                return Err(Error::conversion(format!(
                    "'{exclusive_key}: true' without a '{bound_key}' value"
                )));
            };
            map.insert(exclusive_key.to_string(), bound);
            Ok(())
        }
        Some(Value::Bool(false)) => {
            map.remove(exclusive_key);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// 3.1 -> 3.0: `["T", "null"]` type arrays become `type: T` plus
/// `nullable: true` and numeric exclusive bounds become boolean + bound.
fn downgrade_schema(map: &mut serde_json::Map<String, Value>) -> Result<()> {
    if let Some(Value::Array(types)) = map.get("type") {
        let mut names = Vec::with_capacity(types.len());
        for t in types {
            let Some(name) = t.as_str() else {
                return Err(Error::conversion(format!(
                    "type array contains non-string entry {t}"
                )));
            };
            names.push(name.to_string());
        }

        let non_null: Vec<&String> = names.iter().filter(|n| n.as_str() != "null").collect();
        let had_null = non_null.len() != names.len();
        match (non_null.as_slice(), had_null) {
            ([single], true) => {
                let t = (*single).clone();
                map.insert("type".to_string(), Value::String(t));
                map.insert("nullable".to_string(), Value::Bool(true));
            }
            ([single], false) => {
                let t = (*single).clone();
                map.insert("type".to_string(), Value::String(t));
            }
            ([], true) => {
                return Err(Error::conversion(
                    "'null' as the only type cannot be represented in 3.0",
                ));
            }
            _ => {
                return Err(Error::conversion(format!(
                    "type array [{}] cannot round-trip to a single 3.0 type",
                    names.join(", ")
                )));
            }
        }
    }

    downgrade_exclusive_bound(map, "exclusiveMinimum", "minimum")?;
    downgrade_exclusive_bound(map, "exclusiveMaximum", "maximum")
}

fn downgrade_exclusive_bound(
    map: &mut serde_json::Map<String, Value>,
    exclusive_key: &str,
    bound_key: &str,
) -> Result<()> {
    if let Some(Value::Number(n)) = map.get(exclusive_key) {
        let bound = Value::Number(n.clone());
        // A schema may carry an inclusive bound alongside the exclusive
        // one; 3.0 has only one slot, so that pair cannot round-trip.
        if let Some(existing) = map.get(bound_key) {
            if existing != &bound {
                return Err(Error::conversion(format!(
                    "'{bound_key}' {existing} conflicts with numeric '{exclusive_key}' {bound}"
                )));
            }
        }
        map.insert(bound_key.to_string(), bound);
        map.insert(exclusive_key.to_string(), Value::Bool(true));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::model::SpecVersion;

    fn doc_30_json() -> SpecDocument {
        let model = json!({
            "openapi": "3.0.3",
            "info": {"title": "Payments", "version": "1.0.0"},
            "paths": {"/charges": {"get": {"operationId": "listCharges"}}},
            "components": {"schemas": {
                "Refund": {"type": "string", "nullable": true},
                "Amount": {"type": "integer", "minimum": 0, "exclusiveMinimum": true}
            }}
        });
        let raw = Bytes::from(model.to_string());
        SpecDocument {
            model,
            version: SpecVersion { major: 3, minor: 0, patch: 3 },
            raw,
            format: SpecFormat::Json,
        }
    }

    #[test]
    fn matrix_has_four_entries_one_original() {
        let doc = doc_30_json();
        let records = build_matrix(ApiId::generate(), &doc, Utc::now()).expect("matrix");

        assert_eq!(records.len(), 4);
        let originals: Vec<_> = records
            .iter()
            .filter(|r| r.provenance == Provenance::Original)
            .collect();
        assert_eq!(originals.len(), 1);
        assert_eq!(originals[0].family, VersionFamily::V3_0);
        assert_eq!(originals[0].format, SpecFormat::Json);
        assert_eq!(originals[0].content, doc.raw);
    }

    #[test]
    fn matrix_regeneration_is_byte_identical() {
        let doc = doc_30_json();
        let id = ApiId::generate();
        let at = Utc::now();
        let first = build_matrix(id, &doc, at).expect("matrix");
        let second = build_matrix(id, &doc, at).expect("matrix");
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.content, b.content);
        }
    }

    fn in_components(schema: Value) -> Value {
        json!({"components": {"schemas": {"S": schema}}})
    }

    fn from_components(model: &Value) -> &Value {
        model.pointer("/components/schemas/S").expect("schema present")
    }

    #[test]
    fn upgrade_maps_nullable_to_type_array() {
        let model = in_components(json!({"type": "string", "nullable": true}));
        let up = convert_model(&model, VersionFamily::V3_0, VersionFamily::V3_1)
            .expect("upgrade");
        assert_eq!(from_components(&up), &json!({"type": ["string", "null"]}));
    }

    #[test]
    fn upgrade_maps_boolean_exclusive_bounds() {
        let model =
            in_components(json!({"type": "integer", "minimum": 0, "exclusiveMinimum": true}));
        let up = convert_model(&model, VersionFamily::V3_0, VersionFamily::V3_1)
            .expect("upgrade");
        assert_eq!(
            from_components(&up),
            &json!({"type": "integer", "exclusiveMinimum": 0})
        );
    }

    #[test]
    fn downgrade_maps_type_array_to_nullable() {
        let model = in_components(json!({"type": ["string", "null"]}));
        let down = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0)
            .expect("downgrade");
        assert_eq!(
            from_components(&down),
            &json!({"type": "string", "nullable": true})
        );
    }

    #[test]
    fn downgrade_maps_numeric_exclusive_bounds() {
        let model = in_components(json!({"type": "integer", "exclusiveMinimum": 0}));
        let down = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0)
            .expect("downgrade");
        assert_eq!(
            from_components(&down),
            &json!({"type": "integer", "minimum": 0, "exclusiveMinimum": true})
        );
    }

    #[test]
    fn downgrade_rejects_conflicting_inclusive_and_exclusive_bounds() {
        // 3.1 may state both; 3.0 has a single bound slot per side.
        let model =
            in_components(json!({"type": "integer", "minimum": 0, "exclusiveMinimum": 5}));
        let result = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0);
        assert!(matches!(result, Err(Error::Conversion { .. })));
    }

    #[test]
    fn downgrade_accepts_equal_inclusive_and_exclusive_bounds() {
        let model =
            in_components(json!({"type": "integer", "minimum": 5, "exclusiveMinimum": 5}));
        let down = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0)
            .expect("downgrade");
        assert_eq!(
            from_components(&down),
            &json!({"type": "integer", "minimum": 5, "exclusiveMinimum": true})
        );
    }

    #[test]
    fn upgrade_leaves_example_payloads_alone() {
        // "nullable" here is response data, not a schema keyword.
        let model = json!({
            "paths": {"/a": {"get": {"responses": {"200": {
                "description": "ok",
                "content": {"application/json": {
                    "schema": {"type": "object"},
                    "example": {"nullable": true, "schema": {"type": "string", "nullable": true}}
                }}
            }}}}}
        });
        let up = convert_model(&model, VersionFamily::V3_0, VersionFamily::V3_1)
            .expect("upgrade");
        let example = up
            .pointer("/paths/~1a/get/responses/200/content/application~1json/example")
            .expect("example present");
        assert_eq!(
            example,
            &json!({"nullable": true, "schema": {"type": "string", "nullable": true}})
        );
    }

    #[test]
    fn downgrade_ignores_type_arrays_in_schema_examples() {
        let model = in_components(json!({
            "type": "object",
            "example": {"type": ["a", "b"]}
        }));
        let down = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0)
            .expect("example data must not fail conversion");
        assert_eq!(
            from_components(&down),
            &json!({"type": "object", "example": {"type": ["a", "b"]}})
        );
    }

    #[test]
    fn conversion_reaches_nested_subschemas() {
        let model = in_components(json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string", "nullable": true}}
            }
        }));
        let up = convert_model(&model, VersionFamily::V3_0, VersionFamily::V3_1)
            .expect("upgrade");
        assert_eq!(
            from_components(&up).pointer("/properties/tags/items"),
            Some(&json!({"type": ["string", "null"]}))
        );
    }

    #[test]
    fn conversion_round_trips() {
        let original = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {"schemas": {"S": {"type": "string", "nullable": true}}}
        });
        let up = convert_model(&original, VersionFamily::V3_0, VersionFamily::V3_1)
            .expect("upgrade");
        let mut down = convert_model(&up, VersionFamily::V3_1, VersionFamily::V3_0)
            .expect("downgrade");
        // The version field normalizes to the canonical patch release.
        down["openapi"] = Value::String("3.0.3".to_string());
        assert_eq!(down, original);
    }

    #[test]
    fn multi_type_array_fails_whole_conversion() {
        let model = json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {"schemas": {"S": {"type": ["string", "integer"]}}}
        });
        let result = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0);
        assert!(matches!(result, Err(Error::Conversion { .. })));
    }

    #[test]
    fn null_only_type_fails_whole_conversion() {
        let model = json!({"components": {"schemas": {"S": {"type": ["null"]}}}});
        let result = convert_model(&model, VersionFamily::V3_1, VersionFamily::V3_0);
        assert!(matches!(result, Err(Error::Conversion { .. })));
    }

    #[test]
    fn yaml_rendering_is_deterministic() {
        let model = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let first = render(&model, SpecFormat::Yaml).expect("yaml");
        let second = render(&model, SpecFormat::Yaml).expect("yaml");
        assert_eq!(first, second);
        let text = String::from_utf8(first.to_vec()).expect("utf8");
        assert!(text.find("a:").unwrap() < text.find("b:").unwrap());
    }
}

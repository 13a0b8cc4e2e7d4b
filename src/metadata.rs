//! Document validation, identity derivation, and index projection.
//!
//! A raw API description document enters the registry as opaque JSON bytes.
//! This module decides which schema family it belongs to (OpenAPI v3 or
//! Swagger v2), validates it collecting every violation, derives the
//! content-addressable identity used for deduplication, and produces the
//! indexable projection stored alongside the verbatim bytes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use jsonschema::JSONSchema;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{IndexRecord, SchemaViolation, ValidationReport};

/// The two supported schema families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFamily {
    OpenApiV3,
    SwaggerV2,
}

impl SchemaFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFamily::OpenApiV3 => "openapi_v3",
            SchemaFamily::SwaggerV2 => "swagger_v2",
        }
    }
}

/// The `(title, version, contact.name)` identity triple is incomplete.
#[derive(Debug, Clone, Error)]
#[error("missing required identity fields: info.title, info.version and info.contact.name must all be non-empty")]
pub struct MissingIdentityFields;

/// Subtrees excluded from full-text indexing. They stay retrievable in the
/// verbatim raw bytes; they are just not analyzed.
const NON_INDEXED_KEYS: &[&str] = &[
    "components",
    "definitions",
    "schema",
    "schemas",
    "example",
    "examples",
    "content",
    "$ref",
];

/// Detect the schema family from the top-level version marker.
pub fn detect_family(doc: &Value) -> Option<SchemaFamily> {
    if let Some(v) = doc.get("openapi").and_then(Value::as_str) {
        if v.starts_with("3.") {
            return Some(SchemaFamily::OpenApiV3);
        }
    }
    if let Some(v) = doc.get("swagger").and_then(Value::as_str) {
        if v == "2.0" {
            return Some(SchemaFamily::SwaggerV2);
        }
    }
    None
}

/// Validate raw document bytes against the applicable schema family.
///
/// Fails closed: parse errors and unknown version markers are reported as
/// violations in the returned report, never surfaced as process errors.
/// Collects every violation rather than stopping at the first.
pub fn validate(raw: &[u8]) -> ValidationReport {
    let doc: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            return ValidationReport::invalid(vec![SchemaViolation {
                reason: format!("document is not valid JSON: {}", e),
                path: String::new(),
                schema_path: String::new(),
            }]);
        }
    };

    if !doc.is_object() {
        return ValidationReport::invalid(vec![SchemaViolation {
            reason: "document root must be an object".to_string(),
            path: String::new(),
            schema_path: "/type".to_string(),
        }]);
    }

    let family = match detect_family(&doc) {
        Some(f) => f,
        None => {
            return ValidationReport::invalid(vec![SchemaViolation {
                reason: "unable to detect schema family: expected openapi \"3.x\" or swagger \"2.0\""
                    .to_string(),
                path: String::new(),
                schema_path: String::new(),
            }]);
        }
    };

    let schema = compiled_schema(family);
    // The error iterator borrows `doc`; finish with it before returning.
    let report = match schema.validate(&doc) {
        Ok(()) => ValidationReport::ok(),
        Err(errors) => {
            let violations = errors
                .map(|e| SchemaViolation {
                    reason: e.to_string(),
                    path: e.instance_path.to_string(),
                    schema_path: e.schema_path.to_string(),
                })
                .collect();
            ValidationReport::invalid(violations)
        }
    };
    report
}

/// Derive the deterministic document identity from the info block.
///
/// The id is a function of `(info.title, info.version, info.contact.name)`
/// alone: identical triples always map to the identical id, across processes
/// and over time. Two documents sharing the triple collide by design; this
/// is the dedup key, not a random identifier.
pub fn derive_identity(raw: &[u8]) -> Result<String, MissingIdentityFields> {
    let doc: Value = serde_json::from_slice(raw).map_err(|_| MissingIdentityFields)?;
    let info = doc.get("info").cloned().unwrap_or(Value::Null);
    let title = info.get("title").and_then(Value::as_str).unwrap_or("");
    let version = info.get("version").and_then(Value::as_str).unwrap_or("");
    let contact = info
        .get("contact")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");

    if title.is_empty() || version.is_empty() || contact.is_empty() {
        return Err(MissingIdentityFields);
    }

    // JSON-encode the triple so field boundaries can't be confused, then
    // take a 128-bit digest rendered as hex.
    let encoded =
        serde_json::to_string(&(title, version, contact)).expect("string triple serializes");
    let digest = Sha256::digest(encoded.as_bytes());
    Ok(hex::encode(&digest[..16]))
}

/// Produce the indexable projection of a document.
///
/// Only call on documents that already passed [`validate`]; malformed input
/// degrades to an empty projection rather than failing.
pub fn storage_record(raw: &[u8]) -> IndexRecord {
    let doc: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(_) => return IndexRecord::default(),
    };

    let info = doc.get("info").cloned().unwrap_or(Value::Null);
    let title = str_at(&info, "title");
    let version = str_at(&info, "version");
    let description = str_at(&info, "description");
    let contact_name = info
        .get("contact")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let tags: Vec<String> = doc
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut fields = BTreeMap::new();
    flatten(&doc, String::new(), &mut fields);

    let mut search_text = String::new();
    for values in fields.values() {
        for v in values {
            search_text.push_str(v);
            search_text.push(' ');
        }
    }

    IndexRecord {
        title,
        version,
        contact_name,
        description,
        tags,
        fields,
        search_text,
    }
}

fn str_at(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

/// Flatten string leaves into a dotted-path -> values map, skipping the
/// non-indexed subtrees.
fn flatten(v: &Value, path: String, out: &mut BTreeMap<String, Vec<String>>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                if NON_INDEXED_KEYS.contains(&k.as_str()) {
                    continue;
                }
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", path, k)
                };
                flatten(child, child_path, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                flatten(child, path.clone(), out);
            }
        }
        Value::String(s) => {
            if !s.is_empty() {
                out.entry(path).or_default().push(s.clone());
            }
        }
        _ => {}
    }
}

fn compiled_schema(family: SchemaFamily) -> &'static JSONSchema {
    match family {
        SchemaFamily::OpenApiV3 => {
            static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
            SCHEMA.get_or_init(|| compile(openapi_v3_schema()))
        }
        SchemaFamily::SwaggerV2 => {
            static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
            SCHEMA.get_or_init(|| compile(swagger_v2_schema()))
        }
    }
}

fn compile(schema: Value) -> JSONSchema {
    // The compiled validator borrows the schema value, so give the embedded
    // schema a program lifetime.
    let leaked: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::compile(leaked).expect("embedded schema compiles")
}

fn openapi_v3_schema() -> Value {
    json!({
        "type": "object",
        "required": ["openapi", "info", "paths"],
        "properties": {
            "openapi": { "type": "string", "pattern": "^3\\." },
            "info": {
                "type": "object",
                "required": ["title", "version"],
                "properties": {
                    "title": { "type": "string", "minLength": 1 },
                    "version": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "termsOfService": { "type": "string" },
                    "contact": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "url": { "type": "string" },
                            "email": { "type": "string" }
                        }
                    }
                }
            },
            "paths": { "type": "object" },
            "servers": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["url"],
                    "properties": { "url": { "type": "string" } }
                }
            },
            "tags": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }
            },
            "components": { "type": "object" }
        }
    })
}

fn swagger_v2_schema() -> Value {
    json!({
        "type": "object",
        "required": ["swagger", "info", "paths"],
        "properties": {
            "swagger": { "type": "string", "const": "2.0" },
            "info": {
                "type": "object",
                "required": ["title", "version"],
                "properties": {
                    "title": { "type": "string", "minLength": 1 },
                    "version": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "contact": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "url": { "type": "string" },
                            "email": { "type": "string" }
                        }
                    }
                }
            },
            "paths": { "type": "object" },
            "host": { "type": "string" },
            "basePath": { "type": "string" },
            "schemes": {
                "type": "array",
                "items": { "type": "string", "enum": ["http", "https", "ws", "wss"] }
            },
            "tags": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }
            },
            "definitions": { "type": "object" }
        }
    })
}

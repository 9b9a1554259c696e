//! Upload manifest validation
//!
//! A file-upload manifest lists data files (`files: [{file_name, file_size,
//! md5sum, ...}]`). It is checked against an embedded JSON Schema and every
//! violation becomes a `MANIFEST_INVALID` issue; the graph is never touched.

use crate::error::{DictionaryError, DictionaryResult};
use jsonschema::JSONSchema;
use mdsub_model::{Issue, IssueCode};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

static UPLOAD_MANIFEST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["files"],
        "properties": {
            "files": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["file_name", "file_size", "md5sum"],
                    "properties": {
                        "id": {"type": "string"},
                        "file_name": {"type": "string", "minLength": 1},
                        "file_size": {"type": "integer", "minimum": 0},
                        "md5sum": {"type": "string", "pattern": "^[a-fA-F0-9]{32}$"},
                        "local_file_path": {"type": "string"},
                        "project_id": {"type": "string"},
                        "type": {"type": "string"}
                    }
                }
            }
        }
    })
});

static COMPILED: Lazy<Result<JSONSchema, String>> =
    Lazy::new(|| JSONSchema::compile(&UPLOAD_MANIFEST_SCHEMA).map_err(|e| e.to_string()));

/// Parse a manifest body; JSON for `application/json`, YAML otherwise
pub fn parse_manifest(body: &str, content_type: &str) -> DictionaryResult<Value> {
    if content_type.eq_ignore_ascii_case("application/json") {
        serde_json::from_str(body).map_err(|e| DictionaryError::Syntax(e.to_string()))
    } else {
        serde_yaml::from_str(body).map_err(|e| DictionaryError::Syntax(e.to_string()))
    }
}

/// Validate a parsed manifest, returning a flat list of issues
///
/// An empty list means the manifest is valid.
pub fn validate_upload_manifest(manifest: &Value) -> DictionaryResult<Vec<Issue>> {
    let schema = COMPILED
        .as_ref()
        .map_err(|e| DictionaryError::Schema(e.clone()))?;

    let issues = match schema.validate(manifest) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|err| {
                Issue::error(
                    IssueCode::ManifestInvalid,
                    err.to_string(),
                    err.instance_path.to_string(),
                )
            })
            .collect(),
    };
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_manifest() {
        let manifest = json!({
            "files": [{
                "file_name": "reads.bam",
                "file_size": 1024,
                "md5sum": "d41d8cd98f00b204e9800998ecf8427e"
            }]
        });
        assert!(validate_upload_manifest(&manifest).unwrap().is_empty());
    }

    #[test]
    fn every_violation_is_reported() {
        let manifest = json!({
            "files": [
                {"file_name": "a.bam", "file_size": -1, "md5sum": "d41d8cd98f00b204e9800998ecf8427e"},
                {"file_name": "b.bam", "file_size": 1, "md5sum": "nothex"}
            ]
        });
        let issues = validate_upload_manifest(&manifest).unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == IssueCode::ManifestInvalid));
        assert!(issues.iter().any(|i| i.path == "/files/0/file_size"));
        assert!(issues.iter().any(|i| i.path == "/files/1/md5sum"));
    }

    #[test]
    fn missing_files_key() {
        let issues = validate_upload_manifest(&json!({})).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn yaml_manifest_parses() {
        let body = "files:\n  - file_name: a.bam\n    file_size: 3\n    md5sum: d41d8cd98f00b204e9800998ecf8427e\n";
        let manifest = parse_manifest(body, "application/x-yaml").unwrap();
        assert!(validate_upload_manifest(&manifest).unwrap().is_empty());
        assert!(matches!(
            parse_manifest("{not json", "application/json"),
            Err(DictionaryError::Syntax(_))
        ));
    }
}

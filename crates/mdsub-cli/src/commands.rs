//! Subcommand implementations
//!
//! Each command returns an [`Outcome`]; the binary prints it and maps
//! `success` to the exit code.

use anyhow::Context;
use async_trait::async_trait;
use mdsub_authz::{Decision, Identity, PolicyEngine, PolicyError, ResourceCreation, RoleSet};
use mdsub_core::{CommitMode, EngineConfig, SubmissionEngine, SubmissionRequest};
use mdsub_dictionary::{
    parse_manifest, validate_upload_manifest, Dictionary, DictionaryRegistry, SchemaValidator,
    TemplateFormat,
};
use mdsub_graph::InMemoryGraphStore;
use mdsub_ingest::Normalizer;
use mdsub_model::{Issue, ProjectScope, ResourcePath};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Printable result of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub output: String,
}

/// Arguments of `submit`
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub dictionary: PathBuf,
    pub input: PathBuf,
    pub content_type: Option<String>,
    pub program: String,
    pub project: String,
    pub mode: CommitMode,
    pub config: Option<PathBuf>,
}

/// Content type guessed from a file extension
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("yaml" | "yml") => "application/yaml",
        _ => "text/tab-separated-values",
    }
}

fn load_dictionary(path: &Path) -> anyhow::Result<Dictionary> {
    Dictionary::from_path(path).with_context(|| format!("loading dictionary {}", path.display()))
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn pretty(value: &impl serde::Serialize) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("serializing output")
}

/// Normalize and validate a submission file
pub fn validate(dictionary: &Path, input: &Path, content_type: Option<&str>) -> anyhow::Result<Outcome> {
    let dictionary = Arc::new(load_dictionary(dictionary)?);
    let body = read(input)?;
    let content_type = content_type.unwrap_or_else(|| content_type_for(input));

    let normalized = Normalizer::new()
        .with_dictionary(Arc::clone(&dictionary))
        .normalize(&body, content_type)?;
    let results = SchemaValidator::new(dictionary).validate_batch(&normalized.documents);

    let errors = normalized.issues.iter().filter(|i| i.is_error()).count()
        + results.iter().map(|r| r.errors().count()).sum::<usize>();
    tracing::info!(
        documents = normalized.documents.len(),
        errors,
        "validation finished"
    );

    let output = pretty(&json!({
        "valid": errors == 0,
        "documents": normalized.documents.len(),
        "parse_issues": normalized.issues,
        "results": results,
    }))?;
    Ok(Outcome {
        success: errors == 0,
        output,
    })
}

/// Render a template for one entity type
pub fn template(dictionary: &Path, entity: &str, format: &str) -> anyhow::Result<Outcome> {
    let dictionary = load_dictionary(dictionary)?;
    let format: TemplateFormat = format.parse()?;
    let output = dictionary.template(entity, format)?;
    Ok(Outcome {
        success: true,
        output,
    })
}

/// Validate an upload manifest file
pub fn check_manifest(input: &Path) -> anyhow::Result<Outcome> {
    let body = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let manifest = parse_manifest(&body, content_type_for(input))?;
    let issues: Vec<Issue> = validate_upload_manifest(&manifest)?;
    let output = if issues.is_empty() {
        "manifest is valid".to_string()
    } else {
        issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    };
    Ok(Outcome {
        success: issues.is_empty(),
        output,
    })
}

/// Policy engine for offline runs: everything is allowed
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPolicy;

#[async_trait]
impl PolicyEngine for LocalPolicy {
    async fn check_access(
        &self,
        _identity: &Identity,
        _roles: &RoleSet,
        _paths: &[ResourcePath],
    ) -> Result<Decision, PolicyError> {
        Ok(Decision::Allow)
    }

    async fn create_resource(&self, _path: &ResourcePath) -> Result<ResourceCreation, PolicyError> {
        Ok(ResourceCreation::Created)
    }
}

/// Dry-run a submission against a fresh in-memory graph
///
/// The program and project are registered first so the file can link to
/// them; nothing outlives the process.
pub async fn submit(options: SubmitOptions) -> anyhow::Result<Outcome> {
    let config = match &options.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_toml_str(&source)?
        }
        None => EngineConfig::default(),
    };
    let dictionary = load_dictionary(&options.dictionary)?;
    let engine = SubmissionEngine::new(
        config,
        Arc::new(DictionaryRegistry::new(dictionary)),
        Arc::new(InMemoryGraphStore::new()),
        Arc::new(LocalPolicy),
    )?;
    let identity = Identity::new("local", "local");

    let program = json!({"type": "program", "name": options.program}).to_string();
    engine
        .register_program(&identity, program.as_bytes(), "application/json")
        .await?;
    let project = json!({"type": "project", "code": options.project}).to_string();
    engine
        .register_project(&identity, &options.program, project.as_bytes(), "application/json")
        .await?;

    let body = read(&options.input)?;
    let content_type = options
        .content_type
        .unwrap_or_else(|| content_type_for(&options.input).to_string());
    let request = SubmissionRequest::new(
        ProjectScope::new(options.program, options.project),
        identity,
        body,
        content_type,
    )
    .with_mode(options.mode)
    .dry_run(true);

    let report = engine.submit(request).await?;
    Ok(Outcome {
        success: report.success,
        output: pretty(&report)?,
    })
}

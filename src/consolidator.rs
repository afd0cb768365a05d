//! Collection Consolidator
//!
//! Accumulates per-section request collections into one bundle and exports it exactly
//! once. Contributions arrive through `&mut self` from the scheduler's sequential lane,
//! so there is never more than one writer.
//!
//! State machine: `Uninitialized → Accumulating → Finalizing → Finalized`. A failed export
//! leaves the consolidator in `Finalizing`, which rejects every call until `reset`.

use crate::error::ApiError;
use crate::section::Section;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const COLLECTION_SCHEMA: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Subdirectory of the output directory that receives the bundle
pub const COLLECTION_DIR: &str = "collection";

/// Variable shared across sections; merged first-write-wins by `key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedVariable {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One section's share of the bundle, produced by the collection generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionContribution {
    pub collection_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub auth: Option<Value>,
    /// Requests and nested item groups in collection v2.1 shape
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub variables: Vec<SharedVariable>,
    #[serde(default)]
    pub environment_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsolidatorState {
    Uninitialized,
    Accumulating,
    Finalizing,
    Finalized,
}

/// What one `contribute` call added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributionSummary {
    pub request_count: usize,
    pub folder_added: bool,
}

/// Paths written by `finalize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedCollection {
    pub collection_file: PathBuf,
    pub environment_file: PathBuf,
    pub documentation_file: Option<PathBuf>,
    pub total_requests: usize,
    pub folder_count: usize,
    /// Folder names in export order
    pub folder_names: Vec<String>,
}

impl ExportedCollection {
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.collection_file.clone(), self.environment_file.clone()];
        paths.extend(self.documentation_file.clone());
        paths
    }

    /// Which files were written: `collection`, `environment` and maybe `documentation`.
    pub fn file_kinds(&self) -> Vec<&'static str> {
        let mut kinds = vec!["collection", "environment"];
        if self.documentation_file.is_some() {
            kinds.push("documentation");
        }
        kinds
    }

    pub fn summary(&self) -> String {
        format!(
            "Consolidated collection with {} requests across {} functional areas",
            self.total_requests, self.folder_count
        )
    }
}

/// Read an exported bundle back and check its shape. Returns the request count.
///
/// The bundle needs `info` with a name and schema and a non-empty `item` list.
pub fn validate_collection(path: &Path) -> Result<usize, ApiError> {
    let invalid = |reason: String| ApiError::Consolidation(format!("Invalid collection: {}", reason));
    let bytes = fs::read(path).map_err(|e| invalid(format!("cannot read {:?}: {}", path, e)))?;
    let collection: Value =
        serde_json::from_slice(&bytes).map_err(|e| invalid(format!("not JSON: {}", e)))?;

    let missing: Vec<&str> = ["info", "item"]
        .into_iter()
        .filter(|field| collection.get(*field).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!("missing {}", missing.join(", "))));
    }

    let info = &collection["info"];
    let has_text = |key: &str| info.get(key).and_then(Value::as_str).is_some_and(|v| !v.is_empty());
    if !has_text("name") || !has_text("schema") {
        return Err(invalid("info needs a name and a schema".to_string()));
    }

    let items = collection["item"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if items.is_empty() {
        return Err(invalid("no items".to_string()));
    }
    Ok(count_requests(items))
}

#[derive(Debug, Clone, Serialize)]
struct Folder {
    name: String,
    description: String,
    item: Vec<Value>,
}

#[derive(Debug, Clone)]
struct Aggregate {
    name: String,
    version: String,
    auth: Option<Value>,
    postman_id: String,
    environment_name: String,
    folders: Vec<Folder>,
    variables: Vec<SharedVariable>,
    variable_keys: HashSet<String>,
    total_requests: usize,
}

impl Aggregate {
    fn from_first(contribution: &CollectionContribution) -> Self {
        Self {
            name: contribution
                .collection_name
                .replace(" API Collection", "s API Collection"),
            version: contribution
                .version
                .clone()
                .unwrap_or_else(|| "1.0.0".to_string()),
            auth: contribution.auth.clone(),
            postman_id: uuid::Uuid::new_v4().to_string(),
            environment_name: contribution
                .environment_name
                .clone()
                .unwrap_or_else(|| "API Environment".to_string()),
            folders: Vec::new(),
            variables: Vec::new(),
            variable_keys: HashSet::new(),
            total_requests: 0,
        }
    }

    fn merge_variables(&mut self, variables: Vec<SharedVariable>) {
        for variable in variables {
            if self.variable_keys.insert(variable.key.clone()) {
                self.variables.push(variable);
            } else {
                debug!(key = %variable.key, "Keeping first value of shared variable");
            }
        }
    }

    fn description(&self) -> String {
        let names: Vec<&str> = self.folders.iter().map(|f| f.name.as_str()).collect();
        let preview = names.iter().take(3).copied().collect::<Vec<_>>().join(", ");
        let ellipsis = if names.len() > 3 { "..." } else { "" };
        format!(
            "Comprehensive API collection with all endpoints organized by functionality. \
             Total requests: {} Organized into {} functional areas: {}{} \
             Uses environment variables for easy deployment across different environments.",
            self.total_requests,
            names.len(),
            preview,
            ellipsis
        )
    }

    fn collection_json(&self) -> Value {
        let mut collection = json!({
            "info": {
                "name": self.name,
                "description": self.description(),
                "schema": COLLECTION_SCHEMA,
                "_postman_id": self.postman_id,
                "version": self.version,
            },
            "item": self.folders,
            "variable": self.variables,
        });
        if let Some(auth) = &self.auth {
            collection["auth"] = auth.clone();
        }
        collection
    }

    fn environment_json(&self) -> Value {
        let values: Vec<Value> = self
            .variables
            .iter()
            .map(|v| json!({ "key": v.key, "value": v.value, "enabled": true }))
            .collect();
        json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "name": self.environment_name,
            "values": values,
            "_postman_variable_scope": "environment",
            "_postman_exported_at": Utc::now().to_rfc3339(),
            "_postman_exported_using": "testsmith",
        })
    }

    fn readme(&self, base_name: &str) -> String {
        let mut doc = vec![
            format!("# {}", self.name),
            String::new(),
            self.description(),
            String::new(),
            "## Overview".to_string(),
            format!("- **Total Requests**: {}", self.total_requests),
            format!("- **Functional Areas**: {}", self.folders.len()),
            String::new(),
            "## Collection Structure".to_string(),
            String::new(),
        ];
        for folder in &self.folders {
            doc.push(format!("### {}", folder.name));
            if !folder.description.is_empty() {
                doc.push(folder.description.clone());
            }
            doc.push(String::new());
        }
        doc.push("## Environment Variables".to_string());
        doc.push(String::new());
        if self.variables.is_empty() {
            doc.push("This collection defines no shared variables.".to_string());
        } else {
            doc.push("| Variable | Default |".to_string());
            doc.push("|----------|---------|".to_string());
            for variable in &self.variables {
                let value = match &variable.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                doc.push(format!("| `{}` | `{}` |", variable.key, value));
            }
        }
        doc.extend([
            String::new(),
            "## Quick Start".to_string(),
            String::new(),
            "1. Import the collection JSON file into Postman".to_string(),
            "2. Import the environment file and select it".to_string(),
            "3. Update the environment variables with your actual values".to_string(),
            String::new(),
            "## Newman".to_string(),
            String::new(),
            "```bash".to_string(),
            format!(
                "newman run {}.json -e {}_environment.json",
                base_name, base_name
            ),
            "```".to_string(),
            String::new(),
            format!(
                "Generated by testsmith on {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
        ]);
        doc.join("\n")
    }
}

/// Count requests, descending into nested item groups.
pub fn count_requests(items: &[Value]) -> usize {
    items
        .iter()
        .map(|item| {
            if item.get("request").is_some() {
                1
            } else {
                item.get("item")
                    .and_then(Value::as_array)
                    .map(|nested| count_requests(nested))
                    .unwrap_or(0)
            }
        })
        .sum()
}

pub struct CollectionConsolidator {
    output_dir: PathBuf,
    export_documentation: bool,
    state: ConsolidatorState,
    aggregate: Option<Aggregate>,
}

impl CollectionConsolidator {
    /// `output_dir` is the run output root; files land in `<output_dir>/collection/`.
    pub fn new(output_dir: impl Into<PathBuf>, export_documentation: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            export_documentation,
            state: ConsolidatorState::Uninitialized,
            aggregate: None,
        }
    }

    pub fn state(&self) -> ConsolidatorState {
        self.state
    }

    pub fn total_requests(&self) -> usize {
        self.aggregate.as_ref().map_or(0, |a| a.total_requests)
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.aggregate
            .as_ref()
            .map(|a| a.folders.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn variables(&self) -> &[SharedVariable] {
        self.aggregate
            .as_ref()
            .map(|a| a.variables.as_slice())
            .unwrap_or(&[])
    }

    /// Add one section's contribution; the first one fixes the bundle identity.
    pub fn contribute(
        &mut self,
        section: &Section,
        contribution: CollectionContribution,
    ) -> Result<ContributionSummary, ApiError> {
        match self.state {
            ConsolidatorState::Uninitialized | ConsolidatorState::Accumulating => {}
            ConsolidatorState::Finalizing => {
                return Err(ApiError::Consolidation(
                    "consolidator is unusable after a failed export; reset it first".to_string(),
                ))
            }
            ConsolidatorState::Finalized => {
                return Err(ApiError::Consolidation(
                    "cannot contribute after the collection was finalized".to_string(),
                ))
            }
        }

        let aggregate = self
            .aggregate
            .get_or_insert_with(|| Aggregate::from_first(&contribution));
        self.state = ConsolidatorState::Accumulating;

        aggregate.merge_variables(contribution.variables);

        if contribution.items.is_empty() {
            debug!(section_id = %section.id, "Empty contribution, no folder added");
            return Ok(ContributionSummary {
                request_count: 0,
                folder_added: false,
            });
        }

        let request_count = count_requests(&contribution.items);
        aggregate.total_requests += request_count;
        aggregate.folders.push(Folder {
            name: section.name.clone(),
            description: section.description.clone(),
            item: contribution.items,
        });

        info!(
            section = %section.name,
            request_count,
            "Added section folder to collection"
        );
        Ok(ContributionSummary {
            request_count,
            folder_added: true,
        })
    }

    /// Write `<base>.json`, `<base>_environment.json` and (unless disabled)
    /// `<base>_README.md`, then move to `Finalized`.
    pub fn finalize(&mut self, base_name: &str) -> Result<ExportedCollection, ApiError> {
        match self.state {
            ConsolidatorState::Accumulating => {}
            ConsolidatorState::Uninitialized => {
                return Err(ApiError::Consolidation(
                    "No collection data to export".to_string(),
                ))
            }
            ConsolidatorState::Finalizing => {
                return Err(ApiError::Consolidation(
                    "a previous export failed; reset before finalizing again".to_string(),
                ))
            }
            ConsolidatorState::Finalized => {
                return Err(ApiError::Consolidation(
                    "collection was already finalized".to_string(),
                ))
            }
        }
        let aggregate = self
            .aggregate
            .as_ref()
            .ok_or_else(|| ApiError::Consolidation("No collection data to export".to_string()))?;

        self.state = ConsolidatorState::Finalizing;
        let exported = export(
            aggregate,
            &self.output_dir.join(COLLECTION_DIR),
            base_name,
            self.export_documentation,
        )?;
        self.state = ConsolidatorState::Finalized;

        info!(
            total_requests = exported.total_requests,
            folders = exported.folder_count,
            path = %exported.collection_file.display(),
            "Consolidated collection exported"
        );
        Ok(exported)
    }

    pub fn reset(&mut self) {
        self.state = ConsolidatorState::Uninitialized;
        self.aggregate = None;
        debug!("Consolidator reset");
    }
}

fn export(
    aggregate: &Aggregate,
    dir: &Path,
    base_name: &str,
    export_documentation: bool,
) -> Result<ExportedCollection, ApiError> {
    let write_err =
        |what: &str, e: &dyn std::fmt::Display| ApiError::Consolidation(format!("Failed to write {}: {}", what, e));

    fs::create_dir_all(dir).map_err(|e| write_err("collection directory", &e))?;

    let collection_file = dir.join(format!("{}.json", base_name));
    let body = serde_json::to_vec_pretty(&aggregate.collection_json())
        .map_err(|e| write_err("collection", &e))?;
    fs::write(&collection_file, body).map_err(|e| write_err("collection", &e))?;

    let environment_file = dir.join(format!("{}_environment.json", base_name));
    let body = serde_json::to_vec_pretty(&aggregate.environment_json())
        .map_err(|e| write_err("environment", &e))?;
    fs::write(&environment_file, body).map_err(|e| write_err("environment", &e))?;

    let documentation_file = if export_documentation {
        let path = dir.join(format!("{}_README.md", base_name));
        fs::write(&path, aggregate.readme(base_name)).map_err(|e| write_err("documentation", &e))?;
        Some(path)
    } else {
        None
    };

    Ok(ExportedCollection {
        collection_file,
        environment_file,
        documentation_file,
        total_requests: aggregate.total_requests,
        folder_count: aggregate.folders.len(),
        folder_names: aggregate.folders.iter().map(|f| f.name.clone()).collect(),
    })
}

//! Schema export and synchronization
//!
//! A schema file is a JSON array of `{"object": name, "fields": {field:
//! description}}`. Descriptions carry enough type information for
//! [`infer`] to recreate the field on another org.

pub mod diff;
pub mod export;
pub mod infer;
pub mod plural;
pub mod sync;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One object of a schema file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub object: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ObjectSchema {
    pub fn is_custom(&self) -> bool {
        self.object.ends_with("__c")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub object: String,
    pub field_count: usize,
    pub fields: BTreeMap<String, String>,
}

/// Content of `<org>_schema_summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub org_type: String,
    pub total_objects: usize,
    pub objects: Vec<ObjectSummary>,
}

impl SchemaSummary {
    pub fn new(org_type: &str, schema: &[ObjectSchema]) -> Self {
        Self {
            org_type: org_type.to_string(),
            total_objects: schema.len(),
            objects: schema
                .iter()
                .map(|o| ObjectSummary {
                    object: o.object.clone(),
                    field_count: o.fields.len(),
                    fields: o.fields.clone(),
                })
                .collect(),
        }
    }
}

pub fn load_schema(path: &Path) -> Result<Vec<ObjectSchema>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse schema file: {}", path.display()))
}

//! Export org object definitions to a schema file

use anyhow::{Context, Result};
use colored::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{ObjectSchema, SchemaSummary};
use crate::api::OrgApi;
use crate::api::models::{FieldDescribe, SObjectDescribe};
use crate::upload::SYSTEM_FIELDS;

/// Description text [`super::infer`] can map back to the field type
pub fn field_description(field: &FieldDescribe) -> String {
    let label = if field.label.is_empty() {
        field.name.as_str()
    } else {
        field.label.as_str()
    };

    match field.field_type.as_str() {
        "reference" if !field.reference_to.is_empty() => {
            format!("{}. References {}", label, field.reference_to.join(", "))
        }
        "picklist" | "multipicklist" if !field.picklist_values.is_empty() => {
            let values: Vec<String> = field
                .picklist_values
                .iter()
                .filter(|p| p.active)
                .map(|p| format!("'{}'", p.value.replace('\'', "")))
                .collect();
            format!("{}. One of [{}]", label, values.join(", "))
        }
        "datetime" => format!("{}. Timestamp in format YYYY-MM-DDTHH:MM:SS", label),
        "date" => format!("{}. A date", label),
        "boolean" => format!("{}. A boolean flag", label),
        "double" | "currency" | "int" | "percent" => format!("{}. A number ({})", label, field.field_type),
        "textarea" if field.length.unwrap_or(0) > 255 => format!("{}. Long text content", label),
        other => format!("{} ({})", label, other),
    }
}

/// Schema entry for a described object: its createable fields, audit fields excluded
pub fn describe_to_schema(describe: &SObjectDescribe) -> ObjectSchema {
    let fields: BTreeMap<String, String> = describe
        .fields
        .iter()
        .filter(|f| f.createable && !SYSTEM_FIELDS.contains(&f.name.as_str()))
        .map(|f| (f.name.clone(), field_description(f)))
        .collect();

    ObjectSchema {
        object: describe.name.clone(),
        fields,
    }
}

/// Describe each object; objects the org lacks are returned separately
pub async fn export_schema(api: &dyn OrgApi, objects: &[String]) -> Result<(Vec<ObjectSchema>, Vec<String>)> {
    let mut schema = Vec::new();
    let mut missing = Vec::new();

    for object in objects {
        match api
            .describe(object)
            .await
            .with_context(|| format!("Failed to describe {}", object))?
        {
            Some(describe) => {
                let entry = describe_to_schema(&describe);
                println!("  {} {}: {} fields", "✓".green(), entry.object, entry.fields.len());
                schema.push(entry);
            }
            None => {
                println!("  {} {}: not available in this org", "-".dimmed(), object);
                missing.push(object.clone());
            }
        }
    }

    Ok((schema, missing))
}

/// Write `<org>_schema.json` and `<org>_schema_summary.json` into `dir`
pub fn write_schema(dir: &Path, org_type: &str, schema: &[ObjectSchema]) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let schema_path = dir.join(format!("{}_schema.json", org_type));
    let summary_path = dir.join(format!("{}_schema_summary.json", org_type));

    fs::write(&schema_path, serde_json::to_string_pretty(schema)?)
        .with_context(|| format!("Failed to write schema: {}", schema_path.display()))?;

    let summary = SchemaSummary::new(org_type, schema);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write summary: {}", summary_path.display()))?;

    Ok((schema_path, summary_path))
}

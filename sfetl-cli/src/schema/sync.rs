//! Create missing custom objects and fields from a schema file
//!
//! Three passes: custom objects (Metadata API), custom fields (Tooling
//! API), then the `OriginalId__c` external-id field the uploader upserts on.
//! Every decision is recorded as a [`SyncAction`]; in dry-run mode nothing
//! is sent and actions stay `Planned`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::ObjectSchema;
use super::diff::{EXTERNAL_ID_EXEMPT, ObjectDiff, compare_object};
use super::infer::{FieldKind, external_id_metadata};
use super::plural::plural_label;
use crate::api::models::SObjectDescribe;
use crate::api::{ApiError, SalesforceClient};
use crate::upload::EXTERNAL_ID_FIELD;

/// Org operations the synchronizer needs
#[async_trait]
pub trait SchemaApi: Send + Sync {
    async fn object_names(&self) -> Result<HashSet<String>>;
    async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>>;
    async fn create_custom_object(&self, full_name: &str, label: &str, plural_label: &str) -> Result<()>;
    async fn create_custom_field(&self, full_name: &str, metadata: Value) -> Result<()>;
}

#[async_trait]
impl SchemaApi for SalesforceClient {
    async fn object_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .describe_global()
            .await?
            .sobjects
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>> {
        SalesforceClient::describe(self, object).await
    }

    async fn create_custom_object(&self, full_name: &str, label: &str, plural_label: &str) -> Result<()> {
        let result = SalesforceClient::create_custom_object(self, full_name, label, plural_label).await?;
        if result.success {
            return Ok(());
        }
        Err(ApiError {
            status: 200,
            error_code: result.status_code.unwrap_or_default(),
            message: result.message.unwrap_or_default(),
        }
        .into())
    }

    async fn create_custom_field(&self, full_name: &str, metadata: Value) -> Result<()> {
        SalesforceClient::create_custom_field(self, full_name, metadata).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreateObject,
    CreateField,
    CreateExternalId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Planned,
    Created,
    AlreadyExists,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncAction {
    pub kind: ActionKind,
    /// `Object` or `Object.Field__c`
    pub target: String,
    /// Field type or label
    pub detail: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub actions: Vec<SyncAction>,
    /// Schema fields with a different type in the org (reported, not changed)
    pub type_mismatches: Vec<String>,
    pub standard_missing: usize,
}

impl SyncReport {
    pub fn count(&self, kind: ActionKind, matches: impl Fn(&Outcome) -> bool) -> usize {
        self.actions
            .iter()
            .filter(|a| a.kind == kind && matches(&a.outcome))
            .count()
    }

    pub fn created(&self, kind: ActionKind) -> usize {
        self.count(kind, |o| matches!(o, Outcome::Created | Outcome::Planned))
    }

    pub fn existing(&self, kind: ActionKind) -> usize {
        self.count(kind, |o| matches!(o, Outcome::AlreadyExists))
    }

    pub fn skipped(&self, kind: ActionKind) -> usize {
        self.count(kind, |o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.outcome, Outcome::Failed(_)))
            .count()
    }
}

/// Creation failed because the component is already there
fn is_duplicate(err: &anyhow::Error) -> bool {
    if let Some(api) = err.downcast_ref::<ApiError>() {
        if api.error_code == "DUPLICATE_DEVELOPER_NAME" {
            return true;
        }
    }
    let text = format!("{:#}", err);
    text.contains("DUPLICATE_DEVELOPER_NAME") || text.to_lowercase().contains("already exists")
}

/// The org cannot take the field on this object
fn is_unsupported(err: &anyhow::Error) -> bool {
    let text = format!("{:#}", err);
    text.to_lowercase().contains("not found")
        || text.contains("FIELD_INTEGRITY_EXCEPTION")
        || text.contains("INVALID_OR_NULL_FOR_RESTRICTED_PICKLIST")
}

pub struct SchemaSyncer<'a> {
    api: &'a dyn SchemaApi,
    dry_run: bool,
    existing_objects: HashSet<String>,
    describes: HashMap<String, Option<SObjectDescribe>>,
}

impl<'a> SchemaSyncer<'a> {
    pub async fn new(api: &'a dyn SchemaApi, dry_run: bool) -> Result<Self> {
        let existing_objects = api.object_names().await?;
        log::info!("Org has {} objects", existing_objects.len());
        Ok(Self {
            api,
            dry_run,
            existing_objects,
            describes: HashMap::new(),
        })
    }

    async fn describe_cached(&mut self, object: &str) -> Result<Option<SObjectDescribe>> {
        if !self.existing_objects.contains(object) {
            return Ok(None);
        }
        if let Some(cached) = self.describes.get(object) {
            return Ok(cached.clone());
        }
        let describe = self.api.describe(object).await?;
        self.describes.insert(object.to_string(), describe.clone());
        Ok(describe)
    }

    /// Diff every schema entry against the org
    pub async fn plan(&mut self, schema: &[ObjectSchema]) -> Result<Vec<ObjectDiff>> {
        let mut diffs = Vec::with_capacity(schema.len());
        for entry in schema {
            let describe = self.describe_cached(&entry.object).await?;
            diffs.push(compare_object(entry, describe.as_ref()));
        }
        Ok(diffs)
    }

    pub async fn sync(&mut self, schema: &[ObjectSchema]) -> Result<SyncReport> {
        let diffs = self.plan(schema).await?;
        let mut report = SyncReport::default();
        let mut available: HashSet<String> = self.existing_objects.clone();

        // Pass 1: custom objects
        for diff in diffs.iter().filter(|d| d.custom) {
            let label = diff.object.trim_end_matches("__c").replace('_', " ");
            let outcome = if !diff.needs_object() {
                Outcome::AlreadyExists
            } else if self.dry_run {
                Outcome::Planned
            } else {
                match self
                    .api
                    .create_custom_object(&diff.object, &label, &plural_label(&label))
                    .await
                {
                    Ok(()) => Outcome::Created,
                    Err(e) if is_duplicate(&e) => Outcome::AlreadyExists,
                    Err(e) => Outcome::Failed(format!("{:#}", e)),
                }
            };

            if matches!(outcome, Outcome::Created | Outcome::Planned | Outcome::AlreadyExists) {
                available.insert(diff.object.clone());
            }
            report.actions.push(SyncAction {
                kind: ActionKind::CreateObject,
                target: diff.object.clone(),
                detail: label,
                outcome,
            });
        }

        // Pass 2: custom fields
        for diff in &diffs {
            report.standard_missing += diff.standard_missing.len();
            report.type_mismatches.extend(diff.fields_type_mismatch.iter().map(|f| {
                format!("{} ({})", f.full_name(&diff.object), f.kind.describe_type())
            }));

            for field in &diff.fields_to_add {
                let outcome = if !available.contains(&diff.object) {
                    Outcome::Skipped(format!("{} is not available", diff.object))
                } else if let FieldKind::Lookup { reference_to, .. } = &field.kind {
                    if available.contains(reference_to) {
                        self.create_field(&field.full_name(&diff.object), field.kind.metadata(&field.name))
                            .await
                    } else {
                        Outcome::Failed(format!("referenced object {} not found", reference_to))
                    }
                } else {
                    self.create_field(&field.full_name(&diff.object), field.kind.metadata(&field.name))
                        .await
                };

                report.actions.push(SyncAction {
                    kind: ActionKind::CreateField,
                    target: field.full_name(&diff.object),
                    detail: field.kind.display(),
                    outcome,
                });
            }
        }

        // Pass 3: external-id fields
        let mut objects: Vec<&ObjectDiff> = diffs.iter().collect();
        objects.sort_by(|a, b| a.object.cmp(&b.object));
        for diff in objects {
            let target = format!("{}.{}", diff.object, EXTERNAL_ID_FIELD);
            let outcome = if EXTERNAL_ID_EXEMPT.contains(&diff.object.as_str()) {
                Outcome::Skipped(format!("{} cannot carry an external id", diff.object))
            } else if !available.contains(&diff.object) {
                Outcome::Skipped(format!("{} is not available", diff.object))
            } else if !diff.needs_external_id {
                Outcome::AlreadyExists
            } else {
                match self.create_field(&target, external_id_metadata()).await {
                    Outcome::Failed(message) if message.to_lowercase().contains("not found") => {
                        Outcome::Skipped(message)
                    }
                    other => other,
                }
            };

            report.actions.push(SyncAction {
                kind: ActionKind::CreateExternalId,
                target,
                detail: "Text(18) external id, unique".into(),
                outcome,
            });
        }

        Ok(report)
    }

    async fn create_field(&self, full_name: &str, metadata: Value) -> Outcome {
        if self.dry_run {
            return Outcome::Planned;
        }

        match self.api.create_custom_field(full_name, metadata).await {
            Ok(()) => {
                log::info!("Created field {}", full_name);
                Outcome::Created
            }
            Err(e) if is_duplicate(&e) => Outcome::AlreadyExists,
            Err(e) if full_name.ends_with(EXTERNAL_ID_FIELD) && is_unsupported(&e) => {
                Outcome::Skipped(format!("{:#}", e))
            }
            Err(e) => {
                log::warn!("Creating field {} failed: {:#}", full_name, e);
                Outcome::Failed(format!("{:#}", e))
            }
        }
    }
}

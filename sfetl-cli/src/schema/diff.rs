//! Schema diff logic for comparing a schema file against the org
//!
//! This module provides functions to:
//! - Compare the fields of a schema entry with the org's describe
//! - Categorize fields as matching, to-create, type-mismatch or standard-missing
//! - Decide whether the object still needs its external-id field

use std::collections::HashMap;

use super::ObjectSchema;
use super::infer::{FieldKind, infer_field_type};
use crate::api::models::{FieldDescribe, SObjectDescribe};
use crate::upload::{EXTERNAL_ID_FIELD, SYSTEM_FIELDS};

/// Objects that cannot carry `OriginalId__c`
pub const EXTERNAL_ID_EXEMPT: &[&str] = &["Knowledge__kav", "Task", "Event"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSyncStatus {
    InBoth,
    /// Custom field missing from the org
    ToCreate,
    TypeMismatch { schema_type: String, org_type: String },
    /// Standard field the org does not expose; never created
    StandardMissing,
}

#[derive(Debug, Clone)]
pub struct FieldDiffEntry {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    pub status: FieldSyncStatus,
}

impl FieldDiffEntry {
    /// `Object.Field__c`
    pub fn full_name(&self, object: &str) -> String {
        format!("{}.{}", object, self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectDiff {
    pub object: String,
    pub custom: bool,
    pub exists_in_org: bool,
    pub fields_in_both: Vec<FieldDiffEntry>,
    pub fields_to_add: Vec<FieldDiffEntry>,
    pub fields_type_mismatch: Vec<FieldDiffEntry>,
    pub standard_missing: Vec<FieldDiffEntry>,
    pub needs_external_id: bool,
}

impl ObjectDiff {
    pub fn needs_object(&self) -> bool {
        self.custom && !self.exists_in_org
    }
}

/// Check if an inferred kind is compatible with the org's field type
fn fields_match(kind: &FieldKind, org_field: &FieldDescribe) -> bool {
    let org_type = org_field.field_type.as_str();
    match kind {
        FieldKind::Text | FieldKind::LongTextArea => matches!(org_type, "string" | "textarea"),
        FieldKind::Number => matches!(org_type, "double" | "currency" | "int" | "percent"),
        FieldKind::Picklist(_) => matches!(org_type, "picklist" | "multipicklist"),
        FieldKind::Lookup { .. } => matches!(org_type, "reference" | "id"),
        other => other.describe_type() == org_type,
    }
}

/// Compare one schema entry with the org's describe (`None` when the org lacks the object)
pub fn compare_object(schema: &ObjectSchema, org: Option<&SObjectDescribe>) -> ObjectDiff {
    let org_fields: HashMap<&str, &FieldDescribe> = org
        .map(|d| d.fields.iter().map(|f| (f.name.as_str(), f)).collect())
        .unwrap_or_default();

    let mut diff = ObjectDiff {
        object: schema.object.clone(),
        custom: schema.is_custom(),
        exists_in_org: org.is_some(),
        needs_external_id: !EXTERNAL_ID_EXEMPT.contains(&schema.object.as_str())
            && !org_fields.contains_key(EXTERNAL_ID_FIELD),
        ..Default::default()
    };

    for (name, description) in &schema.fields {
        if name == "Id" || name == EXTERNAL_ID_FIELD || SYSTEM_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let kind = infer_field_type(&schema.object, name, description);
        let mut entry = FieldDiffEntry {
            name: name.clone(),
            description: description.clone(),
            kind,
            status: FieldSyncStatus::InBoth,
        };

        match org_fields.get(name.as_str()) {
            Some(org_field) if fields_match(&entry.kind, org_field) => diff.fields_in_both.push(entry),
            Some(org_field) => {
                entry.status = FieldSyncStatus::TypeMismatch {
                    schema_type: entry.kind.describe_type().to_string(),
                    org_type: org_field.field_type.clone(),
                };
                diff.fields_type_mismatch.push(entry);
            }
            None if name.ends_with("__c") => {
                entry.status = FieldSyncStatus::ToCreate;
                diff.fields_to_add.push(entry);
            }
            None => {
                entry.status = FieldSyncStatus::StandardMissing;
                diff.standard_missing.push(entry);
            }
        }
    }

    diff
}

/// Generate summary statistics for a set of object diffs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiffStats {
    pub objects_to_create: usize,
    pub fields_matching: usize,
    pub fields_to_add: usize,
    pub fields_type_mismatch: usize,
    pub standard_missing: usize,
    pub external_ids_to_add: usize,
}

impl SchemaDiffStats {
    pub fn from_diffs(diffs: &[ObjectDiff]) -> Self {
        diffs.iter().fold(Self::default(), |mut s, d| {
            s.objects_to_create += usize::from(d.needs_object());
            s.fields_matching += d.fields_in_both.len();
            s.fields_to_add += d.fields_to_add.len();
            s.fields_type_mismatch += d.fields_type_mismatch.len();
            s.standard_missing += d.standard_missing.len();
            s.external_ids_to_add += usize::from(d.needs_external_id);
            s
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_field(name: &str, field_type: &str) -> FieldDescribe {
        FieldDescribe {
            name: name.to_string(),
            label: name.to_string(),
            field_type: field_type.to_string(),
            custom: name.ends_with("__c"),
            nillable: true,
            createable: true,
            external_id: name == EXTERNAL_ID_FIELD,
            length: None,
            reference_to: Vec::new(),
            picklist_values: Vec::new(),
        }
    }

    fn describe(name: &str, fields: Vec<FieldDescribe>) -> SObjectDescribe {
        SObjectDescribe {
            name: name.to_string(),
            label: name.to_string(),
            custom: name.ends_with("__c"),
            fields,
        }
    }

    fn schema(object: &str, fields: &[(&str, &str)]) -> ObjectSchema {
        ObjectSchema {
            object: object.to_string(),
            fields: fields
                .iter()
                .map(|(n, d)| (n.to_string(), d.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_compare_identical_schemas() {
        let entry = schema("Case", &[("Subject", "Subject line"), ("Score__c", "A number")]);
        let org = describe(
            "Case",
            vec![
                make_field("Subject", "string"),
                make_field("Score__c", "double"),
                make_field(EXTERNAL_ID_FIELD, "string"),
            ],
        );

        let diff = compare_object(&entry, Some(&org));

        assert_eq!(diff.fields_in_both.len(), 2);
        assert!(diff.fields_to_add.is_empty());
        assert!(diff.fields_type_mismatch.is_empty());
        assert!(!diff.needs_external_id);
        assert!(!diff.needs_object());
    }

    #[test]
    fn test_custom_fields_to_add_standard_never() {
        let entry = schema(
            "Case",
            &[("IssueId__c", "ID of the Issue"), ("ClosedReason", "Why it closed"), ("Id", "Record id")],
        );
        let org = describe("Case", vec![make_field("Subject", "string")]);

        let diff = compare_object(&entry, Some(&org));

        assert_eq!(diff.fields_to_add.len(), 1);
        assert_eq!(diff.fields_to_add[0].full_name("Case"), "Case.IssueId__c");
        assert!(matches!(diff.fields_to_add[0].kind, FieldKind::Lookup { .. }));
        assert_eq!(diff.standard_missing.len(), 1);
        assert!(diff.needs_external_id);
    }

    #[test]
    fn test_compare_type_mismatch() {
        let entry = schema("Case", &[("Escalated__c", "A boolean flag")]);
        let org = describe("Case", vec![make_field("Escalated__c", "string")]);

        let diff = compare_object(&entry, Some(&org));

        assert!(diff.fields_in_both.is_empty());
        assert_eq!(
            diff.fields_type_mismatch[0].status,
            FieldSyncStatus::TypeMismatch {
                schema_type: "boolean".into(),
                org_type: "string".into(),
            }
        );
    }

    #[test]
    fn test_missing_custom_object() {
        let entry = schema("Issue__c", &[("Name", "Issue name"), ("Priority__c", "One of ['High']")]);

        let diff = compare_object(&entry, None);

        assert!(diff.needs_object());
        assert_eq!(diff.fields_to_add.len(), 1);
        assert!(diff.needs_external_id);
    }

    #[test]
    fn test_external_id_exempt_objects() {
        let diff = compare_object(&schema("Task", &[]), Some(&describe("Task", Vec::new())));
        assert!(!diff.needs_external_id);
    }

    #[test]
    fn test_stats() {
        let diffs = vec![
            compare_object(&schema("Issue__c", &[("Priority__c", "One of ['High']")]), None),
            compare_object(&schema("Task", &[]), Some(&describe("Task", Vec::new()))),
        ];

        let stats = SchemaDiffStats::from_diffs(&diffs);
        assert_eq!(stats.objects_to_create, 1);
        assert_eq!(stats.fields_to_add, 1);
        assert_eq!(stats.external_ids_to_add, 1);
    }
}

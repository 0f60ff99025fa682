//! Salesforce REST payload models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A JSON object as sent to / received from the REST API
pub type Record = serde_json::Map<String, Value>;

/// Per-record result of a create / upsert / delete call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveResult {
    #[serde(default)]
    pub id: Option<String>,
    pub success: bool,
    /// Only present for upserts: true when a new record was created
    #[serde(default)]
    pub created: Option<bool>,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

impl SaveResult {
    /// Successful result carrying the remote ID
    pub fn ok(id: impl Into<String>, created: Option<bool>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            created,
            errors: Vec::new(),
        }
    }

    /// Failed result with a single error
    pub fn failed(status_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            success: false,
            created: None,
            errors: vec![ApiErrorDetail {
                status_code: status_code.into(),
                message: message.into(),
                fields: Vec::new(),
            }],
        }
    }

    /// First error of a failed result
    pub fn first_error(&self) -> Option<&ApiErrorDetail> {
        self.errors.first()
    }
}

/// Error entry inside a SaveResult
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorDetail {
    #[serde(rename = "statusCode", default)]
    pub status_code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Response page of a SOQL query
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    pub done: bool,
    #[serde(rename = "nextRecordsUrl", default)]
    pub next_records_url: Option<String>,
    #[serde(default)]
    pub records: Vec<Value>,
}

/// Result of `GET /sobjects`
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeGlobal {
    pub sobjects: Vec<SObjectSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SObjectSummary {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub queryable: bool,
}

/// Result of `GET /sobjects/{name}/describe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectDescribe {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescribe>,
}

impl SObjectDescribe {
    /// Look up a field by API name
    pub fn field(&self, name: &str) -> Option<&FieldDescribe> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields that can be set on create
    pub fn createable_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.createable)
            .map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescribe {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub createable: bool,
    #[serde(rename = "externalId", default)]
    pub external_id: bool,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(rename = "referenceTo", default)]
    pub reference_to: Vec<String>,
    #[serde(rename = "picklistValues", default)]
    pub picklist_values: Vec<PicklistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistEntry {
    pub value: String,
    #[serde(default)]
    pub active: bool,
}

/// One entry of `GET /limits`
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct LimitValue {
    #[serde(rename = "Max")]
    pub max: i64,
    #[serde(rename = "Remaining")]
    pub remaining: i64,
}

impl LimitValue {
    pub fn used(&self) -> i64 {
        self.max - self.remaining
    }
}

/// Org limits keyed by limit name (e.g. "DataStorageMB")
pub type OrgLimits = HashMap<String, LimitValue>;

/// Request to convert a Lead into existing Account / Contact (/ Opportunity)
#[derive(Debug, Clone, PartialEq)]
pub struct LeadConvertRequest {
    pub lead_id: String,
    pub account_id: String,
    pub contact_id: String,
    pub opportunity_id: Option<String>,
    pub converted_status: String,
}

/// Outcome of a single Lead conversion
#[derive(Debug, Clone, PartialEq)]
pub struct LeadConvertOutcome {
    pub success: bool,
    pub status_code: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_result_deserializes_collection_response() {
        let json = r#"[
            {"id": "001000000000001AAA", "success": true, "created": true, "errors": []},
            {"success": false, "errors": [{"statusCode": "DUPLICATE_VALUE", "message": "duplicate value found", "fields": ["Email"]}]}
        ]"#;

        let results: Vec<SaveResult> = serde_json::from_str(json).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert_eq!(results[0].created, Some(true));
        assert!(!results[1].success);
        let err = results[1].first_error().unwrap();
        assert_eq!(err.status_code, "DUPLICATE_VALUE");
        assert_eq!(err.fields, vec!["Email".to_string()]);
    }

    #[test]
    fn test_limits_used() {
        let json = r#"{"DataStorageMB": {"Max": 200, "Remaining": 150}}"#;
        let limits: OrgLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits["DataStorageMB"].used(), 50);
    }
}

//! Field type inference from a field name and its description

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::upload::CATALOG;

static REFERENCES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)References\s+(\w+)").expect("valid regex"));

static ID_OF_THE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ID of the\s+([\w\s]+?)(?:\s+associated|\s+related|\.|$)").expect("valid regex")
});

static ASSOCIATED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:associated with|related to)\s+(?:this\s+)?(\w+)").expect("valid regex")
});

static ONE_OF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)One of\s+\[(.*?)\]").expect("valid regex"));

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"](.*?)['"]"#).expect("valid regex"));

/// Inferred custom field type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Lookup {
        reference_to: String,
        relationship_name: String,
    },
    Picklist(Vec<String>),
    Date,
    DateTime,
    Checkbox,
    Email,
    Phone,
    Url,
    Number,
    LongTextArea,
    Text,
}

impl FieldKind {
    /// Metadata API type name
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Lookup { .. } => "Lookup",
            FieldKind::Picklist(_) => "Picklist",
            FieldKind::Date => "Date",
            FieldKind::DateTime => "DateTime",
            FieldKind::Checkbox => "Checkbox",
            FieldKind::Email => "Email",
            FieldKind::Phone => "Phone",
            FieldKind::Url => "Url",
            FieldKind::Number => "Number",
            FieldKind::LongTextArea => "LongTextArea",
            FieldKind::Text => "Text",
        }
    }

    /// Type name the REST describe reports for a field of this kind
    pub fn describe_type(&self) -> &'static str {
        match self {
            FieldKind::Lookup { .. } => "reference",
            FieldKind::Picklist(_) => "picklist",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Checkbox => "boolean",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
            FieldKind::Url => "url",
            FieldKind::Number => "double",
            FieldKind::LongTextArea => "textarea",
            FieldKind::Text => "string",
        }
    }

    /// Short form for plans and logs, e.g. `Lookup(Account)`
    pub fn display(&self) -> String {
        match self {
            FieldKind::Lookup { reference_to, .. } => format!("Lookup({})", reference_to),
            FieldKind::Picklist(values) => {
                let shown: Vec<&str> = values.iter().take(3).map(String::as_str).collect();
                let more = if values.len() > 3 { "..." } else { "" };
                format!("Picklist[{}{}]", shown.join(", "), more)
            }
            other => other.type_name().to_string(),
        }
    }

    /// Tooling API `CustomField.Metadata` body
    pub fn metadata(&self, field_name: &str) -> Value {
        let label = field_name.trim_end_matches("__c").replace('_', " ");
        let mut meta = json!({ "type": self.type_name(), "label": label });

        let extra = match self {
            FieldKind::Text => json!({ "length": 255 }),
            FieldKind::LongTextArea => json!({ "length": 32000, "visibleLines": 3 }),
            FieldKind::Number => json!({ "precision": 18, "scale": 2 }),
            FieldKind::Checkbox => json!({ "defaultValue": "false" }),
            FieldKind::Lookup {
                reference_to,
                relationship_name,
            } => json!({ "referenceTo": reference_to, "relationshipName": relationship_name }),
            FieldKind::Picklist(values) => json!({
                "valueSet": {
                    "valueSetDefinition": {
                        "sorted": false,
                        "value": values
                            .iter()
                            .map(|v| json!({ "fullName": v, "default": false }))
                            .collect::<Vec<_>>(),
                    }
                }
            }),
            _ => Value::Null,
        };

        if let (Some(meta), Value::Object(extra)) = (meta.as_object_mut(), extra) {
            meta.extend(extra);
        }
        meta
    }
}

/// Metadata of the `OriginalId__c` external-id field
pub fn external_id_metadata() -> Value {
    json!({
        "type": "Text",
        "label": "Original ID",
        "length": 18,
        "externalId": true,
        "unique": true,
    })
}

fn standard_object(name: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .map(|s| s.name)
        .filter(|n| !n.ends_with("__c"))
        .find(|n| n.eq_ignore_ascii_case(name))
}

fn as_custom(object: String, field_name: &str) -> String {
    if field_name.ends_with("__c") && !object.ends_with("__c") {
        format!("{}__c", object)
    } else {
        object
    }
}

/// Object a reference field points at, from its description or its name
pub fn extract_referenced_object(description: &str, field_name: &str) -> Option<String> {
    if let Some(caps) = REFERENCES_RE.captures(description) {
        return Some(caps[1].to_string());
    }

    if let Some(caps) = ID_OF_THE_RE.captures(description) {
        let name: String = caps[1]
            .split_whitespace()
            .map(capitalize)
            .collect();
        if let Some(standard) = standard_object(&name) {
            return Some(standard.to_string());
        }
        return Some(as_custom(name, field_name));
    }

    if let Some(caps) = ASSOCIATED_RE.captures(description) {
        return Some(as_custom(caps[1].to_string(), field_name));
    }

    let stem = field_name
        .trim_end_matches("__c")
        .trim_end_matches("Id")
        .replace("__c", "");
    if stem.is_empty() {
        return None;
    }
    Some(as_custom(capitalize(&stem), field_name))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Values of a `One of ['a', 'b']` description
pub fn extract_picklist_values(description: &str) -> Option<Vec<String>> {
    let caps = ONE_OF_RE.captures(description)?;
    let inner = &caps[1];

    let quoted: Vec<String> = QUOTED_RE
        .captures_iter(inner)
        .map(|c| c[1].to_string())
        .collect();
    let values: Vec<String> = if quoted.is_empty() {
        inner
            .split(',')
            .map(|v| v.trim().trim_matches(|c: char| c == '\'' || c == '"').to_string())
            .collect()
    } else {
        quoted
    };

    let values: Vec<String> = values.into_iter().filter(|v| !v.trim().is_empty()).collect();
    (!values.is_empty()).then_some(values)
}

/// Relationship name for a lookup: object stem plus field stem, letters and digits only
fn relationship_name(object: &str, field_name: &str) -> String {
    let stem = field_name.replace("Id__c", "").replace("Id", "").replace("__c", "");
    let mut rel: String = stem.split('_').filter(|w| !w.is_empty()).map(capitalize).collect();
    if rel.is_empty() {
        rel = "Ref".to_string();
    }
    if !rel.starts_with(|c: char| c.is_ascii_alphabetic()) {
        rel = format!("Ref{}", rel);
    }
    format!("{}{}", object.replace("__c", ""), rel)
}

pub fn infer_field_type(object: &str, field_name: &str, description: &str) -> FieldKind {
    let name_lower = field_name.to_lowercase();
    let desc_lower = description.to_lowercase();

    if (field_name.ends_with("Id") || field_name.ends_with("Id__c"))
        && ["references", "associated with", "related to", "id of the"]
            .iter()
            .any(|p| desc_lower.contains(p))
    {
        if let Some(reference_to) = extract_referenced_object(description, field_name) {
            return FieldKind::Lookup {
                reference_to,
                relationship_name: relationship_name(object, field_name),
            };
        }
    }

    if desc_lower.contains("one of") {
        if let Some(values) = extract_picklist_values(description) {
            return FieldKind::Picklist(values);
        }
    }

    if desc_lower.contains("date") || desc_lower.contains("timestamp") {
        let datetime_format = (desc_lower.contains("format") && description.contains('T'))
            || description.contains("YYYY-MM-DDTHH:MM:SS");
        let datetime_name = matches!(
            field_name,
            "CreatedDate" | "LastModifiedDate" | "ClosedDate" | "EndTime" | "MessageDate"
        );
        return if datetime_format || datetime_name {
            FieldKind::DateTime
        } else {
            FieldKind::Date
        };
    }

    let is_prefix = field_name
        .strip_prefix("Is")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()));
    if is_prefix || desc_lower.contains("boolean") {
        return FieldKind::Checkbox;
    }

    if name_lower.contains("email") {
        return FieldKind::Email;
    }
    if name_lower.contains("phone") {
        return FieldKind::Phone;
    }
    if name_lower.contains("url") {
        return FieldKind::Url;
    }

    if ["number", "quantity", "price"].iter().any(|p| desc_lower.contains(p)) {
        return FieldKind::Number;
    }

    if description.len() > 255 || desc_lower.contains("description") || desc_lower.contains("content") {
        return FieldKind::LongTextArea;
    }

    FieldKind::Text
}

//! Snapshot row -> Salesforce payload
//!
//! Cleans values, drops and renames columns, resolves references through
//! the ID mapping store and fills per-object defaults. A row that cannot be
//! shaped into a valid payload is rejected with a [`SkipReason`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::catalog::{Computed, EXTERNAL_ID_FIELD, ObjectSpec, RefTarget, SYSTEM_FIELDS};
use super::errors::SkipReason;
use super::prepare::PreparedObject;
use crate::api::Record;
use crate::services::id_map::IdMapStore;
use crate::source::SourceRow;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex"));

static BOOLEAN_FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Is[A-Z]").expect("valid regex"));

/// A row ready to submit
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    /// Snapshot `Id`, if the row had one
    pub local_id: Option<String>,
    pub record: Record,
}

/// Object a source ID belongs to, from its 3-character key prefix
pub fn key_prefix_object(id: &str) -> Option<&'static str> {
    match id.get(..3)? {
        "001" => Some("Account"),
        "003" => Some("Contact"),
        "006" => Some("Opportunity"),
        "00Q" => Some("Lead"),
        "500" => Some("Case"),
        "800" => Some("Contract"),
        _ => None,
    }
}

/// Resolve a polymorphic reference: prefix hint first, then any candidate with a mapping
pub fn resolve_polymorphic<'a>(
    value: &str,
    candidates: &[&'static str],
    id_map: &'a IdMapStore,
) -> Option<(&'static str, &'a str)> {
    if let Some(hint) = key_prefix_object(value).filter(|h| candidates.contains(h)) {
        if let Some(new_id) = id_map.get(hint, value) {
            return Some((hint, new_id));
        }
    }

    candidates
        .iter()
        .find_map(|c| id_map.get(c, value).map(|new_id| (*c, new_id)))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y"),
        _ => false,
    }
}

/// Normalize a date or date-time string to ISO-8601
///
/// `kind` is the describe type (`date` / `datetime`) when known; otherwise
/// the granularity of the input is kept. Unparseable input is returned as is.
pub fn normalize_temporal(raw: &str, kind: Option<&str>) -> String {
    let raw = raw.trim();

    let parsed: Option<DateTime<Utc>> = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|ndt| ndt.and_utc())
        });

    if let Some(dt) = parsed {
        return match kind {
            Some("date") => dt.format("%Y-%m-%d").to_string(),
            _ => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return match kind {
            Some("datetime") => date
                .and_hms_opt(0, 0, 0)
                .map(|ndt| ndt.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| raw.to_string()),
            _ => date.format("%Y-%m-%d").to_string(),
        };
    }

    raw.to_string()
}

/// Clean one column value; `None` drops the column
///
/// `kind` is the describe type of the target field when known.
pub fn clean_value(field: &str, value: &Value, kind: Option<&str>) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    if let Value::String(s) = value {
        if s.trim().is_empty() {
            return None;
        }
    }

    let is_boolean = match kind {
        Some(kind) => kind == "boolean",
        None => BOOLEAN_FIELD_RE.is_match(field),
    };
    if is_boolean {
        return Some(Value::Bool(truthy(value)));
    }

    let is_temporal = match kind {
        Some(kind) => kind == "date" || kind == "datetime",
        None => field.contains("Date") || field.contains("Time"),
    };

    match value {
        Value::String(s) if is_temporal => Some(Value::String(normalize_temporal(s, kind))),
        Value::String(s) => Some(Value::String(s.clone())),
        other => Some(other.clone()),
    }
}

fn sanitize_developer_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let mut name = out.trim_matches('_').to_string();
    if name.is_empty() {
        name = "Territory".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "T_");
    }
    name.truncate(70);
    name
}

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Maps the rows of one object; keeps the per-run uniqueness state
pub struct FieldMapper<'a> {
    spec: &'a ObjectSpec,
    prepared: &'a PreparedObject,
    seen_keys: HashSet<String>,
    developer_names: HashMap<String, usize>,
    /// Columns dropped because the org does not have them
    pub unavailable_columns: BTreeSet<String>,
}

impl<'a> FieldMapper<'a> {
    pub fn new(spec: &'a ObjectSpec, prepared: &'a PreparedObject) -> Self {
        Self {
            spec,
            prepared,
            seen_keys: HashSet::new(),
            developer_names: HashMap::new(),
            unavailable_columns: BTreeSet::new(),
        }
    }

    fn field_allowed(&mut self, field: &str) -> bool {
        match &self.prepared.available_fields {
            Some(available) if !available.contains(field) => {
                self.unavailable_columns.insert(field.to_string());
                false
            }
            _ => true,
        }
    }

    pub fn map_row(&mut self, row: &SourceRow, id_map: &IdMapStore) -> Result<MappedRow, SkipReason> {
        let spec = self.spec;
        let local_id = row.get("Id").and_then(value_text);
        let mut record = Record::new();

        for (column, value) in row {
            let field = spec
                .renamed
                .iter()
                .find(|(from, _)| *from == column.as_str())
                .map_or(column.as_str(), |(_, to)| *to);

            if field == "Id"
                || field == EXTERNAL_ID_FIELD
                || SYSTEM_FIELDS.contains(&field)
                || spec.dropped.contains(&field)
            {
                continue;
            }

            if let Some(reference) = spec.reference(field) {
                let Some(source_id) = value_text(value) else {
                    continue;
                };

                let resolved = match reference.target {
                    RefTarget::Object(target) => id_map.get(target, &source_id).map(|id| (target, id)),
                    RefTarget::Polymorphic(candidates) => {
                        resolve_polymorphic(&source_id, candidates, id_map)
                    }
                };

                match resolved {
                    Some((_, new_id)) => {
                        if self.field_allowed(field) {
                            record.insert(field.to_string(), Value::String(new_id.to_string()));
                        }
                    }
                    None if reference.required => {
                        return Err(SkipReason::UnresolvedReference {
                            field: field.to_string(),
                            target: reference.target.candidates().join("/"),
                            value: source_id,
                        });
                    }
                    None => {
                        log::trace!(
                            "{} {:?}: dropping unresolved {} = {}",
                            spec.name,
                            local_id,
                            field,
                            source_id
                        );
                    }
                }
                continue;
            }

            if !self.field_allowed(field) {
                continue;
            }

            let kind = self.prepared.field_types.get(field).map(String::as_str);
            if let Some(clean) = clean_value(field, value, kind) {
                record.insert(field.to_string(), clean);
            }
        }

        for reference in spec.references.iter().filter(|r| r.required) {
            if !record.contains_key(reference.field) {
                return Err(SkipReason::MissingRequiredField {
                    field: reference.field.to_string(),
                });
            }
        }

        if self.prepared.use_external_id {
            if let Some(id) = &local_id {
                record.insert(EXTERNAL_ID_FIELD.to_string(), Value::String(id.clone()));
            }
        }

        for (field, value) in &self.prepared.stamped {
            record.insert(field.clone(), value.clone());
        }
        for (field, value) in spec.forced {
            record.insert(field.to_string(), value.to_json());
        }
        for (field, value) in spec.defaults {
            record
                .entry(field.to_string())
                .or_insert_with(|| value.to_json());
        }

        for computed in spec.computed {
            match computed {
                Computed::UnitPriceFromTotal => compute_unit_price(&mut record),
                Computed::AccountName => compute_account_name(&mut record, row, local_id.as_deref()),
                Computed::UserIdentity => self.apply_user_identity(&mut record)?,
                Computed::TerritoryDeveloperName => self.apply_developer_name(&mut record),
                Computed::UniqueUrlName => self.apply_unique_url_name(&mut record),
            }
        }

        Ok(MappedRow { local_id, record })
    }

    fn apply_user_identity(&mut self, record: &mut Record) -> Result<(), SkipReason> {
        let email = record.get("Email").and_then(value_text);
        if let Some(email) = &email {
            if !EMAIL_RE.is_match(email) {
                return Err(SkipReason::InvalidValue {
                    field: "Email".to_string(),
                    value: email.clone(),
                });
            }
        }

        let username = match record.get("Username").and_then(value_text).or(email) {
            Some(username) => username,
            None => {
                return Err(SkipReason::MissingRequiredField {
                    field: "Username".to_string(),
                });
            }
        };

        let key = username.to_lowercase();
        if self.prepared.existing_keys.contains(&key) || !self.seen_keys.insert(key) {
            return Err(SkipReason::Duplicate {
                field: "Username".to_string(),
                value: username,
            });
        }
        record.insert("Username".to_string(), Value::String(username.clone()));

        if !record.contains_key("LastName") {
            let last = record
                .get("FirstName")
                .and_then(value_text)
                .unwrap_or_else(|| "User".to_string());
            record.insert("LastName".to_string(), Value::String(last));
        }

        if !record.contains_key("Alias") {
            let local_part = username.split('@').next().unwrap_or_default();
            let mut alias: String = local_part
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(8)
                .collect();
            if alias.is_empty() {
                alias = "user".to_string();
            }
            record.insert("Alias".to_string(), Value::String(alias));
        }

        match &self.prepared.default_profile_id {
            Some(profile_id) => {
                record.insert("ProfileId".to_string(), Value::String(profile_id.clone()));
                Ok(())
            }
            None => Err(SkipReason::MissingRequiredField {
                field: "ProfileId".to_string(),
            }),
        }
    }

    fn apply_developer_name(&mut self, record: &mut Record) {
        let source = record
            .get("DeveloperName")
            .or_else(|| record.get("Name"))
            .and_then(value_text)
            .unwrap_or_default();
        let base = sanitize_developer_name(&source);

        let seen = self.developer_names.entry(base.clone()).or_insert(0);
        let name = if *seen == 0 {
            base
        } else {
            format!("{}_{}", base, seen)
        };
        *seen += 1;

        record.insert("DeveloperName".to_string(), Value::String(name));
    }

    fn apply_unique_url_name(&mut self, record: &mut Record) {
        let base = match record.get("UrlName").and_then(value_text) {
            Some(url) => url,
            None => match record.get("Title").and_then(value_text) {
                Some(title) => slugify(&title),
                None => return,
            },
        };

        let taken = |candidate: &str, seen: &HashSet<String>| {
            let key = candidate.to_lowercase();
            self.prepared.existing_keys.contains(&key) || seen.contains(&key)
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken(&candidate, &self.seen_keys) {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        self.seen_keys.insert(candidate.to_lowercase());
        record.insert("UrlName".to_string(), Value::String(candidate));
    }
}

fn compute_unit_price(record: &mut Record) {
    let total = record.remove("TotalPrice").as_ref().and_then(value_f64);
    if record.contains_key("UnitPrice") {
        return;
    }

    let quantity = record.get("Quantity").and_then(value_f64);
    if let (Some(total), Some(quantity)) = (total, quantity) {
        if quantity > 0.0 {
            let unit = ((total / quantity) * 100.0).round() / 100.0;
            if let Some(n) = Number::from_f64(unit) {
                record.insert("UnitPrice".to_string(), Value::Number(n));
            }
        }
    }
}

fn compute_account_name(record: &mut Record, row: &SourceRow, local_id: Option<&str>) {
    if record.contains_key("Name") {
        return;
    }

    let name = match row.get("Phone").and_then(value_text) {
        Some(phone) => format!("Account-{}", phone),
        None => match local_id {
            Some(id) => format!("Account-{}", id.chars().take(8).collect::<String>()),
            None => "Account".to_string(),
        },
    };
    record.insert("Name".to_string(), Value::String(name));
}

//! Per-object preparation run before an object's rows are mapped
//!
//! Probes the org for the object and its fields, then runs the object's
//! setup step (default profile, territory model, standard prices, chat
//! visitors, ...). The outcome is a [`PreparedObject`] the mapper reads.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::catalog::{EXTERNAL_ID_FIELD, ObjectSpec, UploadMode};
use crate::api::{OrgApi, Record};
use crate::services::id_map::IdMapStore;
use crate::source::SourceRow;

/// IDs per `IN (...)` clause
const SOQL_IN_CHUNK: usize = 200;

#[derive(Debug, Clone)]
pub struct PreparedObject {
    /// Effective mode; falls back to insert when the org lacks `OriginalId__c`
    pub mode: UploadMode,
    pub use_external_id: bool,
    /// Createable fields per describe; `None` when the describe was unavailable
    pub available_fields: Option<HashSet<String>>,
    /// Field name -> describe type (`date`, `datetime`, `boolean`, ...)
    pub field_types: HashMap<String, String>,
    /// Values set on every row
    pub stamped: Record,
    /// Lower-cased unique keys already taken in the org (usernames, URL names)
    pub existing_keys: HashSet<String>,
    pub default_profile_id: Option<String>,
    /// Source IDs handled during preparation; not uploaded
    pub handled_ids: HashSet<String>,
    /// Set when the org cannot take this object at all
    pub unavailable: Option<String>,
}

impl PreparedObject {
    pub fn for_spec(spec: &ObjectSpec) -> Self {
        Self {
            mode: spec.mode,
            use_external_id: spec.external_id && spec.mode == UploadMode::Upsert,
            available_fields: None,
            field_types: HashMap::new(),
            stamped: Record::new(),
            existing_keys: HashSet::new(),
            default_profile_id: None,
            handled_ids: HashSet::new(),
            unavailable: None,
        }
    }
}

/// Quote a string literal for SOQL
pub fn soql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn first_id(records: &[Value]) -> Option<String> {
    records
        .first()
        .and_then(|r| r.get("Id"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn row_text(row: &SourceRow, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_truthy(row: &SourceRow, column: &str) -> bool {
    match row.get(column) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "1" | "true"),
        _ => false,
    }
}

/// Probe the org and run the object's setup step
pub async fn prepare_object(
    api: &dyn OrgApi,
    spec: &ObjectSpec,
    rows: &[SourceRow],
    id_map: &mut IdMapStore,
) -> Result<PreparedObject> {
    let mut prepared = PreparedObject::for_spec(spec);

    match api.describe(spec.name).await {
        Ok(Some(describe)) => {
            if spec.mode == UploadMode::Upsert && describe.field(EXTERNAL_ID_FIELD).is_none() {
                log::warn!(
                    "{} has no {} field, falling back to insert (run sync-schema to add it)",
                    spec.name,
                    EXTERNAL_ID_FIELD
                );
                prepared.mode = UploadMode::Insert;
                prepared.use_external_id = false;
            }
            prepared.field_types = describe
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.field_type.clone()))
                .collect();
            prepared.available_fields = Some(describe.createable_fields().map(String::from).collect());
        }
        Ok(None) => {
            prepared.unavailable = Some(format!("{} is not available in this org", spec.name));
            return Ok(prepared);
        }
        Err(e) => {
            log::debug!("Could not describe {}, sending all columns: {:#}", spec.name, e);
        }
    }

    match spec.name {
        "User" => prepare_users(api, &mut prepared).await?,
        "Knowledge__kav" => prepare_knowledge(api, &mut prepared).await,
        "Territory2" => prepare_territories(api, &mut prepared).await,
        "ProductCategory" => prepare_product_catalog(api, &mut prepared).await,
        "Pricebook2" => map_standard_pricebook(api, rows, id_map, &mut prepared).await?,
        "PricebookEntry" => ensure_standard_prices(api, rows, id_map).await?,
        "LiveChatTranscript" => create_chat_visitors(api, rows, id_map).await?,
        _ => {}
    }

    Ok(prepared)
}

async fn prepare_users(api: &dyn OrgApi, prepared: &mut PreparedObject) -> Result<()> {
    let profiles = api
        .query("SELECT Id, Name FROM Profile WHERE Name IN ('Standard User', 'System Administrator')")
        .await
        .context("Failed to look up the default profile")?;

    prepared.default_profile_id = profiles
        .iter()
        .find(|p| p.get("Name").and_then(Value::as_str) == Some("Standard User"))
        .or(profiles.first())
        .and_then(|p| p.get("Id"))
        .and_then(Value::as_str)
        .map(String::from);

    if prepared.default_profile_id.is_none() {
        log::warn!("No default profile found; User rows will be skipped");
    }

    let users = api
        .query("SELECT Username FROM User")
        .await
        .context("Failed to load existing usernames")?;
    prepared.existing_keys = users
        .iter()
        .filter_map(|u| u.get("Username").and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect();

    log::info!("Found {} existing usernames", prepared.existing_keys.len());
    Ok(())
}

async fn prepare_knowledge(api: &dyn OrgApi, prepared: &mut PreparedObject) {
    for status in ["Draft", "Online", "Archived"] {
        let soql = format!(
            "SELECT UrlName FROM Knowledge__kav WHERE PublishStatus = {}",
            soql_quote(status)
        );
        match api.query(&soql).await {
            Ok(records) => prepared.existing_keys.extend(
                records
                    .iter()
                    .filter_map(|r| r.get("UrlName").and_then(Value::as_str))
                    .map(str::to_lowercase),
            ),
            Err(e) => log::debug!("Could not load {} article URL names: {:#}", status, e),
        }
    }
}

/// ID of the first record matching `soql`, creating `record` when none does
async fn find_or_create(api: &dyn OrgApi, soql: &str, object: &str, record: Value) -> Result<String> {
    if let Some(id) = first_id(&api.query(soql).await?) {
        return Ok(id);
    }

    let Value::Object(record) = record else {
        anyhow::bail!("{} record must be a JSON object", object);
    };
    let id = api.create(object, &record).await?;
    log::info!("Created {} {}", object, id);
    Ok(id)
}

async fn prepare_territories(api: &dyn OrgApi, prepared: &mut PreparedObject) {
    let model = find_or_create(
        api,
        "SELECT Id FROM Territory2Model LIMIT 1",
        "Territory2Model",
        json!({ "Name": "Data Upload Model", "DeveloperName": "Data_Upload_Model" }),
    )
    .await;
    let territory_type = find_or_create(
        api,
        "SELECT Id FROM Territory2Type LIMIT 1",
        "Territory2Type",
        json!({ "MasterLabel": "Data Upload Type", "DeveloperName": "Data_Upload_Type", "Priority": 1 }),
    )
    .await;

    match (model, territory_type) {
        (Ok(model_id), Ok(type_id)) => {
            prepared.stamped.insert("Territory2ModelId".into(), Value::String(model_id));
            prepared.stamped.insert("Territory2TypeId".into(), Value::String(type_id));
        }
        (Err(e), _) | (_, Err(e)) => {
            prepared.unavailable = Some(format!("territory management unavailable: {:#}", e));
        }
    }
}

async fn prepare_product_catalog(api: &dyn OrgApi, prepared: &mut PreparedObject) {
    match find_or_create(
        api,
        "SELECT Id FROM ProductCatalog LIMIT 1",
        "ProductCatalog",
        json!({ "Name": "Data Upload Catalog" }),
    )
    .await
    {
        Ok(catalog_id) => {
            prepared.stamped.insert("CatalogId".into(), Value::String(catalog_id));
        }
        Err(e) => {
            prepared.unavailable = Some(format!("no product catalog available: {:#}", e));
        }
    }
}

async fn standard_pricebook_id(api: &dyn OrgApi) -> Result<Option<String>> {
    let records = api
        .query("SELECT Id FROM Pricebook2 WHERE IsStandard = true LIMIT 1")
        .await
        .context("Failed to look up the standard pricebook")?;
    Ok(first_id(&records))
}

/// Map the source's standard pricebook onto the org's, instead of uploading a copy
async fn map_standard_pricebook(
    api: &dyn OrgApi,
    rows: &[SourceRow],
    id_map: &mut IdMapStore,
    prepared: &mut PreparedObject,
) -> Result<()> {
    let standard_rows: Vec<String> = rows
        .iter()
        .filter(|r| row_truthy(r, "IsStandard"))
        .filter_map(|r| row_text(r, "Id"))
        .collect();
    if standard_rows.is_empty() {
        return Ok(());
    }

    let Some(standard_id) = standard_pricebook_id(api).await? else {
        log::warn!("Org has no standard pricebook; source standard pricebook left unmapped");
        return Ok(());
    };

    let mappings = standard_rows
        .iter()
        .map(|id| (id.clone(), standard_id.clone()))
        .collect();
    id_map.insert_batch("Pricebook2", mappings).await?;
    prepared.handled_ids.extend(standard_rows);
    Ok(())
}

/// Salesforce rejects custom-pricebook entries for products without a standard price
async fn ensure_standard_prices(
    api: &dyn OrgApi,
    rows: &[SourceRow],
    id_map: &IdMapStore,
) -> Result<()> {
    let Some(standard_id) = standard_pricebook_id(api).await? else {
        log::warn!("Org has no standard pricebook; skipping standard price check");
        return Ok(());
    };

    let mut needed: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        let pricebook = row_text(row, "Pricebook2Id").and_then(|id| id_map.get("Pricebook2", &id));
        let product = row_text(row, "Product2Id").and_then(|id| id_map.get("Product2", &id));
        if let (Some(pricebook), Some(product)) = (pricebook, product) {
            if pricebook != standard_id {
                let price = row.get("UnitPrice").and_then(Value::as_f64).unwrap_or(0.0);
                needed.entry(product.to_string()).or_insert(price);
            }
        }
    }
    if needed.is_empty() {
        return Ok(());
    }

    let products: Vec<&String> = needed.keys().collect();
    let mut existing: HashSet<String> = HashSet::new();
    for chunk in products.chunks(SOQL_IN_CHUNK) {
        let ids: Vec<String> = chunk.iter().map(|id| soql_quote(id)).collect();
        let soql = format!(
            "SELECT Product2Id FROM PricebookEntry WHERE Pricebook2Id = {} AND Product2Id IN ({})",
            soql_quote(&standard_id),
            ids.join(", ")
        );
        existing.extend(
            api.query(&soql)
                .await
                .context("Failed to load standard pricebook entries")?
                .iter()
                .filter_map(|r| r.get("Product2Id").and_then(Value::as_str))
                .map(String::from),
        );
    }

    let records: Vec<Record> = needed
        .iter()
        .filter(|(product, _)| !existing.contains(*product))
        .filter_map(|(product, price)| {
            json!({
                "Pricebook2Id": standard_id,
                "Product2Id": product,
                "UnitPrice": price,
                "IsActive": true,
            })
            .as_object()
            .cloned()
        })
        .collect();
    if records.is_empty() {
        return Ok(());
    }

    let results = api.insert("PricebookEntry", &records).await?;
    let created = results.iter().filter(|r| r.success).count();
    log::info!(
        "Created {} of {} missing standard pricebook entries",
        created,
        records.len()
    );
    Ok(())
}

/// One empty LiveChatVisitor per distinct unmapped source visitor
async fn create_chat_visitors(
    api: &dyn OrgApi,
    rows: &[SourceRow],
    id_map: &mut IdMapStore,
) -> Result<()> {
    let visitors: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| row_text(r, "LiveChatVisitorId"))
        .filter(|id| !id_map.contains("LiveChatVisitor", id))
        .collect();
    if visitors.is_empty() {
        return Ok(());
    }

    let records = vec![Record::new(); visitors.len()];
    let results = api
        .insert("LiveChatVisitor", &records)
        .await
        .context("Failed to create chat visitors")?;

    let mut mappings = Vec::new();
    for (visitor, result) in visitors.into_iter().zip(results) {
        match result.id {
            Some(id) if result.success => mappings.push((visitor, id)),
            _ => log::warn!(
                "Could not create chat visitor for {}: {}",
                visitor,
                result
                    .first_error()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }

    log::info!("Created {} chat visitors", mappings.len());
    id_map.insert_batch("LiveChatVisitor", mappings).await
}

/// Existing Contact with this e-mail, for resolving duplicate-rule rejections
pub async fn find_contact_by_email(api: &dyn OrgApi, email: &str) -> Result<Option<String>> {
    let soql = format!("SELECT Id FROM Contact WHERE Email = {} LIMIT 1", soql_quote(email));
    Ok(first_id(&api.query(&soql).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::org::fake::FakeOrg;
    use crate::config::open_memory_pool;
    use crate::upload::catalog;

    async fn empty_store() -> IdMapStore {
        IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap()
    }

    fn rows(values: Vec<Value>) -> Vec<SourceRow> {
        values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }

    #[test]
    fn test_soql_quote() {
        assert_eq!(soql_quote("O'Brien"), r"'O\'Brien'");
    }

    #[tokio::test]
    async fn test_missing_object_is_unavailable() {
        let org = FakeOrg::new().without_object("LiveChatTranscript");
        let mut store = empty_store().await;

        let prepared = prepare_object(&org, catalog::find("LiveChatTranscript").unwrap(), &[], &mut store)
            .await
            .unwrap();

        assert!(prepared.unavailable.is_some());
    }

    #[tokio::test]
    async fn test_missing_external_id_falls_back_to_insert() {
        let org = FakeOrg::new().with_fields("Issue__c", &["Name", "Priority__c"]);
        let mut store = empty_store().await;

        let prepared = prepare_object(&org, catalog::find("Issue__c").unwrap(), &[], &mut store)
            .await
            .unwrap();

        assert_eq!(prepared.mode, UploadMode::Insert);
        assert!(!prepared.use_external_id);
        assert!(prepared.available_fields.unwrap().contains("Priority__c"));
    }

    #[tokio::test]
    async fn test_user_preparation() {
        let org = FakeOrg::new()
            .with_query(
                "FROM Profile",
                vec![
                    json!({"Id": "00eADMIN", "Name": "System Administrator"}),
                    json!({"Id": "00eSTD", "Name": "Standard User"}),
                ],
            )
            .with_query("FROM User", vec![json!({"Username": "Admin@Acme.com"})]);
        let mut store = empty_store().await;

        let prepared = prepare_object(&org, catalog::find("User").unwrap(), &[], &mut store)
            .await
            .unwrap();

        assert_eq!(prepared.default_profile_id.as_deref(), Some("00eSTD"));
        assert!(prepared.existing_keys.contains("admin@acme.com"));
    }

    #[tokio::test]
    async fn test_territory_model_created_and_stamped() {
        let org = FakeOrg::new();
        let mut store = empty_store().await;

        let prepared = prepare_object(&org, catalog::find("Territory2").unwrap(), &[], &mut store)
            .await
            .unwrap();

        assert!(prepared.unavailable.is_none());
        assert_eq!(org.records("Territory2Model").len(), 1);
        assert_eq!(
            prepared.stamped.get("Territory2TypeId"),
            Some(&json!(org.records("Territory2Type")[0].id))
        );
    }

    #[tokio::test]
    async fn test_chat_visitors_created_once() {
        let org = FakeOrg::new();
        let mut store = empty_store().await;
        let source = rows(vec![
            json!({"Id": "t1", "LiveChatVisitorId": "v1"}),
            json!({"Id": "t2", "LiveChatVisitorId": "v1"}),
            json!({"Id": "t3", "LiveChatVisitorId": "v2"}),
        ]);

        let spec = catalog::find("LiveChatTranscript").unwrap();
        prepare_object(&org, spec, &source, &mut store).await.unwrap();
        prepare_object(&org, spec, &source, &mut store).await.unwrap();

        assert_eq!(org.records("LiveChatVisitor").len(), 2);
        assert!(store.contains("LiveChatVisitor", "v1"));
        assert!(store.contains("LiveChatVisitor", "v2"));
    }

    #[tokio::test]
    async fn test_standard_prices_created_for_custom_pricebook_entries() {
        let org = FakeOrg::new().with_query("IsStandard = true", vec![json!({"Id": "01sSTD"})]);
        let mut store = empty_store().await;
        store.insert("Pricebook2", "pbCustom", "01sCUSTOM").await.unwrap();
        store.insert("Product2", "p1", "01tP1").await.unwrap();

        let source = rows(vec![json!({
            "Id": "e1", "Pricebook2Id": "pbCustom", "Product2Id": "p1", "UnitPrice": 12.0
        })]);

        prepare_object(&org, catalog::find("PricebookEntry").unwrap(), &source, &mut store)
            .await
            .unwrap();

        let entries = org.records("PricebookEntry");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields.get("Pricebook2Id"), Some(&json!("01sSTD")));
        assert_eq!(entries[0].fields.get("UnitPrice"), Some(&json!(12.0)));
    }

    #[tokio::test]
    async fn test_standard_pricebook_mapped_not_uploaded() {
        let org = FakeOrg::new().with_query("IsStandard = true", vec![json!({"Id": "01sSTD"})]);
        let mut store = empty_store().await;
        let source = rows(vec![
            json!({"Id": "pbStd", "Name": "Standard Price Book", "IsStandard": 1}),
            json!({"Id": "pbCustom", "Name": "Partner", "IsStandard": 0}),
        ]);

        let prepared = prepare_object(&org, catalog::find("Pricebook2").unwrap(), &source, &mut store)
            .await
            .unwrap();

        assert_eq!(store.get("Pricebook2", "pbStd"), Some("01sSTD"));
        assert!(prepared.handled_ids.contains("pbStd"));
        assert!(!prepared.handled_ids.contains("pbCustom"));
    }
}

//! Dependency-ordered upload of snapshot rows
//!
//! Objects go in graph order. For each object the snapshot rows are
//! prepared, mapped and submitted in batches; every remote ID that comes
//! back is recorded in the ID mapping store before the next batch, so later
//! objects (and re-runs) resolve against it.

use anyhow::Result;
use serde_json::Value;
use std::mem;

use super::catalog::{self, EXTERNAL_ID_FIELD, ObjectSpec, UploadMode};
use super::errors::{ErrorCategory, SkipReason};
use super::graph::DependencyGraph;
use super::leads;
use super::mapper::{FieldMapper, MappedRow};
use super::prepare::{self, PreparedObject};
use super::report::{ObjectStats, UploadReport};
use crate::api::{OrgApi, Record};
use crate::services::id_map::IdMapStore;
use crate::source::SourceDb;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub batch_size: usize,
    /// Rows read per object
    pub limit: Option<usize>,
    /// Skip every row that already has a mapping, upsert objects included
    pub skip_uploaded: bool,
    pub convert_leads: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            limit: None,
            skip_uploaded: false,
            convert_leads: true,
        }
    }
}

/// Upload order for a selection of catalog objects
pub fn plan(specs: &[&'static ObjectSpec]) -> Result<Vec<&'static ObjectSpec>> {
    let order = DependencyGraph::build(specs).insert_order()?;
    Ok(order.iter().filter_map(|name| catalog::find(name)).collect())
}

fn local_id(row: &serde_json::Map<String, Value>) -> Option<String> {
    match row.get("Id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct Uploader<'a> {
    api: &'a dyn OrgApi,
    source: &'a SourceDb,
    id_map: &'a mut IdMapStore,
    options: UploadOptions,
}

impl<'a> Uploader<'a> {
    pub fn new(
        api: &'a dyn OrgApi,
        source: &'a SourceDb,
        id_map: &'a mut IdMapStore,
        options: UploadOptions,
    ) -> Self {
        Self {
            api,
            source,
            id_map,
            options,
        }
    }

    /// Upload the selected objects in dependency order
    pub async fn run(&mut self, specs: &[&'static ObjectSpec], report: &mut UploadReport) -> Result<()> {
        let order = plan(specs)?;
        log::info!(
            "Upload order: {}",
            order.iter().map(|s| s.name).collect::<Vec<_>>().join(" -> ")
        );

        for &spec in &order {
            let stats = self.upload_object(spec).await?;
            log::info!(
                "{}: {} uploaded, {} skipped, {} failed",
                spec.name,
                stats.uploaded,
                stats.skipped,
                stats.failed
            );
            report.objects.push(stats);
        }

        if self.options.convert_leads && order.iter().any(|s| s.name == "Lead") {
            report.lead_conversion = Some(leads::convert_leads(self.api, self.source, self.id_map).await?);
        }

        report.finished_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn upload_object(&mut self, spec: &'static ObjectSpec) -> Result<ObjectStats> {
        let mut stats = ObjectStats::new(spec.name);

        let Some(table) = spec.source_table else {
            stats.note = Some("created during preparation of dependent objects".into());
            return Ok(stats);
        };
        if !self.source.has_table(table).await? {
            stats.note = Some("no source table".into());
            return Ok(stats);
        }

        let rows = match self.source.rows(table, self.options.limit).await {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Reading {} failed: {:#}", table, e);
                stats.note = Some(format!("source read failed: {:#}", e));
                return Ok(stats);
            }
        };
        stats.source_rows = rows.len();
        if rows.is_empty() {
            return Ok(stats);
        }

        log::info!("Uploading {} ({} rows)", spec.name, rows.len());

        let prepared = match prepare::prepare_object(self.api, spec, &rows, self.id_map).await {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("Preparing {} failed: {:#}", spec.name, e);
                stats.note = Some(format!("preparation failed: {:#}", e));
                return Ok(stats);
            }
        };

        if let Some(reason) = &prepared.unavailable {
            log::warn!("Skipping {}: {}", spec.name, reason);
            let skip = SkipReason::ObjectUnavailable {
                reason: reason.clone(),
            };
            for row in &rows {
                stats.record_skip(local_id(row).as_deref(), &skip);
            }
            return Ok(stats);
        }

        let mut mapper = FieldMapper::new(spec, &prepared);
        let mut pending: Vec<MappedRow> = Vec::with_capacity(self.options.batch_size);

        for row in &rows {
            let id = local_id(row);
            if let Some(id) = &id {
                let mapped = self.id_map.contains(spec.name, id);
                if prepared.handled_ids.contains(id)
                    || (mapped && (prepared.mode == UploadMode::Insert || self.options.skip_uploaded))
                {
                    stats.record_skip(Some(id), &SkipReason::AlreadyUploaded);
                    continue;
                }
            }

            match mapper.map_row(row, self.id_map) {
                Ok(mapped) => pending.push(mapped),
                Err(reason) => {
                    log::debug!("{} {:?} skipped: {}", spec.name, id, reason);
                    stats.record_skip(id.as_deref(), &reason);
                }
            }

            if pending.len() >= self.options.batch_size {
                self.submit_batch(spec, &prepared, mem::take(&mut pending), &mut stats)
                    .await?;
            }
        }

        if !pending.is_empty() {
            self.submit_batch(spec, &prepared, pending, &mut stats).await?;
        }

        stats.unavailable_columns = mapper.unavailable_columns.into_iter().collect();
        if !stats.unavailable_columns.is_empty() {
            log::warn!(
                "{}: columns not in org were dropped: {}",
                spec.name,
                stats.unavailable_columns.join(", ")
            );
        }

        Ok(stats)
    }

    /// Submit one batch and record its outcome; only mapping persistence errors propagate
    async fn submit_batch(
        &mut self,
        spec: &ObjectSpec,
        prepared: &PreparedObject,
        batch: Vec<MappedRow>,
        stats: &mut ObjectStats,
    ) -> Result<()> {
        let records: Vec<Record> = batch.iter().map(|row| row.record.clone()).collect();

        let response = if prepared.use_external_id {
            self.api.upsert(spec.name, EXTERNAL_ID_FIELD, &records).await
        } else {
            self.api.insert(spec.name, &records).await
        };

        let results = match response {
            Ok(results) => results,
            Err(e) => {
                let category = ErrorCategory::for_request_error(&e);
                let message = format!("{:#}", e);
                log::error!("{} batch of {} failed: {}", spec.name, batch.len(), message);
                for row in &batch {
                    stats.record_failure(row.local_id.as_deref(), category, "REQUEST_FAILED", &message);
                }
                return Ok(());
            }
        };

        if results.len() != batch.len() {
            log::warn!(
                "{}: {} results for {} records",
                spec.name,
                results.len(),
                batch.len()
            );
        }

        let mut mappings = Vec::new();
        for (index, row) in batch.iter().enumerate() {
            let Some(result) = results.get(index) else {
                stats.record_failure(
                    row.local_id.as_deref(),
                    ErrorCategory::Other,
                    "MISSING_RESULT",
                    "no result returned for this record",
                );
                continue;
            };

            if result.success {
                stats.record_success(result);
                if let (Some(local), Some(remote)) = (&row.local_id, &result.id) {
                    mappings.push((local.clone(), remote.clone()));
                }
                continue;
            }

            let (code, message) = result
                .first_error()
                .map(|e| (e.status_code.as_str(), e.message.as_str()))
                .unwrap_or(("UNKNOWN", "no error details"));
            let category = ErrorCategory::classify(code, message);

            if spec.name == "Contact" && category == ErrorCategory::Duplicate {
                if let Some(existing) = self.existing_contact(row).await {
                    if let Some(local) = &row.local_id {
                        mappings.push((local.clone(), existing));
                    }
                    stats.record_remap();
                    continue;
                }
            }

            stats.record_failure(row.local_id.as_deref(), category, code, message);
        }

        self.id_map.insert_batch(spec.name, mappings).await
    }

    async fn existing_contact(&self, row: &MappedRow) -> Option<String> {
        let email = row.record.get("Email").and_then(Value::as_str)?;
        match prepare::find_contact_by_email(self.api, email).await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("Contact lookup by e-mail failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::org::fake::FakeOrg;
    use crate::api::OfflineOrg;
    use crate::config::open_memory_pool;
    use crate::source::testing::memory_source;
    use serde_json::json;

    async fn crm_source() -> SourceDb {
        let source = memory_source().await;
        source
            .exec(
                "CREATE TABLE Account (Id TEXT, Name TEXT, Phone TEXT, CreatedDate TEXT);
                 INSERT INTO Account VALUES ('001A', 'Acme', NULL, '2024-01-01T00:00:00.000+0000');
                 INSERT INTO Account VALUES ('001B', NULL, '555-0100', NULL);
                 CREATE TABLE Contact (Id TEXT, LastName TEXT, Email TEXT, AccountId TEXT);
                 INSERT INTO Contact VALUES ('003A', 'Ng', 'ng@acme.com', '001A');
                 INSERT INTO Contact VALUES ('003B', 'Ko', 'ko@acme.com', '001Z');
                 CREATE TABLE Task (Id TEXT, Subject TEXT, WhatId TEXT, WhoId TEXT);
                 INSERT INTO Task VALUES ('00TA', 'Call', '001A', '003A');
                 CREATE TABLE Opportunity (Id TEXT, Name TEXT, AccountId TEXT, StageName TEXT);
                 INSERT INTO Opportunity VALUES ('006A', 'Deal', '001A', 'Prospecting');
                 CREATE TABLE OpportunityLineItem (Id TEXT, OpportunityId TEXT, PricebookEntryId TEXT, Quantity REAL, TotalPrice REAL);
                 INSERT INTO OpportunityLineItem VALUES ('00kA', '006MISSING', '01uA', 2, 20.0);",
            )
            .await;
        source
    }

    fn names(specs: &[&str]) -> Vec<&'static ObjectSpec> {
        let names: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        catalog::select(&names).unwrap()
    }

    #[test]
    fn test_plan_orders_parents_first() {
        let order = plan(&names(&["Task", "Contact", "Account"])).unwrap();
        let order: Vec<_> = order.iter().map(|s| s.name).collect();
        assert_eq!(order, vec!["Account", "Contact", "Task"]);
    }

    #[tokio::test]
    async fn test_upload_resolves_references_and_records_mappings() {
        let source = crm_source().await;
        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Task", "Contact", "Account"]), &mut report)
            .await
            .unwrap();

        let accounts = org.records("Account");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].fields.get("OriginalId__c"), Some(&json!("001A")));
        assert!(accounts[0].fields.get("CreatedDate").is_none());
        assert_eq!(accounts[1].fields.get("Name"), Some(&json!("Account-555-0100")));

        let contacts = org.records("Contact");
        assert_eq!(contacts.len(), 2);
        assert_eq!(
            contacts[0].fields.get("AccountId"),
            Some(&json!(store.get("Account", "001A").unwrap()))
        );
        assert!(contacts[1].fields.get("AccountId").is_none());

        let tasks = org.records("Task");
        assert_eq!(tasks[0].fields.get("WhatId"), Some(&json!(store.get("Account", "001A").unwrap())));
        assert_eq!(tasks[0].fields.get("WhoId"), Some(&json!(store.get("Contact", "003A").unwrap())));
        assert!(tasks[0].fields.get("OriginalId__c").is_none());
        assert!(store.contains("Task", "00TA"));

        let totals = report.totals();
        assert_eq!(totals.uploaded, 5);
        assert_eq!(totals.failed, 0);
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let source = crm_source().await;
        let org = FakeOrg::new();
        let pool = open_memory_pool().await.unwrap();
        let selection = names(&["Account", "Contact", "Task"]);

        for _ in 0..2 {
            let mut store = IdMapStore::load(pool.clone()).await.unwrap();
            let mut report = UploadReport::new("original", false);
            Uploader::new(&org, &source, &mut store, UploadOptions::default())
                .run(&selection, &mut report)
                .await
                .unwrap();
        }

        assert_eq!(org.records("Account").len(), 2);
        assert_eq!(org.records("Contact").len(), 2);
        assert_eq!(org.records("Task").len(), 1);

        let store = IdMapStore::load(pool).await.unwrap();
        assert_eq!(store.count("Account"), 2);
        assert_eq!(store.count("Task"), 1);
    }

    #[tokio::test]
    async fn test_second_run_updates_and_skips() {
        let source = crm_source().await;
        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let selection = names(&["Account", "Task"]);

        let mut first = UploadReport::new("original", false);
        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&selection, &mut first)
            .await
            .unwrap();

        let mut second = UploadReport::new("original", false);
        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&selection, &mut second)
            .await
            .unwrap();

        assert_eq!(second.object("Account").unwrap().updated, 2);
        assert_eq!(second.object("Task").unwrap().skipped, 1);
        assert_eq!(second.object("Task").unwrap().problem_count(), 0);

        let mut third = UploadReport::new("original", false);
        let options = UploadOptions {
            skip_uploaded: true,
            ..Default::default()
        };
        let calls = org.write_calls();
        Uploader::new(&org, &source, &mut store, options)
            .run(&selection, &mut third)
            .await
            .unwrap();
        assert_eq!(third.object("Account").unwrap().skipped, 2);
        assert_eq!(org.write_calls(), calls);
    }

    #[tokio::test]
    async fn test_unresolved_required_reference_never_uploaded() {
        let source = crm_source().await;
        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Account", "Opportunity", "OpportunityLineItem"]), &mut report)
            .await
            .unwrap();

        assert!(org.records("OpportunityLineItem").is_empty());
        let items = report.object("OpportunityLineItem").unwrap();
        assert_eq!(items.skipped, 1);
        assert_eq!(items.categories.get(&ErrorCategory::InvalidReference), Some(&1));
        assert_eq!(items.samples[0].code, "UNRESOLVED_REFERENCE");
    }

    #[tokio::test]
    async fn test_row_failures_are_classified_and_run_continues() {
        let source = crm_source().await;
        let org = FakeOrg::new().rejecting(|object, record| {
            (object == "Account" && record.get("OriginalId__c") == Some(&json!("001B")))
                .then(|| ("STORAGE_LIMIT_EXCEEDED".to_string(), "storage full".to_string()))
        });
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Account", "Contact"]), &mut report)
            .await
            .unwrap();

        let accounts = report.object("Account").unwrap();
        assert_eq!(accounts.uploaded, 1);
        assert_eq!(accounts.failed, 1);
        assert_eq!(accounts.categories.get(&ErrorCategory::PlatformLimitation), Some(&1));
        assert!(!store.contains("Account", "001B"));
        assert_eq!(report.object("Contact").unwrap().uploaded, 2);
    }

    #[tokio::test]
    async fn test_duplicate_contact_mapped_onto_existing() {
        let source = crm_source().await;
        let org = FakeOrg::new()
            .rejecting(|object, record| {
                (object == "Contact" && record.get("Email") == Some(&json!("ko@acme.com")))
                    .then(|| ("DUPLICATES_DETECTED".to_string(), "Use one of these records?".to_string()))
            })
            .with_query("FROM Contact WHERE Email", vec![json!({"Id": "003EXISTING"})]);
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Contact"]), &mut report)
            .await
            .unwrap();

        assert_eq!(store.get("Contact", "003B"), Some("003EXISTING"));
        let contacts = report.object("Contact").unwrap();
        assert_eq!(contacts.remapped, 1);
        assert_eq!(contacts.failed, 0);
    }

    #[tokio::test]
    async fn test_batches_split_by_batch_size() {
        let source = memory_source().await;
        let mut sql = String::from("CREATE TABLE Product2 (Id TEXT, Name TEXT);");
        for i in 0..5 {
            sql.push_str(&format!("INSERT INTO Product2 VALUES ('p{}', 'Widget {}');", i, i));
        }
        source.exec(&sql).await;

        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);
        let options = UploadOptions {
            batch_size: 2,
            ..Default::default()
        };

        Uploader::new(&org, &source, &mut store, options)
            .run(&names(&["Product2"]), &mut report)
            .await
            .unwrap();

        assert_eq!(org.write_calls(), 3);
        assert_eq!(store.count("Product2"), 5);
    }

    #[tokio::test]
    async fn test_missing_table_and_limit() {
        let source = crm_source().await;
        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);
        let options = UploadOptions {
            limit: Some(1),
            ..Default::default()
        };

        Uploader::new(&org, &source, &mut store, options)
            .run(&names(&["Account", "Case"]), &mut report)
            .await
            .unwrap();

        assert_eq!(org.records("Account").len(), 1);
        assert_eq!(report.object("Case").unwrap().note.as_deref(), Some("no source table"));
    }

    #[tokio::test]
    async fn test_unavailable_object_is_skipped() {
        let source = crm_source().await;
        let org = FakeOrg::new().without_object("Task");
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Task"]), &mut report)
            .await
            .unwrap();

        let tasks = report.object("Task").unwrap();
        assert_eq!(tasks.skipped, 1);
        assert_eq!(tasks.categories.get(&ErrorCategory::PlatformLimitation), Some(&1));
        assert!(org.records("Task").is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let source = crm_source().await;
        let pool = open_memory_pool().await.unwrap();
        let org = OfflineOrg::new();
        let mut store = IdMapStore::load(pool.clone()).await.unwrap().memory_only();
        let mut report = UploadReport::new("original", true);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Account", "Contact", "Task"]), &mut report)
            .await
            .unwrap();

        assert_eq!(report.totals().uploaded, 5);
        assert!(store.get("Contact", "003A").unwrap().starts_with("DRYRUN"));
        assert_eq!(IdMapStore::load(pool).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_failed_request_fails_its_rows_and_run_continues() {
        let source = memory_source().await;
        let mut sql = String::from(
            "CREATE TABLE Product2 (Id TEXT, Name TEXT);
             CREATE TABLE Account (Id TEXT, Name TEXT);
             INSERT INTO Account VALUES ('001A', 'Acme');",
        );
        for i in 0..5 {
            sql.push_str(&format!("INSERT INTO Product2 VALUES ('p{}', 'Widget {}');", i, i));
        }
        source.exec(&sql).await;

        let org = FakeOrg::new().failing_requests(|object, records| {
            (object == "Product2" && records.iter().any(|r| r.get("Name") == Some(&json!("Widget 2"))))
                .then(|| crate::api::ApiError::from_body(503, "service unavailable"))
        });
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);
        let options = UploadOptions {
            batch_size: 2,
            ..Default::default()
        };

        Uploader::new(&org, &source, &mut store, options)
            .run(&names(&["Account", "Product2"]), &mut report)
            .await
            .unwrap();

        let products = report.object("Product2").unwrap();
        assert_eq!(products.uploaded, 3);
        assert_eq!(products.failed, 2);
        assert_eq!(products.categories.get(&ErrorCategory::PlatformLimitation), Some(&2));
        assert_eq!(org.records("Product2").len(), 3);
        assert!(!store.contains("Product2", "p2"));
        assert!(!store.contains("Product2", "p3"));
        assert!(store.contains("Product2", "p4"));
        assert_eq!(report.object("Account").unwrap().uploaded, 1);
    }

    #[tokio::test]
    async fn test_invalid_text_in_snapshot_does_not_abort_run() {
        let source = memory_source().await;
        source
            .exec(
                "CREATE TABLE Account (Id TEXT, Name TEXT);
                 INSERT INTO Account VALUES ('001A', CAST(x'ff41' AS TEXT));
                 CREATE TABLE Product2 (Id TEXT, Name TEXT);
                 INSERT INTO Product2 VALUES ('p0', 'Widget');",
            )
            .await;
        let org = FakeOrg::new();
        let mut store = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        let mut report = UploadReport::new("original", false);

        Uploader::new(&org, &source, &mut store, UploadOptions::default())
            .run(&names(&["Account", "Product2"]), &mut report)
            .await
            .unwrap();

        assert_eq!(report.object("Account").unwrap().uploaded, 1);
        assert_eq!(report.object("Product2").unwrap().uploaded, 1);
        assert_eq!(
            org.records("Account")[0].fields.get("Name"),
            Some(&json!("\u{FFFD}A"))
        );
    }
}

//! The org as seen by the upload, cleanup and inspection services
//!
//! [`OrgApi`] is implemented by the live [`SalesforceClient`], by
//! [`OfflineOrg`] for dry runs, and by an in-memory fake in tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use super::client::SalesforceClient;
use super::models::{
    LeadConvertOutcome, LeadConvertRequest, OrgLimits, Record, SObjectDescribe, SaveResult,
};

#[async_trait]
pub trait OrgApi: Send + Sync {
    /// All records of a SOQL query
    async fn query(&self, soql: &str) -> Result<Vec<Value>>;

    async fn count(&self, object: &str) -> Result<u64>;

    /// `Ok(None)` when the org has no such object
    async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>>;

    async fn create(&self, object: &str, record: &Record) -> Result<String>;

    async fn insert(&self, object: &str, records: &[Record]) -> Result<Vec<SaveResult>>;

    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<SaveResult>>;

    async fn delete(&self, ids: &[String]) -> Result<Vec<SaveResult>>;

    async fn limits(&self) -> Result<OrgLimits>;

    async fn convert_lead(&self, request: &LeadConvertRequest) -> Result<LeadConvertOutcome>;
}

#[async_trait]
impl OrgApi for SalesforceClient {
    async fn query(&self, soql: &str) -> Result<Vec<Value>> {
        self.query_all(soql).await
    }

    async fn count(&self, object: &str) -> Result<u64> {
        SalesforceClient::count(self, object).await
    }

    async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>> {
        SalesforceClient::describe(self, object).await
    }

    async fn create(&self, object: &str, record: &Record) -> Result<String> {
        SalesforceClient::create(self, object, record).await
    }

    async fn insert(&self, object: &str, records: &[Record]) -> Result<Vec<SaveResult>> {
        self.insert_collection(object, records).await
    }

    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<SaveResult>> {
        self.upsert_collection(object, external_id_field, records)
            .await
    }

    async fn delete(&self, ids: &[String]) -> Result<Vec<SaveResult>> {
        self.delete_collection(ids).await
    }

    async fn limits(&self) -> Result<OrgLimits> {
        SalesforceClient::limits(self).await
    }

    async fn convert_lead(&self, request: &LeadConvertRequest) -> Result<LeadConvertOutcome> {
        SalesforceClient::convert_lead(self, request).await
    }
}

/// Org stand-in for dry runs: accepts every write and fabricates IDs
///
/// Reads come back empty and describes fail, so preparation steps behave as
/// they would against an org whose metadata is unknown.
#[derive(Debug, Default)]
pub struct OfflineOrg {
    next_id: AtomicU64,
}

impl OfflineOrg {
    pub fn new() -> Self {
        Self::default()
    }

    /// 18-character fake ID, unique within this org
    fn fabricate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("DRYRUN{:012}", n)
    }
}

#[async_trait]
impl OrgApi for OfflineOrg {
    async fn query(&self, _soql: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn count(&self, _object: &str) -> Result<u64> {
        Ok(0)
    }

    async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>> {
        anyhow::bail!("offline org cannot describe {}", object)
    }

    async fn create(&self, _object: &str, _record: &Record) -> Result<String> {
        Ok(self.fabricate_id())
    }

    async fn insert(&self, _object: &str, records: &[Record]) -> Result<Vec<SaveResult>> {
        Ok(records
            .iter()
            .map(|_| SaveResult::ok(self.fabricate_id(), None))
            .collect())
    }

    async fn upsert(
        &self,
        _object: &str,
        _external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<SaveResult>> {
        Ok(records
            .iter()
            .map(|_| SaveResult::ok(self.fabricate_id(), Some(true)))
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<Vec<SaveResult>> {
        Ok(ids.iter().map(|id| SaveResult::ok(id.clone(), None)).collect())
    }

    async fn limits(&self) -> Result<OrgLimits> {
        Ok(OrgLimits::new())
    }

    async fn convert_lead(&self, _request: &LeadConvertRequest) -> Result<LeadConvertOutcome> {
        Ok(LeadConvertOutcome {
            success: true,
            status_code: None,
            message: None,
        })
    }
}

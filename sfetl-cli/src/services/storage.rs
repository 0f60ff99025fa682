//! Record counts and storage usage of the org

use anyhow::Result;

use crate::api::OrgApi;
use crate::api::models::LimitValue;

#[derive(Debug, Clone, Default)]
pub struct StorageReport {
    /// (object, record count) for objects with records
    pub counts: Vec<(String, u64)>,
    /// Objects whose count query failed
    pub inaccessible: Vec<String>,
    pub data_storage_mb: Option<LimitValue>,
    pub file_storage_mb: Option<LimitValue>,
}

impl StorageReport {
    pub fn total_records(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

pub async fn storage_report(api: &dyn OrgApi, objects: &[&str]) -> Result<StorageReport> {
    let mut report = StorageReport::default();

    for object in objects {
        match api.count(object).await {
            Ok(0) => {}
            Ok(count) => report.counts.push((object.to_string(), count)),
            Err(e) => {
                log::debug!("Count of {} failed: {:#}", object, e);
                report.inaccessible.push(object.to_string());
            }
        }
    }

    match api.limits().await {
        Ok(mut limits) => {
            report.data_storage_mb = limits.remove("DataStorageMB");
            report.file_storage_mb = limits.remove("FileStorageMB");
        }
        Err(e) => log::warn!("Could not read org limits: {:#}", e),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Record;
    use crate::api::org::fake::FakeOrg;

    #[tokio::test]
    async fn test_counts_only_objects_with_records() {
        let org = FakeOrg::new();
        org.insert("Account", &[Record::new(), Record::new()]).await.unwrap();
        org.insert("Case", &[Record::new()]).await.unwrap();

        let report = storage_report(&org, &["Account", "Contact", "Case"]).await.unwrap();

        assert_eq!(
            report.counts,
            vec![("Account".to_string(), 2), ("Case".to_string(), 1)]
        );
        assert_eq!(report.total_records(), 3);
        assert!(report.inaccessible.is_empty());
        assert!(report.data_storage_mb.is_none());
    }
}

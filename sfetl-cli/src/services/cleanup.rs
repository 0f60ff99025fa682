//! Delete uploaded records from the org, children before parents

use anyhow::Result;

use crate::api::OrgApi;
use crate::api::error::ApiError;
use crate::services::id_map::IdMapStore;
use crate::upload::{DependencyGraph, ObjectSpec};

/// IDs per delete request (sObject Collections limit)
const DELETE_CHUNK: usize = 200;

/// Objects that cannot be deleted through the data API
const UNDELETABLE: &[(&str, &str)] = &[
    ("Knowledge__kav", "articles must be archived and deleted through the Knowledge UI"),
    ("User", "users can only be deactivated"),
];

/// Delete outcomes that mean the record is gone anyway
const ALREADY_GONE: &[&str] = &["ENTITY_IS_DELETED", "INVALID_CROSS_REFERENCE_KEY"];

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Records per object
    pub limit: Option<usize>,
    /// Without it only counts are reported
    pub confirm: bool,
    pub clear_mappings: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectCleanup {
    pub object: String,
    pub found: u64,
    pub deleted: usize,
    pub failed: usize,
    /// Set when the object was not touched
    pub skipped: Option<String>,
    pub mappings_cleared: u64,
    pub sample_errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub confirmed: bool,
    pub objects: Vec<ObjectCleanup>,
}

impl CleanupReport {
    pub fn total_found(&self) -> u64 {
        self.objects.iter().map(|o| o.found).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.objects.iter().map(|o| o.deleted).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.objects.iter().map(|o| o.failed).sum()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.objects
            .iter()
            .filter(|o| o.skipped.is_some())
            .map(|o| o.object.as_str())
            .collect()
    }
}

/// Objects in delete order: referencing objects before the ones they reference
pub fn delete_order(specs: &[&'static ObjectSpec]) -> Result<Vec<String>> {
    Ok(DependencyGraph::build(specs).delete_order()?)
}

pub async fn cleanup(
    api: &dyn OrgApi,
    specs: &[&'static ObjectSpec],
    options: &CleanupOptions,
    mut id_map: Option<&mut IdMapStore>,
) -> Result<CleanupReport> {
    let mut report = CleanupReport {
        confirmed: options.confirm,
        objects: Vec::new(),
    };

    for object in delete_order(specs)? {
        let mut result = clean_object(api, &object, options).await;

        if options.confirm && options.clear_mappings && result.skipped.is_none() {
            if result.failed == 0 && result.deleted as u64 >= result.found {
                if let Some(map) = id_map.as_deref_mut() {
                    result.mappings_cleared = map.clear_object(&object).await?;
                }
            } else if result.found > 0 {
                log::info!(
                    "Keeping {} mappings: {} of {} records remain in the org",
                    object,
                    result.found.saturating_sub(result.deleted as u64),
                    result.found
                );
            }
        }

        report.objects.push(result);
    }

    Ok(report)
}

async fn clean_object(api: &dyn OrgApi, object: &str, options: &CleanupOptions) -> ObjectCleanup {
    let mut result = ObjectCleanup {
        object: object.to_string(),
        ..Default::default()
    };

    if let Some((_, reason)) = UNDELETABLE.iter().find(|(name, _)| *name == object) {
        result.skipped = Some(reason.to_string());
        return result;
    }

    match api.count(object).await {
        Ok(count) => result.found = count,
        Err(e) => {
            log::debug!("Counting {} failed: {:#}", object, e);
            result.skipped = Some(not_accessible(&e));
            return result;
        }
    }

    if result.found == 0 || !options.confirm {
        return result;
    }

    let mut soql = format!("SELECT Id FROM {}", object);
    if let Some(limit) = options.limit {
        soql.push_str(&format!(" LIMIT {}", limit));
    }

    let ids: Vec<String> = match api.query(&soql).await {
        Ok(records) => records
            .iter()
            .filter_map(|r| r.get("Id").and_then(|v| v.as_str()).map(String::from))
            .collect(),
        Err(e) => {
            result.skipped = Some(not_accessible(&e));
            return result;
        }
    };

    log::info!("Deleting {} {} records", ids.len(), object);

    for chunk in ids.chunks(DELETE_CHUNK) {
        match api.delete(chunk).await {
            Ok(results) => {
                for save in results {
                    let error = save.first_error();
                    let gone = error.is_some_and(|e| ALREADY_GONE.contains(&e.status_code.as_str()));
                    if save.success || gone {
                        result.deleted += 1;
                    } else {
                        result.failed += 1;
                        if result.sample_errors.len() < 3 {
                            result.sample_errors.push(
                                error.map_or_else(
                                    || "unknown error".to_string(),
                                    |e| format!("{}: {}", e.status_code, e.message),
                                ),
                            );
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Delete request for {} failed: {:#}", object, e);
                result.failed += chunk.len();
                if result.sample_errors.len() < 3 {
                    result.sample_errors.push(format!("{:#}", e));
                }
            }
        }
    }

    if result.failed * 10 > ids.len() {
        log::warn!(
            "{} of {} {} deletes failed; dependent records may need deleting first",
            result.failed,
            ids.len(),
            object
        );
    }

    result
}

fn not_accessible(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_not_found() => "not available in this org".to_string(),
        _ => format!("not accessible: {:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::org::fake::FakeOrg;
    use crate::api::Record;
    use crate::config::open_memory_pool;
    use crate::upload::catalog;
    use serde_json::json;

    fn specs(names: &[&str]) -> Vec<&'static ObjectSpec> {
        catalog::select(&names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap()
    }

    async fn seeded_org() -> (FakeOrg, Vec<String>, Vec<String>) {
        let accounts: Vec<Record> = (0..3)
            .map(|i| {
                let mut r = Record::new();
                r.insert("Name".into(), json!(format!("Account {}", i)));
                r
            })
            .collect();
        let contacts: Vec<Record> = (0..2)
            .map(|i| {
                let mut r = Record::new();
                r.insert("LastName".into(), json!(format!("Contact {}", i)));
                r
            })
            .collect();

        let org = FakeOrg::new();
        let account_ids: Vec<String> = org
            .insert("Account", &accounts)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        let contact_ids: Vec<String> = org
            .insert("Contact", &contacts)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();

        let org = org
            .with_query("FROM Account", account_ids.iter().map(|id| json!({"Id": id})).collect())
            .with_query("FROM Contact", contact_ids.iter().map(|id| json!({"Id": id})).collect());
        (org, account_ids, contact_ids)
    }

    #[test]
    fn test_delete_order_children_first() {
        let order = delete_order(&specs(&["Account", "Contact", "Case"])).unwrap();
        let pos = |name: &str| order.iter().position(|o| o == name).unwrap();

        assert!(pos("Case") < pos("Contact"));
        assert!(pos("Contact") < pos("Account"));
    }

    #[tokio::test]
    async fn test_without_confirm_only_counts() {
        let (org, _, _) = seeded_org().await;

        let report = cleanup(&org, &specs(&["Account", "Contact"]), &CleanupOptions::default(), None)
            .await
            .unwrap();

        assert!(!report.confirmed);
        assert_eq!(report.total_found(), 5);
        assert_eq!(report.total_deleted(), 0);
        assert_eq!(org.records("Account").len(), 3);
    }

    #[tokio::test]
    async fn test_confirmed_cleanup_deletes_and_clears_mappings() {
        let (org, account_ids, _) = seeded_org().await;
        let mut id_map = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        id_map.insert("Account", "001OLD", &account_ids[0]).await.unwrap();
        id_map.insert("Case", "500OLD", "500NEW").await.unwrap();

        let options = CleanupOptions {
            confirm: true,
            clear_mappings: true,
            ..Default::default()
        };
        let report = cleanup(&org, &specs(&["Account", "Contact"]), &options, Some(&mut id_map))
            .await
            .unwrap();

        assert_eq!(report.total_deleted(), 5);
        assert_eq!(report.total_failed(), 0);
        assert!(org.records("Account").is_empty());
        assert!(org.records("Contact").is_empty());
        assert_eq!(id_map.count("Account"), 0);
        assert_eq!(id_map.count("Case"), 1);
    }

    #[tokio::test]
    async fn test_knowledge_is_skipped() {
        let org = FakeOrg::new();

        let report = cleanup(
            &org,
            &specs(&["Knowledge__kav"]),
            &CleanupOptions {
                confirm: true,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.skipped(), vec!["Knowledge__kav"]);
    }

    #[tokio::test]
    async fn test_already_deleted_counts_as_deleted() {
        let org = FakeOrg::new()
            .with_query("FROM Account", vec![json!({"Id": "001GONE"})]);
        org.insert("Account", &[Record::new()]).await.unwrap();

        let report = cleanup(
            &org,
            &specs(&["Account"]),
            &CleanupOptions {
                confirm: true,
                limit: Some(1),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.objects[0].deleted, 1);
        assert_eq!(report.objects[0].failed, 0);
    }

    #[tokio::test]
    async fn test_limited_cleanup_keeps_mappings_of_remaining_records() {
        let (org, account_ids, _) = seeded_org().await;
        let org = org.with_query(
            "FROM Account",
            account_ids[..2].iter().map(|id| json!({"Id": id})).collect(),
        );
        let mut id_map = IdMapStore::load(open_memory_pool().await.unwrap()).await.unwrap();
        id_map.insert("Account", "001OLD", &account_ids[2]).await.unwrap();

        let options = CleanupOptions {
            confirm: true,
            clear_mappings: true,
            limit: Some(2),
        };
        let report = cleanup(&org, &specs(&["Account"]), &options, Some(&mut id_map))
            .await
            .unwrap();

        let accounts = &report.objects[0];
        assert_eq!(accounts.found, 3);
        assert_eq!(accounts.deleted, 2);
        assert_eq!(accounts.mappings_cleared, 0);
        assert_eq!(org.records("Account").len(), 1);
        assert_eq!(id_map.get("Account", "001OLD"), Some(account_ids[2].as_str()));
    }
}

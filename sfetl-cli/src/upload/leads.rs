//! Post-upload Lead conversion
//!
//! Leads converted in the snapshot are converted in the org as well, onto
//! the Account, Contact and Opportunity already uploaded for them.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;

use super::prepare::soql_quote;
use super::report::LeadConversionStats;
use crate::api::OrgApi;
use crate::api::models::LeadConvertRequest;
use crate::services::id_map::IdMapStore;
use crate::source::SourceDb;

pub const CONVERTED_STATUS: &str = "Closed - Converted";

const ID_CHUNK: usize = 200;

/// Org lead IDs among `ids` that are already converted
async fn already_converted(api: &dyn OrgApi, ids: &[String]) -> Result<HashSet<String>> {
    let mut converted = HashSet::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let quoted: Vec<String> = chunk.iter().map(|id| soql_quote(id)).collect();
        let soql = format!(
            "SELECT Id FROM Lead WHERE IsConverted = true AND Id IN ({})",
            quoted.join(", ")
        );
        converted.extend(
            api.query(&soql)
                .await?
                .iter()
                .filter_map(|r| r.get("Id").and_then(Value::as_str))
                .map(String::from),
        );
    }
    Ok(converted)
}

pub async fn convert_leads(
    api: &dyn OrgApi,
    source: &SourceDb,
    id_map: &IdMapStore,
) -> Result<LeadConversionStats> {
    let leads = source.converted_leads().await?;
    let mut stats = LeadConversionStats {
        candidates: leads.len(),
        ..Default::default()
    };
    if leads.is_empty() {
        return Ok(stats);
    }

    let mut requests = Vec::new();
    for lead in &leads {
        let mapped = (
            id_map.get("Lead", &lead.lead_id),
            id_map.get("Account", &lead.account_id),
            id_map.get("Contact", &lead.contact_id),
        );
        let (Some(lead_id), Some(account_id), Some(contact_id)) = mapped else {
            log::debug!("Lead {} not converted: lead, account or contact not uploaded", lead.lead_id);
            stats.skipped += 1;
            continue;
        };

        requests.push((
            lead.lead_id.as_str(),
            LeadConvertRequest {
                lead_id: lead_id.to_string(),
                account_id: account_id.to_string(),
                contact_id: contact_id.to_string(),
                opportunity_id: lead
                    .opportunity_id
                    .as_deref()
                    .and_then(|id| id_map.get("Opportunity", id))
                    .map(String::from),
                converted_status: CONVERTED_STATUS.to_string(),
            },
        ));
    }

    let org_ids: Vec<String> = requests.iter().map(|(_, r)| r.lead_id.clone()).collect();
    let done = match already_converted(api, &org_ids).await {
        Ok(done) => done,
        Err(e) => {
            log::warn!("Could not check for already converted leads: {:#}", e);
            HashSet::new()
        }
    };

    log::info!("Converting {} leads", requests.len() - done.len().min(requests.len()));

    for (source_id, request) in requests {
        if done.contains(&request.lead_id) {
            stats.already_converted += 1;
            continue;
        }

        match api.convert_lead(&request).await {
            Ok(outcome) if outcome.success => stats.converted += 1,
            Ok(outcome) => stats.record_failure(format!(
                "{}: {} {}",
                source_id,
                outcome.status_code.unwrap_or_default(),
                outcome.message.unwrap_or_default()
            )),
            Err(e) => stats.record_failure(format!("{}: {:#}", source_id, e)),
        }
    }

    Ok(stats)
}

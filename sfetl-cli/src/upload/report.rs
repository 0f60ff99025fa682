//! Upload outcome aggregation and output

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::errors::{ErrorCategory, SkipReason};
use crate::api::SaveResult;

/// Sample messages kept per object in the summary
const MAX_SAMPLES: usize = 3;

/// One rejected or skipped row
#[derive(Debug, Clone, Serialize)]
pub struct FailureSample {
    pub object: String,
    pub local_id: Option<String>,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectStats {
    pub object: String,
    pub source_rows: usize,
    pub uploaded: usize,
    pub created: usize,
    pub updated: usize,
    /// Rows not submitted (mapping rejections and already-uploaded rows)
    pub skipped: usize,
    /// Rows rejected by the org
    pub failed: usize,
    /// Duplicates mapped onto an existing org record instead
    pub remapped: usize,
    pub categories: BTreeMap<ErrorCategory, usize>,
    pub samples: Vec<FailureSample>,
    /// Why the object was not processed at all
    pub note: Option<String>,
    /// Source columns the org does not have
    pub unavailable_columns: Vec<String>,
    #[serde(skip)]
    pub failures: Vec<FailureSample>,
}

impl ObjectStats {
    pub fn new(object: &str) -> Self {
        Self {
            object: object.to_string(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, result: &SaveResult) {
        self.uploaded += 1;
        match result.created {
            Some(false) => self.updated += 1,
            _ => self.created += 1,
        }
    }

    pub fn record_remap(&mut self) {
        self.remapped += 1;
    }

    pub fn record_skip(&mut self, local_id: Option<&str>, reason: &SkipReason) {
        self.skipped += 1;
        if let Some(category) = reason.category() {
            self.push_failure(local_id, category, reason.code(), &reason.to_string());
        }
    }

    pub fn record_failure(&mut self, local_id: Option<&str>, category: ErrorCategory, code: &str, message: &str) {
        self.failed += 1;
        self.push_failure(local_id, category, code, message);
    }

    fn push_failure(&mut self, local_id: Option<&str>, category: ErrorCategory, code: &str, message: &str) {
        *self.categories.entry(category).or_default() += 1;

        let sample = FailureSample {
            object: self.object.clone(),
            local_id: local_id.map(String::from),
            category,
            code: code.to_string(),
            message: message.to_string(),
        };
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(sample.clone());
        }
        self.failures.push(sample);
    }

    pub fn problem_count(&self) -> usize {
        self.categories.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadConversionStats {
    pub candidates: usize,
    pub converted: usize,
    pub already_converted: usize,
    /// Leads whose account or contact has no mapping
    pub skipped: usize,
    pub failed: usize,
    pub samples: Vec<String>,
}

impl LeadConversionStats {
    pub fn record_failure(&mut self, message: String) {
        self.failed += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(message);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub org_type: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub objects: Vec<ObjectStats>,
    pub lead_conversion: Option<LeadConversionStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub uploaded: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UploadReport {
    pub fn new(org_type: &str, dry_run: bool) -> Self {
        Self {
            org_type: org_type.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            objects: Vec::new(),
            lead_conversion: None,
        }
    }

    pub fn object(&self, name: &str) -> Option<&ObjectStats> {
        self.objects.iter().find(|o| o.object == name)
    }

    pub fn totals(&self) -> Totals {
        self.objects.iter().fold(Totals::default(), |mut t, o| {
            t.uploaded += o.uploaded;
            t.created += o.created;
            t.updated += o.updated;
            t.skipped += o.skipped;
            t.failed += o.failed;
            t
        })
    }

    pub fn category_totals(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut totals = BTreeMap::new();
        for stats in &self.objects {
            for (category, count) in &stats.categories {
                *totals.entry(*category).or_default() += count;
            }
        }
        totals
    }

    pub fn print_summary(&self) {
        println!();
        let title = if self.dry_run {
            "Upload summary (dry run)"
        } else {
            "Upload summary"
        };
        println!("{}", title.bold());
        println!(
            "{:<28} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "Object", "Source", "Created", "Updated", "Skipped", "Failed"
        );
        println!("{}", "-".repeat(74).dimmed());

        for stats in &self.objects {
            if let Some(note) = &stats.note {
                println!("{:<28} {}", stats.object, note.dimmed());
                continue;
            }

            let failed = if stats.failed > 0 {
                format!("{:>8}", stats.failed).red().to_string()
            } else {
                format!("{:>8}", 0)
            };
            println!(
                "{:<28} {:>8} {:>8} {:>8} {:>8} {}",
                stats.object,
                stats.source_rows,
                stats.created.to_string().green(),
                stats.updated,
                stats.skipped,
                failed
            );

            for sample in &stats.samples {
                println!(
                    "    {} {} {}",
                    format!("[{}]", sample.category).yellow(),
                    sample.local_id.as_deref().unwrap_or("-").dimmed(),
                    sample.message
                );
            }
            if stats.remapped > 0 {
                println!("    {} duplicates mapped onto existing records", stats.remapped);
            }
            if !stats.unavailable_columns.is_empty() {
                println!(
                    "    {} {}",
                    "not in org:".dimmed(),
                    stats.unavailable_columns.join(", ").dimmed()
                );
            }
        }

        let totals = self.totals();
        println!("{}", "-".repeat(74).dimmed());
        println!(
            "Uploaded {} ({} created, {} updated), skipped {}, failed {}",
            totals.uploaded.to_string().green().bold(),
            totals.created,
            totals.updated,
            totals.skipped,
            if totals.failed > 0 {
                totals.failed.to_string().red().bold()
            } else {
                totals.failed.to_string().normal()
            }
        );

        let categories = self.category_totals();
        if !categories.is_empty() {
            println!();
            println!("{}", "Problems by category".bold());
            for (category, count) in categories {
                println!("  {:<24} {}", category.label(), count);
            }
        }

        if let Some(leads) = &self.lead_conversion {
            println!();
            println!(
                "Lead conversion: {} of {} converted, {} already converted, {} skipped, {} failed",
                leads.converted.to_string().green(),
                leads.candidates,
                leads.already_converted,
                leads.skipped,
                leads.failed
            );
            for message in &leads.samples {
                println!("    {}", message.dimmed());
            }
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize upload report")?;
        fs::write(path, content).with_context(|| format!("Failed to write report: {}", path.display()))
    }

    /// One CSV line per rejected or skipped-with-problem row
    pub fn write_failures_csv(&self, path: &Path) -> Result<usize> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create failures file: {}", path.display()))?;
        writer.write_record(["object", "local_id", "category", "code", "message"])?;

        let mut written = 0;
        for failure in self.objects.iter().flat_map(|o| &o.failures) {
            writer.write_record([
                failure.object.as_str(),
                failure.local_id.as_deref().unwrap_or(""),
                failure.category.label(),
                failure.code.as_str(),
                failure.message.as_str(),
            ])?;
            written += 1;
        }

        writer.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> UploadReport {
        let mut report = UploadReport::new("original", false);

        let mut accounts = ObjectStats::new("Account");
        accounts.source_rows = 3;
        accounts.record_success(&SaveResult::ok("001A", Some(true)));
        accounts.record_success(&SaveResult::ok("001B", Some(false)));
        accounts.record_failure(Some("a3"), ErrorCategory::Duplicate, "DUPLICATES_DETECTED", "dup");
        report.objects.push(accounts);

        let mut contacts = ObjectStats::new("Contact");
        contacts.source_rows = 2;
        contacts.record_skip(Some("c1"), &SkipReason::AlreadyUploaded);
        contacts.record_skip(
            Some("c2"),
            &SkipReason::UnresolvedReference {
                field: "AccountId".into(),
                target: "Account".into(),
                value: "a9".into(),
            },
        );
        report.objects.push(contacts);

        report
    }

    #[test]
    fn test_totals_and_categories() {
        let report = sample_report();
        let totals = report.totals();

        assert_eq!(totals.uploaded, 2);
        assert_eq!(totals.created, 1);
        assert_eq!(totals.updated, 1);
        assert_eq!(totals.skipped, 2);
        assert_eq!(totals.failed, 1);

        let categories = report.category_totals();
        assert_eq!(categories.get(&ErrorCategory::Duplicate), Some(&1));
        assert_eq!(categories.get(&ErrorCategory::InvalidReference), Some(&1));
        assert_eq!(report.object("Contact").unwrap().problem_count(), 1);
    }

    #[test]
    fn test_samples_are_capped() {
        let mut stats = ObjectStats::new("Case");
        for i in 0..10 {
            stats.record_failure(Some(&format!("c{}", i)), ErrorCategory::Other, "X", "boom");
        }

        assert_eq!(stats.samples.len(), MAX_SAMPLES);
        assert_eq!(stats.failures.len(), 10);
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let json_path = dir.path().join("report.json");
        report.write_json(&json_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["objects"][0]["created"], 1);
        assert!(json["objects"][0].get("failures").is_none());

        let csv_path = dir.path().join("failures.csv");
        assert_eq!(report.write_failures_csv(&csv_path).unwrap(), 2);
        let content = fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("object,local_id,category,code,message"));
        assert!(content.contains("Contact,c2,Invalid reference,UNRESOLVED_REFERENCE"));
    }
}

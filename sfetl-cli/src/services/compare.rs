//! Source snapshot vs. org record counts
//!
//! Every snapshot table is counted on both sides and placed in one of four
//! buckets. The result can be exported as an Excel workbook with a summary
//! sheet and a per-object sheet.

use anyhow::{Context, Result};
use rust_xlsxwriter::*;
use std::path::Path;

use crate::api::OrgApi;
use crate::source::SourceDb;

/// Snapshot tables that are not Salesforce objects
const INTERNAL_TABLES: &[&str] = &["id_mappings", "sqlite_sequence"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadStatus {
    /// Org has at least as many records as the source
    Complete,
    Partial,
    Missing,
    /// Nothing to upload
    NotApplicable,
}

impl UploadStatus {
    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::Complete => "Complete",
            UploadStatus::Partial => "Partial",
            UploadStatus::Missing => "Missing",
            UploadStatus::NotApplicable => "No source data",
        }
    }

    fn of(source: u64, org: u64) -> Self {
        match (source, org) {
            (0, _) => UploadStatus::NotApplicable,
            (s, o) if o >= s => UploadStatus::Complete,
            (_, 0) => UploadStatus::Missing,
            _ => UploadStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectComparison {
    pub object: String,
    pub source: u64,
    pub org: u64,
    pub status: UploadStatus,
    /// Why the org count could not be read
    pub error: Option<String>,
}

impl ObjectComparison {
    pub fn missing(&self) -> u64 {
        self.source.saturating_sub(self.org)
    }

    /// Share of source rows present in the org, in percent
    pub fn rate(&self) -> f64 {
        if self.source == 0 {
            return 0.0;
        }
        (self.org.min(self.source) as f64 / self.source as f64) * 100.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonReport {
    pub org_type: String,
    pub generated_at: String,
    /// Sorted by source count, largest first
    pub objects: Vec<ObjectComparison>,
}

impl ComparisonReport {
    pub fn with_status(&self, status: UploadStatus) -> impl Iterator<Item = &ObjectComparison> {
        self.objects.iter().filter(move |o| o.status == status)
    }

    pub fn total_source(&self) -> u64 {
        self.objects.iter().map(|o| o.source).sum()
    }

    /// Uploaded records, capped per object at the source count
    pub fn total_uploaded(&self) -> u64 {
        self.objects.iter().map(|o| o.org.min(o.source)).sum()
    }

    pub fn overall_rate(&self) -> f64 {
        match self.total_source() {
            0 => 0.0,
            total => self.total_uploaded() as f64 / total as f64 * 100.0,
        }
    }
}

pub async fn compare_counts(api: &dyn OrgApi, source: &SourceDb, org_type: &str) -> Result<ComparisonReport> {
    let mut objects = Vec::new();

    for table in source.tables().await? {
        if INTERNAL_TABLES.contains(&table.as_str()) {
            continue;
        }

        let source_count = source.count(&table).await?;
        let (org_count, error) = match api.count(&table).await {
            Ok(n) => (n, None),
            Err(e) => {
                let mut message = format!("{:#}", e);
                message.truncate(80);
                (0, Some(message))
            }
        };

        objects.push(ObjectComparison {
            status: UploadStatus::of(source_count, org_count),
            object: table,
            source: source_count,
            org: org_count,
            error,
        });
    }

    objects.sort_by(|a, b| b.source.cmp(&a.source).then_with(|| a.object.cmp(&b.object)));

    Ok(ComparisonReport {
        org_type: org_type.to_string(),
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        objects,
    })
}

/// Export the comparison to an Excel workbook
pub fn export_comparison_to_excel(report: &ComparisonReport, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();

    create_summary_sheet(&mut workbook, report)?;
    create_objects_sheet(&mut workbook, report)?;

    workbook
        .save(path)
        .with_context(|| format!("Failed to save Excel file: {}", path.display()))?;

    log::info!("Comparison report exported to: {}", path.display());
    Ok(())
}

fn create_summary_sheet(workbook: &mut Workbook, report: &ComparisonReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Summary")?;

    let title_format = Format::new().set_bold().set_font_size(16);
    let bold_format = Format::new().set_bold();
    let percent_format = Format::new().set_num_format("0.00\"%\"");

    sheet.write_string_with_format(
        0,
        0,
        &format!("Upload Comparison: {}", report.org_type),
        &title_format,
    )?;
    sheet.write_string(1, 0, &format!("Generated: {}", report.generated_at))?;

    sheet.write_string_with_format(3, 0, "Metric", &bold_format)?;
    sheet.write_string_with_format(3, 1, "Value", &bold_format)?;

    let mut row = 4u32;
    let counts = [
        ("Objects in source", report.objects.len()),
        ("Complete", report.with_status(UploadStatus::Complete).count()),
        ("Partial", report.with_status(UploadStatus::Partial).count()),
        ("Missing", report.with_status(UploadStatus::Missing).count()),
        ("No source data", report.with_status(UploadStatus::NotApplicable).count()),
    ];
    for (label, value) in counts {
        sheet.write_string(row, 0, label)?;
        sheet.write_number(row, 1, value as f64)?;
        row += 1;
    }

    row += 1;
    sheet.write_string(row, 0, "Records in source")?;
    sheet.write_number(row, 1, report.total_source() as f64)?;
    row += 1;
    sheet.write_string(row, 0, "Records uploaded")?;
    sheet.write_number(row, 1, report.total_uploaded() as f64)?;
    row += 1;
    sheet.write_string(row, 0, "Overall rate")?;
    sheet.write_number_with_format(row, 1, report.overall_rate(), &percent_format)?;

    sheet.autofit();
    Ok(())
}

fn create_objects_sheet(workbook: &mut Workbook, report: &ComparisonReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Objects")?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4472C4))
        .set_font_color(Color::White);
    let complete_format = Format::new().set_background_color(Color::RGB(0xC6EFCE));
    let partial_format = Format::new().set_background_color(Color::RGB(0xFFC000));
    let missing_format = Format::new().set_background_color(Color::RGB(0xFF6B6B));
    let plain_format = Format::new();

    let headers = ["Object", "Source", "Salesforce", "Missing", "Rate %", "Status", "Error"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (i, object) in report.objects.iter().enumerate() {
        let row = i as u32 + 1;
        let format = match object.status {
            UploadStatus::Complete => &complete_format,
            UploadStatus::Partial => &partial_format,
            UploadStatus::Missing => &missing_format,
            UploadStatus::NotApplicable => &plain_format,
        };

        sheet.write_string_with_format(row, 0, &object.object, format)?;
        sheet.write_number_with_format(row, 1, object.source as f64, format)?;
        sheet.write_number_with_format(row, 2, object.org as f64, format)?;
        sheet.write_number_with_format(row, 3, object.missing() as f64, format)?;
        sheet.write_number_with_format(row, 4, (object.rate() * 100.0).round() / 100.0, format)?;
        sheet.write_string_with_format(row, 5, object.status.label(), format)?;
        sheet.write_string_with_format(row, 6, object.error.as_deref().unwrap_or(""), format)?;
    }

    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Record;
    use crate::api::org::fake::FakeOrg;
    use crate::source::testing::memory_source;

    #[test]
    fn test_status_buckets() {
        assert_eq!(UploadStatus::of(0, 0), UploadStatus::NotApplicable);
        assert_eq!(UploadStatus::of(0, 5), UploadStatus::NotApplicable);
        assert_eq!(UploadStatus::of(10, 10), UploadStatus::Complete);
        assert_eq!(UploadStatus::of(10, 12), UploadStatus::Complete);
        assert_eq!(UploadStatus::of(10, 4), UploadStatus::Partial);
        assert_eq!(UploadStatus::of(10, 0), UploadStatus::Missing);
    }

    #[tokio::test]
    async fn test_compare_and_export() {
        let source = memory_source().await;
        source
            .exec(
                "CREATE TABLE Account (Id TEXT);
                 INSERT INTO Account VALUES ('001A'), ('001B');
                 CREATE TABLE Contact (Id TEXT);
                 INSERT INTO Contact VALUES ('003A'), ('003B'), ('003C'), ('003D');
                 CREATE TABLE Issue__c (Id TEXT);
                 INSERT INTO Issue__c VALUES ('a00A');
                 CREATE TABLE Quote (Id TEXT);
                 CREATE TABLE id_mappings (object_name TEXT);",
            )
            .await;

        let org = FakeOrg::new();
        org.insert("Account", &[Record::new(), Record::new()]).await.unwrap();
        org.insert("Contact", &[Record::new()]).await.unwrap();

        let report = compare_counts(&org, &source, "b2b").await.unwrap();

        let names: Vec<&str> = report.objects.iter().map(|o| o.object.as_str()).collect();
        assert_eq!(names, vec!["Contact", "Account", "Issue__c", "Quote"]);
        assert_eq!(report.objects[0].status, UploadStatus::Partial);
        assert_eq!(report.objects[0].missing(), 3);
        assert_eq!(report.objects[1].status, UploadStatus::Complete);
        assert_eq!(report.objects[2].status, UploadStatus::Missing);
        assert_eq!(report.objects[3].status, UploadStatus::NotApplicable);
        assert_eq!(report.total_source(), 7);
        assert_eq!(report.total_uploaded(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.xlsx");
        export_comparison_to_excel(&report, &path).unwrap();
        assert!(path.exists());
    }
}

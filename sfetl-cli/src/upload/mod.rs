//! Snapshot upload: catalog, ordering, mapping, submission and reporting

pub mod catalog;
pub mod errors;
pub mod graph;
pub mod leads;
pub mod mapper;
pub mod prepare;
pub mod report;
pub mod uploader;

pub use catalog::{CATALOG, EXTERNAL_ID_FIELD, ObjectSpec, SYSTEM_FIELDS, UploadMode};
pub use errors::{ErrorCategory, SkipReason};
pub use graph::{CycleError, DependencyGraph};
pub use report::UploadReport;
pub use uploader::{UploadOptions, Uploader};

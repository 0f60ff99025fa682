//! Salesforce API access
//!
//! REST (data, Tooling) through [`SalesforceClient`], the few SOAP calls the
//! REST API lacks in [`soap`], and credential handling in [`auth`].

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod org;
pub mod soap;

pub use auth::{Credentials, Session};
pub use client::SalesforceClient;
pub use error::ApiError;
pub use models::{Record, SaveResult};
pub use org::{OfflineOrg, OrgApi};

//! Error returned by the Salesforce APIs

use serde::Deserialize;

/// Error response from a Salesforce endpoint
///
/// REST endpoints answer with `[{"message": "...", "errorCode": "..."}]`;
/// SOAP endpoints with a fault whose code is stored in `error_code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    /// Build an error from an HTTP status and raw response body
    pub fn from_body(status: u16, body: &str) -> Self {
        if let Ok(errors) = serde_json::from_str::<Vec<RestErrorBody>>(body) {
            if let Some(first) = errors.into_iter().next() {
                return Self {
                    status,
                    error_code: first.error_code,
                    message: first.message,
                };
            }
        }

        Self {
            status,
            error_code: String::new(),
            message: body.trim().to_string(),
        }
    }

    /// The object or resource does not exist in this org
    pub fn is_not_found(&self) -> bool {
        self.status == 404
            || matches!(
                self.error_code.as_str(),
                "NOT_FOUND" | "INVALID_TYPE" | "ENTITY_NOT_FOUND"
            )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.error_code.is_empty() {
            write!(f, "Salesforce API error ({}): {}", self.status, self.message)
        } else {
            write!(
                f,
                "Salesforce API error ({} {}): {}",
                self.status, self.error_code, self.message
            )
        }
    }
}

impl std::error::Error for ApiError {}

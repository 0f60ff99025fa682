//! Failure taxonomy for uploaded and skipped rows

use serde::Serialize;

/// Category of a per-row failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorCategory {
    MissingRequiredField,
    Duplicate,
    InvalidReference,
    Permission,
    InvalidField,
    PlatformLimitation,
    Other,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::MissingRequiredField => "Missing required field",
            ErrorCategory::Duplicate => "Duplicate",
            ErrorCategory::InvalidReference => "Invalid reference",
            ErrorCategory::Permission => "Permission",
            ErrorCategory::InvalidField => "Invalid field",
            ErrorCategory::PlatformLimitation => "Platform limitation",
            ErrorCategory::Other => "Other",
        }
    }

    /// Classify a Salesforce status code, falling back to the message text
    pub fn classify(status_code: &str, message: &str) -> Self {
        match status_code {
            "REQUIRED_FIELD_MISSING" => ErrorCategory::MissingRequiredField,
            "DUPLICATE_VALUE"
            | "DUPLICATES_DETECTED"
            | "DUPLICATE_USERNAME"
            | "DUPLICATE_EXTERNAL_ID"
            | "DUPLICATE_DEVELOPER_NAME"
            | "DUPLICATE_COMM_NICKNAME" => ErrorCategory::Duplicate,
            "INVALID_CROSS_REFERENCE_KEY"
            | "INVALID_ID_FIELD"
            | "ENTITY_IS_DELETED"
            | "FIELD_INTEGRITY_EXCEPTION"
            | "STANDARD_PRICE_NOT_DEFINED" => ErrorCategory::InvalidReference,
            code if code.starts_with("INSUFFICIENT_ACCESS") => ErrorCategory::Permission,
            "INVALID_FIELD"
            | "INVALID_FIELD_FOR_INSERT_UPDATE"
            | "INVALID_TYPE_ON_FIELD_IN_RECORD"
            | "INVALID_EMAIL_ADDRESS"
            | "INVALID_OR_NULL_FOR_RESTRICTED_PICKLIST"
            | "STRING_TOO_LONG"
            | "NUMBER_OUTSIDE_VALID_RANGE"
            | "MALFORMED_ID"
            | "FIELD_CUSTOM_VALIDATION_EXCEPTION"
            | "JSON_PARSER_ERROR" => ErrorCategory::InvalidField,
            "LICENSE_LIMIT_EXCEEDED"
            | "STORAGE_LIMIT_EXCEEDED"
            | "REQUEST_LIMIT_EXCEEDED"
            | "SERVER_UNAVAILABLE"
            | "INVALID_TYPE"
            | "NOT_FOUND"
            | "API_DISABLED_FOR_ORG"
            | "FEATURE_NOT_ENABLED"
            | "UNABLE_TO_LOCK_ROW" => ErrorCategory::PlatformLimitation,
            _ => Self::classify_message(message),
        }
    }

    fn classify_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("duplicate") {
            ErrorCategory::Duplicate
        } else if message.contains("required field") {
            ErrorCategory::MissingRequiredField
        } else if message.contains("insufficient access") || message.contains("permission") {
            ErrorCategory::Permission
        } else if message.contains("limit exceeded") {
            ErrorCategory::PlatformLimitation
        } else {
            ErrorCategory::Other
        }
    }

    /// Category for rows of a batch whose whole request failed
    pub fn for_request_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<crate::api::ApiError>() {
            Some(api) if !api.error_code.is_empty() => {
                match Self::classify(&api.error_code, &api.message) {
                    ErrorCategory::Other if api.status == 429 || api.status >= 500 => {
                        ErrorCategory::PlatformLimitation
                    }
                    category => category,
                }
            }
            Some(api) if api.status == 429 || api.status >= 500 => ErrorCategory::PlatformLimitation,
            _ => ErrorCategory::Other,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a row was not submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required reference whose target has no mapping
    UnresolvedReference {
        field: String,
        target: String,
        value: String,
    },
    MissingRequiredField { field: String },
    InvalidValue { field: String, value: String },
    Duplicate { field: String, value: String },
    /// Local ID already has a remote counterpart
    AlreadyUploaded,
    ObjectUnavailable { reason: String },
}

impl SkipReason {
    /// Failure category, or `None` for rows that are skipped by design
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            SkipReason::UnresolvedReference { .. } => Some(ErrorCategory::InvalidReference),
            SkipReason::MissingRequiredField { .. } => Some(ErrorCategory::MissingRequiredField),
            SkipReason::InvalidValue { .. } => Some(ErrorCategory::InvalidField),
            SkipReason::Duplicate { .. } => Some(ErrorCategory::Duplicate),
            SkipReason::ObjectUnavailable { .. } => Some(ErrorCategory::PlatformLimitation),
            SkipReason::AlreadyUploaded => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            SkipReason::MissingRequiredField { .. } => "MISSING_REQUIRED_VALUE",
            SkipReason::InvalidValue { .. } => "INVALID_VALUE",
            SkipReason::Duplicate { .. } => "DUPLICATE",
            SkipReason::AlreadyUploaded => "ALREADY_UPLOADED",
            SkipReason::ObjectUnavailable { .. } => "OBJECT_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnresolvedReference { field, target, value } => {
                write!(f, "{} references {} {} which has not been uploaded", field, target, value)
            }
            SkipReason::MissingRequiredField { field } => write!(f, "{} is required but empty", field),
            SkipReason::InvalidValue { field, value } => write!(f, "{} has invalid value '{}'", field, value),
            SkipReason::Duplicate { field, value } => {
                write!(f, "{} '{}' already exists in the org", field, value)
            }
            SkipReason::AlreadyUploaded => write!(f, "already uploaded"),
            SkipReason::ObjectUnavailable { reason } => write!(f, "object unavailable: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    #[test]
    fn test_classify_status_codes() {
        let cases = [
            ("REQUIRED_FIELD_MISSING", ErrorCategory::MissingRequiredField),
            ("DUPLICATES_DETECTED", ErrorCategory::Duplicate),
            ("DUPLICATE_USERNAME", ErrorCategory::Duplicate),
            ("INVALID_CROSS_REFERENCE_KEY", ErrorCategory::InvalidReference),
            ("INSUFFICIENT_ACCESS_ON_CROSS_REFERENCE_ENTITY", ErrorCategory::Permission),
            ("INVALID_FIELD_FOR_INSERT_UPDATE", ErrorCategory::InvalidField),
            ("LICENSE_LIMIT_EXCEEDED", ErrorCategory::PlatformLimitation),
            ("STORAGE_LIMIT_EXCEEDED", ErrorCategory::PlatformLimitation),
            ("SERVER_UNAVAILABLE", ErrorCategory::PlatformLimitation),
            ("CANNOT_EXECUTE_FLOW_TRIGGER", ErrorCategory::Other),
        ];

        for (code, expected) in cases {
            assert_eq!(ErrorCategory::classify(code, ""), expected, "{}", code);
        }
    }

    #[test]
    fn test_classify_falls_back_to_message() {
        assert_eq!(
            ErrorCategory::classify("UNKNOWN_EXCEPTION", "Duplicate record found"),
            ErrorCategory::Duplicate
        );
        assert_eq!(
            ErrorCategory::classify("", "Required fields are missing: [Name]"),
            ErrorCategory::MissingRequiredField
        );
        assert_eq!(
            ErrorCategory::classify("", "trigger failed"),
            ErrorCategory::Other
        );
    }

    #[test]
    fn test_request_error_category() {
        let throttled: anyhow::Error = ApiError {
            status: 503,
            error_code: String::new(),
            message: "Service Unavailable".into(),
        }
        .into();
        assert_eq!(
            ErrorCategory::for_request_error(&throttled),
            ErrorCategory::PlatformLimitation
        );

        let generic = anyhow::anyhow!("connection reset");
        assert_eq!(ErrorCategory::for_request_error(&generic), ErrorCategory::Other);
    }

    #[test]
    fn test_skip_reason_categories() {
        let unresolved = SkipReason::UnresolvedReference {
            field: "AccountId".into(),
            target: "Account".into(),
            value: "001x".into(),
        };
        assert_eq!(unresolved.category(), Some(ErrorCategory::InvalidReference));
        assert_eq!(SkipReason::AlreadyUploaded.category(), None);
        assert_eq!(
            unresolved.to_string(),
            "AccountId references Account 001x which has not been uploaded"
        );
    }
}

use crate::aws::AwsCliError;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    ListFailed,
    GetFailed,
    DescribeFailed,
    NotFound,
    NotSupported,
    Unauthorized,
    // No handler creates resources yet; the code is kept for the full set.
    #[allow(dead_code)]
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListFailed => "LIST_FAILED",
            Self::GetFailed => "GET_FAILED",
            Self::DescribeFailed => "DESCRIBE_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::CreateFailed => "CREATE_FAILED",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::DeleteFailed => "DELETE_FAILED",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable envelope every handler failure is reported through.
///
/// The cause is kept opaque: the engine only ever renders it.
#[derive(Debug, Clone, Error)]
#[error("{message}{}", cause_suffix(.cause))]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
    pub cause: Option<Arc<anyhow::Error>>,
}

fn cause_suffix(cause: &Option<Arc<anyhow::Error>>) -> String {
    match cause {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        code: ErrorCode,
        message: impl Into<String>,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(Arc::new(cause.into())),
        }
    }

    pub fn not_supported() -> Self {
        Self::new(ErrorCode::NotSupported, "operation not supported")
    }

    pub fn not_found(what: impl Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{what} not found"))
    }

    /// Wraps a transport failure, upgrading auth and missing-object failures
    /// to their dedicated codes.
    pub fn from_transport(code: ErrorCode, message: impl Into<String>, error: AwsCliError) -> Self {
        let code = match &error {
            AwsCliError::AccessDenied { .. } => ErrorCode::Unauthorized,
            AwsCliError::NotFound { .. } => ErrorCode::NotFound,
            _ => code,
        };
        Self::with_cause(code, message, error)
    }

    pub fn is_not_supported(&self) -> bool {
        self.code == ErrorCode::NotSupported
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Per-field validation result for create/update payloads. A non-empty
/// report blocks the mutation.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ValidationReport {
    issues: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[cfg(test)]
    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, HandlerError, ValidationReport};
    use crate::aws::AwsCliError;

    #[test]
    fn display_appends_cause_when_present() {
        let plain = HandlerError::new(ErrorCode::ListFailed, "failed to list clusters");
        assert_eq!(plain.to_string(), "failed to list clusters");

        let wrapped = HandlerError::with_cause(
            ErrorCode::ListFailed,
            "failed to list clusters",
            anyhow::anyhow!("connection reset"),
        );
        assert_eq!(
            wrapped.to_string(),
            "failed to list clusters: connection reset"
        );
    }

    #[test]
    fn transport_access_denied_becomes_unauthorized() {
        let error = HandlerError::from_transport(
            ErrorCode::ListFailed,
            "failed to list buckets",
            AwsCliError::AccessDenied {
                stderr: "AccessDeniedException".to_string(),
            },
        );
        assert_eq!(error.code, ErrorCode::Unauthorized);
        assert_eq!(error.code.as_str(), "UNAUTHORIZED");
    }

    #[test]
    fn not_supported_is_detectable() {
        assert!(HandlerError::not_supported().is_not_supported());
        assert!(!HandlerError::not_found("bucket logs").is_not_supported());
    }

    #[test]
    fn validation_summary_lists_fields_in_order() {
        let mut report = ValidationReport::default();
        assert!(report.is_empty());
        report.push("pk", "key attribute cannot change");
        report.push("count", "expected a single attribute type");
        assert_eq!(
            report.summary(),
            "pk: key attribute cannot change; count: expected a single attribute type"
        );
    }
}

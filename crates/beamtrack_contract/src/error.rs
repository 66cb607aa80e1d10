use http::StatusCode;
use thiserror::Error;

/// Failure reported by a backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("backend responded with {status}")]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: StatusCode) -> Self {
        Self::Status {
            status,
            detail: None,
        }
    }

    pub fn with_detail(status: StatusCode, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::Status {
            status,
            detail: (!detail.trim().is_empty()).then_some(detail),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::with_detail(StatusCode::NOT_FOUND, detail)
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            Self::Transport(message) | Self::Decode(message) => Some(message.as_str()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self.status_code(),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(StatusCode::CONFLICT)
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use http::StatusCode;

    #[test]
    fn blank_detail_is_dropped() {
        let error = ApiError::with_detail(StatusCode::CONFLICT, "  ");
        assert_eq!(error.detail(), None);
        assert!(error.is_conflict());
    }

    #[test]
    fn transport_failures_have_no_status() {
        let error = ApiError::Transport("connection refused".to_string());
        assert_eq!(error.status_code(), None);
        assert!(!error.is_not_found());
        assert_eq!(error.detail(), Some("connection refused"));
    }

    #[test]
    fn forbidden_counts_as_unauthorized() {
        assert!(ApiError::status(StatusCode::FORBIDDEN).is_unauthorized());
        assert!(ApiError::status(StatusCode::UNAUTHORIZED).is_unauthorized());
        assert!(!ApiError::not_found("gone").is_unauthorized());
    }
}

use beamtrack_contract::ApiError;
use beamtrack_transfer::{ValidationError, SESSION_EXPIRED_MESSAGE};
use thiserror::Error;

pub const NOT_FOUND_MESSAGE: &str = "The requested resource could not be found";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something bad happened. Please try to refresh the application";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Issue id cannot be empty")]
    EmptyIssueId,
    #[error("a submission is already in progress")]
    SubmissionInFlight,
}

impl SyncError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Reauthenticate,
    Generic,
}

/// What a view shows instead of its content when a load fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorState {
    pub fn from_api(error: &ApiError) -> Self {
        let kind = if error.is_not_found() {
            ErrorKind::NotFound
        } else if error.is_unauthorized() {
            ErrorKind::Reauthenticate
        } else {
            ErrorKind::Generic
        };
        Self::of_kind(kind)
    }

    pub fn of_kind(kind: ErrorKind) -> Self {
        let message = match kind {
            ErrorKind::NotFound => NOT_FOUND_MESSAGE,
            ErrorKind::Reauthenticate => SESSION_EXPIRED_MESSAGE,
            ErrorKind::Generic => GENERIC_FAILURE_MESSAGE,
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ErrorState};
    use beamtrack_contract::ApiError;
    use http::StatusCode;

    #[test]
    fn api_errors_map_to_view_states() {
        assert_eq!(
            ErrorState::from_api(&ApiError::not_found("gone")).kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            ErrorState::from_api(&ApiError::status(StatusCode::UNAUTHORIZED)).kind,
            ErrorKind::Reauthenticate
        );
        let generic = ErrorState::from_api(&ApiError::Transport("reset".to_string()));
        assert_eq!(generic.kind, ErrorKind::Generic);
        assert!(generic.message.starts_with("Something bad happened"));
    }
}

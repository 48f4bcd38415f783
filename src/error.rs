use crate::validation::ValidationError;
use thiserror::Error;

/// Everything a backend call can end in, other than success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    /// Expected "not logged in"; callers treat it as a logged-out state.
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session expired")]
    SessionExpired,
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status})")]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("request setup failed: {0}")]
    RequestSetup(String),
    #[error("unexpected response: {0}")]
    UnexpectedShape(String),
    #[error("{0} already in progress")]
    InProgress(&'static str),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Network(_) => "NETWORK",
            Self::Server { .. } => "SERVER",
            Self::RequestSetup(_) => "REQUEST_SETUP",
            Self::UnexpectedShape(_) => "UNEXPECTED_RESPONSE",
            Self::InProgress(_) => "IN_PROGRESS",
        }
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Unauthenticated => "Please log in to continue.".to_string(),
            Self::SessionExpired => "Your session has expired. Please log in again.".to_string(),
            Self::Network(_) => {
                "Unable to reach the server. Please check your connection and try again."
                    .to_string()
            }
            Self::Server { status, message } => message
                .clone()
                .unwrap_or_else(|| generic_status_message(*status).to_string()),
            Self::RequestSetup(_) => "The request could not be prepared.".to_string(),
            Self::UnexpectedShape(msg) => format!("Unexpected response from server: {msg}"),
            Self::InProgress(op) => format!("{op} already in progress"),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::SessionExpired)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.0)
    }
}

pub(crate) fn generic_status_message(status: u16) -> &'static str {
    match status {
        400 => "The request was invalid.",
        401 => "Invalid credentials.",
        403 => "You do not have permission to do that.",
        404 => "The requested resource was not found.",
        409 => "That conflicts with existing data.",
        422 => "Some of the submitted data is invalid.",
        429 => "Too many requests. Please slow down.",
        500..=599 => "Server error. Please try again later.",
        _ => "Something went wrong.",
    }
}

//! Error types for Bondguard.
//!
//! Every failure a caller can see collapses into a single alert (a title and a
//! message). No structured error codes are exposed beyond the HTTP status.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The device refused the location permission request.
    #[error("location permission denied")]
    PermissionDenied,

    /// The one-shot position fix failed or timed out.
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    /// An `sms:` or `tel:` URI could not be opened.
    #[error("failed to open link: {0}")]
    LinkOpenFailed(String),

    #[error("invalid period: {0:?}")]
    InvalidPeriod(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("no active session")]
    NoSession,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Title and message for the alert dialog shown to the user.
    pub fn alert(&self) -> (&'static str, String) {
        match self {
            Error::PermissionDenied => (
                "Permission Denied",
                "Location permission is required to send an emergency alert.".to_string(),
            ),
            Error::LocationUnavailable(_) => (
                "Location Error",
                "Could not determine your location. Please try again.".to_string(),
            ),
            Error::LinkOpenFailed(_) => (
                "Error",
                "Could not open the messaging or phone app.".to_string(),
            ),
            Error::InvalidPeriod(tag) => (
                "Invalid Period",
                format!("Unknown period {tag:?}. Use 7d, 30d or all."),
            ),
            Error::NotFound { kind, .. } => ("Not Found", format!("The {kind} no longer exists.")),
            Error::InvalidCredentials => (
                "Login Failed",
                "Invalid email or password.".to_string(),
            ),
            Error::NoSession => ("Not Signed In", "Please log in first.".to_string()),
            Error::Database(_) | Error::Json(_) => {
                ("Error", "Something went wrong. Please try again.".to_string())
            }
        }
    }
}

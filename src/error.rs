//! Authentication Error Types
//!
//! Centralized error handling for credential, session and gate operations.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::future::Future;
use std::time::Duration;

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Password hashing failed")]
    Hashing,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Short reason shown to the user when a registration is rejected.
    ///
    /// Storage-side failures all read the same so driver detail never
    /// reaches the client.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::PasswordMismatch => "password mismatch",
            AuthError::Validation(_) => "missing fields",
            AuthError::UsernameTaken => "username taken",
            AuthError::InvalidCredentials => "invalid credentials",
            AuthError::InvalidSession => "invalid session",
            AuthError::Persistence(_)
            | AuthError::Timeout
            | AuthError::Hashing
            | AuthError::Config(_)
            | AuthError::Internal => "storage failure",
        }
    }

    /// Whether the user can fix the problem by resubmitting the form.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            AuthError::PasswordMismatch
                | AuthError::Validation(_)
                | AuthError::UsernameTaken
                | AuthError::InvalidCredentials
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::PasswordMismatch => (
                StatusCode::BAD_REQUEST,
                "password_mismatch",
                self.to_string(),
            ),
            AuthError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AuthError::UsernameTaken => (
                StatusCode::CONFLICT,
                "username_taken",
                self.to_string(),
            ),
            AuthError::InvalidSession => (
                StatusCode::UNAUTHORIZED,
                "invalid_session",
                self.to_string(),
            ),
            AuthError::Timeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                "timeout",
                "The service is temporarily unavailable".to_string(),
            ),
            AuthError::Persistence(_)
            | AuthError::Hashing
            | AuthError::Config(_)
            | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Persistence(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Hashing
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {:?}", err);
        AuthError::Internal
    }
}

/// Run a store operation under a deadline
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = limit.as_millis() as u64, "Store operation timed out");
            Err(AuthError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_reasons() {
        assert_eq!(AuthError::PasswordMismatch.reason(), "password mismatch");
        assert_eq!(AuthError::UsernameTaken.reason(), "username taken");
        assert_eq!(
            AuthError::Persistence("connection refused".into()).reason(),
            "storage failure"
        );
        assert_eq!(AuthError::Timeout.reason(), "storage failure");
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let response = AuthError::Persistence("password authentication failed for user root".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), AuthError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(AuthError::Timeout));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, AuthError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}

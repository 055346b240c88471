//! Authentication Models
//!
//! Data structures for form submissions, rendered views, and stored credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================
// Database Entities
// ============================================

/// Credential record of a registered principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================
// Request DTOs
// ============================================

/// Login form submission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Registration form submission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Username must be 1-255 characters"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    pub confirm_password: String,
}

// ============================================
// Response DTOs
// ============================================

/// Template render request handed to the page-rendering collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub template: &'static str,
    pub context: serde_json::Value,
}

impl PageView {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            context: serde_json::json!({}),
        }
    }

    /// Page with an `Error` message in its context
    pub fn with_error(template: &'static str, error: &str) -> Self {
        Self {
            template,
            context: serde_json::json!({ "Error": error }),
        }
    }

    /// Page with the signed-in `Username` in its context
    pub fn with_username(template: &'static str, username: &str) -> Self {
        Self {
            template,
            context: serde_json::json!({ "Username": username }),
        }
    }
}

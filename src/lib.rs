//! Session Gate
//!
//! Session-based credential authentication for a web application:
//! - User registration with unique usernames
//! - Argon2id password hashing
//! - Server-side sessions keyed by an opaque cookie token
//! - An access gate that keeps anonymous callers on the public pages
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables, see
//! [`AuthConfig::from_env`]. Notable ones:
//! - `SESSION_TTL` - Idle session lifetime in seconds (default: 86400)
//! - `AUTH_PUBLIC_PATHS` - Paths reachable without a session (default: "/login,/register")
//! - `ARGON2_MEMORY_COST` / `ARGON2_TIME_COST` / `ARGON2_PARALLELISM` - Hashing cost
//! - `STORE_TIMEOUT_MS` - Deadline for each store operation (default: 5000)
//!
//! # Usage
//!
//! ```rust,ignore
//! use session_gate::{AuthPlugin, Plugin};
//!
//! let plugin = AuthPlugin::new();
//! plugin.activate(db_pool).await?;
//!
//! let app = plugin.router().await.unwrap();
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;
pub mod session;
pub mod users;

// Re-export commonly used types
pub use config::AuthConfig;
pub use error::AuthError;
pub use extractors::{CurrentSession, SessionCookie};
pub use handlers::AuthState;
pub use middleware::{AccessGate, GateDecision};
pub use models::*;
pub use password::PasswordHasher;
pub use service::AuthService;
pub use session::{Session, SessionStore, SessionToken, USERNAME_KEY};
pub use users::{MemoryUserStore, PgUserStore, UserStore};

use async_trait::async_trait;
use axum::Router;
use session::SweeperHandle;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================
// Plugin Types
// ============================================

/// Plugin state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Inactive,
    Active,
    Error,
}

/// Plugin metadata
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Plugin lifecycle trait
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin information
    fn info(&self) -> &PluginInfo;

    /// Get current plugin state
    async fn state(&self) -> PluginState;

    /// Activate the plugin
    async fn activate(&self, db: PgPool) -> Result<(), AuthError>;

    /// Deactivate the plugin
    async fn deactivate(&self) -> Result<(), AuthError>;

    /// Get plugin routes, available while active
    async fn router(&self) -> Option<Router>;
}

// ============================================
// Auth Plugin Implementation
// ============================================

/// Authentication plugin
///
/// Owns the wiring of credential store, hasher, session store and gate.
pub struct AuthPlugin {
    info: PluginInfo,
    state: RwLock<PluginState>,
    config: RwLock<Option<AuthConfig>>,
    auth_service: RwLock<Option<Arc<AuthService>>>,
    sweeper: RwLock<Option<SweeperHandle>>,
}

impl AuthPlugin {
    /// Create a new auth plugin instance
    pub fn new() -> Self {
        Self {
            info: PluginInfo {
                id: "session-gate".into(),
                name: "Session Gate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                description: "Session-based credential authentication".into(),
            },
            state: RwLock::new(PluginState::Inactive),
            config: RwLock::new(None),
            auth_service: RwLock::new(None),
            sweeper: RwLock::new(None),
        }
    }

    /// Get the authentication configuration
    pub async fn config(&self) -> Option<AuthConfig> {
        self.config.read().await.clone()
    }

    /// Get the authentication service
    pub async fn auth_service(&self) -> Option<Arc<AuthService>> {
        self.auth_service.read().await.clone()
    }

    /// Activate over any credential store with an explicit configuration
    pub async fn activate_with(
        &self,
        users: Arc<dyn UserStore>,
        config: AuthConfig,
    ) -> Result<(), AuthError> {
        let result = self.build(users, config).await;
        if result.is_err() {
            *self.state.write().await = PluginState::Error;
        }
        result
    }

    async fn build(&self, users: Arc<dyn UserStore>, config: AuthConfig) -> Result<(), AuthError> {
        config.validate()?;
        users.migrate().await?;

        let hasher = PasswordHasher::from_config(&config)?;
        let sessions = SessionStore::memory(&config);
        let sweeper = config
            .sweep_interval()
            .map(|interval| sessions.spawn_sweeper(interval));

        let auth_service = Arc::new(AuthService::new(users, sessions, hasher, config.clone()));

        *self.config.write().await = Some(config);
        *self.auth_service.write().await = Some(auth_service);
        *self.sweeper.write().await = sweeper;
        *self.state.write().await = PluginState::Active;

        Ok(())
    }
}

impl Default for AuthPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AuthPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn state(&self) -> PluginState {
        *self.state.read().await
    }

    async fn activate(&self, db: PgPool) -> Result<(), AuthError> {
        tracing::info!("Activating Session Gate plugin");

        self.activate_with(Arc::new(PgUserStore::new(db)), AuthConfig::from_env())
            .await?;

        tracing::info!("Session Gate plugin activated successfully");
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), AuthError> {
        tracing::info!("Deactivating Session Gate plugin");

        *self.sweeper.write().await = None;
        *self.auth_service.write().await = None;
        *self.config.write().await = None;
        *self.state.write().await = PluginState::Inactive;

        tracing::info!("Session Gate plugin deactivated");
        Ok(())
    }

    async fn router(&self) -> Option<Router> {
        self.auth_service().await.map(create_routes)
    }
}

/// Create authentication routes
pub fn create_routes(auth_service: Arc<AuthService>) -> Router {
    handlers::create_routes(auth_service)
}

// ============================================
// Module Tests
// ============================================

//! Authentication Service
//!
//! Registration, login and logout flows over the credential store, the
//! password hasher and the session store. Every collaborator is injected
//! at construction.

use crate::config::AuthConfig;
use crate::error::{bounded, AuthError};
use crate::models::*;
use crate::password::PasswordHasher;
use crate::session::{Session, SessionStore, SessionToken, USERNAME_KEY};
use crate::users::UserStore;

use std::sync::Arc;
use validator::Validate;

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionStore,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionStore,
        hasher: PasswordHasher,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            config,
        }
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Get reference to the session store
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ============================================
    // Password Hashing
    // ============================================

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// Verify against the stored hash, or burn equivalent work when there is none
    async fn verify_password(&self, password: &str, stored_hash: Option<String>) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        let outcome = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                hasher.burn(&password);
                false
            }
        })
        .await;

        outcome.unwrap_or_else(|e| {
            tracing::error!("Password verification task failed: {:?}", e);
            false
        })
    }

    // ============================================
    // User Registration
    // ============================================

    /// Register a new user
    ///
    /// Rejections: `PasswordMismatch`, `Validation` for empty fields,
    /// `UsernameTaken`, and `Persistence`/`Timeout` when the store fails.
    pub async fn register(&self, req: RegisterRequest) -> Result<Credential, AuthError> {
        if req.password != req.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        req.validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        // Fast path only; the store's create is the real uniqueness check.
        let existing = bounded(
            self.config.store_timeout(),
            self.users.find_by_username(&req.username),
        )
        .await?;
        if existing.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = self.hash_password(&req.password).await?;

        let credential = bounded(
            self.config.store_timeout(),
            self.users.create(&req.username, &password_hash),
        )
        .await?;

        tracing::info!(username = %credential.username, user_id = %credential.id, "User registered");
        Ok(credential)
    }

    // ============================================
    // Login / Logout
    // ============================================

    /// Attempt to login a user
    ///
    /// Any session the client already presented is destroyed and a fresh
    /// one is issued carrying the `username` attribute. Unknown usernames,
    /// wrong passwords and failed lookups all yield `InvalidCredentials`.
    pub async fn login(
        &self,
        req: LoginRequest,
        presented_token: Option<&str>,
    ) -> Result<Session, AuthError> {
        let credential = if req.validate().is_ok() {
            match bounded(
                self.config.store_timeout(),
                self.users.find_by_username(&req.username),
            )
            .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!(error = %e, "Credential lookup failed during login");
                    None
                }
            }
        } else {
            None
        };

        let stored_hash = credential.as_ref().map(|c| c.password_hash.clone());
        let verified = self.verify_password(&req.password, stored_hash).await;

        let credential = match credential {
            Some(credential) if verified => credential,
            _ => {
                tracing::warn!(username = %req.username, "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if let Some(previous) = presented_token.and_then(SessionToken::parse) {
            self.sessions.destroy(&previous).await?;
        }

        let mut session = self.sessions.create().await?;
        session.set(USERNAME_KEY, credential.username.as_str());
        self.sessions.save(&mut session).await.map_err(|e| match e {
            AuthError::InvalidSession => {
                AuthError::Persistence("session vanished before commit".to_string())
            }
            other => other,
        })?;

        tracing::info!(username = %credential.username, "User logged in");
        Ok(session)
    }

    /// Logout by destroying the presented session
    ///
    /// Succeeds whether or not a live session was presented.
    pub async fn logout(&self, presented_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = presented_token.and_then(SessionToken::parse) else {
            return Ok(());
        };

        self.sessions.destroy(&token).await?;
        tracing::info!("User logged out");
        Ok(())
    }

    // ============================================
    // Session Helpers
    // ============================================

    /// Resolve a presented token, treating every failure as anonymous
    pub async fn resolve(&self, presented_token: Option<&str>) -> Option<Session> {
        let raw = presented_token?;
        match self.sessions.get(raw).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed; treating request as anonymous");
                None
            }
        }
    }

    /// Username bound to the presented session, if any
    pub async fn current_user(&self, presented_token: Option<&str>) -> Option<String> {
        self.resolve(presented_token)
            .await
            .and_then(|s| s.username().map(String::from))
    }
}

#[cfg(test)]
pub(crate) fn test_service(users: Arc<dyn UserStore>) -> AuthService {
    let config = AuthConfig::default();
    AuthService::new(
        users,
        SessionStore::memory(&config),
        crate::password::test_hasher(),
        config,
    )
}

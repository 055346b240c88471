//! Credential Storage
//!
//! The `UserStore` capability and its Postgres and in-memory implementations.
//! A miss is `Ok(None)`; an unreachable store is `Err(AuthError::Persistence)`.

use crate::error::AuthError;
use crate::models::Credential;

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable username -> credential lookup and insert
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Ensure the credential table exists
    async fn migrate(&self) -> Result<(), AuthError>;

    /// Exact, case-sensitive lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AuthError>;

    /// Insert a credential, failing with `UsernameTaken` if the name exists
    ///
    /// Check and insert are one atomic step with respect to other `create` calls.
    async fn create(&self, username: &str, password_hash: &str) -> Result<Credential, AuthError>;
}

// ============================================
// Postgres
// ============================================

/// Postgres-backed credential store
///
/// Uniqueness is the `UNIQUE` constraint on `users.username`; a violation
/// from a racing insert surfaces as `UsernameTaken`.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get reference to the database pool
    pub fn db(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn migrate(&self) -> Result<(), AuthError> {
        tracing::info!("Running credential store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        tracing::info!("Credential store migrations completed successfully");
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AuthError> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(credential)
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<Credential, AuthError> {
        let candidate = Credential::new(username, password_hash);

        let result = sqlx::query_as::<_, Credential>(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(candidate.id)
        .bind(&candidate.username)
        .bind(&candidate.password_hash)
        .bind(candidate.created_at)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(credential) => Ok(credential),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AuthError::UsernameTaken)
            }
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================
// In-memory
// ============================================

/// Process-local credential store
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, Credential>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn migrate(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<Credential, AuthError> {
        use std::collections::hash_map::Entry;

        let mut users = self.users.write().await;
        match users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AuthError::UsernameTaken),
            Entry::Vacant(slot) => {
                let credential = Credential::new(username, password_hash);
                slot.insert(credential.clone());
                Ok(credential)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_find_missing() {
        let store = MemoryUserStore::new();
        assert_eq!(store.find_by_username("alice").await, Ok(None));
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let store = MemoryUserStore::new();
        let created = store.create("alice", "h1").await.unwrap();
        let found = store.find_by_username("alice").await.unwrap().unwrap();

        assert_eq!(created, found);
        assert_eq!(found.password_hash, "h1");
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create("alice", "h1").await.unwrap();

        assert_eq!(store.find_by_username("Alice").await, Ok(None));
        assert!(store.create("Alice", "h2").await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = MemoryUserStore::new();
        store.create("alice", "h1").await.unwrap();

        assert_eq!(store.create("alice", "h2").await, Err(AuthError::UsernameTaken));
        let kept = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(kept.password_hash, "h1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_one_wins() {
        let store = Arc::new(MemoryUserStore::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create("alice", &format!("h{}", i)).await })
            })
            .collect();

        let mut created = 0;
        let mut taken = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(AuthError::UsernameTaken) => taken += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(taken, 15);
        assert_eq!(store.len().await, 1);
    }
}

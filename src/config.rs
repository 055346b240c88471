//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables.
//! Every value has a default, so an empty environment yields a usable config.

use crate::error::AuthError;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

/// Longest accepted session lifetime: one year
pub const MAX_SESSION_TTL: i64 = 365 * 24 * 3600;

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Idle session lifetime in seconds (from SESSION_TTL env var)
    pub session_ttl: i64,

    /// Name of the cookie carrying the session token (from SESSION_COOKIE_NAME env var)
    pub session_cookie_name: String,

    /// Mark the session cookie `Secure` (from SESSION_COOKIE_SECURE env var)
    pub session_cookie_secure: bool,

    /// Seconds between expired-session sweeps, 0 disables (from SESSION_SWEEP_INTERVAL env var)
    pub session_sweep_interval: u64,

    /// Deadline for a single store operation in milliseconds (from STORE_TIMEOUT_MS env var)
    pub store_timeout_ms: u64,

    /// Route paths reachable without a session (from AUTH_PUBLIC_PATHS env var)
    pub public_paths: HashSet<String>,

    /// Where unauthenticated callers are sent (from AUTH_LOGIN_PATH env var)
    pub login_path: String,

    /// Where callers land after logging in (from AUTH_HOME_PATH env var)
    pub home_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost: 65536, // 64 MiB
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            session_ttl: 86400, // 24 hours
            session_cookie_name: "session_id".to_string(),
            session_cookie_secure: false,
            session_sweep_interval: 600,
            store_timeout_ms: 5000,
            public_paths: parse_paths("/login,/register"),
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            argon2_memory_cost: parsed("ARGON2_MEMORY_COST").unwrap_or(defaults.argon2_memory_cost),

            argon2_time_cost: parsed("ARGON2_TIME_COST").unwrap_or(defaults.argon2_time_cost),

            argon2_parallelism: parsed("ARGON2_PARALLELISM").unwrap_or(defaults.argon2_parallelism),

            session_ttl: parsed("SESSION_TTL").unwrap_or(defaults.session_ttl),

            session_cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or(defaults.session_cookie_name),

            session_cookie_secure: env::var("SESSION_COOKIE_SECURE")
                .ok()
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.session_cookie_secure),

            session_sweep_interval: parsed("SESSION_SWEEP_INTERVAL")
                .unwrap_or(defaults.session_sweep_interval),

            store_timeout_ms: parsed("STORE_TIMEOUT_MS").unwrap_or(defaults.store_timeout_ms),

            public_paths: env::var("AUTH_PUBLIC_PATHS")
                .map(|v| parse_paths(&v))
                .unwrap_or(defaults.public_paths),

            login_path: env::var("AUTH_LOGIN_PATH").unwrap_or(defaults.login_path),

            home_path: env::var("AUTH_HOME_PATH").unwrap_or(defaults.home_path),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.session_ttl <= 0 {
            return Err(AuthError::Config("SESSION_TTL must be positive".to_string()));
        }

        if self.session_ttl > MAX_SESSION_TTL {
            return Err(AuthError::Config(format!(
                "SESSION_TTL must not exceed {} seconds",
                MAX_SESSION_TTL
            )));
        }

        if self.store_timeout_ms == 0 {
            return Err(AuthError::Config(
                "STORE_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        if self.session_cookie_name.is_empty()
            || !self
                .session_cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AuthError::Config(
                "SESSION_COOKIE_NAME must be a non-empty token".to_string(),
            ));
        }

        argon2::Params::new(
            self.argon2_memory_cost,
            self.argon2_time_cost,
            self.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Config(format!("invalid Argon2 parameters: {}", e)))?;

        if let Some(path) = self.public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(AuthError::Config(format!(
                "AUTH_PUBLIC_PATHS entry '{}' is not a route path",
                path
            )));
        }

        // Otherwise the gate would redirect the login page to itself.
        if !self.public_paths.contains(&self.login_path) {
            return Err(AuthError::Config(
                "AUTH_LOGIN_PATH must be listed in AUTH_PUBLIC_PATHS".to_string(),
            ));
        }

        Ok(())
    }

    /// Store operation deadline
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Interval of the expiry sweeper, if enabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.session_sweep_interval > 0).then(|| Duration::from_secs(self.session_sweep_interval))
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_paths(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

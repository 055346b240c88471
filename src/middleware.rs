//! Access Gate
//!
//! Runs before every handler. A request passes if its session carries a
//! `username`, or if its path is one of the configured public paths;
//! anything else is redirected to the login page.

use crate::config::AuthConfig;
use crate::extractors::{clear_session_cookie, read_cookie, CurrentSession};
use crate::handlers::AuthState;
use crate::session::Session;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::collections::HashSet;

/// Outcome of the gate for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToLogin(String),
}

/// Route-level access predicate
#[derive(Debug, Clone)]
pub struct AccessGate {
    public_paths: HashSet<String>,
    login_path: String,
}

impl AccessGate {
    pub fn new(public_paths: impl IntoIterator<Item = String>, login_path: impl Into<String>) -> Self {
        Self {
            public_paths: public_paths.into_iter().collect(),
            login_path: login_path.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.public_paths.iter().cloned(), config.login_path.clone())
    }

    /// Exact match against the public allowlist
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }

    /// Decide whether a request may proceed; never fails
    pub fn check(&self, path: &str, session: Option<&Session>) -> GateDecision {
        if session.is_some_and(Session::is_authenticated) || self.is_public(path) {
            GateDecision::Allow
        } else {
            GateDecision::RedirectToLogin(self.login_path.clone())
        }
    }
}

/// Gate middleware
///
/// Resolves the session cookie once and stores the result in request
/// extensions for handlers. A redirect caused by a dead cookie also tells
/// the client to drop it.
pub async fn access_gate(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let raw_token = read_cookie(req.headers(), &state.auth.config().session_cookie_name);
    let session = state.auth.resolve(raw_token.as_deref()).await;

    match state.gate.check(req.uri().path(), session.as_ref()) {
        GateDecision::Allow => {
            req.extensions_mut().insert(CurrentSession(session));
            next.run(req).await
        }
        GateDecision::RedirectToLogin(login) => {
            tracing::debug!(path = %req.uri().path(), "Unauthenticated request redirected");
            if raw_token.is_some() && session.is_none() {
                (
                    [(header::SET_COOKIE, clear_session_cookie(state.auth.config()))],
                    Redirect::to(&login),
                )
                    .into_response()
            } else {
                Redirect::to(&login).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStore, USERNAME_KEY};

    fn gate() -> AccessGate {
        AccessGate::from_config(&AuthConfig::default())
    }

    #[test]
    fn test_public_pages_reachable_anonymously() {
        let gate = gate();
        assert_eq!(gate.check("/login", None), GateDecision::Allow);
        assert_eq!(gate.check("/register", None), GateDecision::Allow);
    }

    #[test]
    fn test_protected_paths_redirect() {
        let gate = gate();
        for path in ["/", "/logout", "/admin", "/login/", "/LOGIN", "/loginx", "pages/auth/login"] {
            assert_eq!(
                gate.check(path, None),
                GateDecision::RedirectToLogin("/login".into()),
                "path {} should be gated",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_authenticated_session_allowed() {
        let store = SessionStore::memory(&AuthConfig::default());
        let gate = gate();

        let anonymous = store.create().await.unwrap();
        assert_eq!(
            gate.check("/", Some(&anonymous)),
            GateDecision::RedirectToLogin("/login".into())
        );

        let mut session = store.create().await.unwrap();
        session.set(USERNAME_KEY, "bob");
        assert_eq!(
            gate.check("/", Some(&session)),
            GateDecision::RedirectToLogin("/login".into()),
            "unsaved username must not pass the gate"
        );

        store.save(&mut session).await.unwrap();
        assert_eq!(gate.check("/", Some(&session)), GateDecision::Allow);
        assert_eq!(gate.check("/login", Some(&session)), GateDecision::Allow);
    }

    #[test]
    fn test_custom_login_path() {
        let gate = AccessGate::new(vec!["/signin".to_string()], "/signin");
        assert_eq!(gate.check("/signin", None), GateDecision::Allow);
        assert_eq!(
            gate.check("/login", None),
            GateDecision::RedirectToLogin("/signin".into())
        );
    }
}

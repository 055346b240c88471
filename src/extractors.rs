//! Session Transport
//!
//! Axum extractor for the session cookie plus the `Set-Cookie` values that
//! issue and clear it.

use crate::config::AuthConfig;
use crate::handlers::AuthState;
use crate::session::{Session, SessionToken};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};

/// Raw session token presented by the client, if any
#[derive(Debug, Clone, Default)]
pub struct SessionCookie(pub Option<String>);

impl SessionCookie {
    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl FromRequestParts<AuthState> for SessionCookie {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionCookie(read_cookie(
            &parts.headers,
            &state.config().session_cookie_name,
        )))
    }
}

/// Session already resolved by the access gate for this request
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<Session>);

impl CurrentSession {
    pub fn username(&self) -> Option<&str> {
        self.0.as_ref().and_then(Session::username)
    }
}

/// Find a cookie by exact name across all `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value handing a session token to the client
pub fn session_cookie(config: &AuthConfig, token: &SessionToken) -> HeaderValue {
    build_cookie(config, token.as_str(), config.session_ttl)
}

/// `Set-Cookie` value telling the client to drop its session token
pub fn clear_session_cookie(config: &AuthConfig) -> HeaderValue {
    build_cookie(config, "", 0)
}

fn build_cookie(config: &AuthConfig, value: &str, max_age: i64) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.session_cookie_name, value, max_age
    );
    if config.session_cookie_secure {
        cookie.push_str("; Secure");
    }

    // Name is validated as a token and the value is hex, so this is always visible ASCII.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

//! Authentication HTTP Handlers
//!
//! Login, registration, index and logout pages. Page rendering belongs to
//! the templating collaborator, so pages are returned as `PageView` JSON.

use crate::error::AuthError;
use crate::extractors::{clear_session_cookie, session_cookie, CurrentSession, SessionCookie};
use crate::middleware::{self, AccessGate};
use crate::models::*;
use crate::service::AuthService;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Form, Json, Router,
};
use std::sync::Arc;

/// Shared state for handlers and the access gate
#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
    pub gate: Arc<AccessGate>,
}

impl AuthState {
    pub fn new(auth: Arc<AuthService>) -> Self {
        let gate = Arc::new(AccessGate::from_config(auth.config()));
        Self { auth, gate }
    }

    pub fn config(&self) -> &crate::config::AuthConfig {
        self.auth.config()
    }
}

// ============================================
// Route Builder
// ============================================

/// Create authentication routes, all behind the access gate
pub fn create_routes(auth_service: Arc<AuthService>) -> Router {
    let state = AuthState::new(auth_service);

    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/", get(index))
        .route("/logout", get(logout))
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::access_gate,
        ))
        .with_state(state)
}

// ============================================
// Registration
// ============================================

/// GET /register
pub async fn register_page() -> Json<PageView> {
    Json(PageView::new("register"))
}

/// POST /register
///
/// Success redirects to the login page; rejections re-render the form
/// with the reason.
pub async fn register(
    State(state): State<AuthState>,
    Form(req): Form<RegisterRequest>,
) -> Response {
    match state.auth.register(req).await {
        Ok(_) => Redirect::to(&state.config().login_path).into_response(),
        Err(e) => {
            let status = if e.is_user_correctable() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(PageView::with_error("register", e.reason()))).into_response()
        }
    }
}

// ============================================
// Login / Logout
// ============================================

/// GET /login
pub async fn login_page() -> Json<PageView> {
    Json(PageView::new("login"))
}

/// POST /login
///
/// Every credential failure looks the same: a redirect back to the login page.
pub async fn login(
    State(state): State<AuthState>,
    cookie: SessionCookie,
    Form(req): Form<LoginRequest>,
) -> Response {
    let config = state.config();

    match state.auth.login(req, cookie.token()).await {
        Ok(session) => (
            [(header::SET_COOKIE, session_cookie(config, session.token()))],
            Redirect::to(&config.home_path),
        )
            .into_response(),
        Err(AuthError::InvalidCredentials) => Redirect::to(&config.login_path).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /logout
pub async fn logout(State(state): State<AuthState>, cookie: SessionCookie) -> Response {
    let config = state.config();

    match state.auth.logout(cookie.token()).await {
        Ok(()) => (
            [(header::SET_COOKIE, clear_session_cookie(config))],
            Redirect::to(&config.login_path),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================
// Pages
// ============================================

/// GET /
pub async fn index(Extension(current): Extension<CurrentSession>) -> Json<PageView> {
    Json(PageView::with_username(
        "index",
        current.username().unwrap_or_default(),
    ))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(PageView::new("not_found")))
}

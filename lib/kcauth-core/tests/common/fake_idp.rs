#![allow(dead_code, clippy::expect_used)]
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

pub const CLIENT_INTERNAL_ID: &str = "c0ffee-0001";
pub const SERVICE_ACCOUNT_USER_ID: &str = "sa-user-0001";
pub const ROLE_ID: &str = "role-admin-0001";
pub const INVALID_TOKEN_CHALLENGE: &str = r#"Bearer error="invalid_token""#;

/// How the token endpoint answers.
#[derive(Debug, Clone)]
pub struct TokenBehavior {
    pub expires_in: Option<i64>,
    pub fail_status: Option<u16>,
    pub delay: Duration,
    /// Only this client id is delayed, every client when `None`.
    pub delayed_client: Option<String>,
    /// Answer 200 without `access_token`.
    pub omit_access_token: bool,
}

impl Default for TokenBehavior {
    fn default() -> Self {
        Self {
            expires_in: Some(60),
            fail_status: None,
            delay: Duration::ZERO,
            delayed_client: None,
            omit_access_token: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct IdpState {
    pub token_hits: AtomicUsize,
    pub resource_hits: AtomicUsize,
    pub realm_checks: AtomicUsize,
    issued: AtomicUsize,
    /// Number of realm checks answered 503 before the realm is ready.
    pub unready_checks: AtomicUsize,
    pub token_behavior: Mutex<TokenBehavior>,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    /// Tokens the protected resource answers 401 to.
    pub revoked: Mutex<HashSet<String>>,
    pub reject_all: Mutex<bool>,
    pub seen_tokens: Mutex<Vec<String>>,
    /// Provisioning step (1..=5) answering with an error.
    pub failing_step: Mutex<Option<usize>>,
    pub steps: Mutex<Vec<&'static str>>,
    pub created_client: Mutex<Option<Value>>,
    pub role_mapping: Mutex<Option<Value>>,
}

impl IdpState {
    pub fn set_token_behavior(&self, behavior: TokenBehavior) {
        *self.token_behavior.lock().expect("lock") = behavior;
    }

    pub fn update_token_behavior(&self, update: impl FnOnce(&mut TokenBehavior)) {
        update(&mut self.token_behavior.lock().expect("lock"));
    }

    pub fn token_hits(&self) -> usize {
        self.token_hits.load(Ordering::SeqCst)
    }

    pub fn resource_hits(&self) -> usize {
        self.resource_hits.load(Ordering::SeqCst)
    }

    pub fn revoke(&self, token: &str) {
        self.revoked
            .lock()
            .expect("lock")
            .insert(token.to_string());
    }

    pub fn reject_all(&self) {
        *self.reject_all.lock().expect("lock") = true;
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().expect("lock").clone()
    }

    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.token_forms.lock().expect("lock").clone()
    }

    pub fn fail_at_step(&self, step: usize) {
        *self.failing_step.lock().expect("lock") = Some(step);
    }

    pub fn steps(&self) -> Vec<&'static str> {
        self.steps.lock().expect("lock").clone()
    }

    /// Records a provisioning step, returns the error to answer with if it must fail.
    fn enter_step(&self, number: usize, name: &'static str) -> Option<StatusCode> {
        self.steps.lock().expect("lock").push(name);
        let failing = *self.failing_step.lock().expect("lock");
        (failing == Some(number)).then(|| failure_status(number))
    }
}

/// Status answered by a failing provisioning step.
pub fn failure_status(step: usize) -> StatusCode {
    match step {
        1 => StatusCode::UNAUTHORIZED,
        2 => StatusCode::CONFLICT,
        3 | 4 => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// In-process identity provider: token endpoint, a protected resource and the
/// admin endpoints used by the realm bootstrap.
#[derive(Debug)]
pub struct FakeIdp {
    pub base_url: Url,
    pub state: Arc<IdpState>,
    handle: JoinHandle<()>,
}

impl FakeIdp {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(IdpState::default());

        let app = router(Arc::clone(&state));
        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(?error, "fake identity provider stopped");
            }
        });

        let base_url = Url::parse(&format!("http://{addr}/"))?;
        info!(%base_url, "fake identity provider started");
        Ok(Self {
            base_url,
            state,
            handle,
        })
    }

    pub fn token_endpoint(&self, realm: &str) -> String {
        format!(
            "{}realms/{realm}/protocol/openid-connect/token",
            self.base_url
        )
    }

    pub fn url(&self, path: &str) -> Url {
        self.base_url
            .join(path.trim_start_matches('/'))
            .expect("valid url")
    }
}

impl Drop for FakeIdp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: Arc<IdpState>) -> Router {
    Router::new()
        .route("/realms/{realm}", get(realm))
        .route("/realms/{realm}/protocol/openid-connect/token", post(token))
        .route("/api/resource", get(resource).post(resource))
        .route("/admin/realms/{realm}/clients", post(create_client))
        .route(
            "/admin/realms/{realm}/clients/{id}/service-account-user",
            get(service_account_user),
        )
        .route("/admin/realms/{realm}/roles/{role}", get(role))
        .route(
            "/admin/realms/{realm}/users/{id}/role-mappings/realm",
            post(assign_role),
        )
        .with_state(state)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn realm(State(state): State<Arc<IdpState>>, Path(realm): Path<String>) -> Response {
    state.realm_checks.fetch_add(1, Ordering::SeqCst);
    let unready = state.unready_checks.load(Ordering::SeqCst);
    if unready > 0 {
        state.unready_checks.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "realm": realm })).into_response()
}

async fn token(
    State(state): State<Arc<IdpState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    let is_password = form.get("grant_type").map(String::as_str) == Some("password");
    let client_id = form.get("client_id").cloned().unwrap_or_default();
    state.token_forms.lock().expect("lock").push(form);

    if is_password && let Some(status) = state.enter_step(1, "admin-token") {
        return (status, Json(json!({ "error": "invalid_grant" }))).into_response();
    }

    let behavior = state.token_behavior.lock().expect("lock").clone();
    let delayed = behavior
        .delayed_client
        .as_ref()
        .is_none_or(|delayed| *delayed == client_id);
    if delayed && !behavior.delay.is_zero() {
        tokio::time::sleep(behavior.delay).await;
    }
    if let Some(status) = behavior.fail_status {
        let status = StatusCode::from_u16(status).expect("valid status");
        return (status, Json(json!({ "error": "invalid_client" }))).into_response();
    }
    if behavior.omit_access_token {
        return Json(json!({ "token_type": "Bearer" })).into_response();
    }

    let count = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let mut body = json!({
        "access_token": format!("T{count}"),
        "token_type": "Bearer",
    });
    if let Some(expires_in) = behavior.expires_in {
        body["expires_in"] = json!(expires_in);
    }
    Json(body).into_response()
}

async fn resource(State(state): State<Arc<IdpState>>, headers: HeaderMap) -> Response {
    state.resource_hits.fetch_add(1, Ordering::SeqCst);
    let Some(token) = bearer(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    state.seen_tokens.lock().expect("lock").push(token.clone());

    let rejected = *state.reject_all.lock().expect("lock")
        || state.revoked.lock().expect("lock").contains(&token);
    if rejected {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, INVALID_TOKEN_CHALLENGE)],
        )
            .into_response();
    }
    Json(json!({ "token": token })).into_response()
}

async fn create_client(
    State(state): State<Arc<IdpState>>,
    Path(realm): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = state.enter_step(2, "create-client") {
        return (status, "Client admin-api already exists").into_response();
    }
    *state.created_client.lock().expect("lock") = Some(body);

    let location = format!("/admin/realms/{realm}/clients/{CLIENT_INTERNAL_ID}");
    (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
}

async fn service_account_user(
    State(state): State<Arc<IdpState>>,
    Path((_realm, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = state.enter_step(3, "resolve-service-account") {
        return (status, "Client not found").into_response();
    }
    if id != CLIENT_INTERNAL_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "id": SERVICE_ACCOUNT_USER_ID,
        "username": "service-account-admin-api",
    }))
    .into_response()
}

async fn role(
    State(state): State<Arc<IdpState>>,
    Path((_realm, role)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = state.enter_step(4, "resolve-role") {
        return (status, "Could not find role").into_response();
    }
    Json(json!({ "id": ROLE_ID, "name": role, "composite": true })).into_response()
}

async fn assign_role(
    State(state): State<Arc<IdpState>>,
    Path((_realm, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = state.enter_step(5, "assign-role") {
        return (status, "unknown_error").into_response();
    }
    if id != SERVICE_ACCOUNT_USER_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    *state.role_mapping.lock().expect("lock") = Some(body);
    StatusCode::NO_CONTENT.into_response()
}

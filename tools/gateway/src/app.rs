//! Gateway state and routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::ipfs::{code_memoizer, IpfsClient};
use crate::request::{ScriptRequest, ScriptResponse, VAULT_KEY_HEADER, VAULT_TOKEN_HEADER};
use crate::runtime::{HttpRuntime, ScriptRuntime};
use sidegate_common::{Cid, Error, Result};
use sidegate_storage::{AdapterRegistry, Memoizer};
use sidegate_vault::{RevealedSecret, SavedSecret, SecretVault};

/// Shared handler state.
pub struct AppState {
    code: Memoizer<Cid, String>,
    vault: Arc<SecretVault>,
    runtime: Arc<dyn ScriptRuntime>,
}

impl AppState {
    pub fn new(
        code: Memoizer<Cid, String>,
        vault: Arc<SecretVault>,
        runtime: Arc<dyn ScriptRuntime>,
    ) -> Self {
        Self {
            code,
            vault,
            runtime,
        }
    }

    /// Wire up production collaborators.
    ///
    /// The vault always lives in the remote tier; without a remote store
    /// the gateway still starts and vault routes answer 503.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let registry = AdapterRegistry::new(&config.storage_root, config.remote_config()?)?;
        let adapters = registry.resolve_chain(&config.code_adapter_kinds()?)?;

        let ipfs = IpfsClient::new(config.ipfs_gateway.clone(), config.upstream_timeout())?;
        let code = code_memoizer(ipfs, adapters, config.memoize_options())?;

        let vault = Arc::new(SecretVault::new(registry.remote()));
        let runtime = Arc::new(HttpRuntime::new(
            config.runtime_url.clone(),
            config.contract_id.clone(),
            config.upstream_timeout(),
        )?);

        Ok(Self::new(code, vault, runtime))
    }
}

/// Build the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run_js_from_ipfs/{cid}", any(run_script))
        .route("/run_js_from_ipfs/{cid}/{id}", any(run_script))
        .route("/vaults", post(save_secret))
        .route("/vaults/{key}", get(fetch_secret))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn run_script(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let cid = Cid::new(params.get("cid").cloned().unwrap_or_default())?;
    let id = params.get("id").cloned().unwrap_or_default();
    debug!(%request_id, cid = %cid, method = %method, "script request");

    let started = Instant::now();
    let code = state.code.call(cid.clone()).await?;
    info!(%request_id, cid = %cid, elapsed_ms = started.elapsed().as_millis() as u64, "fetching took");

    let mut request = ScriptRequest::new(&method, &uri, &headers, &body, id);
    if let Some(secret) = vault_secret(&state, &headers).await? {
        request = request.with_secret(secret.data);
    }

    let started = Instant::now();
    let output = state.runtime.execute(&code, &request.to_json()?).await?;
    info!(%request_id, cid = %cid, elapsed_ms = started.elapsed().as_millis() as u64, "processing took");

    Ok(ScriptResponse::parse(&output)?.into_response()?)
}

/// Resolve the secret named by the vault headers, if both are present.
async fn vault_secret(state: &AppState, headers: &HeaderMap) -> Result<Option<RevealedSecret>> {
    let key = headers.get(VAULT_KEY_HEADER).and_then(|v| v.to_str().ok());
    let token = headers.get(VAULT_TOKEN_HEADER).and_then(|v| v.to_str().ok());

    match (key, token) {
        (Some(key), Some(token)) => Ok(Some(state.vault.fetch(key, token).await?)),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    cid: String,
    data: Value,
    #[serde(default)]
    inherit: Option<String>,
}

async fn save_secret(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> std::result::Result<Json<SavedSecret>, ApiError> {
    let request: SaveRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidInput(format!("invalid vault request: {}", e)))?;
    let cid = Cid::new(request.cid)?;

    // A dangling inherit is the caller's mistake, not a missing resource
    let saved = state
        .vault
        .save(&cid, request.data, request.inherit.as_deref())
        .await
        .map_err(|err| match err {
            Error::NotFound(msg) => Error::InvalidInput(msg),
            other => other,
        })?;

    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: Option<String>,
}

async fn fetch_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<TokenQuery>,
) -> std::result::Result<Json<RevealedSecret>, ApiError> {
    let token = query.token.unwrap_or_default();
    Ok(Json(state.vault.fetch(&key, &token).await?))
}

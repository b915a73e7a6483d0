//! Request and response envelopes exchanged with scripts.

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use sidegate_common::{Error, Result};

/// Header carrying the vault key of the script's secret.
pub const VAULT_KEY_HEADER: &str = "x-vault-key";
/// Header carrying the vault token of the script's secret.
pub const VAULT_TOKEN_HEADER: &str = "x-vault-token";

/// What a script receives as its single argument.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    pub method: String,
    pub path: String,
    pub queries: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<Value>,
}

impl ScriptRequest {
    pub fn new(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8], id: String) -> Self {
        let body = carries_body(method).then(|| String::from_utf8_lossy(body).into_owned());

        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            queries: parse_queries(uri.query()),
            headers: forwarded_headers(headers),
            body,
            id,
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: Value) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Group query parameters by name, keeping every value in order.
pub fn parse_queries(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut queries: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            queries
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    queries
}

/// Request headers as seen by the script.
///
/// Vault credentials are stripped. Repeated headers are joined with `, `;
/// values that are not valid UTF-8 are dropped.
pub fn forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut forwarded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if name == VAULT_KEY_HEADER || name == VAULT_TOKEN_HEADER {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        forwarded
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    forwarded
}

/// What a script returns.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScriptResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ScriptResponse {
    /// Parse runtime output. Empty output is an empty response.
    ///
    /// # Errors
    /// - `Runtime` if the output is not a response object
    pub fn parse(output: &str) -> Result<Self> {
        if output.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(output)
            .map_err(|e| Error::Runtime(format!("script returned malformed response: {}", e)))
    }

    /// Convert into an HTTP response.
    ///
    /// # Errors
    /// - `Runtime` on an invalid status code or header
    pub fn into_response(self) -> Result<Response> {
        let status = match self.status {
            Some(code) => StatusCode::from_u16(code)
                .map_err(|_| Error::Runtime(format!("script returned invalid status {}", code)))?,
            None => StatusCode::OK,
        };

        let body = match self.body {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;

        for (name, value) in self.headers.unwrap_or_default() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::Runtime(format!("script returned invalid header {}", name)))?;
            let value = HeaderValue::from_str(&value).map_err(|_| {
                Error::Runtime(format!("script returned invalid value for header {}", name))
            })?;
            response.headers_mut().append(name, value);
        }

        Ok(response)
    }
}

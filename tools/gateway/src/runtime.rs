//! Bridge to the sandboxed script runtime.
//!
//! The sandbox itself lives behind a contract-query interface that this
//! crate does not speak. A bridge service does; we hand it the code and the
//! serialized request and get the script's serialized response back.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use sidegate_common::{Error, Result};

/// Script engine requested from the contract.
pub const SCRIPT_ENGINE: &str = "SidevmQuickJSWithPolyfill";

/// Executes script code in the remote sandbox.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Run `code` with `request` as its only argument.
    ///
    /// # Returns
    /// The script's output string, normally a serialized response object.
    async fn execute(&self, code: &str, request: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ExecuteCall<'a> {
    contract_id: Option<&'a str>,
    engine: &'a str,
    code: &'a str,
    args: [&'a str; 1],
}

#[derive(Deserialize)]
struct ExecuteReply {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Runtime reached through an HTTP bridge.
pub struct HttpRuntime {
    http: Client,
    endpoint: Option<Url>,
    contract_id: Option<String>,
}

impl HttpRuntime {
    /// Create a runtime client.
    ///
    /// Without an endpoint every execution fails with a configuration
    /// error.
    pub fn new(endpoint: Option<Url>, contract_id: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sidegate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            contract_id,
        })
    }
}

#[async_trait]
impl ScriptRuntime for HttpRuntime {
    async fn execute(&self, code: &str, request: &str) -> Result<String> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            Error::Configuration("sandbox bridge URL is not configured".to_string())
        })?;

        let call = ExecuteCall {
            contract_id: self.contract_id.as_deref(),
            engine: SCRIPT_ENGINE,
            code,
            args: [request],
        };

        let response = self
            .http
            .post(endpoint.clone())
            .json(&call)
            .send()
            .await
            .map_err(|e| Error::Runtime(format!("sandbox bridge unreachable: {}", e)))?;

        let status = response.status();
        let reply: ExecuteReply = response
            .json()
            .await
            .map_err(|e| Error::Runtime(format!("malformed bridge reply ({}): {}", status, e)))?;

        if let Some(message) = reply.error {
            return Err(Error::Runtime(message));
        }
        if !status.is_success() {
            return Err(Error::Runtime(format!("sandbox bridge returned {}", status)));
        }

        debug!(bytes = reply.output.as_ref().map_or(0, String::len), "script finished");
        Ok(reply.output.unwrap_or_default())
    }
}

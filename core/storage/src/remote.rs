//! Remote key-value cache adapter.
//!
//! The store is Redis or anything speaking its commands. Two transports are
//! supported, picked by the URL scheme:
//! - `redis://`: the Redis protocol over one long-lived multiplexed
//!   connection
//! - `http(s)://`: a REST command endpoint; each command is POSTed as a
//!   JSON array (`["SET", key, value, "EX", 60]`) and the reply is
//!   `{"result": ...}` or `{"error": "..."}`

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::adapter::CacheAdapter;
use sidegate_common::{Error, Result};

/// Default bound on a single remote store round trip.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the remote store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// `redis://` URI or REST endpoint of the store.
    pub url: Url,
    /// Credential: the password for `redis://`, a bearer token for REST.
    pub token: Option<String>,
    /// Bound on each command, connecting included.
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Parse a configuration from a store URL.
    ///
    /// # Errors
    /// - URL is malformed or its scheme is not `redis`, `http` or `https`
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::Configuration(format!("invalid remote store URL: {}", e)))?;
        match url.scheme() {
            "redis" | "http" | "https" => {}
            other => {
                return Err(Error::Configuration(format!(
                    "remote store URL must be redis:// or http(s)://, got {}",
                    other
                )))
            }
        }
        Ok(Self {
            url,
            token: None,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        })
    }

    /// Set the credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_redis(&self) -> bool {
        self.url.scheme() == "redis"
    }
}

/// Run `fut` within `timeout`.
async fn bounded<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Network(format!("remote store timed out after {:?}", timeout)))?
}

fn redis_error(err: redis::RedisError) -> Error {
    match err.kind() {
        redis::ErrorKind::AuthenticationFailed => {
            Error::Configuration(format!("remote store rejected credentials: {}", err))
        }
        _ => Error::Network(format!("remote store error: {}", err)),
    }
}

/// Redis protocol transport.
///
/// The connection is opened on first use and then shared by every call;
/// the manager reconnects on its own after a drop.
struct RedisTransport {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisTransport {
    fn new(config: &RemoteConfig) -> Result<Self> {
        let mut url = config.url.clone();
        if let Some(token) = &config.token {
            if url.password().is_none() {
                url.set_password(Some(token)).map_err(|_| {
                    Error::Configuration("remote store URL cannot carry a password".to_string())
                })?;
            }
        }

        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::Configuration(format!("invalid redis URI: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            timeout: config.timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                debug!("connecting to remote store");
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(redis_error)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        bounded(self.timeout, async {
            let mut connection = self.connection().await?;
            let raw: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut connection)
                .await
                .map_err(redis_error)?;
            Ok(raw)
        })
        .await
    }

    async fn set(&self, key: &str, payload: &str, ttl_secs: Option<u64>) -> Result<()> {
        bounded(self.timeout, async {
            let mut connection = self.connection().await?;
            let mut command = redis::cmd("SET");
            command.arg(key).arg(payload);
            if let Some(secs) = ttl_secs {
                command.arg("EX").arg(secs);
            }
            let _: () = command
                .query_async(&mut connection)
                .await
                .map_err(redis_error)?;
            Ok(())
        })
        .await
    }
}

/// Reply envelope of the REST command interface.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// REST command transport.
struct RestTransport {
    http: Client,
    config: RemoteConfig,
}

impl RestTransport {
    fn new(config: RemoteConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sidegate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Run one command and return its `result` field.
    async fn command(&self, args: Value) -> Result<Value> {
        let mut request = self.http.post(self.config.url.clone()).json(&args);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("remote store request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Configuration(format!(
                "remote store rejected credentials ({})",
                status
            )));
        }

        let reply: CommandReply = response.json().await.map_err(|e| {
            Error::Network(format!("malformed remote store reply ({}): {}", status, e))
        })?;

        if let Some(message) = reply.error {
            return Err(Error::Network(format!("remote store error: {}", message)));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("remote store returned {}", status)));
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(raw) => Ok(Some(raw)),
            other => {
                warn!(key, "unexpected remote store reply type");
                Err(Error::Serialization(format!(
                    "expected string reply for GET, got {}",
                    other
                )))
            }
        }
    }

    async fn set(&self, key: &str, payload: &str, ttl_secs: Option<u64>) -> Result<()> {
        let command = match ttl_secs {
            Some(secs) => json!(["SET", key, payload, "EX", secs]),
            None => json!(["SET", key, payload]),
        };
        self.command(command).await?;
        Ok(())
    }
}

enum Transport {
    Redis(RedisTransport),
    Rest(RestTransport),
}

/// Remote key-value cache adapter.
///
/// Values are stored as `{"data": <value>}` JSON text. The adapter can be
/// built without a connection; every call then fails with
/// [`Error::Configuration`] before any I/O.
pub struct RemoteAdapter {
    transport: Option<Transport>,
}

impl RemoteAdapter {
    /// Create an adapter for the configured store.
    ///
    /// No connection is opened until the first call.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let transport = if config.is_redis() {
            Transport::Redis(RedisTransport::new(&config)?)
        } else {
            Transport::Rest(RestTransport::new(config)?)
        };
        Ok(Self {
            transport: Some(transport),
        })
    }

    /// Create an adapter with no connection configured.
    pub fn unconfigured() -> Self {
        Self { transport: None }
    }

    /// Create from an optional configuration.
    pub fn from_config(config: Option<RemoteConfig>) -> Result<Self> {
        match config {
            Some(config) => Self::new(config),
            None => Ok(Self::unconfigured()),
        }
    }

    /// Whether a connection is configured.
    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&self) -> Result<&Transport> {
        self.transport.as_ref().ok_or_else(|| {
            Error::Configuration(
                "redis adapter requires a remote store URL (MEMOIZE_REDIS_URI)".to_string(),
            )
        })
    }
}

#[async_trait]
impl CacheAdapter for RemoteAdapter {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw = match self.transport()? {
            Transport::Redis(redis) => redis.get(key).await?,
            Transport::Rest(rest) => rest.get(key).await?,
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut envelope: Value = serde_json::from_str(&raw)?;
        match envelope.get_mut("data") {
            Some(data) => Ok(Some(data.take())),
            None => Err(Error::Serialization(format!(
                "remote entry for {} has no data field",
                key
            ))),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let transport = self.transport()?;
        let payload = json!({ "data": value }).to_string();
        let ttl_secs = ttl.map(|ttl| ttl.as_secs().max(1));

        match transport {
            Transport::Redis(redis) => redis.set(key, &payload, ttl_secs).await?,
            Transport::Rest(rest) => rest.set(key, &payload, ttl_secs).await?,
        }
        debug!(key, "stored entry in remote store");
        Ok(())
    }
}

//! Script code retrieval from an IPFS HTTP gateway.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use sidegate_common::{Cid, Error, Result};
use sidegate_storage::{CacheAdapter, MemoizeOptions, Memoizer};

/// Client for an IPFS HTTP gateway.
#[derive(Clone)]
pub struct IpfsClient {
    http: Client,
    gateway: Url,
}

impl IpfsClient {
    pub fn new(gateway: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sidegate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http, gateway })
    }

    /// URL the content of `cid` is served from.
    pub fn content_url(&self, cid: &Cid) -> String {
        format!("{}/{}", self.gateway.as_str().trim_end_matches('/'), cid)
    }

    /// Download the content of `cid` as text.
    ///
    /// # Errors
    /// - `Producer` on transport failure or a non-success status
    pub async fn fetch(&self, cid: &Cid) -> Result<String> {
        let url = self.content_url(cid);
        debug!(url = %url, "fetching from IPFS");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Producer(format!("IPFS request for {} failed: {}", cid, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Producer(format!(
                "IPFS gateway returned {} for {}",
                status, cid
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Producer(format!("failed to read IPFS body for {}: {}", cid, e)))
    }
}

/// Cache key of the code stored under `cid`.
pub fn code_key(cid: &Cid) -> String {
    format!("ipfs/{}", cid)
}

/// Memoized code fetch over `adapters`.
pub fn code_memoizer(
    client: IpfsClient,
    adapters: Vec<Arc<dyn CacheAdapter>>,
    options: MemoizeOptions,
) -> Result<Memoizer<Cid, String>> {
    Memoizer::new(adapters, options, code_key, move |cid: Cid| {
        let client = client.clone();
        async move { client.fetch(&cid).await }
    })
}

//! Gateway configuration from command line flags and environment.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use sidegate_common::Result;
use sidegate_storage::{AdapterKind, MemoizeOptions, RemoteConfig};

#[derive(Debug, Clone, Parser)]
#[command(name = "sidegate")]
#[command(about = "sidegate - run IPFS-hosted scripts in a remote sandbox over HTTP")]
#[command(version)]
pub struct GatewayConfig {
    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Address to listen on.
    #[arg(long, env = "SIDEGATE_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Root directory of the filesystem cache tier.
    #[arg(long, env = "SIDEGATE_STORAGE_ROOT", default_value = "./storage")]
    pub storage_root: PathBuf,

    /// Remote key-value store: a `redis://` URI, or an http(s) REST command
    /// endpoint.
    #[arg(long, env = "MEMOIZE_REDIS_URI")]
    pub redis_url: Option<String>,

    /// Password (redis) or bearer token (REST) for the remote store.
    #[arg(long, env = "MEMOIZE_REDIS_TOKEN", hide_env_values = true)]
    pub redis_token: Option<String>,

    /// TTL of remote cache entries, in seconds.
    #[arg(long, env = "SIDEGATE_CACHE_TTL", default_value_t = 86400)]
    pub cache_ttl_secs: u64,

    /// Cache tiers for script code, in lookup order.
    #[arg(long, env = "SIDEGATE_CODE_ADAPTERS", default_value = "fs,redis")]
    pub code_adapters: String,

    /// Run one fetch for concurrent requests of the same uncached script.
    #[arg(long)]
    pub single_flight: bool,

    /// IPFS HTTP gateway serving script code.
    #[arg(
        long,
        env = "SIDEGATE_IPFS_GATEWAY",
        default_value = "https://cloudflare-ipfs.com/ipfs"
    )]
    pub ipfs_gateway: Url,

    /// Endpoint of the sandbox bridge.
    #[arg(long, env = "SIDEGATE_RUNTIME_URL")]
    pub runtime_url: Option<Url>,

    /// Contract hosting the script engine.
    #[arg(long, env = "JS_CONTRACT_ID")]
    pub contract_id: Option<String>,

    /// Timeout for upstream calls (IPFS, sandbox bridge, remote store), in
    /// seconds.
    #[arg(long, env = "SIDEGATE_UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout_secs: u64,
}

impl GatewayConfig {
    /// Remote store settings, if a URL is configured.
    pub fn remote_config(&self) -> Result<Option<RemoteConfig>> {
        let Some(url) = &self.redis_url else {
            return Ok(None);
        };

        let config = RemoteConfig::new(url)?.with_timeout(self.upstream_timeout());
        Ok(Some(match &self.redis_token {
            Some(token) => config.with_token(token.clone()),
            None => config,
        }))
    }

    /// Cache tiers for script code.
    pub fn code_adapter_kinds(&self) -> Result<Vec<AdapterKind>> {
        AdapterKind::parse_chain(&self.code_adapters)
    }

    /// Memoizer options for script code.
    pub fn memoize_options(&self) -> MemoizeOptions {
        MemoizeOptions::default()
            .with_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_single_flight(self.single_flight)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::try_parse_from(["sidegate"]).unwrap();

        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.cache_ttl_secs, 86400);
        assert_eq!(
            config.code_adapter_kinds().unwrap(),
            vec![AdapterKind::Fs, AdapterKind::Redis]
        );
        assert!(!config.memoize_options().single_flight);
    }

    #[test]
    fn test_remote_config_with_token() {
        let config = GatewayConfig::try_parse_from([
            "sidegate",
            "--redis-url",
            "https://kv.example.com",
            "--redis-token",
            "secret",
        ])
        .unwrap();

        let remote = config.remote_config().unwrap().unwrap();
        assert_eq!(remote.url.as_str(), "https://kv.example.com/");
        assert_eq!(remote.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_remote_url_is_configuration_error() {
        let config =
            GatewayConfig::try_parse_from(["sidegate", "--redis-url", "memcached://localhost"])
                .unwrap();

        assert!(config.remote_config().unwrap_err().is_configuration());
    }

    #[test]
    fn test_redis_uri_accepted_with_upstream_timeout() {
        let config = GatewayConfig::try_parse_from([
            "sidegate",
            "--redis-url",
            "redis://cache.internal:6379",
            "--upstream-timeout-secs",
            "5",
        ])
        .unwrap();

        let remote = config.remote_config().unwrap().unwrap();
        assert_eq!(remote.url.scheme(), "redis");
        assert_eq!(remote.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_single_flight_and_ttl_flags() {
        let config = GatewayConfig::try_parse_from([
            "sidegate",
            "--single-flight",
            "--cache-ttl-secs",
            "60",
            "--code-adapters",
            "memory,fs",
        ])
        .unwrap();

        let options = config.memoize_options();
        assert!(options.single_flight);
        assert_eq!(options.ttl, Duration::from_secs(60));
        assert_eq!(
            config.code_adapter_kinds().unwrap(),
            vec![AdapterKind::Memory, AdapterKind::Fs]
        );
    }
}

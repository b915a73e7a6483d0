//! HTTP gateway for sidegate.
//!
//! Routes script executions and vault calls. Script code is memoized
//! through the configured cache tiers; secrets live in the remote tier.

pub mod app;
pub mod config;
pub mod error;
pub mod ipfs;
pub mod request;
pub mod runtime;

pub use app::{router, AppState};
pub use config::GatewayConfig;
pub use error::ApiError;
pub use ipfs::{code_key, code_memoizer, IpfsClient};
pub use request::{ScriptRequest, ScriptResponse};
pub use runtime::{HttpRuntime, ScriptRuntime};

//! Common utilities and types shared across the sidegate crates.
//!
//! This module provides the error taxonomy used by every layer (cache,
//! vault, gateway) and a few small domain newtypes.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Cid, SecretToken};

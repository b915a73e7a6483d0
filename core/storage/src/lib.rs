//! Cache storage adapters and the layered memoizer for sidegate.
//!
//! This module provides a trait-based interface over the storage tiers a
//! memoized call can be cached in (process memory, local filesystem, a
//! remote key-value store) and the [`Memoizer`] that chains them.
//!
//! # Design Principles
//! - Closed adapter set: tiers are picked by [`AdapterKind`], not by probing
//!   what an object can do
//! - First hit wins: a hit in a slow tier is never copied into faster tiers
//! - Write-through: a produced value is written to every tier in the chain
//! - Fail closed: adapter errors abort the call instead of counting as misses

pub mod adapter;
pub mod local;
pub mod memoize;
pub mod memory;
pub mod registry;
pub mod remote;

#[cfg(test)]
mod testing;

pub use adapter::CacheAdapter;
pub use local::LocalAdapter;
pub use memoize::{MemoizeOptions, Memoizer, DEFAULT_TTL};
pub use memory::MemoryAdapter;
pub use registry::{AdapterKind, AdapterRegistry};
pub use remote::{RemoteAdapter, RemoteConfig, DEFAULT_REMOTE_TIMEOUT};

//! Layered memoization over an ordered chain of cache adapters.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::CacheAdapter;
use sidegate_common::{Error, Result};

/// Default TTL applied to tiers that honor one (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;
type ProducerFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;
type Flight = Shared<BoxFuture<'static, Result<Value>>>;

/// Options for a [`Memoizer`].
#[derive(Debug, Clone)]
pub struct MemoizeOptions {
    /// TTL passed to every tier on write.
    pub ttl: Duration,
    /// Collapse concurrent misses on the same key into one producer call.
    pub single_flight: bool,
}

impl MemoizeOptions {
    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable single-flight.
    pub fn with_single_flight(mut self, single_flight: bool) -> Self {
        self.single_flight = single_flight;
        self
    }
}

impl Default for MemoizeOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            single_flight: false,
        }
    }
}

struct Inner<A, T> {
    adapters: Vec<Arc<dyn CacheAdapter>>,
    options: MemoizeOptions,
    key_fn: KeyFn<A>,
    producer: ProducerFn<A, T>,
    in_flight: Mutex<HashMap<String, Flight>>,
}

/// Memoized asynchronous function.
///
/// Reads walk the adapters in order and return the first hit; tiers before
/// the hit are not backfilled. On a full miss the producer runs and its
/// value is written to every tier. A producer error is returned as is and
/// nothing is cached.
///
/// Unless single-flight is enabled, concurrent calls that miss on the same
/// key each run the producer.
pub struct Memoizer<A, T> {
    inner: Arc<Inner<A, T>>,
}

impl<A, T> Clone for Memoizer<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> Memoizer<A, T>
where
    A: Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Wrap `producer` with the given adapter chain.
    ///
    /// # Errors
    /// - Empty adapter chain
    pub fn new<K, F, Fut>(
        adapters: Vec<Arc<dyn CacheAdapter>>,
        options: MemoizeOptions,
        key_fn: K,
        producer: F,
    ) -> Result<Self>
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if adapters.is_empty() {
            return Err(Error::InvalidInput(
                "memoizer needs at least one adapter".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                adapters,
                options,
                key_fn: Arc::new(key_fn),
                producer: Arc::new(move |args| producer(args).boxed()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Cache key the call with `args` would use.
    pub fn key_for(&self, args: &A) -> String {
        (self.inner.key_fn)(args)
    }

    /// Adapters in lookup order.
    pub fn adapters(&self) -> &[Arc<dyn CacheAdapter>] {
        &self.inner.adapters
    }

    /// Call the memoized function.
    ///
    /// # Errors
    /// - Any adapter error during lookup or write-through
    /// - The producer's error, unchanged
    /// - A cached value that does not decode into `T`
    pub async fn call(&self, args: A) -> Result<T> {
        let key = self.key_for(&args);

        if let Some(value) = self.inner.lookup(&key).await? {
            return decode(&key, value);
        }

        debug!(key = %key, "cache miss");
        let value = if self.inner.options.single_flight {
            self.join_flight(key.clone(), args).await?
        } else {
            Inner::produce(Arc::clone(&self.inner), key.clone(), args).await?
        };

        decode(&key, value)
    }

    /// Await the in-flight computation for `key`, starting one if needed.
    ///
    /// The computation runs on its own task, so it finishes and leaves the
    /// in-flight map even when every waiter has been dropped.
    async fn join_flight(&self, key: String, args: A) -> Result<Value> {
        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(flight) => {
                    debug!(key = %key, "joining in-flight computation");
                    flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight_key = key.clone();
                    let task = tokio::spawn(async move {
                        let result =
                            Inner::produce(Arc::clone(&inner), flight_key.clone(), args).await;
                        inner.in_flight.lock().await.remove(&flight_key);
                        result
                    });
                    let flight = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(Error::Producer(format!("computation aborted: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }
}

impl<A, T> Inner<A, T>
where
    A: Send + 'static,
    T: Serialize + Send + 'static,
{
    async fn lookup(&self, key: &str) -> Result<Option<Value>> {
        for adapter in &self.adapters {
            if let Some(value) = adapter.get(key).await? {
                debug!(key, adapter = adapter.name(), "cache hit");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn produce(inner: Arc<Self>, key: String, args: A) -> Result<Value> {
        let produced = match (inner.producer)(args).await {
            Ok(produced) => produced,
            Err(err) => {
                warn!(key = %key, error = %err, "producer failed, nothing cached");
                return Err(err);
            }
        };

        let value = serde_json::to_value(&produced)?;
        for adapter in &inner.adapters {
            adapter.set(&key, &value, Some(inner.options.ttl)).await?;
        }
        Ok(value)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Serialization(format!("cached value for {} is invalid: {}", key, e)))
}

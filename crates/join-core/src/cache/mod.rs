//! Service worker caching: the policy table, the strategies that answer a
//! request from network or cache, and the expiration bookkeeping.
//!
//! The engine is written against small traits so the worker crate can plug
//! in the Cache API and `fetch`, while tests plug in in-memory fakes.

mod engine;
mod expiration;
mod policy;

use std::future::Future;

pub use engine::{CacheEngine, Served, Source};
pub use expiration::{EntryStamp, ExpirationLedger};
pub use policy::{CachePolicy, Destination, PolicyTable, RequestInfo, RouteMatch, Strategy, precache_bucket};

use crate::error::CacheError;

/// Bumped whenever the bucket layout changes; old buckets are purged on
/// activation.
pub const CACHE_VERSION: &str = "v1";

/// Bucket holding the worker's own key-value store.
pub const SETTINGS_BUCKET: &str = "join-settings";

/// Response handle as seen by the strategies.
pub trait Payload: Sized {
    /// A second handle with its own body (`Response.clone()` in the browser).
    fn duplicate(&self) -> Result<Self, CacheError>;

    /// Status 200, or an opaque cross-origin response.
    fn is_cacheable(&self) -> bool;
}

#[allow(async_fn_in_trait)]
pub trait Network {
    type Request;
    type Response: Payload;

    /// A plain GET for `url`, used when precaching.
    fn request_for(&self, url: &str) -> Result<Self::Request, CacheError>;

    async fn fetch(&self, request: &Self::Request) -> Result<Self::Response, CacheError>;
}

#[allow(async_fn_in_trait)]
pub trait ResponseCache {
    type Response;

    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Self::Response>, CacheError>;

    async fn store(&self, bucket: &str, url: &str, response: Self::Response) -> Result<(), CacheError>;

    async fn evict(&self, bucket: &str, url: &str) -> Result<(), CacheError>;

    async fn buckets(&self) -> Result<Vec<String>, CacheError>;

    async fn drop_bucket(&self, bucket: &str) -> Result<bool, CacheError>;
}

/// The worker's small persistent string store.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

pub trait Clock {
    fn now_ms(&self) -> u64;

    fn sleep(&self, ms: u32) -> impl Future<Output = ()>;
}

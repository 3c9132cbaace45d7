use std::pin::pin;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{Either, LocalBoxFuture, select};
use tracing::{debug, info, warn};

use super::expiration::ExpirationLedger;
use super::policy::{CachePolicy, Destination, PolicyTable, RequestInfo, Strategy, precache_bucket};
use super::{Clock, KeyValueStore, Network, Payload, ResponseCache};
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
}

/// A response plus, for stale-while-revalidate hits, the background refresh
/// the host must keep alive (`FetchEvent.waitUntil`).
pub struct Served<R> {
    pub response: R,
    pub source: Source,
    pub policy: &'static str,
    pub revalidation: Option<LocalBoxFuture<'static, ()>>,
}

pub struct CacheEngine<N, C, K, T> {
    network: Rc<N>,
    cache: Rc<C>,
    ledger: Rc<ExpirationLedger<K>>,
    clock: Rc<T>,
    table: Rc<PolicyTable>,
}

impl<N, C, K, T> Clone for CacheEngine<N, C, K, T> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
            cache: self.cache.clone(),
            ledger: self.ledger.clone(),
            clock: self.clock.clone(),
            table: self.table.clone(),
        }
    }
}

impl<N, C, K, T> CacheEngine<N, C, K, T>
where
    N: Network + 'static,
    N::Request: 'static,
    N::Response: 'static,
    C: ResponseCache<Response = N::Response> + 'static,
    K: KeyValueStore + 'static,
    T: Clock + 'static,
{
    pub fn new(network: Rc<N>, cache: Rc<C>, store: Rc<K>, clock: Rc<T>, table: PolicyTable) -> Self {
        Self {
            network,
            cache,
            ledger: Rc::new(ExpirationLedger::new(store)),
            clock,
            table: Rc::new(table),
        }
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    #[tracing::instrument(skip(self, request), fields(url = %info.url))]
    pub async fn handle(&self, info: &RequestInfo, request: N::Request) -> Result<Served<N::Response>, CacheError> {
        let policy = self.table.classify(info).clone();
        debug!(policy = policy.name, strategy = policy.strategy.as_str(), "routing request");

        let Some(bucket) = policy.bucket.clone() else {
            return self.network_only(&policy, &request).await;
        };

        match policy.strategy {
            Strategy::NetworkFirst => self.network_first(&policy, &bucket, &info.url, &request).await,
            Strategy::CacheFirst => self.cache_first(&policy, &bucket, &info.url, &request).await,
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(policy, bucket, info.url.clone(), request)
                    .await
            }
            Strategy::NetworkOnly => self.network_only(&policy, &request).await,
        }
    }

    async fn network_only(&self, policy: &CachePolicy, request: &N::Request) -> Result<Served<N::Response>, CacheError> {
        let response = self.network.fetch(request).await?;
        Ok(served(policy, response, Source::Network))
    }

    async fn network_first(
        &self,
        policy: &CachePolicy,
        bucket: &str,
        url: &str,
        request: &N::Request,
    ) -> Result<Served<N::Response>, CacheError> {
        let outcome = match policy.network_timeout {
            Some(timeout) => {
                let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
                let fetch = pin!(self.network.fetch(request));
                let sleep = pin!(self.clock.sleep(ms));
                match select(fetch, sleep).await {
                    Either::Left((result, _)) => result,
                    Either::Right(((), _)) => Err(CacheError::Timeout(ms)),
                }
            }
            None => self.network.fetch(request).await,
        };

        match outcome {
            Ok(response) => {
                self.store(policy, bucket, url, &response).await;
                Ok(served(policy, response, Source::Network))
            }
            Err(error) => {
                warn!(%error, url, "network failed; trying cache");
                if let Some(response) = self.cached_fresh(policy, bucket, url).await {
                    return Ok(served(policy, response, Source::Cache));
                }
                match self.precached(url).await {
                    Some(response) => Ok(served(policy, response, Source::Cache)),
                    None => Err(error),
                }
            }
        }
    }

    async fn cache_first(
        &self,
        policy: &CachePolicy,
        bucket: &str,
        url: &str,
        request: &N::Request,
    ) -> Result<Served<N::Response>, CacheError> {
        if let Some(response) = self.cached_fresh(policy, bucket, url).await {
            return Ok(served(policy, response, Source::Cache));
        }
        let response = self.network.fetch(request).await?;
        self.store(policy, bucket, url, &response).await;
        Ok(served(policy, response, Source::Network))
    }

    async fn stale_while_revalidate(
        &self,
        policy: CachePolicy,
        bucket: String,
        url: String,
        request: N::Request,
    ) -> Result<Served<N::Response>, CacheError> {
        if let Some(response) = self.cached_fresh(&policy, &bucket, &url).await {
            let engine = self.clone();
            let name = policy.name;
            let revalidation = async move {
                match engine.network.fetch(&request).await {
                    Ok(fresh) => engine.store(&policy, &bucket, &url, &fresh).await,
                    Err(error) => debug!(%error, url, "background revalidation failed"),
                }
            }
            .boxed_local();

            return Ok(Served {
                response,
                source: Source::Cache,
                policy: name,
                revalidation: Some(revalidation),
            });
        }

        let response = self.network.fetch(&request).await?;
        self.store(&policy, &bucket, &url, &response).await;
        Ok(served(&policy, response, Source::Network))
    }

    /// Storage problems never fail the request; they are logged and the
    /// network response is served anyway.
    async fn store(&self, policy: &CachePolicy, bucket: &str, url: &str, response: &N::Response) {
        if !response.is_cacheable() {
            debug!(url, "response not cacheable");
            return;
        }

        let copy = match response.duplicate() {
            Ok(copy) => copy,
            Err(error) => {
                warn!(%error, url, "could not duplicate response for caching");
                return;
            }
        };
        if let Err(error) = self.cache.store(bucket, url, copy).await {
            warn!(%error, bucket, url, "cache write failed");
            return;
        }

        let evicted = match self
            .ledger
            .record_write(bucket, url, self.clock.now_ms(), policy.max_entries, policy.max_age_ms())
            .await
        {
            Ok(evicted) => evicted,
            Err(error) => {
                warn!(%error, bucket, "expiration ledger write failed");
                return;
            }
        };

        for stale in evicted {
            if let Err(error) = self.cache.evict(bucket, &stale).await {
                warn!(%error, bucket, url = %stale, "eviction failed");
            }
        }
    }

    async fn cached_fresh(&self, policy: &CachePolicy, bucket: &str, url: &str) -> Option<N::Response> {
        let now = self.clock.now_ms();
        match self.ledger.is_fresh(bucket, url, policy.max_age_ms(), now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(bucket, url, "cached entry expired");
                return None;
            }
            Err(error) => warn!(%error, bucket, "expiration ledger unreadable"),
        }

        let response = match self.cache.lookup(bucket, url).await {
            Ok(response) => response?,
            Err(error) => {
                warn!(%error, bucket, url, "cache read failed");
                return None;
            }
        };

        if let Err(error) = self.ledger.touch(bucket, url, now).await {
            warn!(%error, bucket, "failed updating entry recency");
        }
        Some(response)
    }

    /// Fetches the app shell into the precache bucket. Returns how many
    /// entries landed. URLs the table routes network-only are skipped.
    #[tracing::instrument(skip(self, urls))]
    pub async fn precache(&self, origin: &str, urls: &[String]) -> Result<usize, CacheError> {
        let bucket = precache_bucket();
        let mut stored = 0;
        for path in urls {
            let url = format!("{}{}", origin.trim_end_matches('/'), path);
            let info = RequestInfo::new(&url, guess_destination(path), false)?;
            if self.table.classify(&info).bucket.is_none() {
                continue;
            }
            let request = self.network.request_for(&info.url)?;
            match self.network.fetch(&request).await {
                Ok(response) if response.is_cacheable() => match self.cache.store(&bucket, &info.url, response).await {
                    Ok(()) => stored += 1,
                    Err(error) => warn!(%error, url = %info.url, "precache write failed"),
                },
                Ok(_) => warn!(url = %info.url, "precache response not cacheable"),
                Err(error) => warn!(%error, url = %info.url, "precache fetch failed"),
            }
        }
        info!(stored, requested = urls.len(), "precached app shell");
        Ok(stored)
    }

    /// The install-time copy of `url`, if the app shell holds one.
    pub async fn precached(&self, url: &str) -> Option<N::Response> {
        match self.cache.lookup(&precache_bucket(), url).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, url, "precache read failed");
                None
            }
        }
    }

    /// Drops every bucket the current table does not know about.
    pub async fn purge_stale(&self) -> Result<Vec<String>, CacheError> {
        let existing = self.cache.buckets().await?;
        let stale = self.table.stale_buckets(&existing);
        for bucket in &stale {
            self.cache.drop_bucket(bucket).await?;
            self.ledger.drop_bucket(bucket).await?;
            info!(bucket = %bucket, "deleted outdated cache bucket");
        }
        Ok(stale)
    }
}

fn served<R>(policy: &CachePolicy, response: R, source: Source) -> Served<R> {
    Served {
        response,
        source,
        policy: policy.name,
        revalidation: None,
    }
}

fn guess_destination(path: &str) -> Destination {
    if path.ends_with('/') || path.ends_with(".html") {
        Destination::Document
    } else if path.ends_with(".webmanifest") || path.ends_with("manifest.json") {
        Destination::Manifest
    } else if path.ends_with(".css") {
        Destination::Style
    } else if path.ends_with(".js") {
        Destination::Script
    } else {
        Destination::Other
    }
}

use std::future::Future;

use gloo::timers::future::TimeoutFuture;
use join_core::cache::{
  Clock,
  KeyValueStore,
  Network,
  Payload,
  ResponseCache,
  SETTINGS_BUCKET
};
use join_core::error::CacheError;
use js_sys::{
  Array,
  Promise
};
use wasm_bindgen::{
  JsCast,
  JsValue
};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
  Cache,
  CacheStorage,
  Request,
  Response,
  ResponseType,
  ServiceWorkerGlobalScope
};

pub fn js_text(value: &JsValue) -> String {
  value
    .as_string()
    .unwrap_or_else(|| format!("{value:?}"))
}

async fn settle(
  promise: Result<Promise, JsValue>,
  wrap: fn(String) -> CacheError
) -> Result<JsValue, CacheError> {
  let promise =
    promise.map_err(|e| wrap(js_text(&e)))?;
  JsFuture::from(promise)
    .await
    .map_err(|e| wrap(js_text(&e)))
}

/// `Response` handle the strategies
/// pass around.
pub struct WebResponse(pub Response);

impl Payload for WebResponse {
  fn duplicate(
    &self
  ) -> Result<Self, CacheError> {
    // Inherent `Response.clone()`: a
    // second handle over a tee'd body.
    Response::clone(&self.0)
      .map(WebResponse)
      .map_err(|e| {
        CacheError::Storage(js_text(&e))
      })
  }

  fn is_cacheable(&self) -> bool {
    self.0.status() == 200
      || self.0.type_()
        == ResponseType::Opaque
  }
}

pub struct FetchNetwork {
  scope: ServiceWorkerGlobalScope
}

impl FetchNetwork {
  pub fn new(
    scope: ServiceWorkerGlobalScope
  ) -> Self {
    Self { scope }
  }
}

impl Network for FetchNetwork {
  type Request = Request;
  type Response = WebResponse;

  fn request_for(
    &self,
    url: &str
  ) -> Result<Request, CacheError> {
    Request::new_with_str(url).map_err(
      |e| {
        CacheError::InvalidUrl(js_text(
          &e
        ))
      }
    )
  }

  async fn fetch(
    &self,
    request: &Request
  ) -> Result<WebResponse, CacheError> {
    let value = settle(
      Ok(
        self
          .scope
          .fetch_with_request(request)
      ),
      CacheError::Network
    )
    .await?;
    value
      .dyn_into::<Response>()
      .map(WebResponse)
      .map_err(|e| {
        CacheError::Network(js_text(&e))
      })
  }
}

/// Named buckets in the Cache API.
pub struct BrowserCache {
  caches: CacheStorage
}

impl BrowserCache {
  pub fn new(caches: CacheStorage) -> Self {
    Self { caches }
  }

  async fn open(
    &self,
    bucket: &str
  ) -> Result<Cache, CacheError> {
    settle(
      Ok(self.caches.open(bucket)),
      CacheError::Storage
    )
    .await?
    .dyn_into::<Cache>()
    .map_err(|e| {
      CacheError::Storage(js_text(&e))
    })
  }
}

impl ResponseCache for BrowserCache {
  type Response = WebResponse;

  async fn lookup(
    &self,
    bucket: &str,
    url: &str
  ) -> Result<Option<WebResponse>, CacheError>
  {
    let cache = self.open(bucket).await?;
    let value = settle(
      Ok(cache.match_with_str(url)),
      CacheError::Storage
    )
    .await?;
    if value.is_undefined() {
      return Ok(None);
    }
    value
      .dyn_into::<Response>()
      .map(|r| Some(WebResponse(r)))
      .map_err(|e| {
        CacheError::Storage(js_text(&e))
      })
  }

  async fn store(
    &self,
    bucket: &str,
    url: &str,
    response: WebResponse
  ) -> Result<(), CacheError> {
    let cache = self.open(bucket).await?;
    settle(
      Ok(cache.put_with_str(url, &response.0)),
      CacheError::Storage
    )
    .await
    .map(|_| ())
  }

  async fn evict(
    &self,
    bucket: &str,
    url: &str
  ) -> Result<(), CacheError> {
    let cache = self.open(bucket).await?;
    settle(
      Ok(cache.delete_with_str(url)),
      CacheError::Storage
    )
    .await
    .map(|_| ())
  }

  async fn buckets(
    &self
  ) -> Result<Vec<String>, CacheError> {
    let keys = settle(
      Ok(self.caches.keys()),
      CacheError::Storage
    )
    .await?;
    Ok(
      Array::from(&keys)
        .iter()
        .filter_map(|key| key.as_string())
        .collect()
    )
  }

  async fn drop_bucket(
    &self,
    bucket: &str
  ) -> Result<bool, CacheError> {
    let deleted = settle(
      Ok(self.caches.delete(bucket)),
      CacheError::Storage
    )
    .await?;
    Ok(deleted.as_bool().unwrap_or(false))
  }
}

/// String store kept as plain-text
/// responses in the settings bucket.
pub struct SettingsStore {
  caches: CacheStorage
}

impl SettingsStore {
  pub fn new(caches: CacheStorage) -> Self {
    Self { caches }
  }

  fn key_url(key: &str) -> String {
    format!("/__join/{key}")
  }

  async fn open(
    &self
  ) -> Result<Cache, CacheError> {
    settle(
      Ok(self.caches.open(SETTINGS_BUCKET)),
      CacheError::Settings
    )
    .await?
    .dyn_into::<Cache>()
    .map_err(|e| {
      CacheError::Settings(js_text(&e))
    })
  }
}

impl KeyValueStore for SettingsStore {
  async fn get(
    &self,
    key: &str
  ) -> Result<Option<String>, CacheError>
  {
    let cache = self.open().await?;
    let value = settle(
      Ok(
        cache.match_with_str(
          &Self::key_url(key)
        )
      ),
      CacheError::Settings
    )
    .await?;
    if value.is_undefined() {
      return Ok(None);
    }

    let response = value
      .dyn_into::<Response>()
      .map_err(|e| {
        CacheError::Settings(js_text(&e))
      })?;
    let text =
      settle(response.text(), CacheError::Settings)
        .await?;
    Ok(text.as_string())
  }

  async fn put(
    &self,
    key: &str,
    value: &str
  ) -> Result<(), CacheError> {
    let cache = self.open().await?;
    let response =
      Response::new_with_opt_str(Some(
        value
      ))
      .map_err(|e| {
        CacheError::Settings(js_text(&e))
      })?;
    settle(
      Ok(cache.put_with_str(
        &Self::key_url(key),
        &response
      )),
      CacheError::Settings
    )
    .await
    .map(|_| ())
  }

  async fn remove(
    &self,
    key: &str
  ) -> Result<(), CacheError> {
    let cache = self.open().await?;
    settle(
      Ok(
        cache.delete_with_str(
          &Self::key_url(key)
        )
      ),
      CacheError::Settings
    )
    .await
    .map(|_| ())
  }
}

pub struct BrowserClock;

impl Clock for BrowserClock {
  fn now_ms(&self) -> u64 {
    js_sys::Date::now() as u64
  }

  fn sleep(
    &self,
    ms: u32
  ) -> impl Future<Output = ()> {
    TimeoutFuture::new(ms)
  }
}

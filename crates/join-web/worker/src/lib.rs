//! Service worker compiled to wasm.
//!
//! `sw.js` registers the event listeners synchronously and forwards each
//! event to the exports below, which answer with promises for
//! `waitUntil` / `respondWith`.

mod browser;

use std::cell::RefCell;
use std::rc::Rc;

use join_core::cache::{
  CacheEngine,
  Destination,
  PolicyTable,
  RequestInfo
};
use join_core::config::{
  Config,
  Settings
};
use join_core::error::CacheError;
use join_core::worker::{
  MessageHandler,
  WORKER_VERSION
};
use join_shared::WorkerMessage;
use js_sys::{
  Array,
  Promise,
  Reflect
};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{
  JsFuture,
  future_to_promise
};
use web_sys::{
  Client,
  FetchEvent,
  Request,
  ServiceWorkerGlobalScope
};

use crate::browser::{
  BrowserCache,
  BrowserClock,
  FetchNetwork,
  SettingsStore,
  js_text
};

const EMBEDDED_JOINRC: &str =
  include_str!("../../ui/joinrc");

const OFFLINE_PAGE: &str =
  "/offline.html";

type Engine = CacheEngine<
  FetchNetwork,
  BrowserCache,
  SettingsStore,
  BrowserClock
>;

struct WorkerContext {
  scope:    ServiceWorkerGlobalScope,
  origin:   String,
  settings: Settings,
  engine:   Engine,
  messages: MessageHandler<SettingsStore>
}

thread_local! {
  static CONTEXT: RefCell<Option<Rc<WorkerContext>>> =
    const { RefCell::new(None) };
}

fn context()
-> Result<Rc<WorkerContext>, JsValue> {
  if let Some(ctx) =
    CONTEXT.with(|slot| slot.borrow().clone())
  {
    return Ok(ctx);
  }

  let ctx = Rc::new(build_context()?);
  CONTEXT.with(|slot| {
    *slot.borrow_mut() = Some(ctx.clone())
  });
  Ok(ctx)
}

fn build_context()
-> Result<WorkerContext, JsValue> {
  let scope = js_sys::global()
    .dyn_into::<ServiceWorkerGlobalScope>()?;
  let caches = scope.caches()?;
  let settings =
    Config::from_text(EMBEDDED_JOINRC)
      .and_then(|cfg| cfg.settings())
      .unwrap_or_else(|error| {
        tracing::warn!(
          %error,
          "invalid embedded joinrc; using defaults"
        );
        Settings::default()
      });

  let store =
    Rc::new(SettingsStore::new(caches.clone()));
  let engine = CacheEngine::new(
    Rc::new(FetchNetwork::new(scope.clone())),
    Rc::new(BrowserCache::new(caches)),
    store.clone(),
    Rc::new(BrowserClock),
    PolicyTable::standard(&settings)
  );

  Ok(WorkerContext {
    origin: scope.location().origin(),
    scope,
    settings,
    engine,
    messages: MessageHandler::new(
      store,
      WORKER_VERSION
    )
  })
}

fn to_js(error: CacheError) -> JsValue {
  JsValue::from_str(&error.to_string())
}

#[wasm_bindgen(start)]
pub fn start() {
  console_error_panic_hook::set_once();
  wasm_tracing::set_as_global_default();
  tracing::info!(
    version = WORKER_VERSION,
    "service worker loaded"
  );
}

/// Precaches the app shell and takes
/// over without waiting for old tabs.
#[wasm_bindgen]
pub fn on_install() -> Promise {
  future_to_promise(async move {
    let ctx = context()?;
    ctx
      .engine
      .precache(
        &ctx.origin,
        &ctx.settings.precache
      )
      .await
      .map_err(to_js)?;
    JsFuture::from(ctx.scope.skip_waiting()?)
      .await?;
    Ok(JsValue::UNDEFINED)
  })
}

/// Deletes outdated buckets, claims
/// open tabs and announces the new
/// version.
#[wasm_bindgen]
pub fn on_activate() -> Promise {
  future_to_promise(async move {
    let ctx = context()?;
    let purged = ctx
      .engine
      .purge_stale()
      .await
      .map_err(to_js)?;
    tracing::info!(
      purged = purged.len(),
      "activated"
    );
    JsFuture::from(
      ctx.scope.clients().claim()
    )
    .await?;
    broadcast(&ctx, &ctx.messages.activated())
      .await?;
    Ok(JsValue::UNDEFINED)
  })
}

/// Answers a GET intercepted by
/// `sw.js`. Resolves to a `Response`.
#[wasm_bindgen]
pub fn respond(event: FetchEvent) -> Promise {
  future_to_promise(async move {
    let ctx = context()?;
    let request = event.request();
    let destination =
      string_field(&request, "destination");
    let navigation =
      string_field(&request, "mode")
        == "navigate";
    let info = RequestInfo::new(
      &request.url(),
      Destination::parse(&destination),
      navigation
    )
    .map_err(to_js)?;

    match ctx.engine.handle(&info, request).await {
      | Ok(served) => {
        if let Some(revalidation) =
          served.revalidation
        {
          let keep_alive =
            future_to_promise(async move {
              revalidation.await;
              Ok(JsValue::UNDEFINED)
            });
          if let Err(error) =
            event.wait_until(&keep_alive)
          {
            tracing::debug!(
              error = %js_text(&error),
              "could not extend fetch event"
            );
          }
        }
        Ok(served.response.0.into())
      }
      | Err(error) if navigation => {
        tracing::warn!(
          %error,
          url = %info.url,
          "navigation failed; serving offline page"
        );
        offline_page(&ctx)
          .await
          .ok_or_else(|| to_js(error))
      }
      | Err(error) => Err(to_js(error))
    }
  })
}

/// Applies a page message and
/// broadcasts the reply, if any.
#[wasm_bindgen]
pub fn on_message(data: JsValue) -> Promise {
  future_to_promise(async move {
    let ctx = context()?;
    let message: WorkerMessage =
      serde_wasm_bindgen::from_value(data)
        .map_err(|e| {
          JsValue::from_str(&e.to_string())
        })?;
    if let Some(reply) = ctx
      .messages
      .handle(message)
      .await
      .map_err(to_js)?
    {
      broadcast(&ctx, &reply).await?;
    }
    Ok(JsValue::UNDEFINED)
  })
}

async fn broadcast(
  ctx: &WorkerContext,
  message: &WorkerMessage
) -> Result<(), JsValue> {
  let value = message
    .serialize(
      &serde_wasm_bindgen::Serializer::json_compatible()
    )
    .map_err(|e| {
      JsValue::from_str(&e.to_string())
    })?;
  let clients = JsFuture::from(
    ctx.scope.clients().match_all()
  )
  .await?;

  let clients = Array::from(&clients);
  for client in clients.iter() {
    let client = client.unchecked_into::<Client>();
    if let Err(error) =
      client.post_message(&value)
    {
      tracing::debug!(
        error = %js_text(&error),
        "client unreachable"
      );
    }
  }
  tracing::debug!(
    kind = message.kind(),
    clients = clients.length(),
    "broadcast"
  );
  Ok(())
}

async fn offline_page(
  ctx: &WorkerContext
) -> Option<JsValue> {
  let url =
    format!("{}{OFFLINE_PAGE}", ctx.origin);
  let page =
    ctx.engine.precached(&url).await;
  if page.is_none() {
    tracing::warn!(
      %url,
      "offline page missing from precache"
    );
  }
  page.map(|response| response.0.into())
}

fn string_field(
  request: &Request,
  name: &str
) -> String {
  Reflect::get(request, &JsValue::from_str(name))
    .ok()
    .and_then(|value| value.as_string())
    .unwrap_or_default()
}

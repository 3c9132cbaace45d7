use gloo::events::EventListener;
use join_shared::WorkerMessage;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
  MessageEvent,
  ServiceWorkerRegistration
};
use yew::Callback;

use crate::host::{
  js_text,
  post_to,
  window
};

pub const WORKER_SCRIPT: &str =
  "/sw.js";

/// Page build version; the worker
/// announces its own and a mismatch
/// means a newer deployment is
/// waiting.
pub const PAGE_VERSION: &str =
  env!("CARGO_PKG_VERSION");

/// Registers the worker, asks it for
/// its version once ready and reports
/// newer versions through `on_update`.
/// Dropping the listener stops
/// listening.
pub fn connect(
  on_update: Callback<String>
) -> Option<EventListener> {
  let window = window().ok()?;
  let container =
    window.navigator().service_worker();

  let registration =
    container.register(WORKER_SCRIPT);
  let ready = container.ready();
  let listener_target = container.clone();
  wasm_bindgen_futures::spawn_local(
    async move {
      if let Err(error) =
        JsFuture::from(registration)
          .await
      {
        tracing::warn!(
          error = %js_text(&error),
          "service worker registration failed"
        );
        return;
      }
      tracing::info!(
        script = WORKER_SCRIPT,
        "service worker registered"
      );

      // No controller exists on first
      // install until the worker claims
      // this page.
      let active = match ready {
        | Ok(ready) => {
          JsFuture::from(ready)
            .await
            .ok()
            .and_then(|value| {
              value
                .dyn_into::<ServiceWorkerRegistration>()
                .ok()
            })
            .and_then(|registration| {
              registration.active()
            })
        }
        | Err(error) => {
          tracing::debug!(
            error = %js_text(&error),
            "service worker not ready"
          );
          None
        }
      };
      let target = update_check_target(
        active,
        || container.controller()
      );
      let Some(worker) = target else {
        tracing::debug!(
          "no service worker to ask for updates"
        );
        return;
      };
      if let Err(error) = post_to(
        &worker,
        &WorkerMessage::CheckUpdate
      ) {
        tracing::warn!(
          %error,
          "update check failed"
        );
      }
    }
  );

  Some(EventListener::new(
    &listener_target,
    "message",
    move |event| {
      let Some(event) =
        event.dyn_ref::<MessageEvent>()
      else {
        return;
      };
      let message = match serde_wasm_bindgen::from_value::<WorkerMessage>(
        event.data()
      ) {
        | Ok(message) => message,
        | Err(error) => {
          tracing::debug!(
            %error,
            "ignoring unknown worker message"
          );
          return;
        }
      };

      match message {
        | WorkerMessage::UpdateAvailable {
          version
        } if version != PAGE_VERSION => {
          tracing::info!(
            %version,
            page = PAGE_VERSION,
            "new version available"
          );
          on_update.emit(version);
        }
        | WorkerMessage::Activated {
          version
        } => {
          tracing::info!(
            %version,
            "service worker activated"
          );
        }
        | other => {
          tracing::debug!(
            kind = other.kind(),
            "worker message"
          );
        }
      }
    }
  ))
}

/// The ready registration's active
/// worker, else the page controller.
fn update_check_target<W>(
  active: Option<W>,
  controller: impl FnOnce() -> Option<W>
) -> Option<W> {
  active.or_else(controller)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn active_worker_is_asked_before_controller()
  {
    assert_eq!(
      update_check_target(
        Some("active"),
        || Some("controller")
      ),
      Some("active")
    );
    assert_eq!(
      update_check_target(
        None,
        || Some("controller")
      ),
      Some("controller")
    );
    assert_eq!(
      update_check_target::<&str>(
        None,
        || None
      ),
      None
    );
  }
}

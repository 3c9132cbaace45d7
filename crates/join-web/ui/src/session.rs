use std::rc::Rc;

use gloo::events::EventListener;
use join_core::auth::{
  AuthFeed,
  AuthStream,
  Authenticator
};
use join_shared::{
  SESSION_STORAGE_KEY,
  SessionUser
};
use wasm_bindgen::JsCast;
use web_sys::StorageEvent;

use crate::host::{
  local_storage,
  window
};

/// Auth state backed by the session
/// blob the login page writes. Other
/// tabs signing in or out arrive as
/// `storage` events.
pub struct SessionAuth {
  feed: Rc<AuthFeed>
}

impl SessionAuth {
  pub fn new() -> Self {
    Self {
      feed: Rc::new(AuthFeed::new(
        read_session()
      ))
    }
  }
}

impl Authenticator for SessionAuth {
  fn current_user(
    &self
  ) -> Option<SessionUser> {
    self.feed.current_user()
  }

  fn subscribe(&self) -> AuthStream {
    let stream = self.feed.subscribe();
    let Ok(window) = window() else {
      return stream;
    };

    let feed = Rc::clone(&self.feed);
    let listener = EventListener::new(
      &window,
      "storage",
      move |event| {
        let Some(event) = event
          .dyn_ref::<StorageEvent>()
        else {
          return;
        };
        // `key` is null when storage
        // was cleared wholesale.
        match event.key().as_deref() {
          | Some(SESSION_STORAGE_KEY)
          | None => {
            feed.publish(read_session())
          }
          | Some(_) => {}
        }
      }
    );

    stream.on_unsubscribe(move || {
      drop(listener)
    })
  }
}

fn read_session() -> Option<SessionUser>
{
  let raw = local_storage()
    .ok()?
    .get_item(SESSION_STORAGE_KEY)
    .ok()
    .flatten()?;
  match serde_json::from_str(&raw) {
    | Ok(user) => Some(user),
    | Err(error) => {
      tracing::warn!(
        %error,
        "ignoring malformed session"
      );
      None
    }
  }
}

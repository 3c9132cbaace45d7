use gloo::events::EventListener;
use join_core::error::HostError;
use join_core::theme::ThemeHost;
use join_shared::{
  ResolvedTheme,
  THEME_STORAGE_KEY,
  ThemePreference,
  WorkerMessage
};
use serde::Serialize;
use wasm_bindgen::{
  JsCast,
  JsValue
};
use web_sys::{
  Document,
  Element,
  MediaQueryList,
  MediaQueryListEvent,
  ServiceWorker,
  Storage
};

const DARK_QUERY: &str =
  "(prefers-color-scheme: dark)";

/// Links carrying `data-light` /
/// `data-dark` hrefs get swapped on
/// every theme change.
const THEMED_LINKS: &str =
  "link[data-light][data-dark]";

/// The page's theme capabilities:
/// `data-theme` on `<html>`, themed
/// favicon/manifest links, local
/// storage and the controlling service
/// worker.
#[derive(Default)]
pub struct WebThemeHost;

impl ThemeHost for WebThemeHost {
  type Watch = EventListener;

  fn prefers_dark(
    &self
  ) -> Result<bool, HostError> {
    Ok(dark_query()?.matches())
  }

  fn set_theme_marker(
    &self,
    theme: ResolvedTheme
  ) -> Result<(), HostError> {
    let root = document()?
      .document_element()
      .ok_or_else(|| {
        HostError::Document(
          "missing <html> element"
            .to_string()
        )
      })?;
    root
      .set_attribute(
        "data-theme",
        theme.as_str()
      )
      .map_err(|e| {
        HostError::Document(js_text(
          &e
        ))
      })?;

    let classes = root.class_list();
    let _ = classes.remove_2(
      ResolvedTheme::Light.as_class(),
      ResolvedTheme::Dark.as_class()
    );
    classes
      .add_1(theme.as_class())
      .map_err(|e| {
        HostError::Document(js_text(
          &e
        ))
      })
  }

  fn update_theme_links(
    &self,
    theme: ResolvedTheme
  ) -> Result<(), HostError> {
    let links = document()?
      .query_selector_all(THEMED_LINKS)
      .map_err(|e| {
        HostError::Document(js_text(
          &e
        ))
      })?;

    let attribute =
      format!("data-{}", theme.as_str());
    for idx in 0..links.length() {
      let Some(link) = links
        .item(idx)
        .and_then(|node| {
          node.dyn_into::<Element>().ok()
        })
      else {
        continue;
      };
      if let Some(href) =
        link.get_attribute(&attribute)
      {
        link
          .set_attribute("href", &href)
          .map_err(|e| {
            HostError::Document(
              js_text(&e)
            )
          })?;
      }
    }
    Ok(())
  }

  fn load_preference(
    &self
  ) -> Result<Option<String>, HostError>
  {
    local_storage()?
      .get_item(THEME_STORAGE_KEY)
      .map_err(|e| {
        HostError::Storage(js_text(&e))
      })
  }

  fn store_preference(
    &self,
    preference: ThemePreference
  ) -> Result<(), HostError> {
    local_storage()?
      .set_item(
        THEME_STORAGE_KEY,
        preference.as_str()
      )
      .map_err(|e| {
        HostError::Storage(js_text(&e))
      })
  }

  fn notify_worker(
    &self,
    message: &WorkerMessage
  ) -> Result<(), HostError> {
    post_to_worker(message)
  }

  fn watch_color_scheme(
    &self,
    on_change: Box<dyn Fn(bool)>
  ) -> Result<EventListener, HostError>
  {
    let query = dark_query()?;
    Ok(EventListener::new(
      &query,
      "change",
      move |event| {
        if let Some(event) = event
          .dyn_ref::<MediaQueryListEvent>(
        ) {
          on_change(event.matches());
        }
      }
    ))
  }
}

/// Posts to the controlling worker.
/// A page without one (first load,
/// hard reload) is not an error.
pub fn post_to_worker(
  message: &WorkerMessage
) -> Result<(), HostError> {
  let window = window()?;
  let Some(worker) = window
    .navigator()
    .service_worker()
    .controller()
  else {
    tracing::debug!(
      kind = message.kind(),
      "no controlling service worker"
    );
    return Ok(());
  };
  post_to(&worker, message)
}

/// Posts `message` to a specific
/// worker, e.g. a registration's
/// active one before it controls
/// this page.
pub fn post_to(
  worker: &ServiceWorker,
  message: &WorkerMessage
) -> Result<(), HostError> {
  let value = message
    .serialize(
      &serde_wasm_bindgen::Serializer::json_compatible()
    )
    .map_err(|e| {
      HostError::Messaging(e.to_string())
    })?;
  worker.post_message(&value).map_err(
    |e| {
      HostError::Messaging(js_text(&e))
    }
  )
}

pub fn window()
-> Result<web_sys::Window, HostError> {
  web_sys::window().ok_or_else(|| {
    HostError::Document(
      "no window".to_string()
    )
  })
}

fn document()
-> Result<Document, HostError> {
  window()?.document().ok_or_else(
    || {
      HostError::Document(
        "no document".to_string()
      )
    }
  )
}

pub fn local_storage()
-> Result<Storage, HostError> {
  window()?
    .local_storage()
    .map_err(|e| {
      HostError::Storage(js_text(&e))
    })?
    .ok_or_else(|| {
      HostError::Storage(
        "local storage disabled"
          .to_string()
      )
    })
}

fn dark_query()
-> Result<MediaQueryList, HostError> {
  window()?
    .match_media(DARK_QUERY)
    .map_err(|e| {
      HostError::MediaQuery(js_text(&e))
    })?
    .ok_or_else(|| {
      HostError::MediaQuery(
        DARK_QUERY.to_string()
      )
    })
}

pub fn js_text(value: &JsValue) -> String {
  value
    .as_string()
    .unwrap_or_else(|| format!("{value:?}"))
}

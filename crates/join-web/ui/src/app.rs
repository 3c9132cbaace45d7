use std::cell::RefCell;
use std::rc::Rc;

use chrono::Timelike;
use futures::future::{
  AbortHandle,
  Abortable
};
use gloo::events::EventListener;
use gloo::timers::callback::Timeout;
use join_core::auth::Authenticator;
use join_core::config::{
  Config,
  Settings
};
use join_core::dashboard::{
  DashboardController,
  Greeting
};
use join_core::layout::{
  BreakpointTracker,
  Layout
};
use join_core::stats::TaskSummary;
use join_core::theme::ThemeSynchronizer;
use join_shared::{
  THEME_STORAGE_KEY,
  ThemePreference
};
use wasm_bindgen::JsCast;
use web_sys::StorageEvent;
use yew::{
  Callback,
  Html,
  classes,
  function_component,
  html,
  use_effect_with,
  use_state
};

use crate::components::{
  GreetingPanel,
  Header,
  SummaryCards,
  UpdateBanner
};
use crate::host::{
  WebThemeHost,
  window
};
use crate::rest::RestTaskSource;
use crate::session::SessionAuth;
use crate::view::YewDashboardView;
use crate::worker_link;

const EMBEDDED_JOINRC: &str =
  include_str!("../joinrc");

type Theme =
  ThemeSynchronizer<WebThemeHost>;

#[function_component(App)]
pub fn app() -> Html {
  let settings = use_state(load_settings);
  let theme_sync = {
    let default = settings.theme_default;
    use_state(move || {
      Rc::new(Theme::new(
        Rc::new(WebThemeHost),
        default
      ))
    })
  };
  let theme =
    use_state(|| (*theme_sync).current());
  let loading = use_state(|| true);
  let summary =
    use_state(TaskSummary::default);
  let greeting =
    use_state(|| None::<Greeting>);
  let layout = {
    let breakpoint =
      settings.breakpoint_px;
    use_state(move || {
      Layout::for_width(
        viewport_width(),
        breakpoint
      )
    })
  };
  let update_version =
    use_state(|| None::<String>);

  {
    let theme_sync = theme_sync.clone();
    let theme = theme.clone();
    let settings = settings.clone();
    use_effect_with((), move |_| {
      let report = theme_sync.restore();
      theme.set(report.preference);

      let default =
        settings.theme_default;
      let listener =
        window().ok().map(|window| {
          let sync =
            Rc::clone(&*theme_sync);
          EventListener::new(
            &window,
            "storage",
            move |event| {
              adopt_from_other_tab(
                &sync, &theme, default,
                event
              )
            }
          )
        });
      move || drop(listener)
    });
  }

  {
    let settings = (*settings).clone();
    let view = YewDashboardView {
      loading:  setter(&loading),
      summary:  setter(&summary),
      greeting: {
        let greeting = greeting.clone();
        Callback::from(
          move |value: Greeting| {
            greeting.set(Some(value))
          }
        )
      },
      layout:   setter(&layout)
    };
    use_effect_with((), move |_| {
      start_dashboard(&settings, view)
    });
  }

  {
    let update_version =
      update_version.clone();
    use_effect_with((), move |_| {
      let listener =
        worker_link::connect(
          Callback::from(
            move |version: String| {
              update_version
                .set(Some(version))
            }
          )
        );
      move || drop(listener)
    });
  }

  let on_toggle_theme = {
    let theme_sync = theme_sync.clone();
    let theme = theme.clone();
    Callback::from(move |()| {
      let report = theme_sync.cycle();
      theme.set(report.preference);
    })
  };

  let on_reload = Callback::from(|()| {
    if let Ok(window) = window() {
      let _ = window.location().reload();
    }
  });

  html! {
      <div class={classes!("app", (*layout).as_class())}>
          <Header theme={*theme} on_toggle_theme={on_toggle_theme} />
          <UpdateBanner version={(*update_version).clone()} on_reload={on_reload} />
          <main class="content">
              if *loading {
                  <div class="loading" aria-busy="true">{ "Loading…" }</div>
              } else {
                  <GreetingPanel greeting={(*greeting).clone()} />
                  <SummaryCards summary={(*summary).clone()} />
              }
          </main>
      </div>
  }
}

fn setter<T: 'static>(
  handle: &yew::UseStateHandle<T>
) -> Callback<T> {
  let handle = handle.clone();
  Callback::from(move |value: T| {
    handle.set(value)
  })
}

/// Spawns the controller over the
/// session feed and wires debounced
/// resize handling. The returned
/// closure stops both.
fn start_dashboard(
  settings: &Settings,
  view: YewDashboardView
) -> Box<dyn FnOnce()> {
  let controller =
    Rc::new(DashboardController::new(
      view,
      RestTaskSource::new(
        settings.database_url.clone()
      ),
      || chrono::Local::now().hour()
    ));

  let auth = SessionAuth::new();
  let stream = auth.subscribe();
  let (abort, registration) =
    AbortHandle::new_pair();
  {
    let controller =
      Rc::clone(&controller);
    wasm_bindgen_futures::spawn_local(
      async move {
        let run = controller.run(stream);
        if Abortable::new(
          run,
          registration
        )
        .await
        .is_err()
        {
          tracing::debug!(
            "dashboard stopped"
          );
        }
      }
    );
  }

  let tracker =
    Rc::new(RefCell::new(
      BreakpointTracker::new(
        settings.breakpoint_px,
        settings.debounce_ms,
        viewport_width()
      )
    ));
  let pending: Rc<
    RefCell<Option<Timeout>>
  > = Rc::new(RefCell::new(None));
  let resize = window().ok().map(
    |window| {
      let pending = Rc::clone(&pending);
      EventListener::new(
        &window,
        "resize",
        move |_| {
          let now = now_ms();
          let deadline = tracker
            .borrow_mut()
            .on_resize(
              viewport_width(),
              now
            );
          let delay = u32::try_from(
            deadline.saturating_sub(now)
          )
          .unwrap_or(u32::MAX);

          let tracker =
            Rc::clone(&tracker);
          let controller =
            Rc::clone(&controller);
          // Replacing the timeout
          // cancels the previous one.
          *pending.borrow_mut() = Some(
            Timeout::new(delay, move || {
              let settled = tracker
                .borrow_mut()
                .settle(
                  now_ms().max(deadline)
                );
              if let Some(layout) = settled
              {
                controller
                  .set_layout(layout);
              }
            })
          );
        }
      )
    }
  );

  Box::new(move || {
    abort.abort();
    drop(resize);
    pending.borrow_mut().take();
    drop(auth);
  })
}

/// Follows a preference change made
/// in another tab. A removed key or a
/// cleared storage area falls back to
/// the configured default.
fn adopt_from_other_tab(
  sync: &Theme,
  theme: &yew::UseStateHandle<
    ThemePreference
  >,
  default: ThemePreference,
  event: &web_sys::Event
) {
  let Some(event) =
    event.dyn_ref::<StorageEvent>()
  else {
    return;
  };
  let raw = match event.key().as_deref() {
    | Some(THEME_STORAGE_KEY) => {
      event.new_value()
    }
    | None => None,
    | Some(_) => return
  };
  let preference =
    stored_or_default(raw, default);
  let report = sync.adopt(preference);
  theme.set(report.preference);
}

fn stored_or_default(
  raw: Option<String>,
  default: ThemePreference
) -> ThemePreference {
  raw
    .and_then(|raw| raw.parse().ok())
    .unwrap_or(default)
}

fn load_settings() -> Settings {
  Config::from_text(EMBEDDED_JOINRC)
    .and_then(|cfg| cfg.settings())
    .unwrap_or_else(|error| {
      tracing::warn!(
        %error,
        "invalid embedded joinrc; using defaults"
      );
      Settings::default()
    })
}

fn viewport_width() -> u32 {
  window()
    .ok()
    .and_then(|window| {
      window.inner_width().ok()
    })
    .and_then(|width| width.as_f64())
    .map(|width| width.max(0.0) as u32)
    .unwrap_or(0)
}

fn now_ms() -> u64 {
  js_sys::Date::now() as u64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn removed_preference_uses_configured_default()
  {
    assert_eq!(
      stored_or_default(
        None,
        ThemePreference::Dark
      ),
      ThemePreference::Dark
    );
    assert_eq!(
      stored_or_default(
        Some("sepia".to_string()),
        ThemePreference::Light
      ),
      ThemePreference::Light
    );
    assert_eq!(
      stored_or_default(
        Some("dark".to_string()),
        ThemePreference::Device
      ),
      ThemePreference::Dark
    );
  }
}

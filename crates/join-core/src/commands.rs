use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, anyhow};
use chrono::Timelike;
use chrono_tz::Tz;
use join_shared::{ResolvedTheme, SessionUser, ThemePreference, WorkerMessage};
use tracing::{debug, info, warn};

use crate::auth::{AuthState, AuthStream};
use crate::cache::{Destination, PolicyTable, RequestInfo};
use crate::cli::Command;
use crate::config::{Config, Settings};
use crate::dashboard::{DashboardController, DashboardView, Greeting};
use crate::datastore::DataStore;
use crate::error::HostError;
use crate::layout::Layout;
use crate::render::Renderer;
use crate::stats::TaskSummary;
use crate::theme::{ThemeHost, ThemeSynchronizer};

#[tracing::instrument(skip(cfg, renderer, command))]
pub fn dispatch(cfg: &Config, data_dir: &Path, renderer: &Renderer, command: Command) -> anyhow::Result<()> {
    let settings = cfg.settings().context("invalid configuration")?;

    match command {
        Command::Summary { user, timezone } => {
            let store = DataStore::open(data_dir)?;
            let user = session_user(cfg, user);
            let tz = timezone
                .or_else(|| cfg.get("greeting.timezone"))
                .map(|name| name.parse::<Tz>().map_err(|e| anyhow!("unknown timezone {name}: {e}")))
                .transpose()?;
            cmd_summary(store, renderer, user, tz)
        }
        Command::Theme {
            preference,
            system,
            next,
        } => cmd_theme(data_dir, &settings, renderer, preference, system, next),
        Command::Route {
            url,
            destination,
            navigate,
        } => {
            let table = PolicyTable::standard(&settings);
            let info = RequestInfo::new(&url, Destination::parse(&destination), navigate)?;
            renderer.print_route(&info, table.classify(&info))
        }
        Command::Policies => renderer.print_policies(&PolicyTable::standard(&settings)),
    }
}

fn session_user(cfg: &Config, user: Option<String>) -> SessionUser {
    match user.or_else(|| cfg.get("session.user")) {
        Some(uid) => SessionUser {
            uid,
            name: cfg.get("session.name"),
            guest: false,
        },
        None => {
            debug!("no user configured; summarising as guest");
            SessionUser {
                uid: "guest".to_string(),
                name: None,
                guest: true,
            }
        }
    }
}

fn cmd_summary(store: DataStore, renderer: &Renderer, user: SessionUser, tz: Option<Tz>) -> anyhow::Result<()> {
    let view = TerminalView {
        renderer: renderer.clone(),
    };
    let hour_of_day = move || match tz {
        Some(tz) => chrono::Utc::now().with_timezone(&tz).hour(),
        None => chrono::Local::now().hour(),
    };
    let controller = DashboardController::new(view, store, hour_of_day);

    let auth = AuthStream::from_states([AuthState::SignedIn(user)]);
    futures::executor::block_on(controller.run(auth));
    Ok(())
}

/// Prints what the summary page would render.
struct TerminalView {
    renderer: Renderer,
}

impl DashboardView for TerminalView {
    fn show_loading(&self) {
        debug!("loading summary");
    }

    fn hide_loading(&self) {}

    fn render_summary(&self, summary: &TaskSummary) {
        if let Err(error) = self.renderer.print_summary(summary) {
            warn!(%error, "failed printing summary");
        }
    }

    fn render_greeting(&self, greeting: &Greeting) {
        if let Err(error) = self.renderer.print_greeting(greeting) {
            warn!(%error, "failed printing greeting");
        }
    }

    fn set_layout(&self, _layout: Layout) {}
}

fn cmd_theme(
    data_dir: &Path,
    settings: &Settings,
    renderer: &Renderer,
    preference: Option<ThemePreference>,
    system: Option<ResolvedTheme>,
    next: bool,
) -> anyhow::Result<()> {
    let host = Rc::new(FileThemeHost::new(data_dir.join("theme"), system));
    let sync = ThemeSynchronizer::new(host, settings.theme_default);

    let report = match (preference, next) {
        (Some(preference), _) => sync.apply(preference),
        (None, true) => {
            sync.restore();
            sync.cycle()
        }
        (None, false) => sync.adopt(sync.initial_preference()),
    };

    if let Some(marker) = sync.host().marker.get() {
        debug!(marker = marker.as_class(), "theme marker set");
    }
    renderer.print_theme(&report)
}

/// Theme host for the terminal: the preference lives in a file in the data
/// directory and the OS colour scheme is whatever `--system` says.
struct FileThemeHost {
    path: PathBuf,
    system: Option<ResolvedTheme>,
    marker: Cell<Option<ResolvedTheme>>,
}

impl FileThemeHost {
    fn new(path: PathBuf, system: Option<ResolvedTheme>) -> Self {
        Self {
            path,
            system,
            marker: Cell::new(None),
        }
    }
}

impl ThemeHost for FileThemeHost {
    type Watch = ();

    fn prefers_dark(&self) -> Result<bool, HostError> {
        self.system
            .map(|theme| theme == ResolvedTheme::Dark)
            .ok_or_else(|| HostError::MediaQuery("pass --system light|dark".to_string()))
    }

    fn set_theme_marker(&self, theme: ResolvedTheme) -> Result<(), HostError> {
        self.marker.set(Some(theme));
        Ok(())
    }

    fn update_theme_links(&self, _theme: ResolvedTheme) -> Result<(), HostError> {
        Ok(())
    }

    fn load_preference(&self) -> Result<Option<String>, HostError> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(|raw| Some(raw.trim().to_string()))
            .map_err(|e| HostError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn store_preference(&self, preference: ThemePreference) -> Result<(), HostError> {
        fs::write(&self.path, preference.as_str())
            .map_err(|e| HostError::Storage(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), %preference, "stored theme preference");
        Ok(())
    }

    fn notify_worker(&self, message: &WorkerMessage) -> Result<(), HostError> {
        debug!(kind = message.kind(), "no service worker outside the browser");
        Ok(())
    }

    fn watch_color_scheme(&self, _on_change: Box<dyn Fn(bool)>) -> Result<(), HostError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_host_round_trips_preference_through_synchronizer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("theme");

        let first = ThemeSynchronizer::new(
            Rc::new(FileThemeHost::new(path.clone(), Some(ResolvedTheme::Dark))),
            ThemePreference::Device,
        );
        let report = first.apply(ThemePreference::Light);
        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(&path).expect("read"), "light");

        let second = ThemeSynchronizer::new(
            Rc::new(FileThemeHost::new(path, Some(ResolvedTheme::Dark))),
            ThemePreference::Device,
        );
        let restored = second.restore();
        assert_eq!(restored.preference, ThemePreference::Light);
        assert_eq!(second.cycle().preference, ThemePreference::Dark);
    }

    #[test]
    fn device_without_system_hint_resolves_light() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = ThemeSynchronizer::new(
            Rc::new(FileThemeHost::new(dir.path().join("theme"), None)),
            ThemePreference::Device,
        );
        let report = sync.apply(ThemePreference::Device);
        assert_eq!(report.resolved, ResolvedTheme::Light);
        assert_eq!(sync.host().marker.get(), Some(ResolvedTheme::Light));
    }

    #[test]
    fn missing_user_falls_back_to_guest() {
        let cfg = Config::default();
        assert!(session_user(&cfg, None).guest);

        let mut cfg = Config::default();
        cfg.apply_overrides([("rc.session.user".to_string(), "u7".to_string())]);
        let user = session_user(&cfg, None);
        assert_eq!((user.uid.as_str(), user.guest), ("u7", false));
    }
}

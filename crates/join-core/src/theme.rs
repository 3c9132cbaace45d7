//! Theme preference state machine and its synchronisation with the page,
//! local storage and the service worker.
//!
//! The preference is tri-state (`device`, `light`, `dark`); what gets
//! rendered is always one of two [`ResolvedTheme`] values. Everything the
//! browser does is reached through [`ThemeHost`], so the ordering and
//! listener bookkeeping can be exercised without a DOM.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use join_shared::{ResolvedTheme, SettingsPayload, ThemePreference, WorkerMessage};
use tracing::{debug, info, warn};

use crate::error::HostError;

/// Resolves a preference against the OS colour-scheme signal.
pub fn resolve(preference: ThemePreference, prefers_dark: bool) -> ResolvedTheme {
    match preference {
        ThemePreference::Light => ResolvedTheme::Light,
        ThemePreference::Dark => ResolvedTheme::Dark,
        ThemePreference::Device if prefers_dark => ResolvedTheme::Dark,
        ThemePreference::Device => ResolvedTheme::Light,
    }
}

/// Browser capabilities the synchroniser needs.
pub trait ThemeHost {
    /// Dropping the watch removes the colour-scheme listener.
    type Watch;

    fn prefers_dark(&self) -> Result<bool, HostError>;

    fn set_theme_marker(&self, theme: ResolvedTheme) -> Result<(), HostError>;

    /// Favicon, manifest and other theme-dependent links.
    fn update_theme_links(&self, theme: ResolvedTheme) -> Result<(), HostError>;

    fn load_preference(&self) -> Result<Option<String>, HostError>;

    fn store_preference(&self, preference: ThemePreference) -> Result<(), HostError>;

    fn notify_worker(&self, message: &WorkerMessage) -> Result<(), HostError>;

    /// Calls `on_change` with the new "prefers dark" value whenever the OS
    /// colour scheme flips.
    fn watch_color_scheme(&self, on_change: Box<dyn Fn(bool)>) -> Result<Self::Watch, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Marker,
    Links,
    Persist,
    Notify,
    Watch,
}

/// Outcome of [`ThemeSynchronizer::apply`]. Failed steps are listed but
/// never abort the remaining ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub preference: ThemePreference,
    pub resolved: ResolvedTheme,
    pub failures: Vec<(ApplyStep, HostError)>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, step: ApplyStep) -> bool {
        self.failures.iter().any(|(s, _)| *s == step)
    }
}

/// Holds the current preference and the single active colour-scheme watch.
pub struct ThemeSynchronizer<H: ThemeHost> {
    host: Rc<H>,
    default: ThemePreference,
    current: Cell<Option<ThemePreference>>,
    watch: RefCell<Option<H::Watch>>,
}

impl<H> ThemeSynchronizer<H>
where
    H: ThemeHost + 'static,
{
    pub fn new(host: Rc<H>, default: ThemePreference) -> Self {
        Self {
            host,
            default,
            current: Cell::new(None),
            watch: RefCell::new(None),
        }
    }

    pub fn host(&self) -> &Rc<H> {
        &self.host
    }

    /// Preference in effect for this session.
    pub fn current(&self) -> ThemePreference {
        self.current.get().unwrap_or(self.default)
    }

    pub fn is_watching(&self) -> bool {
        self.watch.borrow().is_some()
    }

    /// Stored preference, falling back to the session value and then the
    /// configured default when storage is unreadable or holds junk.
    pub fn initial_preference(&self) -> ThemePreference {
        match self.host.load_preference() {
            Ok(Some(raw)) => match raw.parse::<ThemePreference>() {
                Ok(preference) => preference,
                Err(error) => {
                    warn!(%error, "ignoring stored theme preference");
                    self.default
                }
            },
            Ok(None) => self.default,
            Err(error) => {
                warn!(%error, "theme storage unreadable; using session preference");
                self.current()
            }
        }
    }

    pub fn resolve(&self, preference: ThemePreference) -> ResolvedTheme {
        let prefers_dark = match preference {
            ThemePreference::Device => self.host.prefers_dark().unwrap_or_else(|error| {
                warn!(%error, "colour scheme unavailable; assuming light");
                false
            }),
            _ => false,
        };
        resolve(preference, prefers_dark)
    }

    /// Applies the stored (or default) preference on page load.
    pub fn restore(&self) -> ApplyReport {
        let preference = self.initial_preference();
        self.apply(preference)
    }

    pub fn cycle(&self) -> ApplyReport {
        self.apply(self.current().next())
    }

    /// Resolve, mark the document, update links, persist, then notify the
    /// worker. Persisting precedes the notification so a tab woken by the
    /// worker reads the new value from storage.
    #[tracing::instrument(skip(self))]
    pub fn apply(&self, preference: ThemePreference) -> ApplyReport {
        self.current.set(Some(preference));
        let resolved = self.resolve(preference);
        let mut failures = render(self.host.as_ref(), resolved);

        if let Err(error) = self.host.store_preference(preference) {
            warn!(%error, "failed persisting theme preference; kept in memory");
            failures.push((ApplyStep::Persist, error));
        }

        let message = WorkerMessage::SyncSettings {
            payload: SettingsPayload::theme(preference),
        };
        if let Err(error) = self.host.notify_worker(&message) {
            warn!(%error, "failed notifying service worker");
            failures.push((ApplyStep::Notify, error));
        }

        if let Err(error) = self.rewatch(preference) {
            failures.push((ApplyStep::Watch, error));
        }

        info!(
            preference = %preference,
            resolved = resolved.as_str(),
            failures = failures.len(),
            "applied theme"
        );
        ApplyReport {
            preference,
            resolved,
            failures,
        }
    }

    /// Renders a preference another tab already persisted, without writing
    /// it back or notifying the worker again.
    #[tracing::instrument(skip(self))]
    pub fn adopt(&self, preference: ThemePreference) -> ApplyReport {
        self.current.set(Some(preference));
        let resolved = self.resolve(preference);
        let mut failures = render(self.host.as_ref(), resolved);
        if let Err(error) = self.rewatch(preference) {
            failures.push((ApplyStep::Watch, error));
        }
        ApplyReport {
            preference,
            resolved,
            failures,
        }
    }

    /// Tears down any existing watch before installing a new one, so at most
    /// one listener is ever active.
    fn rewatch(&self, preference: ThemePreference) -> Result<(), HostError> {
        if let Some(previous) = self.watch.borrow_mut().take() {
            drop(previous);
            debug!("removed colour-scheme listener");
        }

        if preference != ThemePreference::Device {
            return Ok(());
        }

        let host: Weak<H> = Rc::downgrade(&self.host);
        let on_change = Box::new(move |prefers_dark: bool| {
            let Some(host) = host.upgrade() else {
                return;
            };
            let resolved = resolve(ThemePreference::Device, prefers_dark);
            debug!(resolved = resolved.as_str(), "os colour scheme changed");
            render(host.as_ref(), resolved);
        });

        match self.host.watch_color_scheme(on_change) {
            Ok(watch) => {
                *self.watch.borrow_mut() = Some(watch);
                debug!("installed colour-scheme listener");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "failed installing colour-scheme listener");
                Err(error)
            }
        }
    }
}

fn render<H: ThemeHost + ?Sized>(host: &H, resolved: ResolvedTheme) -> Vec<(ApplyStep, HostError)> {
    let mut failures = vec![];
    if let Err(error) = host.set_theme_marker(resolved) {
        warn!(%error, "failed setting theme marker");
        failures.push((ApplyStep::Marker, error));
    }
    if let Err(error) = host.update_theme_links(resolved) {
        warn!(%error, "failed updating theme links");
        failures.push((ApplyStep::Links, error));
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Marker(ResolvedTheme),
        Links(ResolvedTheme),
        Stored(ThemePreference),
        Notified(WorkerMessage),
        Watched,
        Unwatched,
    }

    struct Guard {
        active: Rc<Cell<usize>>,
        log: Rc<RefCell<Vec<Event>>>,
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            self.active.set(self.active.get() - 1);
            self.log.borrow_mut().push(Event::Unwatched);
        }
    }

    #[derive(Default)]
    struct Host {
        dark: Cell<bool>,
        stored: RefCell<Option<String>>,
        storage_broken: Cell<bool>,
        marker_broken: Cell<bool>,
        log: Rc<RefCell<Vec<Event>>>,
        active_watches: Rc<Cell<usize>>,
        listeners: RefCell<Vec<Rc<dyn Fn(bool)>>>,
    }

    impl Host {
        fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        fn events(&self) -> Vec<Event> {
            self.log.borrow().clone()
        }

        fn os_flip(&self, dark: bool) {
            self.dark.set(dark);
            let listeners = self.listeners.borrow().clone();
            for listener in listeners {
                listener(dark);
            }
        }
    }

    impl ThemeHost for Host {
        type Watch = Guard;

        fn prefers_dark(&self) -> Result<bool, HostError> {
            Ok(self.dark.get())
        }

        fn set_theme_marker(&self, theme: ResolvedTheme) -> Result<(), HostError> {
            if self.marker_broken.get() {
                return Err(HostError::Document("no <html>".into()));
            }
            self.log.borrow_mut().push(Event::Marker(theme));
            Ok(())
        }

        fn update_theme_links(&self, theme: ResolvedTheme) -> Result<(), HostError> {
            self.log.borrow_mut().push(Event::Links(theme));
            Ok(())
        }

        fn load_preference(&self) -> Result<Option<String>, HostError> {
            if self.storage_broken.get() {
                return Err(HostError::Storage("disabled".into()));
            }
            Ok(self.stored.borrow().clone())
        }

        fn store_preference(&self, preference: ThemePreference) -> Result<(), HostError> {
            if self.storage_broken.get() {
                return Err(HostError::Storage("quota".into()));
            }
            *self.stored.borrow_mut() = Some(preference.as_str().to_string());
            self.log.borrow_mut().push(Event::Stored(preference));
            Ok(())
        }

        fn notify_worker(&self, message: &WorkerMessage) -> Result<(), HostError> {
            self.log.borrow_mut().push(Event::Notified(message.clone()));
            Ok(())
        }

        fn watch_color_scheme(&self, on_change: Box<dyn Fn(bool)>) -> Result<Guard, HostError> {
            let active = self.active_watches.clone();
            active.set(active.get() + 1);
            self.listeners.borrow_mut().push(Rc::from(on_change));
            self.log.borrow_mut().push(Event::Watched);
            Ok(Guard {
                active,
                log: self.log.clone(),
            })
        }
    }

    #[test]
    fn resolve_is_identity_for_concrete_preferences() {
        for dark in [false, true] {
            assert_eq!(resolve(ThemePreference::Light, dark), ResolvedTheme::Light);
            assert_eq!(resolve(ThemePreference::Dark, dark), ResolvedTheme::Dark);
        }
        assert_eq!(resolve(ThemePreference::Device, true), ResolvedTheme::Dark);
        assert_eq!(resolve(ThemePreference::Device, false), ResolvedTheme::Light);
    }

    #[test]
    fn persists_before_notifying_worker() {
        let host = Host::new();
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Device);

        let report = sync.apply(ThemePreference::Dark);
        assert!(report.is_clean());
        assert_eq!(
            host.events(),
            vec![
                Event::Marker(ResolvedTheme::Dark),
                Event::Links(ResolvedTheme::Dark),
                Event::Stored(ThemePreference::Dark),
                Event::Notified(WorkerMessage::SyncSettings {
                    payload: SettingsPayload::theme(ThemePreference::Dark)
                }),
            ]
        );
    }

    #[test]
    fn only_one_listener_survives_repeated_device_applies() {
        let host = Host::new();
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Device);

        for _ in 0..4 {
            sync.apply(ThemePreference::Device);
            assert_eq!(host.active_watches.get(), 1);
        }
        sync.apply(ThemePreference::Light);
        assert_eq!(host.active_watches.get(), 0);
        assert!(!sync.is_watching());
    }

    #[test]
    fn os_change_rerenders_without_persisting() {
        let host = Host::new();
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Device);
        sync.apply(ThemePreference::Device);
        host.log.borrow_mut().clear();

        host.os_flip(true);
        assert_eq!(
            host.events(),
            vec![Event::Marker(ResolvedTheme::Dark), Event::Links(ResolvedTheme::Dark)]
        );
    }

    #[test]
    fn storage_failure_keeps_session_preference() {
        let host = Host::new();
        host.storage_broken.set(true);
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Light);

        let report = sync.apply(ThemePreference::Dark);
        assert!(report.failed(ApplyStep::Persist));
        assert!(!report.failed(ApplyStep::Notify));
        assert_eq!(sync.initial_preference(), ThemePreference::Dark);
        assert_eq!(sync.current(), ThemePreference::Dark);
    }

    #[test]
    fn marker_failure_does_not_block_later_steps() {
        let host = Host::new();
        host.marker_broken.set(true);
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Device);

        let report = sync.apply(ThemePreference::Light);
        assert!(report.failed(ApplyStep::Marker));
        assert!(host.events().contains(&Event::Stored(ThemePreference::Light)));
        assert_eq!(report.resolved, ResolvedTheme::Light);
    }

    #[test]
    fn restore_reads_stored_value_and_cycle_rotates() {
        let host = Host::new();
        *host.stored.borrow_mut() = Some("light".to_string());
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Device);

        assert_eq!(sync.restore().preference, ThemePreference::Light);
        assert_eq!(sync.cycle().preference, ThemePreference::Dark);
        assert_eq!(sync.cycle().preference, ThemePreference::Device);
        assert_eq!(sync.cycle().preference, ThemePreference::Light);
    }

    #[test]
    fn junk_in_storage_falls_back_to_default() {
        let host = Host::new();
        *host.stored.borrow_mut() = Some("sepia".to_string());
        let sync = ThemeSynchronizer::new(host, ThemePreference::Dark);
        assert_eq!(sync.initial_preference(), ThemePreference::Dark);
    }

    #[test]
    fn adopt_skips_persist_and_notify() {
        let host = Host::new();
        let sync = ThemeSynchronizer::new(host.clone(), ThemePreference::Light);
        sync.adopt(ThemePreference::Device);
        let events = host.events();
        assert!(events.iter().all(|e| !matches!(e, Event::Stored(_) | Event::Notified(_))));
        assert!(events.contains(&Event::Watched));
        assert!(sync.is_watching());
    }
}

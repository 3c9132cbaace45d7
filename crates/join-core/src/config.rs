use std::collections::HashMap;
#[cfg(feature = "cli")]
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "cli")]
use anyhow::{Context, anyhow};
use join_shared::ThemePreference;
use tracing::{debug, trace, warn};
#[cfg(feature = "cli")]
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_BREAKPOINT_PX: u32 = 1024;
pub const DEFAULT_DEBOUNCE_MS: u32 = 150;
pub const DEFAULT_NETWORK_TIMEOUT_MS: u32 = 3_000;

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("data.location".to_string(), "~/.join".to_string());
        map.insert("theme.default".to_string(), "device".to_string());
        map.insert(
            "layout.breakpoint".to_string(),
            DEFAULT_BREAKPOINT_PX.to_string(),
        );
        map.insert(
            "layout.debounce".to_string(),
            DEFAULT_DEBOUNCE_MS.to_string(),
        );
        map.insert(
            "cache.network_timeout".to_string(),
            DEFAULT_NETWORK_TIMEOUT_MS.to_string(),
        );
        map.insert("color".to_string(), "on".to_string());
        Self {
            map,
            loaded_files: vec![],
        }
    }
}

impl Config {
    #[cfg(feature = "cli")]
    #[tracing::instrument(skip(joinrc_override))]
    pub fn load(joinrc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        let joinrc = resolve_joinrc_path(joinrc_override)?;
        if let Some(path) = joinrc {
            info!(joinrc = %path.display(), "loading joinrc");
            cfg.load_file(&path)?;
        } else {
            warn!("no joinrc found; using defaults");
        }

        Ok(cfg)
    }

    /// Parses rc text that is not backed by a file (the web crates embed
    /// theirs). `include` lines are skipped since there is no base dir.
    pub fn from_text(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        cfg.apply_text(text, None)?;
        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        match self.map.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| ConfigError::Value {
                    key: key.to_string(),
                    value: raw.clone(),
                }),
            None => Ok(None),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    /// Typed view used by the dashboard, theme and worker code.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let theme_default = match self.get("theme.default") {
            Some(raw) => raw.parse::<ThemePreference>().map_err(|_| ConfigError::Value {
                key: "theme.default".to_string(),
                value: raw,
            })?,
            None => ThemePreference::Device,
        };

        Ok(Settings {
            theme_default,
            breakpoint_px: self
                .get_u32("layout.breakpoint")?
                .unwrap_or(DEFAULT_BREAKPOINT_PX),
            debounce_ms: self
                .get_u32("layout.debounce")?
                .unwrap_or(DEFAULT_DEBOUNCE_MS),
            network_timeout_ms: self
                .get_u32("cache.network_timeout")?
                .unwrap_or(DEFAULT_NETWORK_TIMEOUT_MS),
            database_url: self
                .get("data.database_url")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            precache: self
                .get("cache.precache")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|entry| !entry.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_else(default_precache),
        })
    }

    #[cfg(feature = "cli")]
    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for include in self
            .apply_text(&text, Some(&base_dir))
            .with_context(|| format!("failed to parse {}", path.display()))?
        {
            if include.exists() {
                self.load_file(&include)?;
            } else {
                warn!(include = %include.display(), "include file does not exist; skipping");
            }
        }

        Ok(())
    }

    /// Applies `key = value` lines and returns resolved include paths.
    fn apply_text(
        &mut self,
        text: &str,
        base_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>, ConfigError> {
        let mut includes = vec![];

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }

            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                match base_dir {
                    Some(base) => {
                        let include_path = resolve_include_path(base, include_rest.trim())
                            .ok_or_else(|| ConfigError::Syntax {
                                line: line_num + 1,
                                text: raw_line.to_string(),
                            })?;
                        debug!(
                            include = %include_path.display(),
                            line = line_num + 1,
                            "processing include"
                        );
                        includes.push(include_path);
                    }
                    None => {
                        warn!(line = line_num + 1, "include outside a file; skipping");
                    }
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| ConfigError::Syntax {
                line: line_num + 1,
                text: raw_line.to_string(),
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(includes)
    }
}

/// Typed settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub theme_default: ThemePreference,
    pub breakpoint_px: u32,
    pub debounce_ms: u32,
    pub network_timeout_ms: u32,
    pub database_url: Option<String>,
    pub precache: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme_default: ThemePreference::Device,
            breakpoint_px: DEFAULT_BREAKPOINT_PX,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            database_url: None,
            precache: default_precache(),
        }
    }
}

impl Settings {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.network_timeout_ms))
    }
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/summary.html",
        "/manifest.webmanifest",
        "/offline.html",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(feature = "cli")]
#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[cfg(feature = "cli")]
#[tracing::instrument(skip(override_path))]
fn resolve_joinrc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(joinrc_env) = std::env::var("JOINRC") {
        if joinrc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(joinrc_env)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(".joinrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

#[cfg(feature = "cli")]
fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".join"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> Option<PathBuf> {
    if include.trim().is_empty() {
        return None;
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Some(expanded)
    } else {
        Some(base_dir.join(expanded))
    }
}

#[cfg(feature = "cli")]
fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(not(feature = "cli"))]
fn expand_tilde(path: &Path) -> PathBuf {
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_standard_settings() {
        let settings = Config::default().settings().expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn text_overrides_typed_settings() {
        let cfg = Config::from_text(
            "# dashboard\n\
             theme.default = dark\n\
             layout.breakpoint = 800  # tablets\n\
             data.database_url = https://join-demo.europe-west1.firebasedatabase.app/\n\
             cache.precache = /, /summary.html\n",
        )
        .expect("parse");
        let settings = cfg.settings().expect("settings");
        assert_eq!(settings.theme_default, ThemePreference::Dark);
        assert_eq!(settings.breakpoint_px, 800);
        assert_eq!(
            settings.database_url.as_deref(),
            Some("https://join-demo.europe-west1.firebasedatabase.app")
        );
        assert_eq!(settings.precache, vec!["/", "/summary.html"]);
    }

    #[test]
    fn rejects_line_without_equals() {
        let err = Config::from_text("theme.default\n").expect_err("syntax error");
        assert_eq!(
            err,
            ConfigError::Syntax {
                line: 1,
                text: "theme.default".to_string()
            }
        );
    }

    #[test]
    fn rejects_non_numeric_breakpoint() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("rc.layout.breakpoint".to_string(), "wide".to_string())]);
        assert!(matches!(cfg.settings(), Err(ConfigError::Value { .. })));
    }

    #[test]
    fn overrides_strip_rc_prefix() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("rc.color".to_string(), "off".to_string())]);
        assert_eq!(cfg.get_bool("color"), Some(false));
    }

    #[cfg(feature = "cli")]
    #[test]
    fn load_follows_includes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let extra = temp.path().join("extra.rc");
        fs::write(&extra, "layout.debounce = 300\n").expect("write include");
        let main = temp.path().join("joinrc");
        fs::write(&main, "theme.default = light\ninclude extra.rc\n").expect("write rc");

        let cfg = Config::load(Some(main.as_path())).expect("load");
        let settings = cfg.settings().expect("settings");
        assert_eq!(settings.theme_default, ThemePreference::Light);
        assert_eq!(settings.debounce_ms, 300);
        assert_eq!(cfg.loaded_files.len(), 2);
    }
}

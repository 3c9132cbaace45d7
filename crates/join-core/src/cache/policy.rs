use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::CACHE_VERSION;
use crate::config::Settings;
use crate::error::CacheError;

const MINUTE: u64 = 60;
const DAY: u64 = 24 * 60 * MINUTE;

/// `Request.destination` values the table distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Style,
    Script,
    Worker,
    Image,
    Font,
    Manifest,
    Other,
}

impl Destination {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "worker" | "sharedworker" | "serviceworker" => Self::Worker,
            "image" => Self::Image,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
    NetworkOnly,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkFirst => "network-first",
            Self::CacheFirst => "cache-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::NetworkOnly => "network-only",
        }
    }
}

/// What the worker needs to know about an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub url: String,
    pub host: String,
    pub path: String,
    pub destination: Destination,
    pub navigation: bool,
}

impl RequestInfo {
    pub fn new(url: &str, destination: Destination, navigation: bool) -> Result<Self, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            url: parsed.as_str().to_string(),
            host: parsed.host_str().unwrap_or_default().to_ascii_lowercase(),
            path: parsed.path().to_string(),
            destination,
            navigation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "values")]
pub enum RouteMatch {
    Destination(Vec<Destination>),
    PathSuffix(Vec<String>),
    Host(Vec<String>),
    HostSuffix(Vec<String>),
    PathPrefix(String),
    Navigation,
    Any,
}

impl RouteMatch {
    pub fn matches(&self, request: &RequestInfo) -> bool {
        match self {
            Self::Destination(kinds) => kinds.contains(&request.destination),
            Self::PathSuffix(suffixes) => suffixes.iter().any(|s| request.path.ends_with(s.as_str())),
            Self::Host(hosts) => hosts.iter().any(|h| request.host == *h),
            Self::HostSuffix(suffixes) => suffixes
                .iter()
                .any(|s| request.host == *s || request.host.ends_with(&format!(".{s}"))),
            Self::PathPrefix(prefix) => request.path.starts_with(prefix.as_str()),
            Self::Navigation => request.navigation,
            Self::Any => true,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Destination(kinds) => {
                let names: Vec<String> = kinds
                    .iter()
                    .map(|k| format!("{k:?}").to_ascii_lowercase())
                    .collect();
                format!("destination {}", names.join("|"))
            }
            Self::PathSuffix(suffixes) => format!("path ends with {}", suffixes.join("|")),
            Self::Host(hosts) => format!("host {}", hosts.join("|")),
            Self::HostSuffix(suffixes) => format!("host *.{}", suffixes.join("|*.")),
            Self::PathPrefix(prefix) => format!("path starts with {prefix}"),
            Self::Navigation => "navigation".to_string(),
            Self::Any => "any request".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachePolicy {
    pub name: &'static str,
    pub matcher: RouteMatch,
    pub strategy: Strategy,
    /// `None` for network-only routes.
    pub bucket: Option<String>,
    pub max_entries: usize,
    pub max_age: Duration,
    pub network_timeout: Option<Duration>,
}

impl CachePolicy {
    fn cached(
        name: &'static str,
        matcher: RouteMatch,
        strategy: Strategy,
        bucket: &str,
        max_entries: usize,
        max_age_secs: u64,
    ) -> Self {
        Self {
            name,
            matcher,
            strategy,
            bucket: Some(bucket_name(bucket)),
            max_entries,
            max_age: Duration::from_secs(max_age_secs),
            network_timeout: None,
        }
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }

    pub fn network_only(name: &'static str, matcher: RouteMatch) -> Self {
        Self {
            name,
            matcher,
            strategy: Strategy::NetworkOnly,
            bucket: None,
            max_entries: 0,
            max_age: Duration::ZERO,
            network_timeout: None,
        }
    }

    pub fn max_age_ms(&self) -> u64 {
        u64::try_from(self.max_age.as_millis()).unwrap_or(u64::MAX)
    }
}

pub fn bucket_name(kind: &str) -> String {
    format!("join-{kind}-{CACHE_VERSION}")
}

/// App shell written at install time. Not governed by any policy's age or
/// entry limits; only a version bump replaces it.
pub fn precache_bucket() -> String {
    bucket_name("precache")
}

/// Ordered, immutable route table. The first matching entry wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: Vec<CachePolicy>,
    fallback: CachePolicy,
}

impl PolicyTable {
    pub fn new(policies: Vec<CachePolicy>) -> Self {
        Self {
            policies,
            fallback: CachePolicy::network_only("passthrough", RouteMatch::Any),
        }
    }

    pub fn standard(settings: &Settings) -> Self {
        let timeout = settings.network_timeout();
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self::new(vec![
            CachePolicy::cached(
                "documents",
                RouteMatch::Destination(vec![Destination::Document]),
                Strategy::NetworkFirst,
                "documents",
                50,
                DAY,
            )
            .with_timeout(timeout),
            CachePolicy::cached(
                "assets",
                RouteMatch::Destination(vec![
                    Destination::Style,
                    Destination::Script,
                    Destination::Worker,
                ]),
                Strategy::StaleWhileRevalidate,
                "assets",
                100,
                30 * DAY,
            ),
            CachePolicy::cached(
                "images",
                RouteMatch::Destination(vec![Destination::Image]),
                Strategy::CacheFirst,
                "images",
                120,
                30 * DAY,
            ),
            CachePolicy::cached(
                "fonts",
                RouteMatch::Destination(vec![Destination::Font]),
                Strategy::CacheFirst,
                "fonts",
                30,
                365 * DAY,
            ),
            CachePolicy::cached(
                "manifest",
                RouteMatch::PathSuffix(strings(&[".webmanifest", "manifest.json"])),
                Strategy::StaleWhileRevalidate,
                "manifest",
                5,
                7 * DAY,
            ),
            CachePolicy::network_only(
                "auth",
                RouteMatch::Host(strings(&[
                    "identitytoolkit.googleapis.com",
                    "securetoken.googleapis.com",
                ])),
            ),
            CachePolicy::cached(
                "database",
                RouteMatch::HostSuffix(strings(&["firebasedatabase.app", "firebaseio.com"])),
                Strategy::NetworkFirst,
                "data",
                50,
                5 * MINUTE,
            )
            .with_timeout(timeout),
            CachePolicy::cached(
                "api",
                RouteMatch::PathPrefix("/api/".to_string()),
                Strategy::NetworkFirst,
                "api",
                50,
                5 * MINUTE,
            )
            .with_timeout(timeout),
            CachePolicy::cached(
                "navigation",
                RouteMatch::Navigation,
                Strategy::NetworkFirst,
                "documents",
                50,
                DAY,
            )
            .with_timeout(timeout),
        ])
    }

    pub fn policies(&self) -> &[CachePolicy] {
        &self.policies
    }

    /// First matching policy; unmatched requests go straight to the network.
    pub fn classify(&self, request: &RequestInfo) -> &CachePolicy {
        self.policies
            .iter()
            .find(|policy| policy.matcher.matches(request))
            .unwrap_or(&self.fallback)
    }

    /// Every bucket the table writes to, plus the precache and settings
    /// stores.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.iter().filter_map(|p| p.bucket.clone()).collect();
        names.push(precache_bucket());
        names.push(super::SETTINGS_BUCKET.to_string());
        names.sort();
        names.dedup();
        names
    }

    /// Buckets present in storage that the current table no longer uses.
    pub fn stale_buckets(&self, existing: &[String]) -> Vec<String> {
        let keep = self.bucket_names();
        existing.iter().filter(|name| !keep.contains(name)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::standard(&Settings::default())
    }

    fn classify(url: &str, destination: Destination, navigation: bool) -> &'static str {
        let request = RequestInfo::new(url, destination, navigation).expect("valid url");
        table().classify(&request).name
    }

    #[test]
    fn destinations_route_before_origins() {
        assert_eq!(classify("https://join.app/summary.html", Destination::Document, true), "documents");
        assert_eq!(classify("https://join.app/style.css", Destination::Style, false), "assets");
        assert_eq!(classify("https://join.app/app.js", Destination::Script, false), "assets");
        assert_eq!(classify("https://join.app/img/logo.svg", Destination::Image, false), "images");
        assert_eq!(
            classify("https://fonts.gstatic.com/s/inter.woff2", Destination::Font, false),
            "fonts"
        );
    }

    #[test]
    fn manifest_suffix_and_external_origins() {
        assert_eq!(
            classify("https://join.app/manifest.webmanifest", Destination::Manifest, false),
            "manifest"
        );
        assert_eq!(
            classify(
                "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword",
                Destination::Other,
                false
            ),
            "auth"
        );
        assert_eq!(
            classify(
                "https://join-demo-default-rtdb.europe-west1.firebasedatabase.app/tasks.json",
                Destination::Other,
                false
            ),
            "database"
        );
        assert_eq!(classify("https://join.app/api/tasks", Destination::Other, false), "api");
    }

    #[test]
    fn navigation_fallback_and_passthrough() {
        assert_eq!(classify("https://join.app/board", Destination::Other, true), "navigation");
        assert_eq!(classify("https://join.app/ping", Destination::Other, false), "passthrough");
    }

    #[test]
    fn auth_routes_never_touch_cache() {
        let table = table();
        let request = RequestInfo::new(
            "https://securetoken.googleapis.com/v1/token",
            Destination::Other,
            false,
        )
        .expect("valid url");
        let policy = table.classify(&request);
        assert_eq!(policy.strategy, Strategy::NetworkOnly);
        assert_eq!(policy.bucket, None);
    }

    #[test]
    fn stale_buckets_exclude_current_and_settings() {
        let existing = vec![
            "join-documents-v0".to_string(),
            bucket_name("documents"),
            precache_bucket(),
            "join-settings".to_string(),
            "workbox-precache".to_string(),
        ];
        assert_eq!(
            table().stale_buckets(&existing),
            vec!["join-documents-v0".to_string(), "workbox-precache".to_string()]
        );
    }

    #[test]
    fn rejects_relative_urls() {
        assert!(matches!(
            RequestInfo::new("/summary.html", Destination::Document, true),
            Err(CacheError::InvalidUrl(_))
        ));
    }
}

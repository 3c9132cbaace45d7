//! Error types shared by the core modules.
//!
//! Each seam gets its own enum so callers can decide per layer whether a
//! failure degrades (dashboard, theme) or propagates (network-only fetches).

/// Failure reported by a browser capability (storage, DOM, messaging).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("document update failed: {0}")]
    Document(String),

    #[error("worker messaging failed: {0}")]
    Messaging(String),

    #[error("media query unavailable: {0}")]
    MediaQuery(String),
}

/// Failure reported by the external data layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("not signed in")]
    Unauthenticated,
}

/// Failure inside the cache worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("network request failed: {0}")]
    Network(String),

    #[error("network request timed out after {0} ms")]
    Timeout(u32),

    #[error("cache storage failed: {0}")]
    Storage(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("no cached response for {0}")]
    Miss(String),

    #[error("settings store failed: {0}")]
    Settings(String),
}

/// Failure while reading or interpreting configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config line {line}: {text}")]
    Syntax { line: usize, text: String },

    #[error("invalid value for {key}: {value}")]
    Value { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_timeout() {
        let err = CacheError::Timeout(3_000);
        assert_eq!(err.to_string(), "network request timed out after 3000 ms");
    }

    #[test]
    fn display_config_value() {
        let err = ConfigError::Value {
            key: "layout.breakpoint".into(),
            value: "wide".into(),
        };
        assert_eq!(err.to_string(), "invalid value for layout.breakpoint: wide");
    }
}

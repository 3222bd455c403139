//! Connection and subscription options.
//!
//! Callers fill in a [`ConnectOptions`], leaving anything they don't care
//! about unset; [`ConnectOptions::resolve`] lays it over the defaults to
//! produce the [`ConnectionOptions`] a session keeps for its lifetime.
//! Both shapes deserialize from TOML/JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolved options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Options in effect for a session.  Read-only once the session exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionOptions {
    #[serde(default = "d_url")]
    pub url: String,
    /// Client name reported in `CONNECT`.
    #[serde(default)]
    pub name: Option<String>,
    /// Ask the server to acknowledge every command with `+OK`.
    #[serde(default)]
    pub verbose: bool,
    /// Ask the server for strict subject checking.
    #[serde(default)]
    pub pedantic: bool,
    /// How long to wait for `INFO` and the handshake `PONG`.
    #[serde(default = "d_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl ConnectionOptions {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: d_url(),
            name: None,
            verbose: false,
            pedantic: false,
            handshake_timeout_ms: d_handshake_timeout_ms(),
        }
    }
}

fn d_url() -> String {
    nw_protocol::DEFAULT_URL.into()
}

fn d_handshake_timeout_ms() -> u64 {
    10_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Caller-supplied options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caller-supplied connection options; every field is optional.
///
/// ```rust
/// # use nw_client::ConnectOptions;
/// let resolved = ConnectOptions::new().url("ws://nats.internal:8080").resolve();
/// assert_eq!(resolved.url, "ws://nats.internal:8080");
/// assert!(!resolved.verbose);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectOptions {
    pub url: Option<String>,
    pub name: Option<String>,
    pub verbose: Option<bool>,
    pub pedantic: Option<bool>,
    pub handshake_timeout_ms: Option<u64>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = Some(on);
        self
    }

    pub fn pedantic(mut self, on: bool) -> Self {
        self.pedantic = Some(on);
        self
    }

    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.handshake_timeout_ms = Some(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Shallow merge: fields set here win, the rest keep their defaults.
    /// No validation; a bad URL is reported by the transport on connect.
    pub fn resolve(self) -> ConnectionOptions {
        let defaults = ConnectionOptions::default();
        ConnectionOptions {
            url: self.url.unwrap_or(defaults.url),
            name: self.name.or(defaults.name),
            verbose: self.verbose.unwrap_or(defaults.verbose),
            pedantic: self.pedantic.unwrap_or(defaults.pedantic),
            handshake_timeout_ms: self
                .handshake_timeout_ms
                .unwrap_or(defaults.handshake_timeout_ms),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscribe options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-subscription options.  Both fields pass through to the protocol
/// collaborator untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscribeOptions {
    /// Queue group for load-shared delivery.
    pub queue: Option<String>,
    pub max: Option<u64>,
}

impl SubscribeOptions {
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn max(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_resolve_to_defaults() {
        let opts = ConnectOptions::default().resolve();
        assert_eq!(opts.url, "ws://localhost:4222");
        assert_eq!(opts, ConnectionOptions::default());
        assert_eq!(opts.handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn caller_fields_override_defaults() {
        let opts = ConnectOptions::new()
            .url("ws://x")
            .name("billing")
            .verbose(true)
            .handshake_timeout(Duration::from_millis(250))
            .resolve();
        assert_eq!(opts.url, "ws://x");
        assert_eq!(opts.name.as_deref(), Some("billing"));
        assert!(opts.verbose);
        assert!(!opts.pedantic);
        assert_eq!(opts.handshake_timeout_ms, 250);
    }

    #[test]
    fn huge_handshake_timeout_saturates() {
        let opts = ConnectOptions::new().handshake_timeout(Duration::MAX).resolve();
        assert_eq!(opts.handshake_timeout_ms, u64::MAX);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
url = "ws://nats.example.com:443"
pedantic = true
"#;
        let opts: ConnectOptions = toml::from_str(raw).unwrap();
        let resolved = opts.resolve();
        assert_eq!(resolved.url, "ws://nats.example.com:443");
        assert!(resolved.pedantic);
        assert!(!resolved.verbose);
        assert_eq!(resolved.handshake_timeout_ms, 10_000);
    }

    #[test]
    fn resolved_options_deserialize_with_defaults() {
        let opts: ConnectionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ConnectionOptions::default());
    }

    #[test]
    fn subscribe_options_from_json() {
        let opts: SubscribeOptions = serde_json::from_str(r#"{"queue":"q1"}"#).unwrap();
        assert_eq!(opts.queue.as_deref(), Some("q1"));
        assert_eq!(opts.max, None);
    }
}

//! Client configuration.

use crate::ledger::LedgerQuery;
use std::time::Duration;

use super::backoff::BackoffPolicy;

/// Connection manager configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend URI.
    pub uri: String,
    /// Backend module (database) name.
    pub module_name: String,
    /// First reconnect delay.
    pub base_delay: Duration,
    /// Reconnect delay ceiling.
    pub max_delay: Duration,
    /// Query set issued after every connect.
    pub queries: Vec<LedgerQuery>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: "ws://127.0.0.1:3000".to_string(),
            module_name: "streakline".to_string(),
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            queries: vec![LedgerQuery::All],
        }
    }
}

impl ClientConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("STREAKLINE_HOST_URL").unwrap_or(defaults.uri),
            module_name: std::env::var("STREAKLINE_MODULE").unwrap_or(defaults.module_name),
            base_delay: env_millis("STREAKLINE_BACKOFF_BASE_MS").unwrap_or(defaults.base_delay),
            max_delay: env_millis("STREAKLINE_BACKOFF_MAX_MS").unwrap_or(defaults.max_delay),
            queries: defaults.queries,
        }
    }

    pub fn with_queries(mut self, queries: Vec<LedgerQuery>) -> Self {
        self.queries = queries;
        self
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay)
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

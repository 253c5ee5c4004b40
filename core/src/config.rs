use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a [`Runner`](crate::runtime::Runner). Every field has a default so
/// partial config files deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Proxy clients should be bound to, as `host:port`.
    pub proxy: Option<String>,
    pub pause_poll_ms: u64,
    pub scan_poll_ms: u64,
    /// Upper bound on a scan action. Unset means wait for the scanner indefinitely.
    pub scan_timeout_ms: Option<u64>,
    pub debug: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            pause_poll_ms: 200,
            scan_poll_ms: 100,
            scan_timeout_ms: None,
            debug: false,
        }
    }
}

impl RunnerConfig {
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn scan_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scan_poll_ms.max(1))
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms.map(Duration::from_millis)
    }

    /// Splits the configured proxy into host and port when it is well formed.
    pub fn proxy_endpoint(&self) -> Option<ProxyEndpoint> {
        self.proxy.as_deref().and_then(ProxyEndpoint::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn parse(value: &str) -> Option<Self> {
        let (host, port) = value.trim().rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self {
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_proxies() {
        assert_eq!(
            ProxyEndpoint::parse("127.0.0.1:8080"),
            Some(ProxyEndpoint {
                host: "127.0.0.1".to_string(),
                port: 8080
            })
        );
        assert_eq!(ProxyEndpoint::parse(":8080"), None);
        assert_eq!(ProxyEndpoint::parse("localhost"), None);
        assert_eq!(ProxyEndpoint::parse("localhost:http"), None);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"proxy": "localhost:8090"}"#).expect("config parses");
        assert_eq!(config.pause_poll_ms, 200);
        assert_eq!(config.scan_poll_ms, 100);
        assert_eq!(config.scan_timeout(), None);
        assert_eq!(config.proxy_endpoint().map(|p| p.port), Some(8090));
    }
}

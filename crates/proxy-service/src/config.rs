//! Proxy configuration, loaded from a JSON file.
//!
//! Mirrors the original proxy's config schema (`proxy.*`, `frontend.*`,
//! `upstream[].*`, `upstreamCheckInterval`, `threads`) closely enough that
//! an existing deployment's config file loads unchanged. Duration-valued
//! fields use Go-style strings (`"500ms"`, `"2s"`, `"1h"`); there is no
//! stdlib parser for that, so [`parse_duration`] implements the small
//! grammar by hand.

use std::fs;
use std::path::Path;
use std::time::Duration;

use proxy_core::error::ProxyError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub proxy: ProxyListenerConfig,
    pub frontend: FrontendConfig,
    pub upstream: Vec<UpstreamConfig>,
    #[serde(rename = "upstreamCheckInterval", deserialize_with = "deserialize_duration")]
    pub upstream_check_interval: Duration,
    /// Worker threads for the Tokio runtime; `0` means "use all cores",
    /// the Rust analogue of the original's `runtime.GOMAXPROCS(cfg.Threads)`.
    #[serde(default)]
    pub threads: usize,
    /// Parsed but inert: APM instrumentation is out of scope, kept so a
    /// config file written for the original proxy still loads.
    #[serde(default, rename = "newrelicName")]
    pub newrelic_name: Option<String>,
    #[serde(default, rename = "newrelicKey")]
    pub newrelic_key: Option<String>,
    #[serde(default, rename = "newrelicVerbose")]
    pub newrelic_verbose: bool,
    #[serde(default, rename = "newrelicEnabled")]
    pub newrelic_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyListenerConfig {
    pub listen: String,
    #[serde(rename = "clientTimeout", deserialize_with = "deserialize_duration")]
    pub client_timeout: Duration,
    #[serde(rename = "blockRefreshInterval", deserialize_with = "deserialize_duration")]
    pub block_refresh_interval: Duration,
    #[serde(rename = "hashrateWindow", deserialize_with = "deserialize_duration")]
    pub hashrate_window: Duration,
    #[serde(rename = "luckWindow")]
    pub luck_window: u64,
    #[serde(rename = "largeLuckWindow")]
    pub large_luck_window: u64,
    #[serde(default, rename = "submitHashrate")]
    pub submit_hashrate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    pub listen: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub pool: bool,
}

impl ProxyConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| ProxyError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProxyError> {
        serde_json::from_str(raw).map_err(|e| ProxyError::Config(e.to_string()))
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a Go-style duration string: a decimal number immediately followed
/// by a unit (`ms`, `s`, `m`, `h`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let split_at = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("duration {s:?} has no unit"))?;
    let (number, unit) = s.split_at(split_at);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("duration {s:?} has an invalid number"))?;
    let millis = match unit {
        "ms" => value,
        "s" => value * 1_000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        other => return Err(format!("duration {s:?} has unknown unit {other:?}")),
    };
    Ok(Duration::from_millis(millis as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parses_hours() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse_duration("500").is_err());
    }

    #[test]
    fn loads_full_config_from_json() {
        let raw = r#"{
            "proxy": {
                "listen": "0.0.0.0:8888",
                "clientTimeout": "600s",
                "blockRefreshInterval": "120ms",
                "hashrateWindow": "30m",
                "luckWindow": 120,
                "largeLuckWindow": 2160,
                "submitHashrate": false
            },
            "frontend": {
                "listen": "0.0.0.0:8080",
                "login": "admin",
                "password": "hunter2"
            },
            "upstream": [
                {"name": "main", "url": "http://127.0.0.1:8545", "timeout": "10s", "pool": false}
            ],
            "upstreamCheckInterval": "5s",
            "threads": 2
        }"#;
        let cfg = ProxyConfig::from_json(raw).unwrap();
        assert_eq!(cfg.proxy.listen, "0.0.0.0:8888");
        assert_eq!(cfg.upstream.len(), 1);
        assert_eq!(cfg.upstream[0].timeout, Duration::from_secs(10));
        assert_eq!(cfg.threads, 2);
        assert!(!cfg.newrelic_enabled);
    }

    #[test]
    fn missing_newrelic_fields_default() {
        let raw = r#"{
            "proxy": {
                "listen": "0.0.0.0:8888",
                "clientTimeout": "600s",
                "blockRefreshInterval": "120ms",
                "hashrateWindow": "30m",
                "luckWindow": 120,
                "largeLuckWindow": 2160
            },
            "frontend": {"listen": "0.0.0.0:8080"},
            "upstream": [{"name": "main", "url": "http://127.0.0.1:8545", "timeout": "10s"}],
            "upstreamCheckInterval": "5s"
        }"#;
        let cfg = ProxyConfig::from_json(raw).unwrap();
        assert_eq!(cfg.threads, 0);
        assert!(cfg.newrelic_name.is_none());
        assert!(!cfg.upstream[0].pool);
    }
}

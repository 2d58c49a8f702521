// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Locator discovery configuration.
//!
//! Settings come either from a JSON file ([`DiscoveryConfig::from_file`]) or
//! from `key = value` properties under a per-instance prefix
//! ([`DiscoveryConfig::from_properties`]):
//!
//! ```text
//! LocatorDiscovery.InstanceName = DemoGrid
//! LocatorDiscovery.Timeout      = 500
//! LocatorDiscovery.RetryCount   = 5
//! LocatorDiscovery.Trace.Lookup = 1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default property prefix.
pub const DEFAULT_PREFIX: &str = "LocatorDiscovery";

/// Default IPv4 lookup group.
pub const DEFAULT_IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

/// Default IPv6 lookup group (`ff15::1`).
pub const DEFAULT_IPV6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff15, 0, 0, 0, 0, 0, 0, 1);

/// Default lookup port.
pub const DEFAULT_PORT: u16 = 4061;

const DEFAULT_TIMEOUT_MS: i64 = 300;
const DEFAULT_RETRY_COUNT: i32 = 3;
const DEFAULT_RETRY_DELAY_MS: i64 = 2000;

/// Locator discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Expected instance name; empty pins to the first responder.
    #[serde(default)]
    pub instance_name: String,

    /// Explicit lookup endpoints. Empty derives them from `address`/`port`.
    #[serde(default)]
    pub lookup: Vec<SocketAddr>,

    /// Multicast group used when `lookup` is empty (both defaults when unset).
    #[serde(default)]
    pub address: Option<IpAddr>,

    /// Multicast port used when `lookup` is empty.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Restrict derived lookup views to this local interface address.
    #[serde(default)]
    pub interface: Option<IpAddr>,

    /// Per-iteration reply wait in milliseconds (negative means infinite).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,

    /// Lookup iterations per discovery attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,

    /// Backoff after an exhausted attempt, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: i64,

    /// Discovery trace verbosity (0 = silent).
    #[serde(default)]
    pub trace_lookup: u32,

    /// Local addresses to receive replies on. Empty binds ephemeral ports.
    #[serde(default)]
    pub reply_endpoints: Vec<SocketAddr>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_count() -> i32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay_ms() -> i64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            lookup: Vec::new(),
            address: None,
            port: default_port(),
            interface: None,
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            trace_lookup: 0,
            reply_endpoints: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Build a configuration from properties under `prefix`.
    ///
    /// Unset options keep their defaults; unknown keys under the prefix are
    /// ignored.
    pub fn from_properties(props: &Properties, prefix: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let key = |name: &str| format!("{}.{}", prefix, name);

        if let Some(v) = props.get(&key("InstanceName")) {
            config.instance_name = v.to_string();
        }
        if let Some(v) = props.get(&key("Lookup")) {
            config.lookup = parse_addr_list(&key("Lookup"), v)?;
        }
        if let Some(v) = props.get(&key("Address")) {
            config.address = Some(parse_value(&key("Address"), v)?);
        }
        if let Some(v) = props.get(&key("Port")) {
            config.port = parse_value(&key("Port"), v)?;
        }
        if let Some(v) = props.get(&key("Interface")) {
            if !v.is_empty() {
                config.interface = Some(parse_value(&key("Interface"), v)?);
            }
        }
        if let Some(v) = props.get(&key("Timeout")) {
            config.timeout_ms = parse_value(&key("Timeout"), v)?;
        }
        if let Some(v) = props.get(&key("RetryCount")) {
            config.retry_count = parse_value(&key("RetryCount"), v)?;
        }
        if let Some(v) = props.get(&key("RetryDelay")) {
            config.retry_delay_ms = parse_value(&key("RetryDelay"), v)?;
        }
        if let Some(v) = props.get(&key("Trace.Lookup")) {
            config.trace_lookup = parse_value(&key("Trace.Lookup"), v)?;
        }
        if let Some(v) = props.get(&key("Reply.Endpoints")) {
            config.reply_endpoints = parse_addr_list(&key("Reply.Endpoints"), v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Per-iteration reply wait. An infinite (negative) value falls back to
    /// the default, since an unbounded wait would never retry.
    pub fn timeout(&self) -> Duration {
        if self.timeout_ms < 0 {
            Duration::from_millis(DEFAULT_TIMEOUT_MS as u64)
        } else {
            Duration::from_millis(self.timeout_ms as u64)
        }
    }

    /// Lookup iterations per attempt (at least 1).
    pub fn retry_count(&self) -> u32 {
        self.retry_count.max(1) as u32
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.max(0) as u64)
    }

    /// Lookup endpoints: the explicit list, or the multicast group(s).
    pub fn lookup_endpoints(&self) -> Vec<SocketAddr> {
        if !self.lookup.is_empty() {
            return self.lookup.clone();
        }
        match self.address {
            Some(addr) => vec![SocketAddr::new(addr, self.port)],
            None => vec![
                SocketAddr::new(IpAddr::V4(DEFAULT_IPV4_GROUP), self.port),
                SocketAddr::new(IpAddr::V6(DEFAULT_IPV6_GROUP), self.port),
            ],
        }
    }

    /// Reply endpoints: the configured list, or one ephemeral wildcard
    /// address per address family used by the lookup endpoints.
    pub fn reply_endpoints(&self) -> Vec<SocketAddr> {
        if !self.reply_endpoints.is_empty() {
            return self.reply_endpoints.clone();
        }
        let lookups = self.lookup_endpoints();
        let mut endpoints = Vec::new();
        if lookups.iter().any(|a| a.is_ipv4()) {
            endpoints.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        }
        if lookups.iter().any(|a| a.is_ipv6()) {
            endpoints.push(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0));
        }
        endpoints
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_name.contains('/') {
            return Err(ConfigError::InvalidValue(
                "instance_name cannot contain '/'".into(),
            ));
        }
        if self.lookup.is_empty() && self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if let Some(addr) = self.lookup.iter().find(|a| a.port() == 0) {
            return Err(ConfigError::InvalidValue(format!(
                "lookup endpoint {} has no port",
                addr
            )));
        }
        if let (Some(iface), Some(addr)) = (self.interface, self.address) {
            if iface.is_ipv4() != addr.is_ipv4() {
                return Err(ConfigError::InvalidValue(format!(
                    "interface {} and address {} use different address families",
                    iface, addr
                )));
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = {}", key, value)))
}

fn parse_addr_list(key: &str, value: &str) -> Result<Vec<SocketAddr>, ConfigError> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

/// Flat `key = value` property set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse property text. Blank lines and `#` comments are skipped;
    /// later assignments override earlier ones.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut props = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ConfigError::ParseError(format!("line {}: expected `key = value`", lineno + 1))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::ParseError(format!(
                    "line {}: empty key",
                    lineno + 1
                )));
            }
            props.set(key, value.trim());
        }
        Ok(props)
    }

    /// Load properties from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

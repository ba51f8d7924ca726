//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client
//! factory. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the client factory.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Pool sizing, timeouts and sweep schedule.
    pub pool: PoolConfig,

    /// Trust material and hostname policy for the secure client.
    pub trust: TrustConfig,

    /// Transport backend that services requests.
    pub backend: BackendKind,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name for the plain client (logs/metrics).
    pub name: String,

    /// Pool name for the TLS-customised client.
    pub secure_name: String,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Socket read timeout in milliseconds (response head and body).
    pub read_timeout_ms: u64,

    /// Maximum wait for a pooled connection in milliseconds.
    pub request_timeout_ms: u64,

    /// Maximum connections across all routes.
    pub max_total: usize,

    /// Maximum connections per route.
    pub max_per_route: usize,

    /// Idle connections older than this are evicted by the sweep, in seconds.
    pub idle_eviction_secs: u64,

    /// Delay before the first sweep tick in milliseconds.
    pub sweep_initial_delay_ms: u64,

    /// Period between sweep ticks in milliseconds.
    pub sweep_interval_ms: u64,

    /// Keep-alive applied when the peer does not advertise one, in milliseconds.
    pub keep_alive_default_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "http-pool".to_string(),
            secure_name: "ssl-http-pool".to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            request_timeout_ms: 5000,
            max_total: 200,
            max_per_route: 20,
            idle_eviction_secs: 30,
            sweep_initial_delay_ms: 10_000,
            sweep_interval_ms: 10_000,
            keep_alive_default_ms: 900_000, // 15 minutes
        }
    }
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_eviction_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }

    pub fn sweep_initial_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_initial_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn keep_alive_default(&self) -> Duration {
        Duration::from_millis(self.keep_alive_default_ms)
    }
}

/// Trust material and hostname policy for the secure client.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Format of the trust store (default: PEM).
    pub trust_store_type: Option<StoreType>,

    /// Certificate bundle of additionally trusted peers.
    pub trust_store_path: Option<PathBuf>,

    /// Format of the client key store (default: PEM).
    pub client_key_store_type: Option<StoreType>,

    /// Client certificate chain and private key presented for mutual TLS.
    pub client_key_store_path: Option<PathBuf>,

    /// Password of the client key store.
    pub client_key_store_password: Option<String>,

    /// Hostnames accepted when custom verification is active.
    pub allowed_hostnames: Vec<String>,

    /// The single TLS version spoken by the secure client.
    pub protocol: TlsVersion,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_store_type: None,
            trust_store_path: None,
            client_key_store_type: None,
            client_key_store_path: None,
            client_key_store_password: None,
            allowed_hostnames: Vec::new(),
            protocol: TlsVersion::default(),
        }
    }
}

impl TrustConfig {
    /// True when any custom trust input is configured.
    ///
    /// In that mode the allow-list, not the certificate, decides which
    /// hostnames are acceptable.
    pub fn is_custom(&self) -> bool {
        self.trust_store_path.is_some()
            || self.client_key_store_path.is_some()
            || !self.allowed_hostnames.is_empty()
    }
}

impl fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustConfig")
            .field("trust_store_type", &self.trust_store_type)
            .field("trust_store_path", &self.trust_store_path)
            .field("client_key_store_type", &self.client_key_store_type)
            .field("client_key_store_path", &self.client_key_store_path)
            .field(
                "client_key_store_password",
                &self.client_key_store_password.as_ref().map(|_| "<redacted>"),
            )
            .field("allowed_hostnames", &self.allowed_hostnames)
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// On-disk key/trust store format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreType {
    /// PEM bundle of certificates (and, for identities, one private key,
    /// optionally a password-encrypted PKCS#8 key).
    #[default]
    Pem,
    /// A single DER-encoded certificate.
    Der,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Pem => "pem",
            StoreType::Der => "der",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown store type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported store type '{0}' (expected 'pem' or 'der')")]
pub struct UnsupportedStoreType(pub String);

impl FromStr for StoreType {
    type Err = UnsupportedStoreType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pem" => Ok(StoreType::Pem),
            "der" | "cer" | "crt" => Ok(StoreType::Der),
            _ => Err(UnsupportedStoreType(s.to_string())),
        }
    }
}

impl TryFrom<String> for StoreType {
    type Error = UnsupportedStoreType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StoreType> for String {
    fn from(value: StoreType) -> Self {
        value.as_str().to_string()
    }
}

/// TLS protocol version pinned by the secure client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl TlsVersion {
    pub fn protocol(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            TlsVersion::Tls13 => &rustls::version::TLS13,
        }
    }
}

/// Transport backend servicing client requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Built-in pool with capacity limits, keep-alive strategy and eviction sweep.
    #[default]
    Pooled,
    /// hyper-util's legacy client pool.
    Hyper,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pooled" => Ok(BackendKind::Pooled),
            "hyper" => Ok(BackendKind::Hyper),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(pool.read_timeout(), Duration::from_millis(5000));
        assert_eq!(pool.request_timeout(), Duration::from_millis(5000));
        assert_eq!(pool.keep_alive_default(), Duration::from_millis(900_000));
        assert_eq!(pool.idle_eviction_threshold(), Duration::from_secs(30));
        assert_eq!(pool.max_total, 200);
        assert_eq!(pool.max_per_route, 20);
        assert_eq!(pool.sweep_initial_delay(), Duration::from_secs(10));
        assert_eq!(pool.sweep_interval(), Duration::from_secs(10));
    }

    #[test]
    fn parses_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            backend = "hyper"

            [pool]
            max_total = 10
            max_per_route = 2

            [trust]
            trust_store_path = "/etc/ssl/private-ca.pem"
            allowed_hostnames = ["internal.example"]
            protocol = "tls1.3"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Hyper);
        assert_eq!(config.pool.max_total, 10);
        assert_eq!(config.pool.max_per_route, 2);
        assert_eq!(config.pool.connect_timeout_ms, 5000);
        assert_eq!(config.trust.protocol, TlsVersion::Tls13);
        assert!(config.trust.is_custom());
        assert_eq!(config.trust.trust_store_type, None);
    }

    #[test]
    fn unknown_store_type_is_rejected() {
        let result: Result<ClientConfig, _> = toml::from_str(
            r#"
            [trust]
            trust_store_type = "jks"
            "#,
        );
        assert!(result.is_err());
        assert_eq!("PEM".parse::<StoreType>().unwrap(), StoreType::Pem);
        assert!("jks".parse::<StoreType>().is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let trust = TrustConfig {
            client_key_store_password: Some("hunter2".into()),
            ..TrustConfig::default()
        };
        let rendered = format!("{:?}", trust);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn empty_trust_is_platform_mode() {
        assert!(!TrustConfig::default().is_custom());
    }
}

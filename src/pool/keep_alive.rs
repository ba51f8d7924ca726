//! How long a released connection may stay in the pool.

use std::fmt;
use std::time::Duration;

use http::HeaderMap;

/// Decides the keep-alive of a connection from the response that used it.
pub trait KeepAliveStrategy: Send + Sync + fmt::Debug {
    fn keep_alive(&self, headers: &HeaderMap) -> Duration;
}

/// Honours `Keep-Alive: timeout=N` (seconds), otherwise a fixed default.
///
/// The default is also the ceiling: a server cannot keep a connection
/// parked longer than the configured keep-alive.
#[derive(Debug, Clone, Copy)]
pub struct DefaultKeepAliveStrategy {
    default: Duration,
}

impl DefaultKeepAliveStrategy {
    pub fn new(default: Duration) -> Self {
        Self { default }
    }
}

impl KeepAliveStrategy for DefaultKeepAliveStrategy {
    fn keep_alive(&self, headers: &HeaderMap) -> Duration {
        advertised_timeout(headers).map_or(self.default, |timeout| timeout.min(self.default))
    }
}

fn advertised_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all("keep-alive")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("timeout"))
        .and_then(|(_, secs)| secs.trim().trim_matches('"').parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// True when the peer announced it will close the connection.
pub fn closes_connection(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn uses_advertised_timeout() {
        let strategy = DefaultKeepAliveStrategy::new(Duration::from_secs(900));
        let h = headers(&[("keep-alive", "timeout=5, max=100")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(5));

        let h = headers(&[("keep-alive", "max=100, Timeout = 7")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(7));
    }

    #[test]
    fn advertised_timeout_is_capped_by_default() {
        let strategy = DefaultKeepAliveStrategy::new(Duration::from_secs(900));
        let h = headers(&[("keep-alive", "timeout=3600")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(900));

        let h = headers(&[("keep-alive", "timeout=18446744073709551615")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(900));
    }

    #[test]
    fn falls_back_to_default() {
        let strategy = DefaultKeepAliveStrategy::new(Duration::from_secs(900));
        assert_eq!(strategy.keep_alive(&HeaderMap::new()), Duration::from_secs(900));

        let h = headers(&[("keep-alive", "timeout=-1")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(900));

        let h = headers(&[("keep-alive", "max=5")]);
        assert_eq!(strategy.keep_alive(&h), Duration::from_secs(900));
    }

    #[test]
    fn detects_connection_close() {
        assert!(closes_connection(&headers(&[("connection", "Close")])));
        assert!(closes_connection(&headers(&[("connection", "keep-alive, close")])));
        assert!(!closes_connection(&headers(&[("connection", "keep-alive")])));
        assert!(!closes_connection(&HeaderMap::new()));
    }
}

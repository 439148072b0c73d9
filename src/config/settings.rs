//! Runtime view of the configuration shared by every connection.

use std::time::Duration;

use bytes::Bytes;

use crate::config::schema::ServerConfig;
use crate::framing::FramingConfig;
use crate::http::origin::OriginPolicy;

/// Per-listener behaviour, fixed for the server's lifetime.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Idle time before an undecided connection is settled.
    pub classify_timeout: Duration,
    /// Idle read timeout after classification; `None` disables it.
    pub read_timeout: Option<Duration>,
    pub raw_fallback: bool,
    pub framing: FramingConfig,
    /// Leave ending HTTP responses to the application.
    pub explicit_end: bool,
    /// `None` accepts every origin.
    pub origin: Option<OriginPolicy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_millis(1000),
            read_timeout: Some(Duration::from_secs(120)),
            raw_fallback: true,
            framing: FramingConfig::default(),
            explicit_end: false,
            origin: None,
        }
    }
}

impl Settings {
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        self.origin
            .as_ref()
            .map_or(true, |policy| policy.allows(origin))
    }
}

impl From<&ServerConfig> for Settings {
    fn from(config: &ServerConfig) -> Self {
        let read_timeout = match config.timeouts.read_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            classify_timeout: Duration::from_millis(config.timeouts.classify_ms),
            read_timeout,
            raw_fallback: config.protocol.raw_fallback,
            framing: FramingConfig {
                delimiter: Bytes::from(config.protocol.delimiter.clone().into_bytes()),
                limit: config.protocol.message_limit,
            },
            explicit_end: config.http.explicit_end,
            origin: config
                .http
                .allow_origin
                .as_deref()
                .map(OriginPolicy::from_pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_read_timeout_disables_it() {
        let mut config = ServerConfig::default();
        config.timeouts.read_secs = 0;
        assert_eq!(Settings::from(&config).read_timeout, None);
    }

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = Settings::from(&ServerConfig::default());
        let default = Settings::default();
        assert_eq!(from_config.classify_timeout, default.classify_timeout);
        assert_eq!(from_config.read_timeout, default.read_timeout);
        assert_eq!(from_config.raw_fallback, default.raw_fallback);
        assert_eq!(from_config.framing, default.framing);
        assert!(from_config.origin_allowed(None));
    }

    #[test]
    fn origin_pattern_is_compiled() {
        let mut config = ServerConfig::default();
        config.http.allow_origin = Some("*.example.com".into());
        let settings = Settings::from(&config);
        assert!(settings.origin_allowed(Some("http://test.example.com")));
        assert!(!settings.origin_allowed(Some("http://fail.com")));
        assert!(!settings.origin_allowed(None));
    }
}

//! Configuration for the request telemetry machinery.

use derive_more::{Display, Error};
use regex::Regex;

use crate::client_ip::{Ipv6Prefix, PrefixParseError};

/// Process-wide settings consumed by the span tagging and client IP
/// resolution machinery.
///
/// A config is built once at startup, handed to
/// [`Telemetry`](crate::Telemetry) (or used directly with the engine
/// functions), and treated as read-only afterwards.
///
/// # Usage
/// ```rust
/// use actix_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::builder()
///     .client_ip_header("cf-connecting-ip")
///     .obfuscate_query_matching(r"\A.*\z")
///     .finish()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    client_ip_header: Option<String>,
    query_obfuscation: Option<Regex>,
    reserved_ipv6_ranges: Vec<Ipv6Prefix>,
}

impl TelemetryConfig {
    /// Start building a config.
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    pub(crate) fn client_ip_header(&self) -> Option<&str> {
        self.client_ip_header.as_deref()
    }

    pub(crate) fn query_obfuscation(&self) -> Option<&Regex> {
        self.query_obfuscation.as_ref()
    }

    pub(crate) fn reserved_ipv6_ranges(&self) -> &[Ipv6Prefix] {
        &self.reserved_ipv6_ranges
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            client_ip_header: None,
            query_obfuscation: None,
            reserved_ipv6_ranges: vec![Ipv6Prefix::SITE_LOCAL],
        }
    }
}

/// Builder for [`TelemetryConfig`].
///
/// Validation is deferred: invalid inputs are reported by
/// [`finish`](Self::finish), keeping the builder chain itself infallible.
/// When several inputs are invalid, the first failure is the one reported.
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
    error: Option<ConfigError>,
}

impl TelemetryConfigBuilder {
    /// Trust a single forwarding header for client IP resolution instead of
    /// the built-in precedence list.
    ///
    /// Use this when a trusted edge proxy writes the client address to a
    /// dedicated header; the default list is then ignored entirely.
    pub fn client_ip_header(mut self, name: impl Into<String>) -> Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.config.client_ip_header = Some(name);
        self
    }

    /// Redact the parts of the raw query string matched by `pattern` before
    /// the query is embedded in URL tags.
    ///
    /// Every matched region is replaced with
    /// [`REDACTION_MARKER`](crate::REDACTION_MARKER). A pattern matching the
    /// whole string redacts the query wholesale, which is the common
    /// deployment; leaving the pattern unset keeps query strings untouched.
    pub fn obfuscate_query_matching(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.config.query_obfuscation = Some(regex),
            Err(err) => {
                self.error
                    .get_or_insert(ConfigError::InvalidObfuscationPattern(err));
            }
        }
        self
    }

    /// Treat an additional IPv6 range (`addr/len` notation) as reserved, on
    /// top of the built-in site-local `fec0::/10` exclusion.
    ///
    /// Addresses inside a reserved range are never reported as the client IP.
    pub fn reserved_ipv6_range(mut self, range: &str) -> Self {
        match range.parse::<Ipv6Prefix>() {
            Ok(prefix) => self.config.reserved_ipv6_ranges.push(prefix),
            Err(err) => {
                self.error
                    .get_or_insert(ConfigError::InvalidReservedRange(err));
            }
        }
        self
    }

    /// Finalize the config.
    pub fn finish(self) -> Result<TelemetryConfig, ConfigError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.config),
        }
    }
}

/// Errors surfaced by [`TelemetryConfigBuilder::finish`].
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The query obfuscation pattern is not a valid regex.
    #[display("invalid query obfuscation pattern: {_0}")]
    InvalidObfuscationPattern(regex::Error),

    /// A reserved IPv6 range is not valid `addr/len` notation.
    #[display("invalid reserved IPv6 range: {_0}")]
    InvalidReservedRange(PrefixParseError),
}

use actix_web::dev::ServiceRequest;
use actix_web::http::header;
use regex::{NoExpand, Regex};

use crate::config::TelemetryConfig;

/// Marker substituted for query string content matched by the configured
/// obfuscation pattern.
pub const REDACTION_MARKER: &str = "<redacted>";

/// The URL-derived request tags.
///
/// Building is a pure function of the request snapshot and the config; the
/// set is computed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTags {
    /// Canonical URL: `scheme://host` plus the escaped path, plus the
    /// (possibly redacted) query when one is present. The port is never
    /// embedded here; it is reported as its own tag.
    pub url: String,
    /// Host with any `host:port` suffix stripped.
    pub host: String,
    /// Escaped request path, exactly as received.
    pub path: String,
    /// `http`, or `https` on secure transports.
    pub scheme: &'static str,
    /// Port embedded in the host header, or the scheme default.
    pub port: String,
    /// Redacted query string; set only when a raw query and an obfuscation
    /// pattern are both present.
    pub query: Option<String>,
}

impl UrlTags {
    /// Build the URL tags for `req`.
    pub fn for_request(config: &TelemetryConfig, req: &ServiceRequest) -> UrlTags {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| req.uri().authority().map(|authority| authority.as_str()));

        Self::build(
            config,
            req.app_config().secure(),
            host.unwrap_or(""),
            req.uri().path(),
            req.uri().query(),
        )
    }

    /// Build the URL tags from the snapshot parts.
    ///
    /// `path` must already be in escaped form; it is embedded verbatim and
    /// never re-decoded. A port embedded in `host` wins over the scheme
    /// default, and the host tag then carries the bare host.
    pub fn build(
        config: &TelemetryConfig,
        secure: bool,
        host: &str,
        path: &str,
        raw_query: Option<&str>,
    ) -> UrlTags {
        let (scheme, default_port) = if secure { ("https", "443") } else { ("http", "80") };
        let (host, port) = match split_host_port(host) {
            Some((host, port)) => (host, port),
            None => (host, default_port),
        };

        let mut url = format!("{scheme}://{host}{path}");
        let query = match (raw_query, config.query_obfuscation()) {
            (Some(raw), Some(pattern)) => Some(obfuscate_query(raw, pattern)),
            (Some(raw), None) => {
                url.push('?');
                url.push_str(raw);
                None
            }
            (None, _) => None,
        };
        if let Some(query) = &query {
            url.push('?');
            url.push_str(query);
        }

        UrlTags {
            url,
            host: host.to_owned(),
            path: path.to_owned(),
            scheme,
            port: port.to_owned(),
            query,
        }
    }
}

/// Replace every region of `raw_query` matched by `pattern` with
/// [`REDACTION_MARKER`].
///
/// The substitution is literal: `$`-style capture references in the marker
/// are not expanded.
pub fn obfuscate_query(raw_query: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(raw_query, NoExpand(REDACTION_MARKER))
        .into_owned()
}

/// Split a `host:port` pair, handling bracketed IPv6 literals.
///
/// Returns `None` when `host` carries no explicit numeric port.
fn split_host_port(host: &str) -> Option<(&str, &str)> {
    let (head, port) = host.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(stripped) = head.strip_prefix('[') {
        return stripped.strip_suffix(']').map(|host| (host, port));
    }
    if head.contains(':') {
        // unbracketed IPv6 literal, the colon belongs to the address
        return None;
    }
    Some((head, port))
}

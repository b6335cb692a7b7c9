use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use actix_web::http::header::HeaderMap;
use derive_more::{Display, Error};

use crate::config::TelemetryConfig;

/// Forwarding headers inspected for a client address when no custom header is
/// configured, most trusted first.
pub(crate) const DEFAULT_CLIENT_IP_HEADERS: [&str; 9] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
    "via",
    "true-client-ip",
];

/// An IPv6 network in `addr/len` notation, used to exclude reserved ranges
/// from global-address classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    addr: Ipv6Addr,
    len: u8,
}

impl Ipv6Prefix {
    /// Site-local unicast, `fec0::/10`.
    ///
    /// Deprecated by RFC 3879, but generic address classification does not
    /// reject it, so it is excluded here explicitly and unconditionally.
    pub const SITE_LOCAL: Ipv6Prefix = Ipv6Prefix {
        addr: Ipv6Addr::new(0xfec0, 0, 0, 0, 0, 0, 0, 0),
        len: 10,
    };

    /// Returns the network covering `addr` up to `len` bits, or `None` when
    /// `len` exceeds 128.
    pub fn new(addr: Ipv6Addr, len: u8) -> Option<Self> {
        (len <= 128).then_some(Self { addr, len })
    }

    /// Whether `addr` falls inside this network.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        if self.len == 0 {
            return true;
        }
        let mask = u128::MAX << (128 - u32::from(self.len));
        u128::from(self.addr) & mask == u128::from(addr) & mask
    }
}

/// Error returned when an IPv6 prefix is not valid `addr/len` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("invalid IPv6 prefix, expected `addr/len` notation")]
#[non_exhaustive]
pub struct PrefixParseError;

impl FromStr for Ipv6Prefix {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s.split_once('/').ok_or(PrefixParseError)?;
        let addr = addr.parse::<Ipv6Addr>().map_err(|_| PrefixParseError)?;
        let len = len.parse::<u8>().map_err(|_| PrefixParseError)?;
        Ipv6Prefix::new(addr, len).ok_or(PrefixParseError)
    }
}

/// Whether `ip` is plausibly a real public internet endpoint.
///
/// Private, loopback, and link-local unicast addresses are rejected; IPv6
/// addresses are additionally checked against the reserved ranges.
/// IPv4-mapped IPv6 addresses are classified by their embedded IPv4 address.
pub(crate) fn is_global(ip: IpAddr, reserved: &[Ipv6Prefix]) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(ip) => !ip.is_private() && !ip.is_loopback() && !ip.is_link_local(),
        IpAddr::V6(ip) => {
            // fc00::/7 is RFC 4193 unique-local, the IPv6 counterpart of the
            // RFC 1918 private ranges; fe80::/10 is RFC 4291 link-local.
            let unique_local = ip.segments()[0] & 0xfe00 == 0xfc00;
            let link_local = ip.segments()[0] & 0xffc0 == 0xfe80;

            !ip.is_loopback()
                && !unique_local
                && !link_local
                && !reserved.iter().any(|net| net.contains(ip))
        }
    }
}

/// Parse a forwarding-chain token, accepting either a bare address or an
/// `address:port` pair and keeping only the address part.
fn parse_candidate(s: &str) -> Option<IpAddr> {
    s.parse::<IpAddr>()
        .ok()
        .or_else(|| s.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Resolve the request's originating client address from its forwarding
/// headers, falling back to the transport peer address.
///
/// Headers are consulted in the configured precedence order. Within a header
/// the comma-separated chain is scanned left to right and the first token
/// that parses and classifies as global wins; private and loopback noise
/// injected by intermediate proxies is skipped. A lower-precedence header is
/// only consulted when every higher-precedence one failed to yield a
/// candidate.
///
/// Returns `None` when nothing qualifies — the client IP tag is then omitted
/// rather than set to a bogus value.
pub fn resolve_client_ip(
    config: &TelemetryConfig,
    headers: &HeaderMap,
    peer_addr: Option<SocketAddr>,
) -> Option<IpAddr> {
    let reserved = config.reserved_ipv6_ranges();
    let first_global = |value: &str| {
        value
            .split(',')
            .map(str::trim)
            .filter_map(parse_candidate)
            .find(|ip| is_global(*ip, reserved))
    };

    let custom = config.client_ip_header().map(|name| [name]);
    let header_names: &[&str] = match &custom {
        Some(single) => single,
        None => &DEFAULT_CLIENT_IP_HEADERS,
    };

    for name in header_names {
        let Some(value) = headers.get(*name).and_then(|value| value.to_str().ok()) else {
            continue;
        };
        if let Some(ip) = first_global(value) {
            return Some(ip);
        }
    }

    let peer = peer_addr?.ip();
    is_global(peer, reserved).then_some(peer)
}

#[cfg(test)]
mod tests {
    use actix_web::http::header::{HeaderName, HeaderValue};

    use super::*;

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    fn ip(addr: &str) -> IpAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn first_global_address_in_chain_wins() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[("x-forwarded-for", "10.0.0.1, 8.8.8.8, 1.1.1.1")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("8.8.8.8"))
        );
    }

    #[test]
    fn tokens_with_ports_are_accepted() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[("x-forwarded-for", "8.8.8.8:4512")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("8.8.8.8"))
        );

        let headers = header_map(&[("x-forwarded-for", "[2001:4860:4860::8888]:443")]);
        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("2001:4860:4860::8888"))
        );
    }

    #[test]
    fn malformed_tokens_are_skipped() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[("x-forwarded-for", "garbage, , 8.8.8.8")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("8.8.8.8"))
        );
    }

    #[test]
    fn higher_precedence_header_is_scanned_first() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[
            ("x-real-ip", "1.1.1.1"),
            ("x-forwarded-for", "10.0.0.1, 8.8.8.8"),
        ]);

        // x-forwarded-for outranks x-real-ip in the default list
        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("8.8.8.8"))
        );
    }

    #[test]
    fn lower_precedence_header_is_consulted_when_higher_yields_nothing() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[
            ("x-forwarded-for", "10.0.0.1, 192.168.1.7"),
            ("x-real-ip", "1.1.1.1"),
        ]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("1.1.1.1"))
        );
    }

    #[test]
    fn private_chain_falls_back_to_peer_address() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[("x-forwarded-for", "10.0.0.1, 172.16.3.4")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, peer("8.8.4.4:51111")),
            Some(ip("8.8.4.4"))
        );
    }

    #[test]
    fn non_global_peer_resolves_to_absent() {
        let config = TelemetryConfig::default();
        let headers = header_map(&[("x-forwarded-for", "127.0.0.1")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, peer("192.168.0.10:44000")),
            None
        );
        assert_eq!(resolve_client_ip(&config, &HeaderMap::new(), None), None);
    }

    #[test]
    fn custom_header_overrides_the_default_list() {
        let config = TelemetryConfig::builder()
            .client_ip_header("x-real-ip")
            .finish()
            .unwrap();
        let headers = header_map(&[
            ("x-forwarded-for", "8.8.8.8"),
            ("x-real-ip", "9.9.9.9"),
        ]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("9.9.9.9"))
        );

        // only the configured header is consulted before the peer fallback
        let headers = header_map(&[("x-forwarded-for", "8.8.8.8")]);
        assert_eq!(resolve_client_ip(&config, &headers, None), None);
    }

    #[test]
    fn site_local_ipv6_is_never_global() {
        let reserved = [Ipv6Prefix::SITE_LOCAL];

        assert!(!is_global(ip("fec0::1"), &reserved));
        assert!(!is_global(ip("feff:ffff::1"), &reserved));
        assert!(is_global(ip("2001:4860:4860::8888"), &reserved));
    }

    #[test]
    fn configured_reserved_ranges_are_excluded() {
        let config = TelemetryConfig::builder()
            .reserved_ipv6_range("2001:db8::/32")
            .finish()
            .unwrap();
        let headers = header_map(&[("x-forwarded-for", "2001:db8::1, 8.8.8.8")]);

        assert_eq!(
            resolve_client_ip(&config, &headers, None),
            Some(ip("8.8.8.8"))
        );
    }

    #[test]
    fn non_routable_ipv6_classes_are_rejected() {
        let reserved = [Ipv6Prefix::SITE_LOCAL];

        assert!(!is_global(ip("::1"), &reserved));
        assert!(!is_global(ip("fd00::1"), &reserved));
        assert!(!is_global(ip("fe80::1"), &reserved));
    }

    #[test]
    fn mapped_addresses_classify_by_their_ipv4_part() {
        let reserved = [Ipv6Prefix::SITE_LOCAL];

        assert!(!is_global(ip("::ffff:10.0.0.1"), &reserved));
        assert!(is_global(ip("::ffff:8.8.8.8"), &reserved));
    }

    #[test]
    fn prefix_parsing_rejects_malformed_notation() {
        assert!("fec0::/10".parse::<Ipv6Prefix>().is_ok());
        assert!("fec0::".parse::<Ipv6Prefix>().is_err());
        assert!("fec0::/129".parse::<Ipv6Prefix>().is_err());
        assert!("10.0.0.0/8".parse::<Ipv6Prefix>().is_err());
    }
}

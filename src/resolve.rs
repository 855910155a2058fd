//! Address resolution.
//!
//! A user-supplied host string becomes a list of concrete probe targets:
//! literal IPs map to themselves, domains fan out over SRV
//! (`_minecraft._tcp.`), AAAA, and A lookups. Only the first record of each
//! answer is used, and SRV answers pointing at hosts we already cover are
//! dropped.

use lazy_static::lazy_static;
use regex::Regex;
use snafu::{Backtrace, Snafu};
use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

lazy_static! {
    static ref HOST_PORT: Regex =
        Regex::new(r"^(?:\[(.+?)\]|(.+?))(?:[:：](\d+))?$").expect("valid pattern");
    static ref IPV4: Regex =
        Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("valid pattern");
    static ref DOMAIN: Regex =
        Regex::new(r"^(?:[A-Za-z0-9-]{1,63}\.)+(?:[A-Za-z]{2,}|xn--[A-Za-z0-9-]{2,})$")
            .expect("valid pattern");
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AddressError {
    #[snafu(display("`{address}` is not a domain or IP address"))]
    InvalidAddress {
        address: String,
        backtrace: Backtrace,
    },
    #[snafu(display("port {port} is outside 0-65535"))]
    PortOutOfRange { port: u32, backtrace: Backtrace },
}

/// What shape of address the user typed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrKind {
    V4,
    V6,
    Domain,
}

/// How a probe target was obtained, which also fixes the socket family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    V4,
    V6,
    SrvV4,
    SrvV6,
}

impl TargetKind {
    pub fn is_srv(self) -> bool {
        matches!(self, TargetKind::SrvV4 | TargetKind::SrvV6)
    }

    pub fn is_ipv6(self) -> bool {
        matches!(self, TargetKind::V6 | TargetKind::SrvV6)
    }

    fn from_srv(kind: TargetKind) -> TargetKind {
        match kind {
            TargetKind::V4 | TargetKind::SrvV4 => TargetKind::SrvV4,
            TargetKind::V6 | TargetKind::SrvV6 => TargetKind::SrvV6,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::V4 => "IPv4",
            TargetKind::V6 => "IPv6",
            TargetKind::SrvV4 => "SRV-IPv4",
            TargetKind::SrvV6 => "SRV-IPv6",
        })
    }
}

/// One concrete endpoint to probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    /// The literal IP to dial.
    pub ip: String,
    /// Port to dial; `0` means "use the protocol's default port".
    pub port: u16,
    pub kind: TargetKind,
    /// The hostname the server was reached by, in Punycode. Sent in
    /// handshakes so name-based virtual hosts answer correctly; distinct
    /// from `ip`.
    pub refer: String,
}

/// Splits `host[:port]` / `[ipv6]:port`, accepting the fullwidth `：`
/// separator too. A missing port is `0`, which downstream reads as "use
/// the protocol default". The port is returned unvalidated.
pub fn parse_host(input: &str) -> (String, u32) {
    let Some(captures) = HOST_PORT.captures(input) else {
        return (input.to_string(), 0);
    };
    let address = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let port = captures
        .get(3)
        .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX))
        .unwrap_or(0);
    (address, port)
}

pub fn is_ipv4(address: &str) -> bool {
    IPV4.is_match(address)
        && address
            .split('.')
            .all(|octet| matches!(octet.parse::<u16>(), Ok(value) if value <= 255))
}

pub fn is_ipv6(address: &str) -> bool {
    // zone suffixes (`%eth0`) are not part of the textual address
    let bare = address.trim().split('%').next().unwrap_or_default();
    bare.parse::<Ipv6Addr>().is_ok()
}

pub fn is_domain(address: &str) -> bool {
    let Ok(ascii) = idna::domain_to_ascii(address) else {
        return false;
    };
    ascii == "localhost" || (!ascii.starts_with('-') && DOMAIN.is_match(&ascii))
}

pub fn classify(address: &str) -> Option<AddrKind> {
    if is_ipv4(address) {
        Some(AddrKind::V4)
    } else if is_ipv6(address) {
        Some(AddrKind::V6)
    } else if is_domain(address) {
        Some(AddrKind::Domain)
    } else {
        None
    }
}

/// Punycode form of a hostname, or the input unchanged when it does not
/// IDNA-encode (IPv6 literals, for one).
pub fn punycode(address: &str) -> String {
    idna::domain_to_ascii(address).unwrap_or_else(|_| address.to_string())
}

/// An SRV answer is redundant when a prior target already dials the same
/// ip and port, or when the SRV port is the Java default 25565 and the ip
/// is already covered at all.
fn srv_is_duplicate(existing: &[ProbeTarget], ip: &str, port: u16) -> bool {
    existing
        .iter()
        .any(|entry| entry.ip == ip && (entry.port == port || port == 25565))
}

fn dns_resolver() -> TokioAsyncResolver {
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(10);
    opts.attempts = 3;
    TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
}

async fn lookup_first_a(resolver: &TokioAsyncResolver, domain: &str) -> Option<String> {
    match resolver.ipv4_lookup(domain).await {
        Ok(lookup) => lookup.iter().next().map(|record| record.0.to_string()),
        Err(err) => {
            debug!("A lookup for {domain} failed: {err}");
            None
        }
    }
}

async fn lookup_first_aaaa(resolver: &TokioAsyncResolver, domain: &str) -> Option<String> {
    match resolver.ipv6_lookup(domain).await {
        Ok(lookup) => lookup.iter().next().map(|record| record.0.to_string()),
        Err(err) => {
            debug!("AAAA lookup for {domain} failed: {err}");
            None
        }
    }
}

async fn lookup_first_srv(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Option<(String, u16)> {
    match resolver.srv_lookup(format!("_minecraft._tcp.{domain}")).await {
        Ok(lookup) => lookup.iter().next().map(|record| {
            let target = record.target().to_utf8();
            (target.trim_end_matches('.').to_string(), record.port())
        }),
        Err(err) => {
            debug!("SRV lookup for {domain} failed: {err}");
            None
        }
    }
}

/// Resolves the SRV answer's target down to a dialable endpoint. SRV
/// lookup is disabled on this inner resolution.
async fn resolve_srv_answer(
    resolver: &TokioAsyncResolver,
    srv_host: &str,
    srv_port: u16,
) -> Option<ProbeTarget> {
    let refer = punycode(srv_host);
    match classify(srv_host)? {
        AddrKind::V4 => Some(ProbeTarget {
            ip: srv_host.to_string(),
            port: srv_port,
            kind: TargetKind::SrvV4,
            refer,
        }),
        AddrKind::V6 => Some(ProbeTarget {
            ip: srv_host.to_string(),
            port: srv_port,
            kind: TargetKind::SrvV6,
            refer,
        }),
        AddrKind::Domain => {
            let (a, aaaa) = tokio::join!(
                lookup_first_a(resolver, srv_host),
                lookup_first_aaaa(resolver, srv_host),
            );
            let (ip, kind) = match (a, aaaa) {
                (Some(ip), _) => (ip, TargetKind::V4),
                (None, Some(ip)) => (ip, TargetKind::V6),
                (None, None) => return None,
            };
            Some(ProbeTarget {
                ip,
                port: srv_port,
                kind: TargetKind::from_srv(kind),
                refer,
            })
        }
    }
}

/// Resolves a validated address to its probe targets.
///
/// IP literals yield one target. Domains query SRV, AAAA, and A
/// concurrently (10 s per query, 3 attempts each) and yield up to one
/// target per answer; a resolution with no answers yields an empty list,
/// which the orchestrator reports as a failed connection.
pub async fn resolve_targets(
    address: &str,
    port: u16,
) -> Result<Vec<ProbeTarget>, AddressError> {
    let kind = classify(address).ok_or_else(|| {
        InvalidAddressSnafu {
            address: address.to_string(),
        }
        .build()
    })?;
    let refer = punycode(address);

    match kind {
        AddrKind::V4 => Ok(vec![ProbeTarget {
            ip: address.to_string(),
            port,
            kind: TargetKind::V4,
            refer,
        }]),
        AddrKind::V6 => Ok(vec![ProbeTarget {
            ip: address.to_string(),
            port,
            kind: TargetKind::V6,
            refer,
        }]),
        AddrKind::Domain => {
            let resolver = dns_resolver();
            let (a, aaaa, srv) = tokio::join!(
                lookup_first_a(&resolver, address),
                lookup_first_aaaa(&resolver, address),
                lookup_first_srv(&resolver, address),
            );

            let mut targets = Vec::new();
            if let Some(ip) = a {
                targets.push(ProbeTarget {
                    ip,
                    port,
                    kind: TargetKind::V4,
                    refer: refer.clone(),
                });
            }
            if let Some(ip) = aaaa {
                targets.push(ProbeTarget {
                    ip,
                    port,
                    kind: TargetKind::V6,
                    refer: refer.clone(),
                });
            }
            if let Some((srv_host, srv_port)) = srv {
                if let Some(target) = resolve_srv_answer(&resolver, &srv_host, srv_port).await
                {
                    if srv_is_duplicate(&targets, &target.ip, target.port) {
                        debug!(
                            "dropping SRV target {}:{} already covered",
                            target.ip, target.port
                        );
                    } else {
                        targets.push(target);
                    }
                }
            }
            Ok(targets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_with_every_separator() {
        for (input, host, port) in [
            ("mc.example.com", "mc.example.com", 0),
            ("mc.example.com:25566", "mc.example.com", 25566),
            ("mc.example.com：25566", "mc.example.com", 25566),
            ("203.0.113.5:19132", "203.0.113.5", 19132),
            ("[2001:db8::1]:19133", "2001:db8::1", 19133),
            ("[2001:db8::1]", "2001:db8::1", 0),
            ("localhost", "localhost", 0),
        ] {
            assert_eq!(parse_host(input), (host.to_string(), port), "{input}");
        }
    }

    #[test]
    fn port_survives_unvalidated() {
        let (_, port) = parse_host("host:99999");
        assert_eq!(port, 99999);
    }

    #[test]
    fn classifies_ipv4() {
        assert_eq!(classify("203.0.113.5"), Some(AddrKind::V4));
        assert_eq!(classify("0.0.0.0"), Some(AddrKind::V4));
        // octet out of range falls through to nothing
        assert_eq!(classify("256.1.1.1"), None);
        assert_eq!(classify("1.2.3"), None);
    }

    #[test]
    fn classifies_ipv6() {
        assert_eq!(classify("2001:db8::1"), Some(AddrKind::V6));
        assert_eq!(classify("::1"), Some(AddrKind::V6));
        assert_eq!(classify("::ffff:192.0.2.1"), Some(AddrKind::V6));
        assert_eq!(classify("fe80::1%eth0"), Some(AddrKind::V6));
    }

    #[test]
    fn classifies_domains() {
        assert_eq!(classify("mc.example.com"), Some(AddrKind::Domain));
        assert_eq!(classify("localhost"), Some(AddrKind::Domain));
        assert_eq!(classify("我的服务器.中国"), Some(AddrKind::Domain));
        assert_eq!(classify("-bad.example.com"), None);
        assert_eq!(classify("no dots"), None);
    }

    #[test]
    fn punycode_encodes_unicode_hosts() {
        assert_eq!(punycode("bücher.example"), "xn--bcher-kva.example");
        assert_eq!(punycode("mc.example.com"), "mc.example.com");
    }

    #[test]
    fn srv_duplicate_rules() {
        let existing = vec![ProbeTarget {
            ip: "203.0.113.5".into(),
            port: 0,
            kind: TargetKind::V4,
            refer: "mc.example.com".into(),
        }];
        // same ip, differing port: kept
        assert!(!srv_is_duplicate(&existing, "203.0.113.5", 25577));
        // same ip and port: dropped
        assert!(srv_is_duplicate(&existing, "203.0.113.5", 0));
        // the Java default port is dropped whenever the ip is covered
        assert!(srv_is_duplicate(&existing, "203.0.113.5", 25565));
        // different ip: kept
        assert!(!srv_is_duplicate(&existing, "203.0.113.9", 25565));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn resolves_a_real_domain() {
        let targets = resolve_targets("hypixel.net", 0).await.unwrap();
        assert!(!targets.is_empty());
    }
}

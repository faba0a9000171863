//! Hostname and IP address classification for SSRF defense.
//!
//! The fetch capability refuses any host that resolves into private,
//! link-local, loopback, carrier-NAT or cloud-metadata address space.
//! IPv4-mapped IPv6 (`::ffff:a.b.c.d`, in both dotted and hex spellings)
//! is classified by its embedded IPv4 address; rejecting the mapped form
//! closes the bypass where a private IPv4 target is smuggled inside an
//! IPv6 literal.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Hostnames refused outright, before any pattern matching.
const BLOCKED_HOSTNAMES: [&str; 6] = [
    "localhost",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
    "metadata",
    "instance-data",
];

/// Hostname suffixes that name link-local or site-internal namespaces.
const BLOCKED_SUFFIXES: [&str; 3] = [".localhost", ".local", ".internal"];

/// Cloud metadata endpoints, matched exactly.
const METADATA_IPS: [&str; 3] = ["169.254.169.254", "100.100.100.200", "fd00:ec2::254"];

/// Normalizes a host for comparison: lowercase, trailing dot trimmed,
/// IPv6 brackets stripped.
fn normalize_host(host: &str) -> String {
    let mut h = host.trim().to_lowercase();
    if let Some(stripped) = h.strip_suffix('.') {
        h = stripped.to_string();
    }
    if h.starts_with('[') && h.ends_with(']') {
        h = h[1..h.len() - 1].to_string();
    }
    h
}

/// Returns true if the hostname is on the blocked list or carries a
/// blocked suffix.
pub fn is_blocked_hostname(host: &str) -> bool {
    let h = normalize_host(host);
    if BLOCKED_HOSTNAMES.iter().any(|b| *b == h) {
        return true;
    }
    BLOCKED_SUFFIXES.iter().any(|s| h.ends_with(s))
}

fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    match octets[0] {
        0 | 10 | 127 => true,
        169 => octets[1] == 254,
        172 => (16..=31).contains(&octets[1]),
        192 => octets[1] == 168,
        // Carrier-grade NAT, 100.64.0.0/10
        100 => (64..=127).contains(&octets[1]),
        _ => false,
    }
}

fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    let segments = addr.segments();
    // fe80::/10 link-local, fec0::/10 deprecated site-local
    if (segments[0] & 0xffc0) == 0xfe80 || (segments[0] & 0xffc0) == 0xfec0 {
        return true;
    }
    // fc00::/7 unique local
    (segments[0] & 0xfe00) == 0xfc00
}

/// Classifies an address literal as private/reserved. Accepts bare IPv4,
/// bare IPv6 (bracketed or not), and the IPv4-mapped `::ffff:` form.
/// Non-address input is not private.
pub fn is_private_ip(addr: &str) -> bool {
    let a = normalize_host(addr);

    if let Ok(v4) = a.parse::<Ipv4Addr>() {
        return is_private_ipv4(v4);
    }

    if let Ok(v6) = a.parse::<Ipv6Addr>() {
        // `::ffff:127.0.0.1` and `::ffff:7f00:1` both land here.
        if let Some(mapped) = v6.to_ipv4_mapped() {
            return is_private_ipv4(mapped);
        }
        return is_private_ipv6(v6);
    }

    false
}

/// Exact match against the cloud metadata endpoint list.
pub fn is_cloud_metadata_ip(addr: &str) -> bool {
    let a = normalize_host(addr);
    // Compare IPv6 entries structurally so `fd00:ec2:0:0:0:0:0:254`
    // and `fd00:ec2::254` are the same endpoint.
    if let Ok(v6) = a.parse::<Ipv6Addr>() {
        return METADATA_IPS
            .iter()
            .filter_map(|m| m.parse::<Ipv6Addr>().ok())
            .any(|m| m == v6);
    }
    METADATA_IPS.iter().any(|m| *m == a)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── hostnames ───────────────────────────────────────────────

    #[test]
    fn test_blocked_hostnames() {
        assert!(is_blocked_hostname("localhost"));
        assert!(is_blocked_hostname("LOCALHOST"));
        assert!(is_blocked_hostname("localhost."));
        assert!(is_blocked_hostname("metadata.google.internal"));
    }

    #[test]
    fn test_blocked_suffixes() {
        assert!(is_blocked_hostname("foo.localhost"));
        assert!(is_blocked_hostname("printer.local"));
        assert!(is_blocked_hostname("db.prod.internal"));
    }

    #[test]
    fn test_public_hostnames_allowed() {
        assert!(!is_blocked_hostname("example.com"));
        assert!(!is_blocked_hostname("api.example.com"));
        assert!(!is_blocked_hostname("internal-api.example.com"));
        assert!(!is_blocked_hostname("localhost.example.com"));
    }

    #[test]
    fn test_bracketed_ipv6_hostname() {
        assert!(is_private_ip("[::1]"));
        assert!(is_private_ip("[fe80::1]"));
    }

    // ── IPv4 ranges ─────────────────────────────────────────────

    #[test]
    fn test_private_ipv4_ranges() {
        for addr in [
            "0.0.0.0",
            "10.0.0.1",
            "10.255.255.255",
            "127.0.0.1",
            "127.1.2.3",
            "169.254.169.254",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.1.1",
            "100.64.0.1",
            "100.127.255.255",
        ] {
            assert!(is_private_ip(addr), "{addr} should be private");
        }
    }

    #[test]
    fn test_public_ipv4_allowed() {
        for addr in [
            "8.8.8.8",
            "1.1.1.1",
            "172.15.0.1",
            "172.32.0.1",
            "100.63.0.1",
            "100.128.0.1",
            "169.253.1.1",
            "93.184.216.34",
        ] {
            assert!(!is_private_ip(addr), "{addr} should be public");
        }
    }

    // ── IPv6 ranges ─────────────────────────────────────────────

    #[test]
    fn test_private_ipv6() {
        for addr in ["::", "::1", "fe80::1", "fec0::1", "fc00::1", "fd12:3456::1"] {
            assert!(is_private_ip(addr), "{addr} should be private");
        }
    }

    #[test]
    fn test_public_ipv6_allowed() {
        assert!(!is_private_ip("2606:4700:4700::1111"));
        assert!(!is_private_ip("2001:4860:4860::8888"));
    }

    // ── IPv4-mapped IPv6 ────────────────────────────────────────

    #[test]
    fn test_mapped_ipv4_dotted_form() {
        assert!(is_private_ip("::ffff:127.0.0.1"));
        assert!(is_private_ip("::ffff:10.0.0.1"));
        assert!(is_private_ip("::ffff:192.168.1.1"));
        assert!(!is_private_ip("::ffff:8.8.8.8"));
    }

    #[test]
    fn test_mapped_ipv4_hex_form() {
        // 7f00:1 == 127.0.0.1, a9fe:a9fe == 169.254.169.254
        assert!(is_private_ip("::ffff:7f00:1"));
        assert!(is_private_ip("::ffff:a9fe:a9fe"));
        assert!(!is_private_ip("::ffff:808:808"));
    }

    #[test]
    fn test_mapped_matches_bare_classification() {
        // Invariant: mapped form classifies identically to the bare form.
        for addr in ["127.0.0.1", "10.1.2.3", "8.8.4.4", "172.20.0.5"] {
            let mapped = format!("::ffff:{addr}");
            assert_eq!(is_private_ip(addr), is_private_ip(&mapped), "{addr}");
        }
    }

    // ── metadata endpoints ──────────────────────────────────────

    #[test]
    fn test_cloud_metadata_ips() {
        assert!(is_cloud_metadata_ip("169.254.169.254"));
        assert!(is_cloud_metadata_ip("100.100.100.200"));
        assert!(is_cloud_metadata_ip("fd00:ec2::254"));
        assert!(is_cloud_metadata_ip("fd00:ec2:0:0:0:0:0:254"));
        assert!(!is_cloud_metadata_ip("169.254.169.253"));
        assert!(!is_cloud_metadata_ip("example.com"));
    }

    // ── non-addresses ───────────────────────────────────────────

    #[test]
    fn test_non_address_input_is_not_private() {
        assert!(!is_private_ip("example.com"));
        assert!(!is_private_ip(""));
        assert!(!is_private_ip("not an ip"));
    }
}

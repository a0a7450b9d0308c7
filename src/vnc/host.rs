//! Parsing of user-entered host strings.
//!
//! Users paste everything from plain hostnames to bracketed IPv6
//! addresses with trailing ports. IPv4-mapped IPv6 addresses are
//! normalised to plain IPv4, since not every resolver stack handles the
//! mapped form.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Tried in order; the first match wins.
    static ref HOST_PATTERNS: Vec<Regex> = vec![
        // IPv4-mapped IPv6 address
        Regex::new(r"^::[fF]{4}:(\d+\.\d+\.\d+\.\d+)$").unwrap(),
        // IPv4-mapped IPv6 address with port
        Regex::new(r"^::[fF]{4}:(\d+\.\d+\.\d+\.\d+):(\d+)$").unwrap(),
        // bracketed IPv4-mapped IPv6 address with port
        Regex::new(r"^\[::[fF]{4}:(\d+\.\d+\.\d+\.\d+)\]:(\d+)$").unwrap(),
        // any other bracketed IPv6 address with port
        Regex::new(r"^\[([0-9a-fA-F:]+)\]:(\d+)$").unwrap(),
        // irregular ipv6:port where the port is identifiable by being >= 5 digits;
        // the lazy quantifier keeps the port out of the address capture
        Regex::new(r"^([0-9a-fA-F:]+?):(\d{5})$").unwrap(),
        // any other notation with a trailing port
        Regex::new(r"^([^:]+):(\d+)$").unwrap(),
    ];
}

/// A parsed host string: the host itself plus an optional port peeled
/// off the end. Inputs matching none of the known forms are retained
/// verbatim with no port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub host: String,
    pub port: Option<u16>,
}

impl HostAddress {
    pub fn parse(input: &str) -> Self {
        for pattern in HOST_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(input) {
                let mut host = input.to_string();
                if let Some(matched) = captures.get(1) {
                    if !matched.as_str().is_empty() {
                        host = matched.as_str().to_string();
                    }
                }

                let port = captures
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u16>().ok())
                    .filter(|p| *p > 0);

                return Self { host, port };
            }
        }

        Self {
            host: input.to_string(),
            port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> (String, Option<u16>) {
        let addr = HostAddress::parse(input);
        (addr.host, addr.port)
    }

    #[test]
    fn bare_hostname_is_retained_verbatim() {
        assert_eq!(parsed("example.local"), ("example.local".into(), None));
    }

    #[test]
    fn host_with_port() {
        assert_eq!(parsed("desktop-12:5902"), ("desktop-12".into(), Some(5902)));
    }

    #[test]
    fn ipv4_mapped_ipv6_is_unmapped() {
        assert_eq!(parsed("::ffff:10.0.0.5"), ("10.0.0.5".into(), None));
        assert_eq!(parsed("::FFFF:10.0.0.5"), ("10.0.0.5".into(), None));
    }

    #[test]
    fn ipv4_mapped_ipv6_with_port() {
        assert_eq!(
            parsed("::ffff:10.0.0.5:5900"),
            ("10.0.0.5".into(), Some(5900))
        );
    }

    #[test]
    fn bracketed_ipv4_mapped_with_port() {
        assert_eq!(
            parsed("[::ffff:192.168.1.2]:5901"),
            ("192.168.1.2".into(), Some(5901))
        );
    }

    #[test]
    fn bracketed_ipv6_with_port() {
        assert_eq!(
            parsed("[2001:db8::1]:5901"),
            ("2001:db8::1".into(), Some(5901))
        );
    }

    #[test]
    fn irregular_ipv6_with_five_digit_port() {
        assert_eq!(parsed("fe80::1:11100"), ("fe80::1".into(), Some(11100)));
    }

    #[test]
    fn ipv6_with_short_trailing_group_is_not_split() {
        // a 4-digit trailing group is part of the address, not a port
        assert_eq!(parsed("2001:db8::5900"), ("2001:db8::5900".into(), None));
    }

    #[test]
    fn port_zero_is_ignored() {
        assert_eq!(parsed("host:0"), ("host".into(), None));
    }
}

//! Host bypass matching: globs and CIDR ranges.

use std::net::IpAddr;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Compiled bypass patterns for one endpoint.
///
/// Glob patterns (`*.internal.example`) match hostnames; CIDR patterns
/// (`10.0.0.0/8`, `fd00::/8`) match literal IP hosts.
pub struct BypassMatcher {
    globs: GlobSet,
    cidrs: Vec<(IpAddr, u8)>,
}

impl BypassMatcher {
    pub fn compile(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut cidrs = Vec::new();
        for pattern in patterns {
            if let Some(cidr) = parse_cidr(pattern) {
                cidrs.push(cidr);
            } else {
                match Glob::new(pattern) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => warn!(pattern = %pattern, error = %e, "invalid bypass pattern"),
                }
            }
        }
        let globs = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "bypass glob set failed to compile, matching nothing");
            GlobSet::empty()
        });
        Self { globs, cidrs }
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty() && self.cidrs.is_empty()
    }

    pub fn matches_host(&self, host: &str) -> bool {
        if self.globs.is_match(host) {
            return true;
        }
        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            return self.cidrs.iter().any(|&(net, prefix)| in_cidr(ip, net, prefix));
        }
        false
    }
}

fn parse_cidr(pattern: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = pattern.split_once('/')?;
    let ip: IpAddr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    let max = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    (prefix <= max).then_some((ip, prefix))
}

fn in_cidr(ip: IpAddr, net: IpAddr, prefix: u8) -> bool {
    match (ip, net) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix == 0 {
                return true;
            }
            let mask = u32::MAX << (32 - prefix as u32);
            (u32::from(ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix == 0 {
                return true;
            }
            let mask = u128::MAX << (128 - prefix as u32);
            (u128::from(ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns_match_hostnames() {
        let m = BypassMatcher::compile(&["*.internal.example".to_string(), "localhost".to_string()]);
        assert!(m.matches_host("api.internal.example"));
        assert!(m.matches_host("localhost"));
        assert!(!m.matches_host("example.com"));
    }

    #[test]
    fn cidr_patterns_match_ips() {
        let m = BypassMatcher::compile(&["10.0.0.0/8".to_string(), "192.168.1.0/24".to_string()]);
        assert!(m.matches_host("10.20.30.40"));
        assert!(m.matches_host("192.168.1.7"));
        assert!(!m.matches_host("192.168.2.7"));
        assert!(!m.matches_host("8.8.8.8"));
        assert!(!m.matches_host("example.com"));
    }

    #[test]
    fn ipv6_cidr() {
        let m = BypassMatcher::compile(&["fd00::/8".to_string()]);
        assert!(m.matches_host("fd12:3456::1"));
        assert!(m.matches_host("[fd12:3456::1]"));
        assert!(!m.matches_host("2001:db8::1"));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let m = BypassMatcher::compile(&["10.0.0.0/99".to_string()]);
        // 10.0.0.0/99 is not a valid CIDR; it falls through to glob
        // compilation and matches only the literal string.
        assert!(!m.matches_host("10.1.2.3"));
    }
}

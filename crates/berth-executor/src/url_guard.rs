//! Navigation URL validation with SSRF protection.
//!
//! Every navigation URL passes through here before a browser sees it.
//! Checks run cheapest-first and the first failure wins; advisory findings
//! (dynamic-DNS hosts, free TLDs) come back as warnings and never block.

use std::collections::HashSet;

use berth_types::{Error, Result, MAX_HOST_LEN, MAX_URL_LEN};
use once_cell::sync::Lazy;
use regex::Regex;
use url::{Host, Url};

/// Query keys that commonly smuggle a second URL past host checks.
static REDIRECT_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(redirect|redirect_uri|url|next|continue|return|goto)$")
        .expect("redirect param regex"));

/// Scheme separators that survive one round of percent-decoding: their
/// presence in a decoded query value means the original was double-encoded.
static ENCODED_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)%(3a|2f)").expect("encoded scheme regex"));

static DYNAMIC_DNS_SUFFIXES: &[&str] = &[
    ".duckdns.org",
    ".ngrok.io",
    ".ngrok-free.app",
    ".no-ip.org",
    ".dyndns.org",
];

static FREE_TLDS: &[&str] = &[".tk", ".ml", ".ga", ".cf", ".gq"];

#[derive(Debug, Clone)]
pub struct UrlGuardConfig {
    pub allowed_schemes: Vec<String>,
    /// `file:` URLs only pass when explicitly enabled.
    pub allow_file: bool,
    /// Permit localhost and RFC1918/link-local/unique-local targets.
    pub allow_private_networks: bool,
    pub blocked_hosts: HashSet<String>,
}

impl Default for UrlGuardConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allow_file: false,
            allow_private_networks: false,
            blocked_hosts: HashSet::new(),
        }
    }
}

pub struct UrlGuard {
    config: UrlGuardConfig,
}

impl UrlGuard {
    pub fn new(config: UrlGuardConfig) -> Self {
        Self { config }
    }

    /// Validate one navigation URL. Returns advisory warnings on success.
    pub fn check(&self, raw: &str) -> Result<Vec<String>> {
        if raw.len() > MAX_URL_LEN {
            return Err(Error::invalid_argument(format!(
                "url length {} exceeds {MAX_URL_LEN}",
                raw.len()
            )));
        }

        let url = Url::parse(raw)
            .map_err(|e| Error::invalid_argument(format!("unparseable url: {e}")))?;

        let scheme = url.scheme().to_ascii_lowercase();
        if scheme == "file" {
            if !self.config.allow_file {
                return Err(Error::blocked("file: urls are disabled"));
            }
        } else if !self.config.allowed_schemes.iter().any(|s| s == &scheme) {
            return Err(Error::blocked(format!("scheme {scheme} is not allowed")));
        }

        let mut warnings = Vec::new();

        if scheme != "file" {
            let host = url
                .host()
                .ok_or_else(|| Error::invalid_argument("url has no host"))?;
            let host_str = host.to_string();
            if host_str.len() > MAX_HOST_LEN {
                return Err(Error::invalid_argument(format!(
                    "host exceeds {MAX_HOST_LEN} chars"
                )));
            }
            let lowered = host_str.to_ascii_lowercase();
            if self.config.blocked_hosts.contains(&lowered) {
                return Err(Error::blocked(format!("host {lowered} is blocked")));
            }
            if !self.config.allow_private_networks {
                self.check_private(&host)?;
            }
            self.host_warnings(&lowered, &mut warnings);
        }

        self.check_query(&url, &mut warnings)?;
        Ok(warnings)
    }

    fn check_private(&self, host: &Host<&str>) -> Result<()> {
        match host {
            Host::Domain(domain) => {
                let lowered = domain.to_ascii_lowercase();
                if lowered == "localhost" || lowered.ends_with(".localhost") {
                    return Err(Error::blocked("localhost is not allowed"));
                }
                Ok(())
            }
            Host::Ipv4(ip) => {
                if is_private_v4(*ip) {
                    return Err(Error::blocked(format!(
                        "private network address {ip} is not allowed"
                    )));
                }
                Ok(())
            }
            Host::Ipv6(ip) => {
                if is_private_v6(*ip) {
                    return Err(Error::blocked(format!(
                        "private network address {ip} is not allowed"
                    )));
                }
                Ok(())
            }
        }
    }

    fn host_warnings(&self, host: &str, warnings: &mut Vec<String>) {
        if DYNAMIC_DNS_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            warnings.push(format!("host {host} uses a dynamic-DNS provider"));
        }
        if FREE_TLDS.iter().any(|s| host.ends_with(s)) {
            warnings.push(format!("host {host} uses a free TLD"));
        }
    }

    /// Scan query parameters for redirect-bypass indicators: a known
    /// redirect key carrying another absolute URL, or doubly-encoded
    /// scheme separators.
    fn check_query(&self, url: &Url, warnings: &mut Vec<String>) -> Result<()> {
        for (key, value) in url.query_pairs() {
            if ENCODED_SCHEME.is_match(value.as_ref()) {
                return Err(Error::blocked(format!(
                    "query parameter {key} carries a doubly-encoded scheme"
                )));
            }
            if REDIRECT_PARAM.is_match(key.as_ref()) {
                if let Ok(inner) = Url::parse(value.as_ref()) {
                    if inner.has_host() {
                        // Re-validate the carried URL against the same
                        // policy; a private target hiding in a redirect
                        // parameter is still a block.
                        if !self.config.allow_private_networks {
                            if let Some(host) = inner.host() {
                                if self.check_private(&host).is_err() {
                                    return Err(Error::blocked(format!(
                                        "redirect parameter {key} targets a private address"
                                    )));
                                }
                            }
                        }
                        warnings.push(format!("query parameter {key} carries a full url"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_private_v4(ip: std::net::Ipv4Addr) -> bool {
    ip.is_loopback()            // 127/8
        || ip.is_private()      // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local()   // 169.254/16
        || ip.is_unspecified()
}

fn is_private_v6(ip: std::net::Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // fe80::/10 link-local, fc00::/7 unique-local
    if (segments[0] & 0xffc0) == 0xfe80 || (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // IPv4-mapped addresses inherit the IPv4 classification.
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    false
}

//! Turning raw `href` attributes into probe targets.

use std::net::IpAddr;

use url::Url;

/// What to do with a raw `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Absolute http(s) URL to probe.
    Probe(Url),
    /// Not a navigable web link (empty, fragment-only, `mailto:`, ...).
    Skip(&'static str),
    /// Relative href with no usable base URL, or otherwise unparseable.
    Unresolvable,
}

/// Resolve `href` against `base`.
///
/// Relative hrefs are joined to `base`; absolute hrefs are used as-is. The
/// fragment is stripped from the result.
pub fn resolve_href(href: &str, base: Option<&Url>) -> Resolution {
    let href = href.trim();

    if href.is_empty() {
        return Resolution::Skip("empty href");
    }
    if href.starts_with('#') {
        return Resolution::Skip("in-page anchor");
    }
    let lower = href.to_ascii_lowercase();
    for scheme in ["javascript:", "mailto:", "tel:", "data:"] {
        if lower.starts_with(scheme) {
            return Resolution::Skip("non-web scheme");
        }
    }

    let resolved = match Url::parse(href) {
        Ok(url) => url,
        Err(_) => match base.map(|b| b.join(href)) {
            Some(Ok(url)) => url,
            _ => return Resolution::Unresolvable,
        },
    };

    match resolved.scheme() {
        "http" | "https" => {}
        _ => return Resolution::Skip("non-web scheme"),
    }

    let mut resolved = resolved;
    resolved.set_fragment(None);
    Resolution::Probe(resolved)
}

/// Check if a URL targets a loopback, private, or local-only host.
pub fn is_private_target(url: &Url) -> bool {
    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }
    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

//! Registrable-domain computation.
//!
//! The dependency stack carried over from the teacher has no `publicsuffix`-style
//! crate, so this uses a small static table of common two-label suffixes
//! (`co.uk`, `com.au`, `co.jp`, ...) with a last-two-labels fallback. See
//! DESIGN.md for the rationale.

use url::Url;

const TWO_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.jp", "ne.jp",
    "or.jp", "co.nz", "org.nz", "com.br", "com.cn", "com.hk", "co.in", "co.kr", "com.mx",
    "co.za", "com.sg",
];

/// Derive the registrable domain from a URL's host, e.g. `www.example.co.uk` -> `example.co.uk`.
///
/// Returns `None` if the URL has no host.
pub fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(registrable_domain_from_host(host))
}

/// Same computation, operating directly on a hostname string.
pub fn registrable_domain_from_host(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }

    let last_two = format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
    if TWO_LABEL_SUFFIXES.contains(&last_two.as_str()) && labels.len() >= 3 {
        let last_three = labels[labels.len() - 3..].join(".");
        return last_three;
    }

    last_two
}

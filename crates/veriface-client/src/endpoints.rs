//! Candidate endpoint policy.
//!
//! Backends are found by convention, not service discovery: an optionally
//! configured address plus loopback variants on the fixed development
//! port. The last endpoint that answered is always tried first.

use url::Url;

/// Development-convention port the recognition backend listens on.
pub const DEFAULT_PORT: u16 = 5000;

/// The fixed candidate list: the configured endpoint (if any) first, then
/// loopback variants. Duplicates collapse, first occurrence wins.
pub fn candidate_endpoints(configured: Option<&Url>) -> Vec<Url> {
    let mut candidates: Vec<Url> = Vec::with_capacity(3);
    if let Some(url) = configured {
        push_unique(&mut candidates, url.clone());
    }
    for host in ["localhost", "127.0.0.1"] {
        if let Ok(url) = Url::parse(&format!("http://{host}:{DEFAULT_PORT}")) {
            push_unique(&mut candidates, url);
        }
    }
    candidates
}

/// Search order for one request: the last-known-good endpoint first, then
/// the remaining candidates in their fixed order.
pub fn sweep_order(candidates: &[Url], last_good: Option<&Url>) -> Vec<Url> {
    let Some(last_good) = last_good else {
        return candidates.to_vec();
    };
    let mut order = Vec::with_capacity(candidates.len());
    order.push(last_good.clone());
    order.extend(candidates.iter().filter(|c| *c != last_good).cloned());
    order
}

/// Join a request path onto a base endpoint without `Url::join` surprises
/// around trailing slashes.
pub(crate) fn request_url(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

fn push_unique(candidates: &mut Vec<Url>, url: Url) {
    if !candidates.contains(&url) {
        candidates.push(url);
    }
}

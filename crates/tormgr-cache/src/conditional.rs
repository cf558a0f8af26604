//! Conditional-read short-circuit based on entity versions.

/// Outcome of comparing the stored version with the client's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional<P> {
    /// The client already holds this version; send an empty body.
    NotModified,
    /// Send `payload` and advertise `version` for later conditional requests.
    Fresh { payload: P, version: String },
}

/// Decide between a "not modified" answer and a full payload.
///
/// `client` is the raw conditional header value. It may list several
/// versions separated by commas, quoted or weak (`W/"..."`). An empty stored
/// version, as carried by uncached payloads, never matches.
pub fn respond<P>(stored: &str, client: Option<&str>, payload: P) -> Conditional<P> {
    let matched = !stored.is_empty()
        && client.is_some_and(|header| {
            header
                .split(',')
                .map(normalize)
                .any(|candidate| !candidate.is_empty() && (candidate == stored || candidate == "*"))
        });

    if matched {
        Conditional::NotModified
    } else {
        Conditional::Fresh {
            payload,
            version: stored.to_string(),
        }
    }
}

fn normalize(candidate: &str) -> &str {
    let candidate = candidate.trim();
    let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
    candidate.trim_matches('"')
}

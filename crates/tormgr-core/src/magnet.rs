//! Magnet link parsing.

use url::Url;

use crate::error::{CoreError, Result};

const BTIH_PREFIX: &str = "urn:btih:";

/// The parts of a `magnet:` URI the server keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Upper-cased hex info hash from the `xt` parameter.
    pub info_hash: String,
    /// Display name (`dn`), empty when absent.
    pub title: String,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    pub fn parse(link: &str) -> Result<Self> {
        let url = Url::parse(link).map_err(|e| CoreError::invalid_magnet(e.to_string()))?;
        if url.scheme() != "magnet" {
            return Err(CoreError::invalid_magnet(format!(
                "expected magnet scheme, got {}",
                url.scheme()
            )));
        }

        let mut info_hash = None;
        let mut title = String::new();
        let mut trackers = Vec::new();
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "xt" if info_hash.is_none() => {
                    info_hash = value
                        .strip_prefix(BTIH_PREFIX)
                        .filter(|hash| is_info_hash(hash))
                        .map(str::to_ascii_uppercase);
                }
                "dn" => title = value.into_owned(),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash =
            info_hash.ok_or_else(|| CoreError::invalid_magnet("missing urn:btih info hash"))?;
        Ok(Self {
            info_hash,
            title,
            trackers,
        })
    }

    /// Whether `link` looks like a magnet URI rather than a plain URL.
    pub fn is_magnet(link: &str) -> bool {
        link.trim_start().starts_with("magnet:")
    }
}

fn is_info_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())
}

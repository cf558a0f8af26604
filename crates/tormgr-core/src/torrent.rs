use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::RecordId;

/// Download state of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentStatus {
    #[default]
    New,
    Downloading,
    Downloaded,
    Failed,
}

impl TorrentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TorrentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for TorrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A torrent reference stored in a folder.
///
/// `source_url` is the URL the torrent was originally retrieved from, empty
/// when it was added by info hash alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Torrent {
    pub id: RecordId,
    pub folder: RecordId,
    pub title: String,
    pub info_hash: String,
    #[serde(rename = "sourceURL", skip_serializing_if = "String::is_empty", default)]
    pub source_url: String,
    #[serde(default)]
    pub status: TorrentStatus,
    /// Tracker URLs announced by the magnet link it was added from.
    #[serde(default)]
    pub trackers: Vec<String>,
}

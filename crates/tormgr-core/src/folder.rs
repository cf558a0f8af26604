use serde::{Deserialize, Serialize};

use crate::id::RecordId;

/// A named collection of torrents owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: RecordId,
    #[serde(rename = "title")]
    pub name: String,
    #[serde(skip)]
    pub owner_id: Option<RecordId>,
}

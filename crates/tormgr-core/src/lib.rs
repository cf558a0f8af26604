//! Domain types shared by the tormgr crates.

pub mod access;
pub mod error;
pub mod folder;
pub mod id;
pub mod magnet;
pub mod torrent;
pub mod user;

pub use access::Access;
pub use error::{CoreError, Result};
pub use folder::Folder;
pub use id::RecordId;
pub use magnet::MagnetLink;
pub use torrent::{Torrent, TorrentStatus};
pub use user::{User, normalize_email};

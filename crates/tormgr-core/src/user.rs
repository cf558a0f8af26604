use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::RecordId;

/// An authenticated principal.
///
/// This is the value cached alongside access tokens, so it must stay free of
/// secrets (the password hash never leaves the storage crate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub email: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User[{}, email:{}]", self.id, self.email)
    }
}

/// Canonical form of an email address used for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

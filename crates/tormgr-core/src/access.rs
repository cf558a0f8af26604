//! Access levels granted by credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Access level carried by an access token.
///
/// The discriminants are bit flags: `ReadWrite` is `Read | Write`. The numeric
/// value is what gets persisted (database column, cache field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl Access {
    pub fn bits(self) -> i32 {
        self as i32
    }

    pub fn from_bits(bits: i32) -> Option<Self> {
        match bits {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::ReadWrite),
            _ => None,
        }
    }

    /// Whether this level includes every right of `required`.
    pub fn allows(self, required: Access) -> bool {
        self.bits() & required.bits() == required.bits()
    }
}

impl FromStr for Access {
    type Err = CoreError;

    /// Parses the names used in the API. An empty string means full access.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Read" => Ok(Self::Read),
            "Write" => Ok(Self::Write),
            "" | "ReadWrite" => Ok(Self::ReadWrite),
            other => Err(CoreError::invalid_access(other)),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
            Self::ReadWrite => write!(f, "ReadWrite"),
        }
    }
}

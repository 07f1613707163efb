//! User identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric user handle assigned by the chat platform.
///
/// Every store in this crate is keyed by it; platform snowflakes are
/// converted into it at the transport edge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserHandle(pub i64);

impl UserHandle {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserHandle {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for UserHandle {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

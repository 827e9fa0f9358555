//! Software version strings.
//!
//! Upgrade coordination only ever compares versions for equality against the
//! running binary's version, so this is an opaque newtype rather than a full
//! semver implementation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node software version, e.g. `"1.2.0"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

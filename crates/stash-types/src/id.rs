use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Externally visible identifier of an asset (UUID v7 for time-ordering).
///
/// Ids sort in creation order, so listing by id and listing by creation time
/// agree. An id is only ever minted when a new asset is committed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(Uuid);

impl AssetId {
    /// Generate a new time-ordered asset id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse the canonical hyphenated form.
    ///
    /// Only version 7 UUIDs are accepted; anything else is rejected as a
    /// malformed identifier.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let uuid = Uuid::try_parse(s).map_err(|_| TypeError::InvalidIdentifier(s.to_string()))?;
        if uuid.get_version_num() != 7 {
            return Err(TypeError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self(uuid))
    }

    /// Extract the id from a requested file name such as `<id>.png`.
    ///
    /// Everything from the first `.` on is ignored.
    pub fn from_file_name(name: &str) -> Result<Self, TypeError> {
        let stem = name.split('.').next().unwrap_or_default();
        Self::parse(stem)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

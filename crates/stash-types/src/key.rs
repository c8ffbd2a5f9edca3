use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Relative, `/`-separated key of an object inside a storage backend.
///
/// Keys never start with `/` and never contain empty, `.` or `..` segments,
/// so a backend that maps them onto a directory tree cannot be escaped.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendKey(String);

impl BackendKey {
    /// Validate and wrap a key.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        validate(&key)?;
        Ok(Self(key))
    }

    /// Join a directory and a file name into a key.
    pub fn join(dir: &str, name: &str) -> Result<Self, TypeError> {
        if dir.is_empty() {
            return Self::new(name);
        }
        Self::new(format!("{dir}/{name}"))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the last segment, if any.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// The last segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Iterate over the key's segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate(key: &str) -> Result<(), TypeError> {
    let invalid = |reason| TypeError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with('/') {
        return Err(invalid("absolute key"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid("forbidden character"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            _ => {}
        }
    }
    Ok(())
}

impl fmt::Debug for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendKey({})", self.0)
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BackendKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BackendKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BackendKey> for String {
    fn from(key: BackendKey) -> Self {
        key.0
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// A sniffed media type: the MIME string plus its canonical file extension.
///
/// The extension includes the leading dot (e.g. `".png"`) and is empty when
/// the type has no conventional extension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaType {
    mime: String,
    extension: String,
}

impl MediaType {
    /// Create a media type from a MIME string and extension.
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into(),
        }
    }

    /// The generic binary type, used when nothing more specific matches.
    pub fn octet_stream() -> Self {
        Self::new("application/octet-stream", "")
    }

    /// The MIME string, e.g. `image/png`.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// The canonical extension with leading dot, or `""`.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime)
    }
}

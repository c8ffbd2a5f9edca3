use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::id::AssetId;
use crate::key::BackendKey;
use crate::media::MediaType;

/// Catalog metadata for one stored asset.
///
/// Records are immutable once committed. `content_digest` is unique across
/// the catalog, so each record owns exactly one backend object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: AssetId,
    /// `id` followed by the sniffed extension.
    #[serde(rename = "fileName")]
    pub logical_name: String,
    pub size: u64,
    #[serde(rename = "mimeType")]
    pub media_type: String,
    #[serde(rename = "hash")]
    pub content_digest: ContentDigest,
    /// Stored backend key; only set under counter-based placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<BackendKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Build a fresh record stamped with the current time.
    ///
    /// Timestamps are truncated to microseconds, the precision catalogs keep.
    pub fn new(
        id: AssetId,
        content_digest: ContentDigest,
        size: u64,
        media_type: &MediaType,
        storage_key: Option<BackendKey>,
    ) -> Self {
        Self::new_at(
            id,
            content_digest,
            size,
            media_type,
            storage_key,
            Utc::now().trunc_subsecs(6),
        )
    }

    /// Build a record with an explicit creation time.
    pub fn new_at(
        id: AssetId,
        content_digest: ContentDigest,
        size: u64,
        media_type: &MediaType,
        storage_key: Option<BackendKey>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            logical_name: format!("{id}{}", media_type.extension()),
            size,
            media_type: media_type.mime().to_string(),
            content_digest,
            storage_key,
            created_at,
            updated_at: created_at,
        }
    }
}

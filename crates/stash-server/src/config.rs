use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stash_cache::CacheConfig;
use stash_core::{CounterConfig, CounterPlacement, Placement};
use stash_hasher::HasherConfig;

use crate::error::{ServerError, ServerResult};

const GIB: u64 = 1024 * 1024 * 1024;
const REDACTED: &str = "***";

/// Full Stash configuration, loaded from TOML with environment overrides.
///
/// Every section and field has a default, so an empty file is valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheSettings,
    pub catalog: CatalogConfig,
    pub ingest: IngestConfig,
    pub placement: PlacementConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Shared key required in `X-API-Key` on mutating routes.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_key: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory of the local backend.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: PathBuf::from("data/objects"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub max_age_secs: u64,
    pub max_size: u64,
    /// Seconds between background sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            max_age_secs: 24 * 60 * 60,
            max_size: 10 * GIB,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub kind: CatalogKind,
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            kind: CatalogKind::Sqlite,
            url: "sqlite://data/stash.db".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_upload_size: u64,
    /// Directory for upload spool files; the system temp dir when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let hasher = HasherConfig::default();
        Self {
            max_upload_size: hasher.max_size,
            spool_dir: hasher.spool_dir,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    #[default]
    Content,
    Counter,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub mode: PlacementMode,
    pub shard_depth: usize,
    pub files_per_dir: u64,
    pub overflow_buckets: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        let counter = CounterConfig::default();
        Self {
            mode: PlacementMode::Content,
            shard_depth: counter.shard_depth,
            files_per_dir: counter.files_per_dir,
            overflow_buckets: counter.overflow_buckets,
        }
    }
}

impl StashConfig {
    /// Load from `path` (defaults when `None`), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ServerError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// TOML for display, with the API key masked.
    pub fn to_redacted_toml_string(&self) -> ServerResult<String> {
        let mut shown = self.clone();
        if shown.server.api_key.is_some() {
            shown.server.api_key = Some(REDACTED.into());
        }
        shown.to_toml_string()
    }

    /// Apply `STASH_*` overrides looked up through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        if let Some(key) = lookup("STASH_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(url) = lookup("STASH_DATABASE_URL") {
            self.catalog.url = url;
        }
        if let Some(root) = lookup("STASH_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("STASH_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("STASH_BIND_ADDR") {
            self.server.bind_addr = addr
                .parse()
                .map_err(|e| ServerError::Config(format!("STASH_BIND_ADDR {addr:?}: {e}")))?;
        }
        if let Some(secs) = lookup("STASH_CACHE_MAX_AGE_SECS") {
            self.cache.max_age_secs = secs.trim().parse().map_err(|e| {
                ServerError::Config(format!("STASH_CACHE_MAX_AGE_SECS {secs:?}: {e}"))
            })?;
        }
        if let Some(size) = lookup("STASH_CACHE_MAX_SIZE") {
            self.cache.max_size = parse_size(&size).ok_or_else(|| {
                ServerError::Config(format!("STASH_CACHE_MAX_SIZE {size:?}: expected bytes or K/M/G/T suffix"))
            })?;
        }
        Ok(())
    }

    /// Check the settings `serve` depends on.
    pub fn validate_for_serving(&self) -> ServerResult<()> {
        match self.server.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(ServerError::Config(
                    "an API key is required (server.api_key or STASH_API_KEY)".into(),
                ))
            }
        }
        if self.ingest.max_upload_size == 0 {
            return Err(ServerError::Config("ingest.max_upload_size must be positive".into()));
        }
        if self.placement.mode == PlacementMode::Counter && self.placement.files_per_dir == 0 {
            return Err(ServerError::Config("placement.files_per_dir must be positive".into()));
        }
        Ok(())
    }

    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig {
            max_size: self.ingest.max_upload_size,
            spool_dir: self.ingest.spool_dir.clone(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            dir: self.cache.dir.clone(),
            max_age: Duration::from_secs(self.cache.max_age_secs),
            max_size: self.cache.max_size,
        }
    }

    pub fn placement(&self) -> Placement {
        match self.placement.mode {
            PlacementMode::Content => Placement::ContentAddressed,
            PlacementMode::Counter => Placement::Counter(CounterPlacement::new(CounterConfig {
                shard_depth: self.placement.shard_depth,
                files_per_dir: self.placement.files_per_dir,
                overflow_buckets: self.placement.overflow_buckets,
            })),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs.max(1))
    }
}

/// Parse `1048576`, `512K`, `64M`, `10G` or `1T` (binary multiples).
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last()? {
        (i, 'k' | 'K') => (&text[..i], 1u64 << 10),
        (i, 'm' | 'M') => (&text[..i], 1 << 20),
        (i, 'g' | 'G') => (&text[..i], 1 << 30),
        (i, 't' | 'T') => (&text[..i], 1 << 40),
        _ => (text, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config() {
        let c = StashConfig::default();
        assert_eq!(c.server.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.ingest.max_upload_size, 50 * 1024 * 1024);
        assert_eq!(c.cache.max_age_secs, 86_400);
        assert_eq!(c.cache.max_size, 10 * GIB);
        assert_eq!(c.placement.files_per_dir, 5000);
        assert_eq!(c.placement.shard_depth, 1);
        assert!(c.server.api_key.is_none());
        assert!(c.placement().is_content_addressed());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StashConfig::from_toml_str(
            r#"
            [server]
            api_key = "k"

            [placement]
            mode = "counter"
            files_per_dir = 10

            [catalog]
            kind = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(c.server.api_key.as_deref(), Some("k"));
        assert_eq!(c.server.bind_addr.port(), 8080);
        assert_eq!(c.placement.mode, PlacementMode::Counter);
        assert_eq!(c.placement.files_per_dir, 10);
        assert_eq!(c.placement.overflow_buckets, CounterConfig::default().overflow_buckets);
        assert_eq!(c.catalog.kind, CatalogKind::Memory);
        assert_eq!(c.storage.backend, BackendKind::Local);

        let Placement::Counter(counter) = c.placement() else {
            panic!("expected counter placement");
        };
        assert_eq!(counter.config().files_per_dir, 10);
    }

    #[test]
    fn toml_round_trips() {
        let mut c = StashConfig::default();
        c.server.api_key = Some("secret".into());
        let text = c.to_toml_string().unwrap();
        assert_eq!(StashConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn redacted_toml_masks_the_api_key() {
        let mut c = StashConfig::default();
        c.server.api_key = Some("hunter2".into());
        let text = c.to_redacted_toml_string().unwrap();
        assert!(!text.contains("hunter2"));
        let shown = StashConfig::from_toml_str(&text).unwrap();
        assert_eq!(shown.server.api_key.as_deref(), Some("***"));
        assert_eq!(c.server.api_key.as_deref(), Some("hunter2"));

        let unset = StashConfig::default().to_redacted_toml_string().unwrap();
        assert!(!unset.contains("api_key"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = StashConfig::from_toml_str("[server]\nbind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STASH_API_KEY", "from-env"),
            ("STASH_DATABASE_URL", "sqlite://elsewhere.db"),
            ("STASH_STORAGE_ROOT", "/srv/objects"),
            ("STASH_CACHE_DIR", "/var/cache/stash"),
            ("STASH_BIND_ADDR", "127.0.0.1:9000"),
            ("STASH_CACHE_MAX_AGE_SECS", "60"),
            ("STASH_CACHE_MAX_SIZE", "2G"),
        ]);
        let mut c = StashConfig::default();
        c.apply_env_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(c.server.api_key.as_deref(), Some("from-env"));
        assert_eq!(c.catalog.url, "sqlite://elsewhere.db");
        assert_eq!(c.storage.root, PathBuf::from("/srv/objects"));
        assert_eq!(c.cache.dir, PathBuf::from("/var/cache/stash"));
        assert_eq!(c.server.bind_addr.port(), 9000);
        assert_eq!(c.cache_config().max_age, Duration::from_secs(60));
        assert_eq!(c.cache.max_size, 2 * GIB);
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut c = StashConfig::default();
        let err = c
            .apply_env_from(|name| (name == "STASH_CACHE_MAX_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn serving_requires_an_api_key() {
        let mut c = StashConfig::default();
        assert!(c.validate_for_serving().is_err());
        c.server.api_key = Some("  ".into());
        assert!(c.validate_for_serving().is_err());
        c.server.api_key = Some("key".into());
        assert!(c.validate_for_serving().is_ok());
    }

    #[test]
    fn sizes_parse_with_suffixes() {
        assert_eq!(parse_size("1024"), Some(1024));
        assert_eq!(parse_size("512K"), Some(512 * 1024));
        assert_eq!(parse_size("64m"), Some(64 << 20));
        assert_eq!(parse_size("10G"), Some(10 * GIB));
        assert_eq!(parse_size("1T"), Some(1 << 40));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("G"), None);
        assert_eq!(parse_size("-1"), None);
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use stash_backend::{Backend, InMemoryBackend, LocalDirBackend};
use stash_catalog::{Catalog, InMemoryCatalog, SqliteCatalog};
use stash_core::AssetStore;

use crate::auth::ApiKey;
use crate::config::{BackendKind, CatalogKind, StashConfig};
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Stash HTTP server.
pub struct StashServer {
    config: StashConfig,
    state: AppState,
}

impl StashServer {
    /// Validate `config` and open the store it describes.
    pub async fn open(config: StashConfig) -> ServerResult<Self> {
        config.validate_for_serving()?;
        let store = Arc::new(open_store(&config).await?);
        Ok(Self::with_store(config, store))
    }

    /// Serve an already opened store.
    pub fn with_store(config: StashConfig, store: Arc<AssetStore>) -> Self {
        let api_key = ApiKey::new(config.server.api_key.as_deref().unwrap_or_default());
        Self {
            config,
            state: AppState::new(store, api_key),
        }
    }

    pub fn config(&self) -> &StashConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.state.store
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C or SIGTERM, sweeping the cache in the background.
    pub async fn serve(self) -> ServerResult<()> {
        let sweeper = self
            .state
            .store
            .cache()
            .spawn_sweeper(self.config.sweep_interval());
        let listener = TcpListener::bind(self.config.server.bind_addr).await?;
        info!(addr = %self.config.server.bind_addr, "stash server listening");

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        sweeper.abort();
        info!("stash server stopped");
        result.map_err(ServerError::Io)
    }
}

/// Open the backend, catalog and cache described by `config`.
pub async fn open_store(config: &StashConfig) -> ServerResult<AssetStore> {
    let backend: Arc<dyn Backend> = match config.storage.backend {
        BackendKind::Local => Arc::new(LocalDirBackend::new(config.storage.root.clone())?),
        BackendKind::Memory => Arc::new(InMemoryBackend::new()),
    };

    let catalog: Arc<dyn Catalog> = match config.catalog.kind {
        CatalogKind::Sqlite => {
            if let Some(parent) = sqlite_file(&config.catalog.url).and_then(|p| p.parent().map(PathBuf::from)) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(&parent)?;
                }
            }
            Arc::new(SqliteCatalog::connect(&config.catalog.url).await?)
        }
        CatalogKind::Memory => Arc::new(InMemoryCatalog::new()),
    };

    let store = AssetStore::builder(backend, catalog)
        .hasher(config.hasher_config())
        .cache(config.cache_config())
        .placement(config.placement())
        .open()
        .await?;
    Ok(store)
}

/// Database file named by a `sqlite:` URL, if it names one.
fn sqlite_file(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.trim_start_matches("//");
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

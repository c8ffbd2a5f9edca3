use std::sync::Arc;

use stash_core::AssetStore;

use crate::auth::ApiKey;

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Arc<AssetStore>,
    pub api_key: ApiKey,
}

impl AppState {
    pub fn new(store: Arc<AssetStore>, api_key: ApiKey) -> Self {
        Self { store, api_key }
    }
}

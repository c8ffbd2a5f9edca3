//! HTTP server for Stash.
//!
//! Exposes the asset store over a small REST API:
//!
//! | Route | Auth |
//! |---|---|
//! | `PUT /upload` | `X-API-Key` |
//! | `GET /assets?limit&offset` | `X-API-Key` |
//! | `DELETE /assets/{id}` | `X-API-Key` |
//! | `GET /assets/{name}` | public |
//! | `GET /health` | public |
//!
//! Failures are reported as `{"success": false, "error": {"code", "message"}}`.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{ApiKey, RequireApiKey, API_KEY_HEADER};
pub use config::{
    BackendKind, CacheSettings, CatalogConfig, CatalogKind, IngestConfig, PlacementConfig,
    PlacementMode, ServerConfig, StashConfig, StorageConfig,
};
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::{open_store, StashServer};
pub use state::AppState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use serde_json::Value;
    use stash_cache::CacheConfig;
    use stash_core::{AssetStore, HasherConfig, InMemoryBackend, InMemoryCatalog};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    const KEY: &str = "test-key";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really an image";

    async fn app(max_upload: u64) -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::builder(
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryCatalog::new()),
        )
        .hasher(HasherConfig {
            max_size: max_upload,
            spool_dir: None,
        })
        .cache(CacheConfig {
            dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        })
        .open()
        .await
        .unwrap();
        let state = AppState::new(Arc::new(store), ApiKey::new(KEY));
        (build_router(state), dir)
    }

    fn request(method: &str, uri: &str, key: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(body).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router, data: &'static [u8]) -> (StatusCode, Value) {
        let response = send(app, request("PUT", "/upload", Some(KEY), Body::from(data))).await;
        let status = response.status();
        (status, json(response).await)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (app, _dir) = app(1024).await;
        let response = send(&app, request("GET", "/health", None, Body::empty())).await;
        assert_eq!(response.status(), 200);
        assert_eq!(json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn upload_creates_then_dedups() {
        let (app, _dir) = app(1024).await;

        let (status, first) = upload(&app, PNG).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["success"], true);
        assert_eq!(first["asset"]["mimeType"], "image/png");
        assert_eq!(first["asset"]["size"], PNG.len());
        assert!(first.get("deduped").is_none());
        let name = first["asset"]["fileName"].as_str().unwrap();
        assert!(name.ends_with(".png"));

        let (status, second) = upload(&app, PNG).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["deduped"], true);
        assert_eq!(second["asset"]["id"], first["asset"]["id"]);
        assert_eq!(second["asset"]["hash"], first["asset"]["hash"]);
    }

    #[tokio::test]
    async fn mutating_routes_require_the_key() {
        let (app, _dir) = app(1024).await;
        for (method, uri) in [("PUT", "/upload"), ("GET", "/assets"), ("DELETE", "/assets/x")] {
            for key in [None, Some("wrong")] {
                let response = send(&app, request(method, uri, key, Body::from("data"))).await;
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
                let body = json(response).await;
                assert_eq!(body["success"], false);
                assert_eq!(body["error"]["code"], 401);
            }
        }
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let (app, _dir) = app(8).await;
        let (status, body) = upload(&app, b"123456789").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], 413);

        let (status, _) = upload(&app, b"12345678").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn download_streams_with_headers() {
        let (app, _dir) = app(1024).await;
        let (_, uploaded) = upload(&app, PNG).await;
        let name = uploaded["asset"]["fileName"].as_str().unwrap().to_string();

        let response = send(&app, request("GET", &format!("/assets/{name}"), None, Body::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CONTENT_LENGTH], PNG.len().to_string().as_str());
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("inline; filename={name}").as_str()
        );
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=2592000");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test]
    async fn download_errors_map_to_status_codes() {
        let (app, _dir) = app(1024).await;

        let response = send(&app, request("GET", "/assets/not-an-id.png", None, Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["message"], "Invalid asset ID format");

        let missing = format!("/assets/{}.png", stash_core::AssetId::new());
        let response = send(&app, request("GET", &missing, None, Body::empty())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let (app, _dir) = app(1024).await;
        let mut ids = Vec::new();
        for data in [&b"one"[..], b"two", b"three"] {
            let (_, body) = upload(&app, data).await;
            ids.push(body["asset"]["id"].clone());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let response = send(&app, request("GET", "/assets?limit=2&offset=0", Some(KEY), Body::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["offset"], 0);
        let listed: Vec<Value> = body["assets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].clone())
            .collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);

        let response = send(&app, request("GET", "/assets?limit=5000&offset=x", Some(KEY), Body::empty())).await;
        let body = json(response).await;
        assert_eq!(body["limit"], 100);
        assert_eq!(body["offset"], 0);
        assert_eq!(body["assets"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_the_asset() {
        let (app, _dir) = app(1024).await;
        let (_, uploaded) = upload(&app, PNG).await;
        let id = uploaded["asset"]["id"].as_str().unwrap().to_string();
        let name = uploaded["asset"]["fileName"].as_str().unwrap().to_string();

        let response = send(&app, request("DELETE", &format!("/assets/{id}"), Some(KEY), Body::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["success"], true);

        let response = send(&app, request("GET", &format!("/assets/{name}"), None, Body::empty())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, request("DELETE", &format!("/assets/{id}"), Some(KEY), Body::empty())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, request("DELETE", "/assets/bogus", Some(KEY), Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let (app, _dir) = app(1024).await;
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/upload")
            .header(header::ORIGIN, "https://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-api-key")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}

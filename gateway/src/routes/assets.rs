//! Static asset serving for production builds of the web client.

use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

/// Serve `dir` for any path no other route claims.
///
/// Unknown paths fall back to `index.html` so client-side routes resolve.
pub fn create_assets_router(dir: &Path) -> Router<Arc<AppState>> {
    let index = ServeFile::new(dir.join("index.html"));
    Router::new().fallback_service(ServeDir::new(dir).fallback(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &Path) -> Router {
        create_assets_router(dir).with_state(AppState::with_connector(ServerConfig::default(), None))
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>index</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('salut')").unwrap();

        let response = app(dir.path())
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"console.log('salut')");
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>index</html>").unwrap();

        let response = app(dir.path())
            .oneshot(Request::get("/lesson/3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>index</html>");
    }
}

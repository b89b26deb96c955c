//! Static file server for the generated feeds.
//!
//! Serves the overview page and the feed directory over HTTP for readers
//! polling the feeds. Browsers only apply the XSL stylesheet when the
//! XML arrives with an XML content type, and a cached copy would hide
//! fresh posts, hence the explicit MIME table and no-store cache
//! headers on every response.

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, instrument};

#[derive(Clone)]
struct ServeState {
    root: PathBuf,
}

/// Serve `root` (the directory holding `index.html` and the feed
/// subdirectory) on the given port until interrupted.
#[instrument(level = "info", skip_all, fields(%root, %port))]
pub async fn serve(root: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let state = ServeState { root: PathBuf::from(root) };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = Router::new()
        .route("/", get(index))
        .route("/{*path}", get(file))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Serving feeds");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<ServeState>) -> Response {
    respond_with_file(&state.root, "index.html").await
}

async fn file(State(state): State<ServeState>, UrlPath(path): UrlPath<String>) -> Response {
    respond_with_file(&state.root, &path).await
}

async fn respond_with_file(root: &Path, rel: &str) -> Response {
    // Nothing outside the serving root.
    if rel.split(['/', '\\']).any(|part| part == "..") {
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    let path = root.join(rel);
    match fs::read(&path).await {
        Ok(bytes) => {
            let mut response = (StatusCode::OK, bytes).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(rel)));
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            );
            response
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "File not served");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

/// Content types for the file kinds the output tree contains.
fn content_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("xml") => "application/xml; charset=utf-8",
        Some("xsl") => "application/xslt+xml",
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("css") => "text/css",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

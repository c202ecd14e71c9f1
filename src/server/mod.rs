//! # Server Module
//!
//! HTTP surface over the cached sample library.
//!
//! ## Routes
//!
//! | Route | Response |
//! |---|---|
//! | `GET /strudel.json`, `GET /manifest` | flat `{ "_base": url, id: path }` manifest |
//! | `GET /api/samples` | `{ base, entries: [{ id, relativePath, href, size }] }` |
//! | `GET /api/metadata` | metadata records, one per sample |
//! | `GET /stats` | `{ total, root, port }` |
//! | `POST /api/invalidate` | drops both caches, `204` |
//! | `GET /samples/*path` | file bytes with byte-range support |
//! | `GET /livereload` | SSE `samples-changed` events (hot reload only) |
//!
//! Every response allows any origin, so live-coding pages served elsewhere
//! can load samples directly.

pub mod files;

use axum::{
    extract::State,
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, HOST},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{stream, Stream};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use url::Url;

use crate::samples::{metadata::MetadataRecord, SampleLibrary};
use crate::watcher::SampleChange;

/// Shared application state injected into all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<SampleLibrary>,
    pub public_url: Option<Url>,
    pub port: Option<u16>,
    /// Present when hot reload is enabled
    pub reload: Option<broadcast::Sender<SampleChange>>,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/strudel.json", get(manifest))
        .route("/manifest", get(manifest))
        .route("/api/samples", get(rich_manifest))
        .route("/api/metadata", get(metadata))
        .route("/api/invalidate", post(invalidate))
        .route("/stats", get(stats))
        .route("/samples/*path", get(files::serve_sample));

    if state.reload.is_some() {
        router = router.route("/livereload", get(livereload));
    }

    router
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RichEntry {
    id: String,
    relative_path: String,
    href: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct RichManifest {
    base: String,
    entries: Vec<RichEntry>,
}

#[derive(Debug, Serialize)]
struct Stats {
    total: usize,
    root: String,
    port: Option<u16>,
}

async fn manifest(State(state): State<AppState>, headers: HeaderMap) -> Json<Map<String, Value>> {
    let entries = state.library.list_entries().await;

    let mut manifest = Map::new();
    manifest.insert("_base".to_string(), Value::String(files_base(&state, &headers)));
    // Ids repetidos: gana el último escaneado
    for entry in entries.iter() {
        manifest.insert(entry.id.clone(), Value::String(entry.relative_path.clone()));
    }

    Json(manifest)
}

async fn rich_manifest(State(state): State<AppState>, headers: HeaderMap) -> Json<RichManifest> {
    let entries = state.library.list_entries().await;
    let base = files_base(&state, &headers);

    let entries = entries
        .iter()
        .map(|entry| RichEntry {
            id: entry.id.clone(),
            relative_path: entry.relative_path.clone(),
            href: format!("{base}{}", encode_path(&entry.relative_path)),
            size: entry.size,
        })
        .collect();

    Json(RichManifest { base, entries })
}

async fn metadata(State(state): State<AppState>) -> Json<Vec<MetadataRecord>> {
    let records = state.library.list_metadata().await;
    Json(Vec::clone(&records))
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    let entries = state.library.list_entries().await;
    Json(Stats {
        total: entries.len(),
        root: state.library.root().display().to_string(),
        port: state.port,
    })
}

async fn invalidate(State(state): State<AppState>) -> StatusCode {
    state.library.invalidate();
    info!("🔄 Caché invalidada manualmente");
    StatusCode::NO_CONTENT
}

async fn livereload(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let rx = state
        .reload
        .as_ref()
        .ok_or(StatusCode::NOT_FOUND)?
        .subscribe();
    debug!("Cliente de live-reload conectado");

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => match Event::default().event("samples-changed").json_data(&change) {
                    Ok(event) => return Some((Ok::<_, Infallible>(event), rx)),
                    Err(err) => warn!(error = %err, "Failed to encode reload event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Live-reload client lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// URL base del endpoint de archivos, siempre terminada en `/samples/`.
fn files_base(state: &AppState, headers: &HeaderMap) -> String {
    let origin = match &state.public_url {
        Some(url) => url.as_str().trim_end_matches('/').to_string(),
        None => match headers.get(HOST).and_then(|host| host.to_str().ok()) {
            Some(host) => format!("http://{host}"),
            None => format!("http://localhost:{}", state.port.unwrap_or(80)),
        },
    };
    format!("{origin}/samples/")
}

fn encode_path(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

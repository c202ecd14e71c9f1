use axum::{
    body::Body,
    extract::{Path as UriPath, State},
    http::{
        header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::{
    io::SeekFrom,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use super::AppState;

#[derive(Error, Debug)]
pub enum FileServeError {
    #[error("Requested path escapes the sample root")]
    Forbidden,

    #[error("Sample not found")]
    NotFound,

    #[error("Range not satisfiable for {len} bytes")]
    RangeNotSatisfiable { len: u64 },

    #[error("I/O error while serving sample: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl IntoResponse for FileServeError {
    fn into_response(self) -> Response {
        match self {
            FileServeError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            FileServeError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            FileServeError::RangeNotSatisfiable { len } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(CONTENT_RANGE, format!("bytes */{len}"))],
            )
                .into_response(),
            err @ (FileServeError::Io(_) | FileServeError::Response(_)) => {
                error!(error = %err, "Failed to serve sample");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Rango pedido en la cabecera `Range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parses a single `bytes=` range against a file of `len` bytes.
///
/// Malformed or multi-range headers are ignored and yield [`ByteRange::Full`].
pub fn parse_range(header: Option<&str>, len: u64) -> ByteRange {
    let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };

    match (start.trim(), end.trim()) {
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if len == 0 => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial {
                start: len.saturating_sub(n),
                end: len - 1,
            },
            Err(_) => ByteRange::Full,
        },
        (start, "") => match start.parse::<u64>() {
            Ok(start) if start >= len => ByteRange::Unsatisfiable,
            Ok(start) => ByteRange::Partial {
                start,
                end: len - 1,
            },
            Err(_) => ByteRange::Full,
        },
        (start, end) => match (start.parse::<u64>(), end.parse::<u64>()) {
            (Ok(start), Ok(end)) if end < start => ByteRange::Full,
            (Ok(start), Ok(_)) if start >= len => ByteRange::Unsatisfiable,
            (Ok(start), Ok(end)) => ByteRange::Partial {
                start,
                end: end.min(len - 1),
            },
            _ => ByteRange::Full,
        },
    }
}

/// Joins `requested` onto `root`, rejecting anything that lands outside it.
///
/// `..` is resolved lexically; absolute paths are refused outright.
pub fn resolve_within(root: &Path, requested: &str) -> Result<PathBuf, FileServeError> {
    let mut resolved = root.to_path_buf();

    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(FileServeError::Forbidden);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(FileServeError::Forbidden),
        }
    }

    // starts_with compara por componentes: root + separador
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(FileServeError::Forbidden)
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("aiff") => "audio/aiff",
        _ => "application/octet-stream",
    }
}

pub async fn serve_sample(
    State(state): State<AppState>,
    UriPath(requested): UriPath<String>,
    headers: HeaderMap,
) -> Result<Response, FileServeError> {
    let root = state.library.root();
    let path = resolve_within(root, &requested).inspect_err(|_| {
        warn!(requested = %requested, "Rejected path outside sample root");
    })?;

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| FileServeError::NotFound)?;
    if !meta.is_file() {
        return Err(FileServeError::NotFound);
    }

    // Un symlink dentro del root no debe apuntar fuera de él
    let canonical = tokio::fs::canonicalize(&path)
        .await
        .map_err(|_| FileServeError::NotFound)?;
    if !canonical.starts_with(root) {
        warn!(requested = %requested, "Rejected symlink outside sample root");
        return Err(FileServeError::Forbidden);
    }

    let len = meta.len();
    let range = parse_range(headers.get(RANGE).and_then(|v| v.to_str().ok()), len);
    let (status, start, count) = match range {
        ByteRange::Full => (StatusCode::OK, 0, len),
        ByteRange::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        ByteRange::Unsatisfiable => return Err(FileServeError::RangeNotSatisfiable { len }),
    };

    let mut file = File::open(&canonical).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let body = Body::from_stream(ReaderStream::new(file.take(count)));

    let mut response = Response::builder()
        .status(status)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_TYPE, content_type_for(&canonical))
        .header(CONTENT_LENGTH, count);
    if let ByteRange::Partial { start, end } = range {
        response = response.header(CONTENT_RANGE, format!("bytes {start}-{end}/{len}"));
    }

    Ok(response.body(body)?)
}

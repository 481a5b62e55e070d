use async_stream::stream;
use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use super::events::{find_package_dir, list_events};
use super::server::ServerState;

const CHUNK_SIZE: usize = 256 * 1024;

fn no_cache() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        (header::PRAGMA, "no-cache"),
    ]
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(serde_json::json!({"ok": true})))
}

pub async fn results_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.shared.live_snapshot();
    (StatusCode::OK, no_cache(), axum::Json(snapshot))
}

pub async fn frame_handler(State(state): State<ServerState>) -> Response {
    match state.shared.latest_jpeg() {
        Some((jpeg, _ts)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/jpeg")
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(Body::from((*jpeg).clone()))
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("no frame available yet"))
            .unwrap(),
    }
}

/// `multipart/x-mixed-replace` MJPEG stream, ticking at roughly `target_fps`.
///
/// A write failure (the client went away) simply ends the generator; axum
/// drops the connection without surfacing the broken pipe as a panic.
pub async fn mjpeg_handler(State(state): State<ServerState>) -> impl IntoResponse {
    debug!("new mjpeg client connected");
    let mut interval = tokio::time::interval(state.target_frame_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let body_stream = stream! {
        let mut last_ts = -1.0f64;
        loop {
            interval.tick().await;
            let Some((jpeg, ts)) = state.shared.latest_jpeg() else {
                trace!("no frame available for mjpeg tick");
                continue;
            };
            if ts == last_ts {
                continue;
            }
            last_ts = ts;

            let header = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                jpeg.len()
            );
            yield Ok::<_, std::io::Error>(Bytes::from(header));
            yield Ok(Bytes::from((*jpeg).clone()));
            yield Ok(Bytes::from_static(b"\r\n"));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(body_stream))
        .unwrap()
}

pub async fn events_list_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let rows = list_events(&state.record_dir);
    (StatusCode::OK, no_cache(), axum::Json(rows))
}

/// Single entry point for `/events/<id>.json`, `/events/<id>.result.json`,
/// and `/events/<id>.mp4`: axum's router matches one segment at a time, so
/// the suffix is parsed here rather than split across three route patterns.
pub async fn events_file_handler(
    State(state): State<ServerState>,
    AxumPath(filename): AxumPath<String>,
) -> Response {
    let Some((id_str, kind)) = split_event_filename(&filename) else {
        return (StatusCode::NOT_FOUND, "unknown event file").into_response();
    };
    let Ok(event_id) = id_str.parse::<u64>() else {
        return (StatusCode::NOT_FOUND, "invalid event id").into_response();
    };
    let Some(dir) = find_package_dir(&state.record_dir, event_id) else {
        return (StatusCode::NOT_FOUND, "event not found").into_response();
    };

    match kind {
        EventFileKind::Incident => serve_json_file(&dir.join("incident.json")).await,
        EventFileKind::Result => serve_json_file(&dir.join("result.json")).await,
        EventFileKind::Clip => serve_clip_file(&dir.join("clip.mp4")).await,
    }
}

enum EventFileKind {
    Incident,
    Result,
    Clip,
}

fn split_event_filename(filename: &str) -> Option<(&str, EventFileKind)> {
    if let Some(id) = filename.strip_suffix(".result.json") {
        Some((id, EventFileKind::Result))
    } else if let Some(id) = filename.strip_suffix(".json") {
        Some((id, EventFileKind::Incident))
    } else if let Some(id) = filename.strip_suffix(".mp4") {
        Some((id, EventFileKind::Clip))
    } else {
        None
    }
}

async fn serve_json_file(path: &std::path::Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(Body::from(bytes))
            .unwrap(),
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Streams `clip.mp4` in fixed-size chunks rather than loading the whole
/// file, matching the spec's 256 KiB chunking for large clips.
async fn serve_clip_file(path: &std::path::Path) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(_) => return (StatusCode::NOT_FOUND, "clip not found").into_response(),
    };

    let body_stream = stream! {
        let mut file = file;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<_, std::io::Error>(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    if matches!(e.kind(), std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset) {
                        break;
                    }
                    yield Err(e);
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(body_stream))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_event_filename_prefers_longest_suffix() {
        assert!(matches!(
            split_event_filename("42.result.json"),
            Some(("42", EventFileKind::Result))
        ));
        assert!(matches!(
            split_event_filename("42.json"),
            Some(("42", EventFileKind::Incident))
        ));
        assert!(matches!(
            split_event_filename("42.mp4"),
            Some(("42", EventFileKind::Clip))
        ));
        assert!(split_event_filename("42.txt").is_none());
    }
}

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures_util::TryStreamExt;
use serde_json::json;
use sluice_pipeline::{single_part, FailureKind, UploadOutcome, UploadPipeline};
use sluice_quota::QuotaDenial;
use sluice_types::request::DEFAULT_MIME;
use sluice_types::{BucketName, UploadRequest};
use tracing::{error, info, warn};

use crate::auth::{api_key, KeyResolver};

/// Header carrying the uploaded file's name.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// File name used when the client sends none.
pub const FALLBACK_FILE_NAME: &str = "upload";

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: UploadPipeline,
    pub keys: Arc<dyn KeyResolver>,
    /// Largest declared body accepted.
    pub max_body_bytes: u64,
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "sluice-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Upload into the default bucket.
pub async fn upload_default_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    upload(state, BucketName::default(), headers, body).await
}

/// Upload into the bucket named in the path.
pub async fn upload_handler(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match BucketName::new(bucket) {
        Ok(bucket) => upload(state, bucket, headers, body).await,
        Err(e) => {
            warn!(error = %e, "rejected upload to invalid bucket");
            reject(StatusCode::BAD_REQUEST, "SERVER_INVALID_BUCKET")
        }
    }
}

async fn upload(state: AppState, bucket: BucketName, headers: HeaderMap, body: Body) -> Response {
    let Some(key) = api_key(&headers) else {
        return reject(StatusCode::UNAUTHORIZED, "SERVER_API_KEY_MISSING");
    };
    let principal = match state.keys.resolve(key).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return reject(StatusCode::FORBIDDEN, "V1_SERVER_API_KEY_NOT_FOUND"),
        Err(e) => {
            error!(error = %e, "API key lookup failed");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "V1_SERVER_API_KEY_NOT_FOUND");
        }
    };
    let Some(declared) = content_length(&headers) else {
        return reject(StatusCode::LENGTH_REQUIRED, "SERVER_CONTENT_LENGTH_REQUIRED");
    };

    if declared > state.max_body_bytes {
        let denial = QuotaDenial::SizeTooLarge {
            declared,
            limit: state.max_body_bytes,
        };
        warn!(user = %principal, %denial, "body over server limit");
        let outcome = UploadOutcome::failure(
            FailureKind::QuotaExceeded(denial),
            denial.to_string(),
            principal.username,
        );
        return outcome_response(&outcome);
    }

    let file_name = header_str(&headers, FILE_NAME_HEADER).unwrap_or(FALLBACK_FILE_NAME);
    let mime = header_str(&headers, header::CONTENT_TYPE.as_str()).unwrap_or(DEFAULT_MIME);
    info!(user = %principal, bucket = %bucket, file = file_name, declared, "upload request");

    let stream = body.into_data_stream().map_err(io::Error::other);
    let parts = single_part(file_name, mime, Box::pin(stream));
    let request = UploadRequest::new(declared, principal, bucket);

    let outcome = state.pipeline.run(&request, parts).await;
    outcome_response(&outcome)
}

/// Map an outcome to its HTTP response.
///
/// Failures are 413 and close the connection; the body carries the
/// decorator either way.
pub fn outcome_response(outcome: &UploadOutcome) -> Response {
    let body = Json(outcome.to_json());
    if outcome.keep_alive() {
        (StatusCode::OK, body).into_response()
    } else {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            [(header::CONNECTION, "close")],
            body,
        )
            .into_response()
    }
}

fn reject(status: StatusCode, decorator: &'static str) -> Response {
    (status, Json(json!({ "decorator": decorator, "error": true }))).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, header::CONTENT_LENGTH.as_str())?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn content_length_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(content_length(&h), None);
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4096"));
        assert_eq!(content_length(&h), Some(4096));
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&h), None);
    }

    #[test]
    fn blank_headers_are_absent() {
        let mut h = HeaderMap::new();
        h.insert(FILE_NAME_HEADER, HeaderValue::from_static("  "));
        assert_eq!(header_str(&h, FILE_NAME_HEADER), None);
    }
}

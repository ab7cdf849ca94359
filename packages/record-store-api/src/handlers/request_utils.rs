//! Request utilities for HTTP endpoints.

use http_body_util::BodyExt;
use hyper::{body::Bytes, Request, Response};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::router::RouterError;
use scenario_core::{RecordId, StoreError};

use super::response::success_response;

/// Type alias for matchit parameters with explicit lifetimes
pub type MatchitParams<'a, 'b> = matchit::Params<'a, 'b>;

/// Helper function to read request body with timeout
pub async fn read_request_body_with_timeout(
    req: Request<hyper::body::Incoming>,
    timeout_ms: u64,
) -> Result<Bytes, RouterError> {
    let timeout_duration = time::Duration::from_millis(timeout_ms);
    let body = time::timeout(timeout_duration, req.collect())
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| RouterError::InternalError(format!("Failed to read request body: {}", e)))?;
    Ok(body.to_bytes())
}

/// Reads the body and parses it as JSON.
pub async fn read_json_body<T: DeserializeOwned>(
    req: Request<hyper::body::Incoming>,
    timeout_ms: u64,
) -> Result<T, RouterError> {
    let body_bytes = read_request_body_with_timeout(req, timeout_ms).await?;
    serde_json::from_slice(&body_bytes)
        .map_err(|e| RouterError::BadRequest(format!("Failed to parse request: {}", e)))
}

/// Returns a decoded path parameter.
pub fn path_param(params: &MatchitParams<'_, '_>, name: &str) -> Result<String, RouterError> {
    let raw = params
        .get(name)
        .ok_or_else(|| RouterError::BadRequest(format!("Missing path parameter '{}'", name)))?;
    Ok(percent_decode_str(raw).decode_utf8_lossy().into_owned())
}

/// Map StoreError to appropriate RouterError
pub fn map_store_error_to_router_error(e: StoreError) -> RouterError {
    match e {
        StoreError::NotFound { .. } => RouterError::NotFound(e.to_string()),
        StoreError::Rejected { ref message, .. } => RouterError::Rejected {
            message: e.to_string(),
            details: message.clone(),
        },
        StoreError::Timeout { .. } => RouterError::Timeout,
        StoreError::Transport(_) | StoreError::LockPoisoned => {
            RouterError::InternalError(format!("Store error: {}", e))
        }
    }
}

/// Response from creating a record.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    /// Assigned record ID
    pub id: RecordId,
}

/// Helper to build HTTP response with proper error handling
pub fn build_response(status: u16, json: Vec<u8>) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Bytes::from(json))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

/// Helper to build empty HTTP response (for 204 No Content)
pub fn build_empty_response(status: u16) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .body(Bytes::new())
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

/// Wraps `data` in the success envelope and serializes it.
pub fn success_json<T: Serialize>(status: u16, data: T) -> Result<Response<Bytes>, RouterError> {
    let json = serde_json::to_vec(&success_response(data))
        .map_err(|e| RouterError::InternalError(format!("Failed to serialize response: {}", e)))?;
    build_response(status, json)
}

/// Extracts the comma separated `fields` query parameter.
pub fn parse_fields_param(query_str: Option<&str>) -> Vec<String> {
    let mut fields = Vec::new();
    if let Some(query_str) = query_str {
        for pair in query_str.split('&') {
            let Some((key, encoded_value)) = pair.split_once('=') else {
                continue;
            };
            if key != "fields" {
                continue;
            }
            let decoded_value = percent_decode_str(encoded_value).decode_utf8_lossy();
            fields.extend(
                decoded_value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            );
        }
    }
    fields
}

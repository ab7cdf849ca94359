//! Query and health handlers.

use hyper::{body::Bytes, Request, Response};
use serde_json::json;

use crate::router::{AppState, RouterError};
use scenario_core::RecordFilter;

use super::call_store;
use super::request_utils::{path_param, read_json_body, success_json, MatchitParams};

/// Queries records of one object type.
///
/// # Endpoint
/// `POST /query/{object_type}`
///
/// # Request Body
/// ```json
/// { "kind": "field_equals", "field": "PartyId", "value": "IND000000000002" }
/// ```
///
/// # Response
/// - **200 OK**: `{"success": true, "data": [{"id": "...", "fields": {...}}]}`
///
/// # Errors
/// - **400 Bad Request**: Unknown filter kind or malformed body
pub async fn query_records(
    req: Request<hyper::body::Incoming>,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let object_type = path_param(&params, "object_type")?;
    let filter: RecordFilter = read_json_body(req, state.config.request_timeout_ms).await?;

    let records = call_store(&state, move |store| store.query(&object_type, &filter)).await?;
    success_json(200, records)
}

/// Liveness probe.
///
/// # Endpoint
/// `GET /health`
pub async fn health(
    _req: Request<hyper::body::Incoming>,
    _params: MatchitParams<'_, '_>,
    _state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    success_json(200, json!({"status": "ok"}))
}

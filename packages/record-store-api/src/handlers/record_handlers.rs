//! Single-record operation handlers.

use hyper::{body::Bytes, Request, Response};
use serde_json::Value;
use tracing::debug;

use crate::router::{AppState, RouterError};
use scenario_core::{Fields, Record, RecordFilter, RecordId, StoreError};

use super::call_store;
use super::request_utils::{
    build_empty_response, parse_fields_param, path_param, read_json_body, success_json,
    CreateRecordResponse, MatchitParams,
};

/// Creates a record.
///
/// # Endpoint
/// `POST /objects/{object_type}`
///
/// # Request Body
/// ```json
/// { "Name": "Alpha Account", "Phone": "555-0100" }
/// ```
///
/// # Response
/// - **201 Created**: `{"success": true, "data": {"id": "ACC000000000001"}}`
///
/// # Errors
/// - **400 Bad Request**: Body is not a JSON object or the store rejected it
pub async fn create_record(
    req: Request<hyper::body::Incoming>,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let object_type = path_param(&params, "object_type")?;
    let fields: Fields = read_json_body(req, state.config.request_timeout_ms).await?;

    let id = call_store(&state, move |store| store.create(&object_type, &fields)).await?;
    debug!(%id, "created over http");
    success_json(201, CreateRecordResponse { id })
}

/// Reads a record.
///
/// # Endpoint
/// `GET /objects/{object_type}/{id}?fields=A,B`
///
/// With `fields`, each listed field is fetched individually and comes back
/// as `null` while it is not populated. Without it the whole record is
/// returned.
///
/// # Errors
/// - **404 Not Found**: Record does not exist
pub async fn read_record(
    req: Request<hyper::body::Incoming>,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let object_type = path_param(&params, "object_type")?;
    let id = RecordId::new(path_param(&params, "id")?);
    let requested = parse_fields_param(req.uri().query());

    let record = call_store(&state, move |store| {
        if requested.is_empty() {
            return store
                .query(&object_type, &RecordFilter::id_in(&[id.clone()]))?
                .into_iter()
                .next()
                .ok_or(StoreError::NotFound {
                    object_type,
                    id: id.to_string(),
                });
        }
        let mut fields = Fields::new();
        for field in requested {
            let value = store.fetch_field(&object_type, &id, &field)?;
            fields.insert(field, value.unwrap_or(Value::Null));
        }
        Ok(Record { id, fields })
    })
    .await?;

    success_json(200, record)
}

/// Partially updates a record; `null` clears a field.
///
/// # Endpoint
/// `PATCH /objects/{object_type}/{id}`
///
/// # Response
/// - **204 No Content**
///
/// # Errors
/// - **400 Bad Request**: Store rejected the update
/// - **404 Not Found**: Record does not exist
pub async fn update_record(
    req: Request<hyper::body::Incoming>,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let object_type = path_param(&params, "object_type")?;
    let id = RecordId::new(path_param(&params, "id")?);
    let fields: Fields = read_json_body(req, state.config.request_timeout_ms).await?;

    call_store(&state, move |store| store.update(&object_type, &id, &fields)).await?;
    build_empty_response(204)
}

/// Deletes a record.
///
/// # Endpoint
/// `DELETE /objects/{object_type}/{id}`
///
/// # Response
/// - **204 No Content**
///
/// # Errors
/// - **404 Not Found**: Record does not exist (already deleted)
pub async fn delete_record(
    _req: Request<hyper::body::Incoming>,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let object_type = path_param(&params, "object_type")?;
    let id = RecordId::new(path_param(&params, "id")?);

    call_store(&state, move |store| {
        store
            .delete(&object_type, &[id])
            .into_iter()
            .next()
            .map(|(_, outcome)| outcome)
            .unwrap_or(Ok(()))
    })
    .await?;
    build_empty_response(204)
}

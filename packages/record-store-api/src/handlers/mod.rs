//! HTTP endpoint implementations for record CRUD and queries.

mod query_handlers;
mod record_handlers;
pub mod request_utils;
pub mod response;

use std::sync::Arc;

pub use query_handlers::{health, query_records};
pub use record_handlers::{create_record, delete_record, read_record, update_record};
pub use response::{error_response, success_response, ApiError, ApiResponse, ErrorResponse};

use crate::router::{AppState, RouterError};
use request_utils::map_store_error_to_router_error;
use scenario_core::{RecordStore, StoreError};

/// Runs a store call on the blocking pool.
///
/// Store implementations are synchronous and may block (the HTTP client
/// does), so they never run on the reactor threads.
async fn call_store<T, F>(state: &AppState, f: F) -> Result<T, RouterError>
where
    F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| RouterError::InternalError(format!("Store task failed: {}", e)))?
        .map_err(map_store_error_to_router_error)
}

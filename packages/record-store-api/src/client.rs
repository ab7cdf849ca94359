//! Blocking HTTP client implementing [`RecordStore`].

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::handlers::request_utils::CreateRecordResponse;
use crate::handlers::{ApiResponse, ErrorResponse};
use scenario_core::store::DeleteResults;
use scenario_core::{Fields, Record, RecordFilter, RecordId, RecordStore, StoreError};

/// Characters left unescaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Record store reached over HTTP.
///
/// Status mapping: 404 becomes [`StoreError::NotFound`], 400 becomes
/// [`StoreError::Rejected`] carrying the server's message, everything else
/// (including connection failures) becomes [`StoreError::Transport`].
pub struct RestStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestStore {
    /// Builds a client for the store at `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the server answers `/health`.
    pub fn health(&self) -> Result<(), StoreError> {
        let response = self.send(self.client.get(self.url(&["health"])))?;
        let _: Value = decode(response, "health", None)?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, SEGMENT));
        }
        url
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().map_err(transport)
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Turns a non-success response into the matching [`StoreError`].
fn check_status(
    response: Response,
    object_type: &str,
    id: Option<&RecordId>,
) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(envelope) => envelope.error.details.unwrap_or(envelope.error.message),
        Err(_) => body,
    };
    Err(match status.as_u16() {
        404 => StoreError::NotFound {
            object_type: object_type.to_string(),
            id: id.map(ToString::to_string).unwrap_or_default(),
        },
        400 => StoreError::Rejected {
            object_type: object_type.to_string(),
            message,
        },
        _ => StoreError::Transport(format!("HTTP {}: {}", status, message)),
    })
}

fn decode<T: DeserializeOwned>(
    response: Response,
    object_type: &str,
    id: Option<&RecordId>,
) -> Result<T, StoreError> {
    let response = check_status(response, object_type, id)?;
    let envelope: ApiResponse<T> = response.json().map_err(transport)?;
    Ok(envelope.data)
}

impl RecordStore for RestStore {
    fn create(&self, object_type: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        let request = self.client.post(self.url(&["objects", object_type])).json(fields);
        let created: CreateRecordResponse = decode(self.send(request)?, object_type, None)?;
        debug!(object_type, id = %created.id, "created");
        Ok(created.id)
    }

    fn update(&self, object_type: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        let request = self
            .client
            .patch(self.url(&["objects", object_type, id.as_str()]))
            .json(fields);
        check_status(self.send(request)?, object_type, Some(id))?;
        Ok(())
    }

    fn fetch_field(
        &self,
        object_type: &str,
        id: &RecordId,
        field: &str,
    ) -> Result<Option<Value>, StoreError> {
        let request = self
            .client
            .get(self.url(&["objects", object_type, id.as_str()]))
            .query(&[("fields", field)]);
        let mut record: Record = decode(self.send(request)?, object_type, Some(id))?;
        Ok(record.fields.remove(field).filter(|value| !value.is_null()))
    }

    fn delete(&self, object_type: &str, ids: &[RecordId]) -> DeleteResults {
        ids.iter()
            .map(|id| {
                let outcome = self
                    .send(
                        self.client
                            .delete(self.url(&["objects", object_type, id.as_str()])),
                    )
                    .and_then(|response| check_status(response, object_type, Some(id)))
                    .map(|_| ());
                (id.clone(), outcome)
            })
            .collect()
    }

    fn query(&self, object_type: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let request = self.client.post(self.url(&["query", object_type])).json(filter);
        decode(self.send(request)?, object_type, None)
    }
}

//! Matchit routing configuration.

use std::sync::Arc;

use hyper::header::AUTHORIZATION;
use hyper::{body::Bytes, Method, Request, Response};
use matchit::Router as MatchitRouter;

use crate::config::ServerConfig;
use crate::handlers;
use scenario_core::RecordStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Store being served
    pub store: Arc<dyn RecordStore>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

/// HTTP request router.
pub struct Router {
    inner: MatchitRouter<RouteHandler>,
    state: AppState,
}

impl Router {
    /// Creates a router serving `store`.
    ///
    /// # Arguments
    /// * `store` - Record store behind the endpoints
    /// * `config` - Server configuration
    ///
    /// # Returns
    /// `Result<Router, matchit::InsertError>`; the route table is static, so
    /// an error means a malformed route literal.
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: ServerConfig,
    ) -> Result<Self, matchit::InsertError> {
        let mut router = MatchitRouter::new();

        // Record endpoints
        router.insert("/objects/{object_type}", RouteHandler::Record)?;
        router.insert("/objects/{object_type}/{id}", RouteHandler::Record)?;

        // Query endpoint
        router.insert("/query/{object_type}", RouteHandler::Query)?;

        router.insert("/health", RouteHandler::Health)?;

        Ok(Self {
            inner: router,
            state: AppState {
                store,
                config: Arc::new(config),
            },
        })
    }

    /// Routes an incoming request to the appropriate handler.
    ///
    /// # Arguments
    /// * `req` - HTTP request
    ///
    /// # Returns
    /// `Result<Response<Bytes>, RouterError>` containing the response or an error.
    pub async fn route(
        &self,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Bytes>, RouterError> {
        let path = req.uri().path().to_string();

        match self.inner.at(&path) {
            Ok(matched) => {
                let handler = matched.value;
                if !matches!(handler, RouteHandler::Health) {
                    self.authorize(&req)?;
                }
                handler
                    .handle(req, matched.params, self.state.clone())
                    .await
            }
            Err(_) => Err(RouterError::NotFound(format!("No route found for {}", path))),
        }
    }

    fn authorize(&self, req: &Request<hyper::body::Incoming>) -> Result<(), RouterError> {
        let Some(token) = &self.state.config.token else {
            return Ok(());
        };
        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if presented == Some(token.as_str()) {
            Ok(())
        } else {
            Err(RouterError::Unauthorized)
        }
    }
}

/// Route handler function.
enum RouteHandler {
    Record,
    Query,
    Health,
}

impl RouteHandler {
    /// Handles a request with the given route parameters.
    async fn handle(
        &self,
        req: Request<hyper::body::Incoming>,
        params: matchit::Params<'_, '_>,
        state: AppState,
    ) -> Result<Response<Bytes>, RouterError> {
        match self {
            RouteHandler::Record => {
                let has_id_param = params.get("id").is_some();
                if req.method() == Method::POST && !has_id_param {
                    handlers::create_record(req, params, state).await
                } else if req.method() == Method::GET && has_id_param {
                    handlers::read_record(req, params, state).await
                } else if req.method() == Method::PATCH && has_id_param {
                    handlers::update_record(req, params, state).await
                } else if req.method() == Method::DELETE && has_id_param {
                    handlers::delete_record(req, params, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::Query => {
                if req.method() == Method::POST {
                    handlers::query_records(req, params, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::Health => {
                if req.method() == Method::GET {
                    handlers::health(req, params, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
        }
    }
}

/// Router error type.
#[derive(Debug)]
pub enum RouterError {
    MethodNotAllowed,
    Unauthorized,
    InternalError(String),
    Timeout,
    BadRequest(String),
    NotFound(String),
    /// Store refused the payload; `details` carries the store's own message
    Rejected { message: String, details: String },
}

impl RouterError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            RouterError::MethodNotAllowed => 405,
            RouterError::Unauthorized => 401,
            RouterError::InternalError(_) => 500,
            RouterError::Timeout => 408,
            RouterError::BadRequest(_) | RouterError::Rejected { .. } => 400,
            RouterError::NotFound(_) => 404,
        }
    }
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::Unauthorized => write!(f, "Unauthorized"),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            RouterError::Timeout => write!(f, "Request Timeout"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::Rejected { message, .. } => write!(f, "Rejected: {}", message),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<RouterError> for Response<Bytes> {
    fn from(err: RouterError) -> Self {
        let status = err.status();
        let (message, details) = match err {
            RouterError::MethodNotAllowed => ("Method Not Allowed".to_string(), None),
            RouterError::Unauthorized => ("Unauthorized".to_string(), None),
            RouterError::Timeout => ("Request Timeout".to_string(), None),
            RouterError::InternalError(msg)
            | RouterError::BadRequest(msg)
            | RouterError::NotFound(msg) => (msg, None),
            RouterError::Rejected { message, details } => (message, Some(details)),
        };

        let error_response = handlers::error_response(status, message, details);
        let body = serde_json::to_vec(&error_response)
            .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":{{\"code\":\"500\",\"message\":\"Failed to serialize error: {}\"}}}}", e).into_bytes());

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() =
            hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

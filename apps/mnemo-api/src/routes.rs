use axum::{
	Json, Router,
	extract::{Request, State},
	http::{StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;

use mnemo_service::{
	Error as ServiceError, GraphQueryRequest, GraphQueryResponse, SearchRequest, SearchResponse,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	let protected = Router::new()
		.route("/v1/context/search", post(search))
		.route("/v1/context/graph_query", post(graph_query))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_token));

	Router::new().route("/health", get(health)).merge(protected).with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/backends", get(backends))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_token))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state
		.service
		.search(payload)
		.await
		.map_err(|err| ApiError::with_body(&err, SearchResponse::failure(err.to_string())))?;

	Ok(Json(response))
}

async fn graph_query(
	State(state): State<AppState>,
	Json(payload): Json<GraphQueryRequest>,
) -> Result<Json<GraphQueryResponse>, ApiError> {
	let response = state
		.service
		.graph_query(payload)
		.await
		.map_err(|err| ApiError::with_body(&err, GraphQueryResponse::failure(err.to_string())))?;

	Ok(Json(response))
}

async fn backends(State(state): State<AppState>) -> Response {
	Json(state.service.health().snapshot()).into_response()
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let Some(expected) = state.service.cfg.security.api_auth_token.as_deref() else {
		return next.run(request).await;
	};
	let provided = request
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "));

	if provided != Some(expected) {
		return ApiError::new(
			StatusCode::UNAUTHORIZED,
			ErrorBody {
				error_code: "unauthorized".to_string(),
				message: "Missing or invalid bearer token.".to_string(),
			},
		)
		.into_response();
	}

	next.run(request).await
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

/// Error response carrying the same body schema as the successful response of its route.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	body: Value,
}
impl ApiError {
	fn new(status: StatusCode, body: impl Serialize) -> Self {
		let body = serde_json::to_value(body).unwrap_or(Value::Null);

		Self { status, body }
	}

	fn with_body(err: &ServiceError, body: impl Serialize) -> Self {
		let status = status_for(err);

		if status.is_server_error() {
			tracing::error!(error = %err, status = status.as_u16(), "Request failed.");
		} else {
			tracing::debug!(error = %err, status = status.as_u16(), "Request rejected.");
		}

		Self::new(status, body)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

pub fn status_for(err: &ServiceError) -> StatusCode {
	match err {
		ServiceError::InvalidRequest { .. } | ServiceError::Validation { .. } =>
			StatusCode::BAD_REQUEST,
		ServiceError::AllBackendsFailed { .. }
		| ServiceError::BackendUnavailable { .. }
		| ServiceError::BackendTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
		ServiceError::ConfigMismatch { .. }
		| ServiceError::Provider { .. }
		| ServiceError::Storage { .. }
		| ServiceError::Qdrant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

use mnemo_domain::{cypher_gate::Rejection, query::BackendKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Validation error {code}: {reason}")]
	Validation { code: String, reason: String },
	#[error("Backend {backend} is unavailable: {message}")]
	BackendUnavailable { backend: BackendKind, message: String },
	#[error("Backend {backend} timed out after {timeout_ms} ms.")]
	BackendTimeout { backend: BackendKind, timeout_ms: u64 },
	#[error("All selected backends failed. {}", notes.join(" "))]
	AllBackendsFailed { notes: Vec<String> },
	#[error("Configuration mismatch: {}", mismatches.join("; "))]
	ConfigMismatch { mismatches: Vec<String> },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<mnemo_storage::Error> for Error {
	fn from(err: mnemo_storage::Error) -> Self {
		match err {
			mnemo_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
			mnemo_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<mnemo_providers::Error> for Error {
	fn from(err: mnemo_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<Rejection> for Error {
	fn from(rejection: Rejection) -> Self {
		Self::Validation { code: rejection.code.as_str().to_string(), reason: rejection.reason }
	}
}

//! Error types shared across the editor.

use thiserror::Error;

/// Violations of graph integrity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
	#[error("node id must not be empty")]
	EmptyId,
	#[error("a node with id '{0}' already exists")]
	DuplicateId(String),
	#[error("no node with id '{0}'")]
	UnknownNode(String),
}

/// Schema violations in a node's typed payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
	#[error("node type '{0}' does not carry a payload")]
	Unexpected(&'static str),
	#[error("malformed {node_type} payload: {message}")]
	Malformed {
		node_type: &'static str,
		message: String,
	},
	#[error("{field} must be {rule}, got {value}")]
	OutOfRange {
		field: &'static str,
		rule: &'static str,
		value: f64,
	},
	#[error("retained_pct ({retained}) must not exceed captured_pct ({captured})")]
	RetainedExceedsCaptured { retained: f64, captured: f64 },
}

/// Failures while turning a reference response into a polygon dataset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
	#[error("topology has no object named '{0}'")]
	MissingObject(String),
	#[error("topology requires an object name")]
	UnnamedObject,
	#[error("arc index {0} out of bounds")]
	ArcOutOfBounds(i64),
	#[error("unsupported reference data: {0}")]
	Unsupported(String),
	#[error("could not decode reference data: {0}")]
	Decode(String),
}

/// Failures talking to the analysis backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
	#[error("request failed: {0}")]
	Network(String),
	#[error("backend answered HTTP {0}")]
	Status(u16),
	#[error("could not decode response: {0}")]
	Decode(String),
	#[error("Exceeded max attempts ({0})")]
	ExceededMaxAttempts(u32),
	#[error("superseded by a newer request")]
	Superseded,
	#[error("backend task ended with status {0}")]
	TaskFailed(String),
}

/// Crate level error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
	#[error(transparent)]
	Graph(#[from] GraphError),
	#[error(transparent)]
	Payload(#[from] PayloadError),
	#[error(transparent)]
	Dataset(#[from] DatasetError),
	#[error(transparent)]
	Api(#[from] ApiError),
	#[error("storage unavailable: {0}")]
	Storage(String),
	#[error("invalid session snapshot: {0}")]
	Snapshot(String),
	#[error("export failed: {0}")]
	Export(String),
}

impl From<serde_json::Error> for ApiError {
	fn from(err: serde_json::Error) -> Self {
		ApiError::Decode(err.to_string())
	}
}

impl From<serde_json::Error> for DatasetError {
	fn from(err: serde_json::Error) -> Self {
		DatasetError::Decode(err.to_string())
	}
}

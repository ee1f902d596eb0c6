//! Error types and the failure envelope builder.

use std::time::Duration;

use log::error;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::{CommandKind, Response};

/// Coarse classification carried on every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad arguments; nothing in the document was touched.
    Validation,
    /// The document engine raised while performing the operation.
    Engine,
    /// The envelope named an operation that does not exist.
    Protocol,
    /// Execution did not signal completion in time.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Engine => "engine",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Cell index {index} is out of range (notebook has {count} cells)")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("Insert position {position} is out of range (notebook has {count} cells)")]
    PositionOutOfRange { position: i64, count: usize },

    #[error("Invalid command parameters: {0}")]
    InvalidParams(#[source] serde_json::Error),

    #[error("{0}")]
    Engine(#[from] anyhow::Error),

    #[error("Cell {0} no longer exists")]
    CellMissing(String),

    #[error("Completion signal for cell {0} was dropped before execution finished")]
    CompletionDropped(String),

    #[error("Execution of cell {cell_id} did not finish within {limit:?}")]
    ExecutionTimeout { cell_id: String, limit: Duration },

    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error("Failed to encode response payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::IndexOutOfRange { .. }
            | BridgeError::PositionOutOfRange { .. }
            | BridgeError::InvalidParams(_) => ErrorKind::Validation,
            BridgeError::Engine(_)
            | BridgeError::CellMissing(_)
            | BridgeError::CompletionDropped(_)
            | BridgeError::Encode(_) => ErrorKind::Engine,
            BridgeError::UnknownCommand(_) => ErrorKind::Protocol,
            BridgeError::ExecutionTimeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Build the failure envelope for a command and log it.
///
/// This is the single place handler failures turn into wire traffic; the
/// connection stays open whatever the error was.
pub fn report_failure(kind: CommandKind, request_id: Value, err: &BridgeError) -> Response {
    error!("[bridge] {}: {}", kind.failure_message(), err);
    Response::error(kind.result_tag(), request_id, err.kind(), err.to_string())
}

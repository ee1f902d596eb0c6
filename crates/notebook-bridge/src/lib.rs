//! Command bridge between an external automation client and a live notebook.
//!
//! The client sends JSON command envelopes over a WebSocket; the bridge
//! routes each to a handler that drives a [`session::DocumentSession`],
//! waits for execution when the command needs results, and answers with a
//! response envelope carrying the same `request_id`.

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod output;
pub mod protocol;
pub mod session;
pub mod settings;

pub use dispatch::Dispatcher;
pub use error::{BridgeError, ErrorKind};
pub use handlers::HandlerContext;
pub use memory::{ExecutionOutcome, Executor, MemoryNotebook, NoKernel};
pub use protocol::{CommandKind, Response};
pub use session::{CellSnapshot, CellType, DocumentSession};

//! The document engine capability surface the bridge drives.
//!
//! The bridge never owns cells. Every handler re-reads the live document
//! through [`DocumentSession`] on each call, so nothing is cached between
//! commands.
//!
//! ## Execution completion
//!
//! Execution is asynchronous on the engine side. A handler that needs the
//! result registers a [`CompletionSignal`] for the target cell *before*
//! triggering execution, then awaits it. Each signal resolves at most once
//! and is dropped from the registry when it fires, so later executions of
//! the same cell never re-trigger it.
//!
//! Registering two signals for one cell while an execution is in flight is
//! not serialized: both resolve on the next completion of that cell, in the
//! engine's completion order rather than request order. Overlapping
//! executions of the same cell can interleave their selection and content
//! side effects. Callers that need ordering must serialize requests
//! themselves.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::protocol::SlideType;

/// Jupyter cell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    #[default]
    Code,
    Markdown,
    Raw,
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellType::Code => write!(f, "code"),
            CellType::Markdown => write!(f, "markdown"),
            CellType::Raw => write!(f, "raw"),
        }
    }
}

/// Point-in-time view of a single cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    /// Engine-assigned id, if the engine has one for this cell.
    pub id: Option<String>,
    pub index: usize,
    pub cell_type: CellType,
    pub source: String,
    /// nbformat output objects (`stream`, `display_data`, `execute_result`,
    /// `error`). Only code cells that have run carry any.
    pub outputs: Vec<Value>,
    pub execution_count: Option<i64>,
    pub slideshow: Option<SlideType>,
}

impl CellSnapshot {
    /// Stable id when the engine assigned one, otherwise `cell_<index>`.
    pub fn resolved_id(&self) -> String {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("cell_{}", self.index),
        }
    }
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookInfo {
    pub name: String,
    pub path: Option<String>,
    pub kernel_name: Option<String>,
    pub modified: bool,
    pub trusted: bool,
}

/// Operations the bridge needs from a live notebook.
///
/// Indices are positions in the current cell order. Implementations may
/// assume callers have validated indices, but must still fail (not panic)
/// on out-of-range input.
pub trait DocumentSession: Send + Sync {
    fn cell_count(&self) -> usize;

    /// All cells, top to bottom.
    fn cells(&self) -> Vec<CellSnapshot>;

    fn cell(&self, index: usize) -> Option<CellSnapshot> {
        self.cells().into_iter().nth(index)
    }

    /// Look up a cell by the id reported in [`CellSnapshot::resolved_id`].
    fn find_cell(&self, cell_id: &str) -> Option<CellSnapshot> {
        self.cells()
            .into_iter()
            .find(|cell| cell.resolved_id() == cell_id)
    }

    /// Insert an empty cell so that it ends up at `index`.
    fn insert_cell(&self, index: usize, cell_type: CellType) -> anyhow::Result<CellSnapshot>;

    fn cell_text(&self, index: usize) -> anyhow::Result<String>;

    fn set_cell_text(&self, index: usize, text: &str) -> anyhow::Result<()>;

    fn select_cell(&self, index: usize) -> anyhow::Result<()>;

    fn selected_index(&self) -> Option<usize>;

    /// Start executing the cell. Completion is reported through the
    /// signal returned by [`DocumentSession::on_execution_finished`].
    fn execute_cell(&self, index: usize) -> anyhow::Result<()>;

    /// Subscribe once to the next execution-completion of `cell_id`.
    fn on_execution_finished(&self, cell_id: &str) -> CompletionSignal;

    fn render_markdown(&self, index: usize) -> anyhow::Result<()>;

    fn save_checkpoint(&self) -> anyhow::Result<()>;

    fn notebook_info(&self) -> NotebookInfo;

    fn slideshow_type(&self, index: usize) -> anyhow::Result<Option<SlideType>>;

    /// `None` removes the classification.
    fn set_slideshow_type(&self, index: usize, slide_type: Option<SlideType>)
        -> anyhow::Result<()>;

    /// Restart the execution engine and run every cell top to bottom.
    fn restart_and_run_all(&self) -> anyhow::Result<()>;
}

/// Single-resolution future for one cell's execution completion.
///
/// Dropping the signal cancels the subscription.
#[derive(Debug)]
pub struct CompletionSignal {
    cell_id: String,
    rx: oneshot::Receiver<()>,
}

impl CompletionSignal {
    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    /// Wait for the completion to fire.
    pub async fn wait(self) -> Result<(), BridgeError> {
        self.rx
            .await
            .map_err(|_| BridgeError::CompletionDropped(self.cell_id))
    }
}

/// Pending completion signals keyed by cell id.
///
/// Engines own one of these and call [`CompletionRegistry::notify`] when a
/// cell finishes executing.
#[derive(Debug, Default)]
pub struct CompletionRegistry {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal for the next completion of `cell_id`.
    ///
    /// Signals that were dropped (timed out or cancelled) are pruned here
    /// so a stuck cell does not accumulate dead entries.
    pub fn subscribe(&self, cell_id: &str) -> CompletionSignal {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let senders = waiters.entry(cell_id.to_string()).or_default();
        senders.retain(|sender| !sender.is_closed());
        senders.push(tx);
        CompletionSignal {
            cell_id: cell_id.to_string(),
            rx,
        }
    }

    /// Resolve and forget every signal registered for `cell_id`.
    ///
    /// Returns how many live subscribers were woken.
    pub fn notify(&self, cell_id: &str) -> usize {
        let senders = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cell_id)
            .unwrap_or_default();
        senders
            .into_iter()
            .filter_map(|tx| tx.send(()).ok())
            .count()
    }

    /// Number of subscribers still waiting on `cell_id`.
    pub fn pending(&self, cell_id: &str) -> usize {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = waiters.get_mut(cell_id) else {
            return 0;
        };
        senders.retain(|tx| !tx.is_closed());
        let count = senders.len();
        if count == 0 {
            waiters.remove(cell_id);
        }
        count
    }
}

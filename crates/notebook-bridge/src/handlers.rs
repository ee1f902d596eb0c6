//! The ten command handlers.
//!
//! Handlers run synchronously up to the point where they would wait on
//! execution. Commands that need the result of a run hand back a
//! [`Reply::Deferred`] future that resolves once the cell's completion
//! signal fires; everything else answers [`Reply::Ready`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::BridgeError;
use crate::output::{extract_output, ExtractedOutput};
use crate::protocol::{
    parse_params, slideshow_label, CellImages, CellIndexParams, CellInfo, CellOutput, CellsInfo,
    CommandKind, EditCellParams, InsertCellParams, InsertedCell, NotebookInfoPayload,
    SavedNotebook, SlideType, SlideshowParams, SlideshowResult, TextOutputParams,
    DEFAULT_MAX_LENGTH,
};
use crate::session::{CellSnapshot, CellType, CompletionSignal, DocumentSession};

/// Shared dependencies every handler receives.
#[derive(Clone)]
pub struct HandlerContext {
    pub session: Arc<dyn DocumentSession>,
    /// `None` waits for completion forever.
    pub execution_timeout: Option<Duration>,
}

impl HandlerContext {
    pub fn new(session: Arc<dyn DocumentSession>) -> Self {
        Self {
            session,
            execution_timeout: None,
        }
    }

    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

/// A handler's success payload, now or after execution completes.
pub enum Reply {
    Ready(Value),
    Deferred(BoxFuture<'static, Result<Value, BridgeError>>),
}

impl Reply {
    fn ready(payload: impl Serialize) -> Result<Self, BridgeError> {
        Ok(Reply::Ready(serde_json::to_value(payload)?))
    }

    /// Resolve the payload, waiting if it was deferred.
    pub async fn resolve(self) -> Result<Value, BridgeError> {
        match self {
            Reply::Ready(value) => Ok(value),
            Reply::Deferred(future) => future.await,
        }
    }
}

/// Run the handler for `kind` against the command envelope.
pub fn handle(
    kind: CommandKind,
    ctx: &HandlerContext,
    envelope: &Value,
) -> Result<Reply, BridgeError> {
    match kind {
        CommandKind::InsertAndExecuteCell => insert_and_execute_cell(ctx, envelope),
        CommandKind::SaveNotebook => save_notebook(ctx),
        CommandKind::GetCellsInfo => get_cells_info(ctx),
        CommandKind::GetNotebookInfo => get_notebook_info(ctx),
        CommandKind::RunCell => run_cell(ctx, envelope),
        CommandKind::RunAllCells => run_all_cells(ctx),
        CommandKind::GetCellTextOutput => get_cell_text_output(ctx, envelope),
        CommandKind::GetCellImageOutput => get_cell_image_output(ctx, envelope),
        CommandKind::EditCellContent => edit_cell_content(ctx, envelope),
        CommandKind::SetSlideshowType => set_slideshow_type(ctx, envelope),
    }
}

/// `0 <= index < count`
fn checked_index(index: i64, count: usize) -> Result<usize, BridgeError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < count)
        .ok_or(BridgeError::IndexOutOfRange { index, count })
}

/// `0 <= position <= count`
fn checked_position(position: i64, count: usize) -> Result<usize, BridgeError> {
    usize::try_from(position)
        .ok()
        .filter(|&p| p <= count)
        .ok_or(BridgeError::PositionOutOfRange { position, count })
}

fn cell_at(session: &dyn DocumentSession, index: i64) -> Result<CellSnapshot, BridgeError> {
    let index = checked_index(index, session.cell_count())?;
    session
        .cell(index)
        .ok_or_else(|| BridgeError::CellMissing(format!("cell_{}", index)))
}

fn cell_output(cell_id: String, index: usize, output: ExtractedOutput) -> CellOutput {
    CellOutput {
        cell_id,
        index,
        has_images: output.has_images(),
        output_text: output.text,
        is_truncated: output.is_truncated,
    }
}

/// Defer the reply until `signal` fires, then build it from the cell's
/// fresh state.
fn after_completion<F, T>(ctx: &HandlerContext, signal: CompletionSignal, build: F) -> Reply
where
    F: FnOnce(&CellSnapshot, ExtractedOutput) -> T + Send + 'static,
    T: Serialize,
{
    let session = Arc::clone(&ctx.session);
    let timeout = ctx.execution_timeout;
    let future = async move {
        let cell_id = signal.cell_id().to_string();
        match timeout {
            Some(limit) => tokio::time::timeout(limit, signal.wait())
                .await
                .map_err(|_| BridgeError::ExecutionTimeout {
                    cell_id: cell_id.clone(),
                    limit,
                })??,
            None => signal.wait().await?,
        }
        debug!("[bridge] Execution of {} finished", cell_id);
        let cell = session
            .find_cell(&cell_id)
            .ok_or(BridgeError::CellMissing(cell_id))?;
        let output = extract_output(&cell, Some(DEFAULT_MAX_LENGTH));
        Ok::<_, BridgeError>(serde_json::to_value(build(&cell, output))?)
    };
    Reply::Deferred(future.boxed())
}

fn insert_and_execute_cell(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: InsertCellParams = parse_params(envelope)?;
    let session = ctx.session.as_ref();
    let position = checked_position(params.position, session.cell_count())?;

    let cell = session.insert_cell(position, params.cell_type)?;
    session.set_cell_text(position, &params.content)?;
    session.select_cell(position)?;
    let cell_id = cell.resolved_id();

    match params.cell_type {
        CellType::Code => {
            let signal = session.on_execution_finished(&cell_id);
            session.execute_cell(position)?;
            Ok(after_completion(ctx, signal, move |cell, output| {
                InsertedCell {
                    cell_id: cell.resolved_id(),
                    position,
                    has_images: output.has_images(),
                    output_text: output.text,
                    is_truncated: output.is_truncated,
                }
            }))
        }
        CellType::Markdown | CellType::Raw => {
            if params.cell_type == CellType::Markdown {
                session.render_markdown(position)?;
            }
            Reply::ready(InsertedCell {
                cell_id,
                position,
                output_text: String::new(),
                is_truncated: false,
                has_images: false,
            })
        }
    }
}

fn save_notebook(ctx: &HandlerContext) -> Result<Reply, BridgeError> {
    ctx.session.save_checkpoint()?;
    Reply::ready(SavedNotebook {
        notebook_path: ctx.session.notebook_info().path,
    })
}

fn get_cells_info(ctx: &HandlerContext) -> Result<Reply, BridgeError> {
    let cells = ctx
        .session
        .cells()
        .into_iter()
        .map(|cell| CellInfo {
            id: cell.resolved_id(),
            position: cell.index,
            content: cell.source,
            cell_type: cell.cell_type,
            prompt_number: cell.execution_count,
        })
        .collect();
    Reply::ready(CellsInfo { cells })
}

fn get_notebook_info(ctx: &HandlerContext) -> Result<Reply, BridgeError> {
    let info = ctx.session.notebook_info();
    Reply::ready(NotebookInfoPayload {
        notebook_name: info.name,
        notebook_path: info.path,
        kernel_name: info.kernel_name,
        cell_count: ctx.session.cell_count(),
        modified: info.modified,
        trusted: info.trusted,
    })
}

fn run_cell(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: CellIndexParams = parse_params(envelope)?;
    let session = ctx.session.as_ref();
    let cell = cell_at(session, params.index)?;
    let index = cell.index;

    session.select_cell(index)?;
    let signal = session.on_execution_finished(&cell.resolved_id());
    session.execute_cell(index)?;
    Ok(after_completion(ctx, signal, move |cell, output| {
        cell_output(cell.resolved_id(), index, output)
    }))
}

/// Fire-and-forget: the reply only says the run was started.
fn run_all_cells(ctx: &HandlerContext) -> Result<Reply, BridgeError> {
    ctx.session.restart_and_run_all()?;
    Ok(Reply::Ready(json!({})))
}

fn get_cell_text_output(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: TextOutputParams = parse_params(envelope)?;
    let cell = cell_at(ctx.session.as_ref(), params.index)?;
    let output = extract_output(&cell, Some(params.max_length));
    Reply::ready(cell_output(cell.resolved_id(), cell.index, output))
}

fn get_cell_image_output(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: CellIndexParams = parse_params(envelope)?;
    let cell = cell_at(ctx.session.as_ref(), params.index)?;
    let output = extract_output(&cell, None);
    Reply::ready(CellImages {
        cell_id: cell.resolved_id(),
        index: cell.index,
        images: output.images,
    })
}

fn edit_cell_content(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: EditCellParams = parse_params(envelope)?;
    let session = ctx.session.as_ref();
    let cell = cell_at(session, params.index)?;
    let index = cell.index;

    session.set_cell_text(index, &params.content)?;

    match cell.cell_type {
        CellType::Code if params.execute => {
            let signal = session.on_execution_finished(&cell.resolved_id());
            session.execute_cell(index)?;
            Ok(after_completion(ctx, signal, move |cell, output| {
                cell_output(cell.resolved_id(), index, output)
            }))
        }
        cell_type => {
            if cell_type == CellType::Markdown {
                session.render_markdown(index)?;
            }
            Reply::ready(cell_output(
                cell.resolved_id(),
                index,
                ExtractedOutput::default(),
            ))
        }
    }
}

fn set_slideshow_type(ctx: &HandlerContext, envelope: &Value) -> Result<Reply, BridgeError> {
    let params: SlideshowParams = parse_params(envelope)?;
    let session = ctx.session.as_ref();
    let cell = cell_at(session, params.index)?;

    let slide_type = SlideType::resolve(params.requested());
    session.set_slideshow_type(cell.index, slide_type)?;
    Reply::ready(SlideshowResult {
        cell_id: cell.resolved_id(),
        index: cell.index,
        slideshow_type: slideshow_label(slide_type).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{ExecutionOutcome, MemoryNotebook, NoKernel};

    fn context(nb: MemoryNotebook) -> (Arc<MemoryNotebook>, HandlerContext) {
        let nb = Arc::new(nb);
        let ctx = HandlerContext::new(nb.clone());
        (nb, ctx)
    }

    fn seeded(count: usize) -> MemoryNotebook {
        let nb = MemoryNotebook::new(|source: &str| {
            ExecutionOutcome::Finished(vec![json!({
                "output_type": "stream",
                "name": "stdout",
                "text": format!("ran {}", source)
            })])
        });
        for i in 0..count {
            nb.append_cell(CellType::Code, &format!("cell {}", i));
        }
        nb
    }

    async fn run(kind: CommandKind, ctx: &HandlerContext, envelope: Value) -> Result<Value, BridgeError> {
        handle(kind, ctx, &envelope)?.resolve().await
    }

    #[test]
    fn test_checked_index() {
        assert_eq!(checked_index(0, 3).unwrap(), 0);
        assert_eq!(checked_index(2, 3).unwrap(), 2);
        assert!(checked_index(3, 3).is_err());
        assert!(checked_index(-1, 3).is_err());
        assert!(checked_index(0, 0).is_err());
    }

    #[test]
    fn test_checked_position_allows_end() {
        assert_eq!(checked_position(3, 3).unwrap(), 3);
        assert_eq!(checked_position(0, 0).unwrap(), 0);
        assert!(checked_position(4, 3).is_err());
        assert!(checked_position(-2, 3).is_err());
    }

    #[tokio::test]
    async fn test_run_cell_selects_and_waits() {
        let (nb, ctx) = context(seeded(3));
        let payload = run(CommandKind::RunCell, &ctx, json!({"index": 1})).await.unwrap();
        assert_eq!(payload["index"], 1);
        assert_eq!(payload["output_text"], "ran cell 1");
        assert_eq!(payload["is_truncated"], false);
        assert_eq!(nb.selected_index(), Some(1));
    }

    #[tokio::test]
    async fn test_run_cell_out_of_range_touches_nothing() {
        let (nb, ctx) = context(seeded(2));
        let err = run(CommandKind::RunCell, &ctx, json!({"index": 2})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(nb.selected_index(), None);
        assert!(nb.cells().iter().all(|c| c.execution_count.is_none()));
    }

    #[tokio::test]
    async fn test_insert_markdown_renders_without_waiting() {
        let (nb, ctx) = context(MemoryNotebook::new(|_: &str| ExecutionOutcome::Pending));
        let reply = handle(
            CommandKind::InsertAndExecuteCell,
            &ctx,
            &json!({"position": 0, "cell_type": "markdown", "content": "# Hi"}),
        )
        .unwrap();
        assert!(matches!(reply, Reply::Ready(_)));
        let payload = reply.resolve().await.unwrap();
        assert_eq!(payload["position"], 0);
        assert_eq!(payload["output_text"], "");
        assert!(nb.is_rendered(0));
        assert_eq!(nb.cell_text(0).unwrap(), "# Hi");
    }

    #[tokio::test]
    async fn test_insert_position_past_end_is_rejected() {
        let (nb, ctx) = context(seeded(1));
        let err = run(
            CommandKind::InsertAndExecuteCell,
            &ctx,
            json!({"position": 5, "content": "x"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::PositionOutOfRange { position: 5, count: 1 }));
        assert_eq!(nb.cell_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_code_default_position() {
        let (nb, ctx) = context(seeded(2));
        let payload = run(
            CommandKind::InsertAndExecuteCell,
            &ctx,
            json!({"content": "print(1)"}),
        )
        .await
        .unwrap();
        assert_eq!(payload["position"], 1);
        assert_eq!(payload["output_text"], "ran print(1)");
        assert_eq!(nb.cell_text(1).unwrap(), "print(1)");
        assert_eq!(payload["cell_id"], json!(nb.cell(1).unwrap().resolved_id()));
    }

    #[tokio::test]
    async fn test_edit_without_execute_leaves_outputs_alone() {
        let (nb, ctx) = context(seeded(1));
        let payload = run(
            CommandKind::EditCellContent,
            &ctx,
            json!({"index": 0, "content": "y = 2"}),
        )
        .await
        .unwrap();
        assert_eq!(payload["output_text"], "");
        assert_eq!(payload["has_images"], false);
        assert_eq!(nb.cell_text(0).unwrap(), "y = 2");
        assert_eq!(nb.cell(0).unwrap().execution_count, None);
    }

    #[tokio::test]
    async fn test_edit_with_execute_runs_code() {
        let (_nb, ctx) = context(seeded(1));
        let payload = run(
            CommandKind::EditCellContent,
            &ctx,
            json!({"index": 0, "content": "y = 2", "execute": true}),
        )
        .await
        .unwrap();
        assert_eq!(payload["output_text"], "ran y = 2");
    }

    #[tokio::test]
    async fn test_edit_markdown_never_executes() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Markdown, "old");
        let (nb, ctx) = context(nb);
        let reply = handle(
            CommandKind::EditCellContent,
            &ctx,
            &json!({"index": 0, "content": "*new*", "execute": true}),
        )
        .unwrap();
        assert!(matches!(reply, Reply::Ready(_)));
        assert!(nb.is_rendered(0));
    }

    #[tokio::test]
    async fn test_slideshow_set_and_clear() {
        let (nb, ctx) = context(seeded(1));
        let payload = run(
            CommandKind::SetSlideshowType,
            &ctx,
            json!({"index": 0, "slideshow_type": "skip"}),
        )
        .await
        .unwrap();
        assert_eq!(payload["slideshow_type"], "skip");
        assert_eq!(nb.slideshow_type(0).unwrap(), Some(SlideType::Skip));

        let payload = run(CommandKind::SetSlideshowType, &ctx, json!({"index": 0}))
            .await
            .unwrap();
        assert_eq!(payload["slideshow_type"], "none");
        assert_eq!(nb.slideshow_type(0).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cells_info_lists_every_cell() {
        let (nb, ctx) = context(seeded(2));
        nb.append_cell(CellType::Raw, "raw text");
        run(CommandKind::RunCell, &ctx, json!({"index": 0})).await.unwrap();

        let payload = run(CommandKind::GetCellsInfo, &ctx, json!({})).await.unwrap();
        let cells = payload["cells"].as_array().unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0]["prompt_number"], 1);
        assert_eq!(cells[1]["prompt_number"], Value::Null);
        assert_eq!(cells[2]["type"], "raw");
        assert_eq!(cells[2]["content"], "raw text");
        assert_eq!(cells[2]["position"], 2);
    }

    #[tokio::test]
    async fn test_notebook_info_payload() {
        let (_nb, ctx) = context(seeded(4));
        let payload = run(CommandKind::GetNotebookInfo, &ctx, json!({})).await.unwrap();
        assert_eq!(payload["notebook_name"], "Untitled.ipynb");
        assert_eq!(payload["notebook_path"], Value::Null);
        assert_eq!(payload["cell_count"], 4);
        assert_eq!(payload["modified"], true);
    }

    #[tokio::test]
    async fn test_save_without_path_is_engine_error() {
        let (_nb, ctx) = context(seeded(1));
        let err = run(CommandKind::SaveNotebook, &ctx, json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[tokio::test]
    async fn test_run_all_returns_empty_payload() {
        let (nb, ctx) = context(seeded(2));
        let payload = run(CommandKind::RunAllCells, &ctx, json!({})).await.unwrap();
        assert_eq!(payload, json!({}));
        assert_eq!(nb.cell(1).unwrap().execution_count, Some(2));
    }

    #[tokio::test]
    async fn test_pending_execution_times_out() {
        let nb = MemoryNotebook::new(|_: &str| ExecutionOutcome::Pending);
        nb.append_cell(CellType::Code, "while True: pass");
        let (nb, ctx) = context(nb);
        let ctx = ctx.with_execution_timeout(Some(Duration::from_millis(20)));

        let id = nb.cell(0).unwrap().resolved_id();
        let err = run(CommandKind::RunCell, &ctx, json!({"index": 0})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().ends_with("within 20ms"), "{}", err);
        assert_eq!(nb.pending_completions(&id), 0);
    }
}

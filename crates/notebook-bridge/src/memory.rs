//! In-process notebook document backed by nbformat.
//!
//! `MemoryNotebook` keeps a parsed `.ipynb` in memory and implements
//! [`DocumentSession`] on top of it. Code runs through an [`Executor`]; an
//! executor either hands back outputs immediately or reports the run as
//! pending, in which case whoever owns the kernel later calls
//! [`MemoryNotebook::finish_execution`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context};
use log::{debug, info};
use nbformat::v4::{Cell, CellId, CellMetadata, Notebook, Output};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::protocol::SlideType;
use crate::session::{
    CellSnapshot, CellType, CompletionRegistry, CompletionSignal, DocumentSession, NotebookInfo,
};

const UNTITLED: &str = "Untitled.ipynb";

/// What an [`Executor`] did with a cell's source.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Execution is done; these are the nbformat output objects.
    Finished(Vec<Value>),
    /// Execution continues elsewhere. Completion must be reported through
    /// [`MemoryNotebook::finish_execution`].
    Pending,
}

/// Runs code cell source.
pub trait Executor: Send + Sync {
    fn execute(&self, source: &str) -> ExecutionOutcome;

    /// Called before restart-and-run-all.
    fn restart(&self) {}
}

impl<F> Executor for F
where
    F: Fn(&str) -> ExecutionOutcome + Send + Sync,
{
    fn execute(&self, source: &str) -> ExecutionOutcome {
        self(source)
    }
}

/// Executor used when no kernel is attached. Every run finishes with no
/// outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKernel;

impl Executor for NoKernel {
    fn execute(&self, _source: &str) -> ExecutionOutcome {
        ExecutionOutcome::Finished(Vec::new())
    }
}

struct State {
    notebook: Notebook,
    path: Option<PathBuf>,
    dirty: bool,
    trusted: bool,
    selected: Option<usize>,
    execution_counter: i32,
    rendered: HashSet<String>,
}

pub struct MemoryNotebook {
    state: Mutex<State>,
    executor: Box<dyn Executor>,
    completions: CompletionRegistry,
}

impl MemoryNotebook {
    /// An unsaved notebook with no cells.
    pub fn new(executor: impl Executor + 'static) -> Self {
        let notebook = Notebook {
            metadata: nbformat::v4::Metadata {
                kernelspec: None,
                language_info: None,
                authors: None,
                additional: HashMap::new(),
            },
            nbformat: 4,
            nbformat_minor: 5,
            cells: Vec::new(),
        };
        Self::from_parts(notebook, None, true, executor)
    }

    /// Load an `.ipynb` file, upgrading legacy notebooks to v4.
    pub fn open(path: impl AsRef<Path>, executor: impl Executor + 'static) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let notebook = match nbformat::parse_notebook(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?
        {
            nbformat::Notebook::V4(nb) => nb,
            nbformat::Notebook::V3(v3) => nbformat::upgrade_v3_notebook(v3)?,
            nbformat::Notebook::Legacy(legacy) => nbformat::upgrade_legacy_notebook(legacy)?,
        };
        info!(
            "[notebook] Opened {} ({} cells)",
            path.display(),
            notebook.cells.len()
        );
        Ok(Self::from_parts(
            notebook,
            Some(path.to_path_buf()),
            true,
            executor,
        ))
    }

    fn from_parts(
        notebook: Notebook,
        path: Option<PathBuf>,
        trusted: bool,
        executor: impl Executor + 'static,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                notebook,
                path,
                dirty: false,
                trusted,
                selected: None,
                execution_counter: 0,
                rendered: HashSet::new(),
            }),
            executor: Box::new(executor),
            completions: CompletionRegistry::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a cell with the given source at the end of the notebook.
    pub fn append_cell(&self, cell_type: CellType, source: &str) -> CellSnapshot {
        let mut state = self.lock();
        let mut cell = new_cell(cell_type);
        *source_mut(&mut cell) = source_to_lines(source);
        state.notebook.cells.push(cell);
        state.dirty = true;
        let index = state.notebook.cells.len() - 1;
        snapshot(index, &state.notebook.cells[index])
    }

    /// Record the outputs of a finished run and resolve everyone waiting on
    /// the cell.
    pub fn finish_execution(&self, cell_id: &str, outputs: Vec<Value>) -> anyhow::Result<()> {
        let outputs = outputs
            .into_iter()
            .map(serde_json::from_value::<Output>)
            .collect::<Result<Vec<_>, _>>()
            .context("Executor produced an invalid output")?;

        {
            let mut state = self.lock();
            let index = find_index(&state.notebook, cell_id)
                .ok_or_else(|| anyhow!("Cell {} not found", cell_id))?;
            state.execution_counter += 1;
            let count = state.execution_counter;
            if let Cell::Code {
                outputs: cell_outputs,
                execution_count,
                ..
            } = &mut state.notebook.cells[index]
            {
                *cell_outputs = outputs;
                *execution_count = Some(count);
            }
            state.dirty = true;
        }

        let woken = self.completions.notify(cell_id);
        debug!("[notebook] Cell {} finished, {} waiter(s)", cell_id, woken);
        Ok(())
    }

    pub fn set_path(&self, path: impl Into<PathBuf>) {
        self.lock().path = Some(path.into());
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.lock().trusted = trusted;
    }

    /// Whether the markdown cell at `index` has been rendered.
    pub fn is_rendered(&self, index: usize) -> bool {
        let state = self.lock();
        state
            .notebook
            .cells
            .get(index)
            .is_some_and(|cell| state.rendered.contains(cell.id().as_str()))
    }

    /// Number of completion signals still waiting on `cell_id`.
    pub fn pending_completions(&self, cell_id: &str) -> usize {
        self.completions.pending(cell_id)
    }

    fn checked<'a>(state: &'a mut State, index: usize) -> anyhow::Result<&'a mut Cell> {
        let count = state.notebook.cells.len();
        state
            .notebook
            .cells
            .get_mut(index)
            .ok_or_else(|| anyhow!("Cell index {} is out of range ({} cells)", index, count))
    }
}

impl DocumentSession for MemoryNotebook {
    fn cell_count(&self) -> usize {
        self.lock().notebook.cells.len()
    }

    fn cells(&self) -> Vec<CellSnapshot> {
        self.lock()
            .notebook
            .cells
            .iter()
            .enumerate()
            .map(|(index, cell)| snapshot(index, cell))
            .collect()
    }

    fn cell(&self, index: usize) -> Option<CellSnapshot> {
        self.lock()
            .notebook
            .cells
            .get(index)
            .map(|cell| snapshot(index, cell))
    }

    fn insert_cell(&self, index: usize, cell_type: CellType) -> anyhow::Result<CellSnapshot> {
        let mut state = self.lock();
        let count = state.notebook.cells.len();
        if index > count {
            bail!("Cannot insert at {} ({} cells)", index, count);
        }
        state.notebook.cells.insert(index, new_cell(cell_type));
        state.dirty = true;
        if let Some(selected) = state.selected.as_mut() {
            if *selected >= index {
                *selected += 1;
            }
        }
        Ok(snapshot(index, &state.notebook.cells[index]))
    }

    fn cell_text(&self, index: usize) -> anyhow::Result<String> {
        let mut state = self.lock();
        Ok(Self::checked(&mut state, index)?.source().join(""))
    }

    fn set_cell_text(&self, index: usize, text: &str) -> anyhow::Result<()> {
        let mut state = self.lock();
        let cell = Self::checked(&mut state, index)?;
        *source_mut(cell) = source_to_lines(text);
        let id = cell.id().as_str().to_string();
        // Editing a markdown cell puts it back into edit mode.
        state.rendered.remove(&id);
        state.dirty = true;
        Ok(())
    }

    fn select_cell(&self, index: usize) -> anyhow::Result<()> {
        let mut state = self.lock();
        Self::checked(&mut state, index)?;
        state.selected = Some(index);
        Ok(())
    }

    fn selected_index(&self) -> Option<usize> {
        self.lock().selected
    }

    fn execute_cell(&self, index: usize) -> anyhow::Result<()> {
        let (cell_id, cell_type, source) = {
            let mut state = self.lock();
            let cell = Self::checked(&mut state, index)?;
            let cell_id = cell.id().as_str().to_string();
            let source = cell.source().join("");
            let cell_type = match cell {
                Cell::Code {
                    outputs,
                    execution_count,
                    ..
                } => {
                    outputs.clear();
                    *execution_count = None;
                    CellType::Code
                }
                Cell::Markdown { .. } => CellType::Markdown,
                Cell::Raw { .. } => CellType::Raw,
            };
            if cell_type == CellType::Markdown {
                state.rendered.insert(cell_id.clone());
            }
            (cell_id, cell_type, source)
        };

        if cell_type != CellType::Code {
            self.completions.notify(&cell_id);
            return Ok(());
        }

        debug!("[notebook] Executing cell {} at index {}", cell_id, index);
        match self.executor.execute(&source) {
            ExecutionOutcome::Finished(outputs) => self.finish_execution(&cell_id, outputs),
            ExecutionOutcome::Pending => Ok(()),
        }
    }

    fn on_execution_finished(&self, cell_id: &str) -> CompletionSignal {
        self.completions.subscribe(cell_id)
    }

    fn render_markdown(&self, index: usize) -> anyhow::Result<()> {
        let mut state = self.lock();
        let cell = Self::checked(&mut state, index)?;
        if let Cell::Markdown { id, .. } = cell {
            let id = id.as_str().to_string();
            state.rendered.insert(id);
        }
        Ok(())
    }

    fn save_checkpoint(&self) -> anyhow::Result<()> {
        let mut state = self.lock();
        let path = state
            .path
            .clone()
            .ok_or_else(|| anyhow!("Notebook has no path; nothing to save to"))?;
        let content = nbformat::serialize_notebook(&nbformat::Notebook::V4(
            state.notebook.clone(),
        ))
        .map_err(|e| anyhow!("Failed to serialize notebook: {}", e))?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        state.dirty = false;
        info!("[notebook] Saved {}", path.display());
        Ok(())
    }

    fn notebook_info(&self) -> NotebookInfo {
        let state = self.lock();
        let name = state
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        let kernel_name = serde_json::to_value(&state.notebook.metadata.kernelspec)
            .ok()
            .and_then(|spec| spec.get("name").and_then(Value::as_str).map(String::from));
        NotebookInfo {
            name,
            path: state.path.as_ref().map(|p| p.display().to_string()),
            kernel_name,
            modified: state.dirty,
            trusted: state.trusted,
        }
    }

    fn slideshow_type(&self, index: usize) -> anyhow::Result<Option<SlideType>> {
        let mut state = self.lock();
        let cell = Self::checked(&mut state, index)?;
        Ok(read_slide_type(metadata_mut(cell)))
    }

    fn set_slideshow_type(
        &self,
        index: usize,
        slide_type: Option<SlideType>,
    ) -> anyhow::Result<()> {
        let mut state = self.lock();
        let metadata = metadata_mut(Self::checked(&mut state, index)?);
        match slide_type {
            Some(slide_type) => {
                metadata.additional.insert(
                    "slideshow".to_string(),
                    json!({ "slide_type": slide_type.as_str() }),
                );
            }
            None => {
                metadata.additional.remove("slideshow");
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn restart_and_run_all(&self) -> anyhow::Result<()> {
        info!("[notebook] Restarting and running all cells");
        self.executor.restart();
        let count = {
            let mut state = self.lock();
            state.execution_counter = 0;
            for cell in state.notebook.cells.iter_mut() {
                if let Cell::Code {
                    outputs,
                    execution_count,
                    ..
                } = cell
                {
                    outputs.clear();
                    *execution_count = None;
                }
            }
            state.notebook.cells.len()
        };
        for index in 0..count {
            self.execute_cell(index)?;
        }
        Ok(())
    }
}

fn new_cell(cell_type: CellType) -> Cell {
    let id = CellId::from(Uuid::new_v4());
    match cell_type {
        CellType::Code => Cell::Code {
            id,
            metadata: empty_cell_metadata(),
            execution_count: None,
            source: Vec::new(),
            outputs: Vec::new(),
        },
        CellType::Markdown => Cell::Markdown {
            id,
            metadata: empty_cell_metadata(),
            source: Vec::new(),
            attachments: None,
        },
        CellType::Raw => Cell::Raw {
            id,
            metadata: empty_cell_metadata(),
            source: Vec::new(),
        },
    }
}

fn empty_cell_metadata() -> CellMetadata {
    CellMetadata {
        id: None,
        collapsed: None,
        scrolled: None,
        deletable: None,
        editable: None,
        format: None,
        name: None,
        tags: None,
        jupyter: None,
        execution: None,
        additional: HashMap::new(),
    }
}

fn snapshot(index: usize, cell: &Cell) -> CellSnapshot {
    let id = Some(cell.id().as_str().to_string());
    let source = cell.source().join("");
    match cell {
        Cell::Code {
            metadata,
            execution_count,
            outputs,
            ..
        } => CellSnapshot {
            id,
            index,
            cell_type: CellType::Code,
            source,
            outputs: outputs
                .iter()
                .filter_map(|o| serde_json::to_value(o).ok())
                .collect(),
            execution_count: execution_count.map(i64::from),
            slideshow: read_slide_type(metadata),
        },
        Cell::Markdown { metadata, .. } => CellSnapshot {
            id,
            index,
            cell_type: CellType::Markdown,
            source,
            outputs: Vec::new(),
            execution_count: None,
            slideshow: read_slide_type(metadata),
        },
        Cell::Raw { metadata, .. } => CellSnapshot {
            id,
            index,
            cell_type: CellType::Raw,
            source,
            outputs: Vec::new(),
            execution_count: None,
            slideshow: read_slide_type(metadata),
        },
    }
}

fn read_slide_type(metadata: &CellMetadata) -> Option<SlideType> {
    SlideType::resolve(
        metadata
            .additional
            .get("slideshow")
            .and_then(|s| s.get("slide_type"))
            .and_then(Value::as_str),
    )
}

fn metadata_mut(cell: &mut Cell) -> &mut CellMetadata {
    match cell {
        Cell::Code { metadata, .. } | Cell::Markdown { metadata, .. } | Cell::Raw { metadata, .. } => {
            metadata
        }
    }
}

fn source_mut(cell: &mut Cell) -> &mut Vec<String> {
    match cell {
        Cell::Code { source, .. } | Cell::Markdown { source, .. } | Cell::Raw { source, .. } => {
            source
        }
    }
}

fn find_index(notebook: &Notebook, cell_id: &str) -> Option<usize> {
    notebook
        .cells
        .iter()
        .position(|c| c.id().as_str() == cell_id)
}

/// nbformat stores source as lines that keep their trailing newline.
fn source_to_lines(source: &str) -> Vec<String> {
    if source.is_empty() {
        return Vec::new();
    }
    source.split_inclusive('\n').map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn stream(text: &str) -> Value {
        json!({"output_type": "stream", "name": "stdout", "text": text})
    }

    fn echo_executor() -> impl Executor {
        |source: &str| ExecutionOutcome::Finished(vec![stream(source)])
    }

    fn notebook_file() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ipynb").tempfile().unwrap();
        let content = json!({
            "cells": [
                {
                    "cell_type": "code",
                    "id": "first",
                    "metadata": {"slideshow": {"slide_type": "fragment"}},
                    "execution_count": 3,
                    "source": ["x = 1\n", "x"],
                    "outputs": [{
                        "output_type": "execute_result",
                        "execution_count": 3,
                        "data": {"text/plain": "1"},
                        "metadata": {}
                    }]
                },
                {
                    "cell_type": "markdown",
                    "id": "second",
                    "metadata": {},
                    "source": ["# Notes"]
                }
            ],
            "metadata": {
                "kernelspec": {"name": "python3", "display_name": "Python 3", "language": "python"}
            },
            "nbformat": 4,
            "nbformat_minor": 5
        });
        file.write_all(content.to_string().as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_open_reads_cells_and_metadata() {
        let file = notebook_file();
        let nb = MemoryNotebook::open(file.path(), NoKernel).unwrap();
        assert_eq!(nb.cell_count(), 2);

        let cells = nb.cells();
        assert_eq!(cells[0].resolved_id(), "first");
        assert_eq!(cells[0].source, "x = 1\nx");
        assert_eq!(cells[0].execution_count, Some(3));
        assert_eq!(cells[0].slideshow, Some(SlideType::Fragment));
        assert_eq!(cells[0].outputs.len(), 1);
        assert_eq!(cells[1].cell_type, CellType::Markdown);

        let info = nb.notebook_info();
        assert_eq!(info.kernel_name.as_deref(), Some("python3"));
        assert!(info.name.ends_with(".ipynb"));
        assert!(!info.modified);
        assert!(info.trusted);
    }

    #[test]
    fn test_open_upgrades_v3_notebook() {
        let mut file = tempfile::Builder::new().suffix(".ipynb").tempfile().unwrap();
        let content = json!({
            "metadata": {"name": "old"},
            "nbformat": 3,
            "nbformat_minor": 0,
            "worksheets": [{
                "metadata": {},
                "cells": [
                    {
                        "cell_type": "code",
                        "collapsed": false,
                        "input": ["x = 1\n", "x"],
                        "language": "python",
                        "metadata": {},
                        "outputs": [],
                        "prompt_number": 1
                    },
                    {
                        "cell_type": "markdown",
                        "metadata": {},
                        "source": ["# Heading"]
                    }
                ]
            }]
        });
        file.write_all(content.to_string().as_bytes()).unwrap();

        let nb = MemoryNotebook::open(file.path(), NoKernel).unwrap();
        let cells = nb.cells();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].cell_type, CellType::Code);
        assert_eq!(cells[0].source, "x = 1\nx");
        assert_eq!(cells[1].cell_type, CellType::Markdown);
        assert_eq!(cells[1].source, "# Heading");
    }

    #[test]
    fn test_new_notebook_is_untitled() {
        let nb = MemoryNotebook::new(NoKernel);
        let info = nb.notebook_info();
        assert_eq!(info.name, "Untitled.ipynb");
        assert_eq!(info.path, None);
        assert_eq!(info.kernel_name, None);
        assert_eq!(nb.cell_count(), 0);
    }

    #[test]
    fn test_insert_cell_positions() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Code, "a");
        nb.append_cell(CellType::Code, "b");
        let inserted = nb.insert_cell(1, CellType::Markdown).unwrap();
        assert_eq!(inserted.index, 1);
        assert_eq!(inserted.cell_type, CellType::Markdown);
        let sources: Vec<_> = nb.cells().into_iter().map(|c| c.source).collect();
        assert_eq!(sources, vec!["a", "", "b"]);

        // Appending at the end is allowed; past the end is not.
        assert!(nb.insert_cell(3, CellType::Code).is_ok());
        assert!(nb.insert_cell(9, CellType::Code).is_err());
        assert_eq!(nb.cell_count(), 4);
    }

    #[test]
    fn test_set_and_get_text_marks_dirty() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Code, "");
        nb.set_cell_text(0, "line1\nline2").unwrap();
        assert_eq!(nb.cell_text(0).unwrap(), "line1\nline2");
        assert!(nb.notebook_info().modified);
        assert!(nb.set_cell_text(1, "x").is_err());
    }

    #[tokio::test]
    async fn test_execute_finished_signals_completion() {
        let nb = MemoryNotebook::new(echo_executor());
        let cell = nb.append_cell(CellType::Code, "hello");
        let signal = nb.on_execution_finished(&cell.resolved_id());
        nb.execute_cell(0).unwrap();
        signal.wait().await.unwrap();

        let cell = nb.cell(0).unwrap();
        assert_eq!(cell.execution_count, Some(1));
        assert_eq!(cell.outputs.len(), 1);
        assert_eq!(cell.outputs[0]["output_type"], "stream");
    }

    #[tokio::test]
    async fn test_pending_execution_waits_for_finish() {
        let nb = MemoryNotebook::new(|_: &str| ExecutionOutcome::Pending);
        let cell = nb.append_cell(CellType::Code, "slow()");
        let id = cell.resolved_id();
        let signal = nb.on_execution_finished(&id);
        nb.execute_cell(0).unwrap();
        assert_eq!(nb.pending_completions(&id), 1);

        nb.finish_execution(&id, vec![stream("done\n")]).unwrap();
        signal.wait().await.unwrap();
        assert_eq!(nb.pending_completions(&id), 0);
        assert_eq!(nb.cell(0).unwrap().outputs.len(), 1);
    }

    #[test]
    fn test_finish_execution_unknown_cell_fails() {
        let nb = MemoryNotebook::new(NoKernel);
        assert!(nb.finish_execution("ghost", Vec::new()).is_err());
    }

    #[test]
    fn test_finish_execution_rejects_bad_output() {
        let nb = MemoryNotebook::new(NoKernel);
        let cell = nb.append_cell(CellType::Code, "");
        let err = nb
            .finish_execution(&cell.resolved_id(), vec![json!({"output_type": "nonsense"})])
            .unwrap_err();
        assert!(err.to_string().contains("invalid output"));
    }

    #[tokio::test]
    async fn test_execute_markdown_renders_and_signals() {
        let nb = MemoryNotebook::new(NoKernel);
        let cell = nb.append_cell(CellType::Markdown, "# Title");
        let signal = nb.on_execution_finished(&cell.resolved_id());
        nb.execute_cell(0).unwrap();
        signal.wait().await.unwrap();
        assert!(nb.is_rendered(0));

        nb.set_cell_text(0, "# Other").unwrap();
        assert!(!nb.is_rendered(0));
        nb.render_markdown(0).unwrap();
        assert!(nb.is_rendered(0));
    }

    #[test]
    fn test_select_cell_bounds() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Code, "");
        assert!(nb.select_cell(1).is_err());
        assert_eq!(nb.selected_index(), None);
        nb.select_cell(0).unwrap();
        assert_eq!(nb.selected_index(), Some(0));
    }

    #[test]
    fn test_insert_before_selection_shifts_it() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Code, "a");
        nb.select_cell(0).unwrap();
        nb.insert_cell(0, CellType::Code).unwrap();
        assert_eq!(nb.selected_index(), Some(1));
    }

    #[test]
    fn test_slideshow_metadata() {
        let nb = MemoryNotebook::new(NoKernel);
        nb.append_cell(CellType::Code, "");
        assert_eq!(nb.slideshow_type(0).unwrap(), None);

        nb.set_slideshow_type(0, Some(SlideType::Subslide)).unwrap();
        assert_eq!(nb.slideshow_type(0).unwrap(), Some(SlideType::Subslide));
        assert_eq!(nb.cell(0).unwrap().slideshow, Some(SlideType::Subslide));

        nb.set_slideshow_type(0, None).unwrap();
        assert_eq!(nb.slideshow_type(0).unwrap(), None);
    }

    #[test]
    fn test_save_without_path_fails() {
        let nb = MemoryNotebook::new(NoKernel);
        let err = nb.save_checkpoint().unwrap_err();
        assert!(err.to_string().contains("no path"));
    }

    #[test]
    fn test_save_writes_file_and_clears_dirty() {
        let file = notebook_file();
        let nb = MemoryNotebook::open(file.path(), NoKernel).unwrap();
        nb.set_cell_text(1, "# Changed").unwrap();
        nb.set_slideshow_type(1, Some(SlideType::Notes)).unwrap();
        assert!(nb.notebook_info().modified);

        nb.save_checkpoint().unwrap();
        assert!(!nb.notebook_info().modified);

        let reopened = MemoryNotebook::open(file.path(), NoKernel).unwrap();
        let cell = reopened.cell(1).unwrap();
        assert_eq!(cell.source, "# Changed");
        assert_eq!(cell.slideshow, Some(SlideType::Notes));
    }

    #[test]
    fn test_restart_and_run_all_reexecutes_code_cells() {
        let nb = MemoryNotebook::new(echo_executor());
        nb.append_cell(CellType::Code, "one");
        nb.append_cell(CellType::Markdown, "*two*");
        nb.append_cell(CellType::Code, "three");
        nb.execute_cell(0).unwrap();
        nb.execute_cell(0).unwrap();
        assert_eq!(nb.cell(0).unwrap().execution_count, Some(2));

        nb.restart_and_run_all().unwrap();
        let cells = nb.cells();
        assert_eq!(cells[0].execution_count, Some(1));
        assert_eq!(cells[2].execution_count, Some(2));
        assert_eq!(cells[2].outputs.len(), 1);
        assert!(nb.is_rendered(1));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MemoryNotebook::open(dir.path().join("missing.ipynb"), NoKernel).is_err());
    }
}

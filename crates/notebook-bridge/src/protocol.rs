//! Wire types for the notebook command channel.
//!
//! Every frame is a single JSON object. Inbound command envelopes carry a
//! `type` tag selecting the handler and an opaque `request_id`:
//!
//! ```text
//! {"type": "run_cell", "request_id": "req-7", "index": 2}
//! ```
//!
//! Outbound envelopes echo the `request_id` and tag the result with
//! `<type>_result`:
//!
//! ```text
//! {"type": "run_cell_result", "request_id": "req-7", "status": "success",
//!  "source": "notebook", "target": "external", "cell_id": "...", ...}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, ErrorKind};
use crate::session::CellType;

/// Text outputs returned by execution-bound commands are cut to this many
/// characters unless the command carries its own `max_length`.
pub const DEFAULT_MAX_LENGTH: usize = 1500;

// ─── Handshake ───────────────────────────────────────────────────────────────

/// Which side of the channel a peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Notebook,
    External,
}

/// First frame sent after the connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub role: Role,
}

impl Handshake {
    pub fn notebook() -> Self {
        Self {
            role: Role::Notebook,
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Every operation an external client can ask the notebook for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    InsertAndExecuteCell,
    SaveNotebook,
    GetCellsInfo,
    GetNotebookInfo,
    RunCell,
    RunAllCells,
    GetCellTextOutput,
    GetCellImageOutput,
    EditCellContent,
    SetSlideshowType,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::InsertAndExecuteCell,
        CommandKind::SaveNotebook,
        CommandKind::GetCellsInfo,
        CommandKind::GetNotebookInfo,
        CommandKind::RunCell,
        CommandKind::RunAllCells,
        CommandKind::GetCellTextOutput,
        CommandKind::GetCellImageOutput,
        CommandKind::EditCellContent,
        CommandKind::SetSlideshowType,
    ];

    /// The inbound `type` tag.
    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::InsertAndExecuteCell => "insert_and_execute_cell",
            CommandKind::SaveNotebook => "save_notebook",
            CommandKind::GetCellsInfo => "get_cells_info",
            CommandKind::GetNotebookInfo => "get_notebook_info",
            CommandKind::RunCell => "run_cell",
            CommandKind::RunAllCells => "run_all_cells",
            CommandKind::GetCellTextOutput => "get_cell_text_output",
            CommandKind::GetCellImageOutput => "get_cell_image_output",
            CommandKind::EditCellContent => "edit_cell_content",
            CommandKind::SetSlideshowType => "set_slideshow_type",
        }
    }

    /// The outbound `type` tag for this command's response.
    pub fn result_tag(self) -> String {
        result_tag_for(self.tag())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Log line used when this command fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            CommandKind::InsertAndExecuteCell => "Error inserting cell",
            CommandKind::SaveNotebook => "Error saving notebook",
            CommandKind::GetCellsInfo => "Error getting cells info",
            CommandKind::GetNotebookInfo => "Error getting notebook info",
            CommandKind::RunCell => "Error running cell",
            CommandKind::RunAllCells => "Error running all cells",
            CommandKind::GetCellTextOutput => "Error getting cell text output",
            CommandKind::GetCellImageOutput => "Error getting cell image output",
            CommandKind::EditCellContent => "Error editing cell content",
            CommandKind::SetSlideshowType => "Error setting slideshow type",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

pub fn result_tag_for(tag: &str) -> String {
    format!("{}_result", tag)
}

/// Deserialize the operation-specific fields of a command envelope.
///
/// The envelope's own `type`/`request_id` (and any routing fields the remote
/// side adds) are ignored.
pub fn parse_params<T: DeserializeOwned>(envelope: &Value) -> Result<T, BridgeError> {
    T::deserialize(envelope).map_err(BridgeError::InvalidParams)
}

fn default_position() -> i64 {
    1
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

/// `insert_and_execute_cell`
#[derive(Debug, Clone, Deserialize)]
pub struct InsertCellParams {
    #[serde(default = "default_position")]
    pub position: i64,
    #[serde(default)]
    pub cell_type: CellType,
    #[serde(default)]
    pub content: String,
}

/// `run_cell`, `get_cell_image_output`
#[derive(Debug, Clone, Deserialize)]
pub struct CellIndexParams {
    #[serde(default)]
    pub index: i64,
}

/// `get_cell_text_output`
#[derive(Debug, Clone, Deserialize)]
pub struct TextOutputParams {
    #[serde(default)]
    pub index: i64,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

/// `edit_cell_content`
#[derive(Debug, Clone, Deserialize)]
pub struct EditCellParams {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub execute: bool,
}

/// `set_slideshow_type`
#[derive(Debug, Clone, Deserialize)]
pub struct SlideshowParams {
    #[serde(default)]
    pub index: i64,
    /// `null` and a missing field both mean "-". Any JSON value is
    /// accepted; non-strings fall outside the enumeration.
    #[serde(default)]
    pub slideshow_type: Option<Value>,
}

impl SlideshowParams {
    pub fn requested(&self) -> Option<&str> {
        self.slideshow_type.as_ref().and_then(Value::as_str)
    }
}

// ─── Slideshow classification ────────────────────────────────────────────────

/// Jupyter slideshow classification stored in `metadata.slideshow.slide_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideType {
    Slide,
    Subslide,
    Fragment,
    Skip,
    Notes,
}

impl SlideType {
    pub fn as_str(self) -> &'static str {
        match self {
            SlideType::Slide => "slide",
            SlideType::Subslide => "subslide",
            SlideType::Fragment => "fragment",
            SlideType::Skip => "skip",
            SlideType::Notes => "notes",
        }
    }

    /// Resolve a requested classification.
    ///
    /// `"-"`, `"none"` and anything outside the enumeration resolve to
    /// `None`, which removes the classification.
    pub fn resolve(requested: Option<&str>) -> Option<SlideType> {
        match requested? {
            "slide" => Some(SlideType::Slide),
            "subslide" => Some(SlideType::Subslide),
            "fragment" => Some(SlideType::Fragment),
            "skip" => Some(SlideType::Skip),
            "notes" => Some(SlideType::Notes),
            _ => None,
        }
    }
}

/// Name reported back for a resolved classification.
pub fn slideshow_label(slide_type: Option<SlideType>) -> &'static str {
    slide_type.map_or("none", SlideType::as_str)
}

// ─── Output payloads ─────────────────────────────────────────────────────────

/// Image representations extracted from cell outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/svg+xml")]
    Svg,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Svg];

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Svg => "image/svg+xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutput {
    pub format: ImageFormat,
    pub data: String,
}

/// Result of `insert_and_execute_cell`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertedCell {
    pub cell_id: String,
    pub position: usize,
    pub output_text: String,
    pub is_truncated: bool,
    pub has_images: bool,
}

/// Result of `run_cell`, `get_cell_text_output` and `edit_cell_content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellOutput {
    pub cell_id: String,
    pub index: usize,
    pub output_text: String,
    pub is_truncated: bool,
    pub has_images: bool,
}

/// Result of `get_cell_image_output`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellImages {
    pub cell_id: String,
    pub index: usize,
    pub images: Vec<ImageOutput>,
}

/// Result of `save_notebook`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedNotebook {
    pub notebook_path: Option<String>,
}

/// One entry of `get_cells_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellInfo {
    pub id: String,
    pub position: usize,
    pub content: String,
    #[serde(rename = "type")]
    pub cell_type: CellType,
    pub prompt_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellsInfo {
    pub cells: Vec<CellInfo>,
}

/// Result of `get_notebook_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookInfoPayload {
    pub notebook_name: String,
    pub notebook_path: Option<String>,
    pub kernel_name: Option<String>,
    pub cell_count: usize,
    pub modified: bool,
    pub trusted: bool,
}

/// Result of `set_slideshow_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideshowResult {
    pub cell_id: String,
    pub index: usize,
    pub slideshow_type: String,
}

// ─── Response envelope ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outbound envelope, correlated to a command by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub response_type: String,
    pub request_id: Value,
    pub status: Status,
    pub source: Role,
    pub target: Role,
    /// Success payload fields, or `message`/`error_kind` on failure.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Response {
    /// Wrap a handler payload. Non-object payloads are carried under `result`.
    pub fn success(response_type: String, request_id: Value, payload: Value) -> Self {
        let body = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            response_type,
            request_id,
            status: Status::Success,
            source: Role::Notebook,
            target: Role::External,
            body,
        }
    }

    pub fn error(response_type: String, request_id: Value, kind: ErrorKind, message: String) -> Self {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message));
        body.insert(
            "error_kind".to_string(),
            Value::String(kind.as_str().to_string()),
        );
        Self {
            response_type,
            request_id,
            status: Status::Error,
            source: Role::Notebook,
            target: Role::External,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    pub fn message(&self) -> Option<&str> {
        self.field("message").and_then(Value::as_str)
    }
}

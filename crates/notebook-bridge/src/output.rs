//! Collects the text and image payloads a cell produced.
//!
//! Works on nbformat output objects as plain JSON, the same way they arrive
//! from the kernel: `stream` outputs carry `text`, rich outputs carry a
//! `data` mimebundle.

use serde_json::Value;

use crate::protocol::{ImageFormat, ImageOutput};
use crate::session::{CellSnapshot, CellType};

/// Everything extracted from one cell's result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedOutput {
    pub text: String,
    pub is_truncated: bool,
    pub images: Vec<ImageOutput>,
}

impl ExtractedOutput {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Extract text and images from a cell.
///
/// Non-code cells and cells without outputs yield an empty result. When
/// `max_length` is set the text is cut to that many characters; images are
/// never truncated.
pub fn extract_output(cell: &CellSnapshot, max_length: Option<usize>) -> ExtractedOutput {
    if cell.cell_type != CellType::Code || cell.outputs.is_empty() {
        return ExtractedOutput::default();
    }

    let mut text = String::new();
    let mut images = Vec::new();

    for output in &cell.outputs {
        if let Some(fragment) = output_text(output) {
            text.push_str(&fragment);
        }

        let Some(data) = output.get("data") else {
            continue;
        };
        for format in ImageFormat::ALL {
            if let Some(payload) = data.get(format.mime_type()).and_then(multiline_string) {
                images.push(ImageOutput {
                    format,
                    data: payload,
                });
            }
        }
    }

    let (text, is_truncated) = match max_length {
        Some(limit) => truncate_text(text, limit),
        None => (text, false),
    };

    ExtractedOutput {
        text,
        is_truncated,
        images,
    }
}

/// Stream text if present, otherwise the `text/plain` representation.
fn output_text(output: &Value) -> Option<String> {
    if let Some(text) = output.get("text").and_then(multiline_string) {
        return Some(text);
    }
    output
        .get("data")
        .and_then(|data| data.get("text/plain"))
        .and_then(multiline_string)
}

/// nbformat allows a string or a list of lines.
fn multiline_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(parts.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Cut `text` to its first `limit` characters.
pub fn truncate_text(text: String, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((byte_offset, _)) => {
            let mut text = text;
            text.truncate(byte_offset);
            (text, true)
        }
        None => (text, false),
    }
}

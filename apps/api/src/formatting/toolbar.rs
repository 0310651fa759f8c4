//! Toolbar edits: wrapping the current selection in inline markers.
//!
//! Offsets are counted in Unicode scalar values, not bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    Bold,
    Italic,
    Underline,
}

impl MarkerStyle {
    pub fn markers(&self) -> (&'static str, &'static str) {
        match self {
            MarkerStyle::Bold => ("**", "**"),
            MarkerStyle::Italic => ("*", "*"),
            MarkerStyle::Underline => ("<u>", "</u>"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WrapError {
    #[error("selection start {start} is after selection end {end}")]
    Inverted { start: usize, end: usize },

    #[error("selection end {end} is past the end of the text ({len} characters)")]
    OutOfBounds { end: usize, len: usize },
}

/// The edited text and the selection to restore afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapEdit {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Surrounds `text[start..end]` with the style's markers.
///
/// A non-empty selection keeps covering the same inner text. An empty
/// selection inserts the marker pair at the cursor and leaves the cursor
/// between the two markers.
pub fn wrap_selection(
    text: &str,
    start: usize,
    end: usize,
    style: MarkerStyle,
) -> Result<WrapEdit, WrapError> {
    if start > end {
        return Err(WrapError::Inverted { start, end });
    }
    let len = text.chars().count();
    if end > len {
        return Err(WrapError::OutOfBounds { end, len });
    }

    let (open, close) = style.markers();
    let start_byte = byte_offset(text, start);
    let end_byte = byte_offset(text, end);

    let mut edited = String::with_capacity(text.len() + open.len() + close.len());
    edited.push_str(&text[..start_byte]);
    edited.push_str(open);
    edited.push_str(&text[start_byte..end_byte]);
    edited.push_str(close);
    edited.push_str(&text[end_byte..]);

    // Markers are ASCII: byte length == char length
    let shift = open.len();
    Ok(WrapEdit {
        text: edited,
        start: start + shift,
        end: end + shift,
    })
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

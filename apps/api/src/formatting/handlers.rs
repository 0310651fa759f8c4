//! Axum route handlers for the Formatting API.

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::formatting::inline::{format_inline, Span, SpanKind};
use crate::formatting::render::render_html;
use crate::formatting::toolbar::{wrap_selection, MarkerStyle, WrapEdit};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FormatRequest {
    pub text: String,
}

/// Owned copy of a `Span`: spans borrow the request text, which is dropped
/// before the response body is written.
#[derive(Debug, Serialize)]
pub struct FormattedSpan {
    pub kind: SpanKind,
    pub text: String,
}

impl From<Span<'_>> for FormattedSpan {
    fn from(span: Span<'_>) -> Self {
        Self {
            kind: span.kind,
            text: span.text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FormatResponse {
    pub lines: Vec<Vec<FormattedSpan>>,
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct WrapRequest {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub style: MarkerStyle,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/format
pub async fn handle_format(Json(req): Json<FormatRequest>) -> Json<FormatResponse> {
    let lines = format_inline(&req.text)
        .map(|line| line.into_iter().map(FormattedSpan::from).collect())
        .collect();
    Json(FormatResponse {
        lines,
        html: render_html(&req.text),
    })
}

/// POST /api/v1/format/wrap
pub async fn handle_wrap(Json(req): Json<WrapRequest>) -> Result<Json<WrapEdit>, AppError> {
    wrap_selection(&req.text, req.start, req.end, req.style)
        .map(Json)
        .map_err(|e| AppError::Validation(e.to_string()))
}

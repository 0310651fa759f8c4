// Inline rich-text formatting: markup parsing, HTML rendering and toolbar edits.
// Pure functions only; no store access here.

pub mod handlers;
pub mod inline;
pub mod render;
pub mod toolbar;

//! Seam to the HTML template renderer.
//!
//! Rendering itself lives outside this crate. Whatever engine the caller
//! uses only has to produce a string for a template identifier and a JSON
//! data payload; the mail core treats that string as opaque.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by the rendering collaborator. Carried through
/// [`crate::error::MailError::Render`] without reinterpretation.
#[derive(Debug, Error)]
#[error("template {template:?} failed to render: {reason}")]
pub struct RenderError {
    pub template: String,
    pub reason: String,
}

impl RenderError {
    pub fn new(template: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            template: template.into(),
            reason: reason.to_string(),
        }
    }
}

/// Supplies rendered HTML for a template identifier and a data payload.
pub trait TemplateRenderer {
    fn render(&self, template: &str, data: &Value) -> Result<String, RenderError>;
}

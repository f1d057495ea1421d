//! Structured-payload extraction from generator response envelopes.
//!
//! The generation endpoint may place the structured object in one of several
//! envelope shapes. Shapes are tried in priority order and the first one that
//! yields a JSON object wins. Nothing here ever guesses at free-form prose.

use serde_json::{Map, Value};
use tracing::debug;

pub type JsonObject = Map<String, Value>;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One known envelope layout.
pub trait EnvelopeShape: Send + Sync {
    /// The structured object, if this shape matches the envelope.
    fn extract(&self, envelope: &Value) -> Option<JsonObject>;

    /// Human-readable shape name for tracing.
    fn name(&self) -> &str;
}

/// Content blocks nested under `output[*].content[*]`.
fn content_blocks(envelope: &Value) -> impl Iterator<Item = &Value> {
    envelope
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
}

/// A content block carrying an already-parsed JSON object.
pub struct StructuredJsonBlock;

impl EnvelopeShape for StructuredJsonBlock {
    fn extract(&self, envelope: &Value) -> Option<JsonObject> {
        content_blocks(envelope)
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("output_json"))
            .find_map(|block| block.get("json").and_then(Value::as_object).cloned())
    }

    fn name(&self) -> &str {
        "output_json block"
    }
}

/// A text content block whose text is a JSON object.
pub struct TextBlock;

impl EnvelopeShape for TextBlock {
    fn extract(&self, envelope: &Value) -> Option<JsonObject> {
        content_blocks(envelope)
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("output_text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .find_map(parse_object_text)
    }

    fn name(&self) -> &str {
        "output_text block"
    }
}

/// A top-level convenience text field.
pub struct TopLevelText;

impl EnvelopeShape for TopLevelText {
    fn extract(&self, envelope: &Value) -> Option<JsonObject> {
        envelope
            .get("output_text")
            .and_then(Value::as_str)
            .and_then(parse_object_text)
    }

    fn name(&self) -> &str {
        "top-level output_text"
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds envelope shapes in priority order.
pub struct ShapeRegistry {
    shapes: Vec<Box<dyn EnvelopeShape>>,
}

impl ShapeRegistry {
    /// Registry with all built-in shapes, structured blocks first.
    pub fn new() -> Self {
        Self {
            shapes: vec![
                Box::new(StructuredJsonBlock),
                Box::new(TextBlock),
                Box::new(TopLevelText),
            ],
        }
    }

    /// First object any shape finds in the envelope.
    pub fn extract(&self, envelope: &Value) -> Option<JsonObject> {
        for shape in &self.shapes {
            if let Some(object) = shape.extract(envelope) {
                debug!(shape = shape.name(), "structured payload extracted");
                return Some(object);
            }
        }
        None
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the structured object from a raw response body.
///
/// `None` when the body is not JSON or no known shape holds an object.
pub fn extract_structured(body: &str) -> Option<JsonObject> {
    let envelope: Value = serde_json::from_str(body).ok()?;
    ShapeRegistry::new().extract(&envelope)
}

/// Parse text as a JSON object, tolerating one surrounding Markdown fence.
fn parse_object_text(text: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(strip_fence(text)).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") up to the first newline
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

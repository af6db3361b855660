//! Offline generation backend
//!
//! Answers without contacting a provider: structured calls get a payload
//! synthesized from the requested [`OutputShape`], free-text calls a fixed
//! reply. Lets the service run end to end without an API key.

use crate::services::generation_client::{GenerationBackend, GenerationError};
use crate::services::output_shape::OutputShape;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Reply text for free-text calls
pub const MOCK_TEXT_REPLY: &str = "This is a mock tutor reply.";

pub struct MockBackend {
    items_per_array: usize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MockBackend {
    pub fn new(items_per_array: usize) -> Self {
        Self { items_per_array }
    }

    /// Value of `shape` for element `index`; strings are `"<field> <n>"`
    fn synthesize(&self, shape: &OutputShape, field: &str, index: usize) -> Value {
        match shape {
            OutputShape::String => json!(format!("{} {}", field, index + 1)),
            OutputShape::Integer => json!(index + 1),
            OutputShape::Number => json!((index + 1) as f64),
            OutputShape::Boolean => json!(false),
            OutputShape::Array(item) => Value::Array(
                (0..self.items_per_array)
                    .map(|i| self.synthesize(item, field, i))
                    .collect(),
            ),
            OutputShape::Object(fields) => {
                let mut object = Map::new();
                for (name, field_shape) in fields {
                    object.insert(name.clone(), self.synthesize(field_shape, name, index));
                }
                Value::Object(object)
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn complete(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> Result<String, GenerationError> {
        debug!(prompt_chars = prompt.len(), structured = shape.is_some(), "Mock generation call");
        Ok(match shape {
            Some(shape) => self.synthesize(shape, "value", 0).to_string(),
            None => MOCK_TEXT_REPLY.to_string(),
        })
    }
}

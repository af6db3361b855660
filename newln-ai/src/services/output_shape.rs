//! Expected output shape for generation calls
//!
//! The shape is sent to the provider as a response schema and used locally to
//! validate the returned JSON before anything is handed to callers.

use serde_json::{json, Map, Value};

/// Closed, recursive description of a JSON payload
///
/// Object fields are all required; unknown extra fields are tolerated.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<OutputShape>),
    Object(Vec<(String, OutputShape)>),
}

/// Types with a fixed generation output shape
pub trait Shaped {
    fn output_shape() -> OutputShape;
}

impl<T: Shaped> Shaped for Vec<T> {
    fn output_shape() -> OutputShape {
        OutputShape::array_of(T::output_shape())
    }
}

impl Shaped for String {
    fn output_shape() -> OutputShape {
        OutputShape::String
    }
}

impl OutputShape {
    pub fn array_of(item: OutputShape) -> Self {
        OutputShape::Array(Box::new(item))
    }

    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, OutputShape)>) -> Self {
        OutputShape::Object(
            fields
                .into_iter()
                .map(|(name, shape)| (name.to_string(), shape))
                .collect(),
        )
    }

    /// Provider response-schema representation
    pub fn to_schema(&self) -> Value {
        match self {
            OutputShape::String => json!({ "type": "STRING" }),
            OutputShape::Integer => json!({ "type": "INTEGER" }),
            OutputShape::Number => json!({ "type": "NUMBER" }),
            OutputShape::Boolean => json!({ "type": "BOOLEAN" }),
            OutputShape::Array(item) => json!({
                "type": "ARRAY",
                "items": item.to_schema(),
            }),
            OutputShape::Object(fields) => {
                let mut properties = Map::new();
                for (name, shape) in fields {
                    properties.insert(name.clone(), shape.to_schema());
                }
                let required: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                json!({
                    "type": "OBJECT",
                    "properties": properties,
                    "required": required,
                })
            }
        }
    }

    /// Check `value` against this shape
    ///
    /// The error names the JSON path of the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), String> {
        let ok = match self {
            OutputShape::String => value.is_string(),
            OutputShape::Integer => value.is_i64() || value.is_u64(),
            OutputShape::Number => value.is_number(),
            OutputShape::Boolean => value.is_boolean(),
            OutputShape::Array(item) => {
                let Some(elements) = value.as_array() else {
                    return Err(format!("{}: expected array, got {}", path, kind_of(value)));
                };
                for (i, element) in elements.iter().enumerate() {
                    item.validate_at(element, &format!("{}[{}]", path, i))?;
                }
                true
            }
            OutputShape::Object(fields) => {
                let Some(object) = value.as_object() else {
                    return Err(format!("{}: expected object, got {}", path, kind_of(value)));
                };
                for (name, shape) in fields {
                    let field_path = format!("{}.{}", path, name);
                    match object.get(name) {
                        Some(field) => shape.validate_at(field, &field_path)?,
                        None => return Err(format!("{}: missing required field", field_path)),
                    }
                }
                true
            }
        };

        if ok {
            Ok(())
        } else {
            Err(format!(
                "{}: expected {}, got {}",
                path,
                self.type_name(),
                kind_of(value)
            ))
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            OutputShape::String => "string",
            OutputShape::Integer => "integer",
            OutputShape::Number => "number",
            OutputShape::Boolean => "boolean",
            OutputShape::Array(_) => "array",
            OutputShape::Object(_) => "object",
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

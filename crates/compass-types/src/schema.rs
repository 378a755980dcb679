//! Structural input schemas for tools.
//!
//! Tool arguments arrive as JSON values. Each tool declares an [`ObjectSchema`]
//! describing the shape it accepts, and the dispatcher validates incoming
//! arguments against it before the handler ever runs. The same schema is
//! rendered as JSON Schema for `tools/list`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The structural type of a single property.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<SchemaType>),
    Object,
    Any,
}

impl SchemaType {
    /// JSON Schema type name.
    fn type_name(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array(_) => "array",
            SchemaType::Object => "object",
            SchemaType::Any => "any",
        }
    }

    /// Check `value` against this type, reporting the first mismatch under `path`.
    fn check(&self, path: &str, value: &Value) -> Result<(), String> {
        let ok = match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => value.is_i64() || value.is_u64(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Object => value.is_object(),
            SchemaType::Any => true,
            SchemaType::Array(item) => match value.as_array() {
                Some(items) => {
                    for (i, v) in items.iter().enumerate() {
                        item.check(&format!("{path}[{i}]"), v)?;
                    }
                    true
                }
                None => false,
            },
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "property '{path}' must be {} {}, got {}",
                article(self.type_name()),
                self.type_name(),
                kind_of(value)
            ))
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            SchemaType::Any => serde_json::json!({}),
            SchemaType::Array(item) => serde_json::json!({
                "type": "array",
                "items": item.to_json_schema(),
            }),
            other => serde_json::json!({ "type": other.type_name() }),
        }
    }
}

fn article(word: &str) -> &'static str {
    match word.as_bytes().first() {
        Some(b'a' | b'e' | b'i' | b'o' | b'u') => "an",
        _ => "a",
    }
}

/// Human-readable name of a JSON value's kind.
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

/// A single named property in an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub ty: SchemaType,
    pub description: Option<String>,
}

/// Schema for a tool's argument object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    properties: BTreeMap<String, PropertySchema>,
    required: Vec<String>,
    additional_properties: bool,
}

impl ObjectSchema {
    /// An empty schema: no properties, nothing extra allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional property.
    pub fn property(
        mut self,
        name: impl Into<String>,
        ty: SchemaType,
        description: impl Into<String>,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertySchema {
                ty,
                description: Some(description.into()),
            },
        );
        self
    }

    /// Add a property the caller must supply.
    pub fn required_property(
        mut self,
        name: impl Into<String>,
        ty: SchemaType,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.property(name, ty, description)
    }

    /// Accept properties that are not declared.
    pub fn allow_additional(mut self) -> Self {
        self.additional_properties = true;
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertySchema> {
        &self.properties
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Validate an argument object, returning a description of the first violation.
    ///
    /// Missing required properties are reported first, in declaration order,
    /// then supplied properties in key order.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for name in &self.required {
            if !args.contains_key(name) {
                return Err(format!("missing required property '{name}'"));
            }
        }

        let mut keys: Vec<&String> = args.keys().collect();
        keys.sort();
        for key in keys {
            match self.properties.get(key) {
                Some(prop) => prop.ty.check(key, &args[key])?,
                None if self.additional_properties => {}
                None => return Err(format!("unexpected property '{key}'")),
            }
        }
        Ok(())
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for (name, prop) in &self.properties {
            let mut schema = prop.ty.to_json_schema();
            if let (Some(desc), Some(obj)) = (&prop.description, schema.as_object_mut()) {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(name.clone(), schema);
        }

        let mut schema = serde_json::json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": self.additional_properties,
        });
        if !self.required.is_empty() {
            schema["required"] = serde_json::json!(self.required);
        }
        schema
    }
}

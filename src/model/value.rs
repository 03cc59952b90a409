use std::fmt;
use std::sync::Arc;

use super::instance::Model;
use super::schema::Schema;

/// A concrete value held by a model field.
///
/// `Raw` carries structured input that has no typed representation (a JSON
/// object where a scalar was declared, a `null` inside a list, ...). It is only
/// ever produced by `Model::from_dikt` and never passes field validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<FieldValue>),
    Object(Box<Model>),
    Raw(serde_json::Value),
}

impl FieldValue {
    /// Short name of the value's kind, used in type-mismatch messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Str(_) => "string",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
            FieldValue::Raw(_) => "untyped value",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            FieldValue::Object(model) => Some(model),
            _ => None,
        }
    }

    /// Convert to a plain JSON value. Nested models are expanded with the
    /// given field-name separator.
    pub(crate) fn to_json(&self, separator: Option<char>) -> serde_json::Value {
        use serde_json::Value;

        match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Array(items) => {
                Value::Array(items.iter().map(|item| item.to_json(separator)).collect())
            }
            FieldValue::Object(model) => model.export(separator),
            FieldValue::Raw(raw) => raw.clone(),
        }
    }

    /// Plain conversion from JSON with no schema guidance
    pub(crate) fn from_json(value: &serde_json::Value) -> FieldValue {
        use serde_json::Value;

        match value {
            Value::String(s) => FieldValue::Str(s.clone()),
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => n
                    .as_f64()
                    .map(FieldValue::Float)
                    .unwrap_or_else(|| FieldValue::Raw(value.clone())),
            },
            Value::Array(items) => {
                FieldValue::Array(items.iter().map(FieldValue::from_json).collect())
            }
            other => FieldValue::Raw(other.clone()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Model> for FieldValue {
    fn from(value: Model) -> Self {
        FieldValue::Object(Box::new(value))
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// The semantic kind a field accepts
#[derive(Debug, Clone)]
pub enum DataType {
    String,
    Int,
    Float,
    Bool,
    Array(Box<DataType>),
    Object(Arc<Schema>),
}

impl DataType {
    /// Shallow type check: lists are not inspected element by element and
    /// models are matched by schema, not re-validated.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (DataType::String, FieldValue::Str(_)) => true,
            (DataType::Int, FieldValue::Int(_)) => true,
            (DataType::Float, FieldValue::Float(_)) => true,
            (DataType::Bool, FieldValue::Bool(_)) => true,
            (DataType::Array(_), FieldValue::Array(_)) => true,
            (DataType::Object(schema), FieldValue::Object(model)) => model.schema().is_same(schema),
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "string"),
            DataType::Int => write!(f, "integer"),
            DataType::Float => write!(f, "float"),
            DataType::Bool => write!(f, "boolean"),
            DataType::Array(item) => write!(f, "array of {}", item),
            DataType::Object(schema) => write!(f, "{}", schema.name()),
        }
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataType::String, DataType::String)
            | (DataType::Int, DataType::Int)
            | (DataType::Float, DataType::Float)
            | (DataType::Bool, DataType::Bool) => true,
            (DataType::Array(a), DataType::Array(b)) => a == b,
            (DataType::Object(a), DataType::Object(b)) => a.is_same(b),
            _ => false,
        }
    }
}

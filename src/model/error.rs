use std::fmt;

use thiserror::Error;

use super::value::FieldValue;

/// Which field kind (or model kind) produced a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    Array,
    Object,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "StringField",
            FieldKind::Int => "IntField",
            FieldKind::Float => "FloatField",
            FieldKind::Bool => "BoolField",
            FieldKind::Array => "ArrayField",
            FieldKind::Object => "ObjectField",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Field(FieldKind),
    Model(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Field(kind) => write!(f, "{}", kind),
            Origin::Model(name) => write!(f, "model {}", name),
        }
    }
}

/// Cause of a validation failure. Match on this rather than on messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    #[error("field is required")]
    RequiredField,

    #[error("expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: &'static str },

    #[error("string is longer than {max} characters")]
    StringTooLong { max: usize },

    #[error("string is shorter than {min} characters")]
    StringTooShort { min: usize },

    #[error("string does not match pattern '{pattern}'")]
    PatternMismatch { pattern: String },

    #[error("number exceeds maximum {maximum} (exclusive: {exclusive})")]
    NumberMaxExceeded { maximum: String, exclusive: bool },

    #[error("number is below minimum {minimum} (exclusive: {exclusive})")]
    NumberMinBelow { minimum: String, exclusive: bool },

    #[error("array has fewer than {min} items")]
    ArrayTooFewItems { min: usize },

    #[error("array has more than {max} items")]
    ArrayTooManyItems { max: usize },

    #[error("model {model} has no field with this name")]
    UnknownField { model: String },
}

/// A rejected value, with the field name it was assigned under and the field
/// or model kind that rejected it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value for '{field}' ({origin}): {kind}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub origin: Origin,
    pub field: String,
    pub data: Option<FieldValue>,
}

impl ValidationError {
    pub fn new(
        kind: ValidationErrorKind,
        origin: Origin,
        field: impl Into<String>,
        data: Option<FieldValue>,
    ) -> Self {
        Self {
            kind,
            origin,
            field: field.into(),
            data,
        }
    }

    pub fn is_required_field(&self) -> bool {
        matches!(self.kind, ValidationErrorKind::RequiredField)
    }
}

/// Errors raised while declaring fields and model schemas
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("default value rejected by its own field: {0}")]
    InvalidDefault(#[source] ValidationError),

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("field '{field}' declared twice on model {model}")]
    DuplicateField { model: String, field: String },
}

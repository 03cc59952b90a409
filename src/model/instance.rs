use std::borrow::Cow;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::error::{Origin, ValidationError, ValidationErrorKind};
use super::schema::Schema;
use super::value::{DataType, FieldValue};

/// Options for [`Model::to_dikt`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Replaces `_` in field names, e.g. `-` for HTTP header names
    pub separator: Option<char>,
    /// Run full validation before exporting
    pub validate: bool,
}

impl ExportOptions {
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }
}

/// Options for [`Model::from_dikt`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Field-name separator used by the input, e.g. `-` for HTTP headers
    pub separator: Option<char>,
    /// Best-effort scalar coercion (see [`coerce`])
    pub coerce: bool,
    /// Validate the whole instance once it is built
    pub validate: bool,
}

impl ImportOptions {
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn coerced(mut self) -> Self {
        self.coerce = true;
        self
    }

    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }
}

/// An instance of a model kind: one optional value per declared field.
///
/// Every write through [`Model::set`] is validated by the field before it is
/// committed; a rejected write leaves the previous value in place.
#[derive(Debug, Clone)]
pub struct Model {
    schema: Arc<Schema>,
    values: Vec<Option<FieldValue>>,
}

impl Model {
    /// Build a validated instance. Missing fields fall back to their default;
    /// a missing required field without default is an error.
    pub fn new<I, K, V>(schema: &Arc<Schema>, values: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        Self::construct(schema, values, true)
    }

    /// Build an instance storing the supplied values as-is. Defaults are still
    /// applied and a missing required field without default is still an
    /// error; supplied values are not validated.
    pub fn new_unchecked<I, K, V>(schema: &Arc<Schema>, values: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        Self::construct(schema, values, false)
    }

    fn construct<I, K, V>(
        schema: &Arc<Schema>,
        values: I,
        validate: bool,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut supplied: Vec<Option<FieldValue>> = vec![None; schema.len()];
        for (key, value) in values {
            let key = key.as_ref();
            let index = schema
                .position(key)
                .ok_or_else(|| unknown_field(schema, key))?;
            supplied[index] = Some(value.into());
        }

        let mut model = Model {
            schema: schema.clone(),
            values: vec![None; schema.len()],
        };
        for ((index, (name, field)), value) in schema.fields().enumerate().zip(supplied) {
            model.values[index] = match value {
                Some(value) => {
                    if validate {
                        field.validate(Some(&value), name)?;
                    }
                    Some(value)
                }
                None => match field.default_value() {
                    Some(default) => Some(default.clone()),
                    None => {
                        field.validate(None, name)?;
                        None
                    }
                },
            };
        }
        Ok(model)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Declared fields and their current values, in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.schema
            .fields()
            .zip(self.values.iter())
            .map(|((name, _), value)| (name, value.as_ref()))
    }

    /// Current value of a field; `None` when absent or not declared
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema
            .position(name)
            .and_then(|index| self.values[index].as_ref())
    }

    /// Like [`Model::get`], but an undeclared name is an error
    pub fn try_get(&self, name: &str) -> Result<Option<&FieldValue>, ValidationError> {
        let index = self
            .schema
            .position(name)
            .ok_or_else(|| unknown_field(&self.schema, name))?;
        Ok(self.values[index].as_ref())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_float)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    pub fn get_array(&self, name: &str) -> Option<&[FieldValue]> {
        self.get(name).and_then(FieldValue::as_array)
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.get(name).and_then(FieldValue::as_model)
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ValidationError> {
        self.set_value(name, Some(value.into()))
    }

    /// Clear a field. A field with a default goes back to its default, so an
    /// instance exported and imported again reads the same. Fails on required
    /// fields without default.
    pub fn unset(&mut self, name: &str) -> Result<(), ValidationError> {
        self.set_value(name, None)
    }

    /// Validated write; `None` clears the field back to its default, if any
    pub fn set_value(
        &mut self,
        name: &str,
        value: Option<FieldValue>,
    ) -> Result<(), ValidationError> {
        let (index, field) = self
            .schema
            .position(name)
            .zip(self.schema.field(name))
            .ok_or_else(|| unknown_field(&self.schema, name))?;
        let value = value.or_else(|| field.default_value().cloned());
        field.validate(value.as_ref(), name)?;
        self.values[index] = value;
        Ok(())
    }

    /// Validate every field, nested models included. Returns the first
    /// violation in declaration order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for ((name, field), value) in self.schema.fields().zip(self.values.iter()) {
            field.validate(value.as_ref(), name)?;
        }
        Ok(())
    }

    /// Export to a plain JSON object. Absent fields are omitted.
    pub fn to_dikt(&self, options: &ExportOptions) -> Result<Value, ValidationError> {
        if options.validate {
            self.validate()?;
        }
        Ok(self.export(options.separator))
    }

    pub(crate) fn export(&self, separator: Option<char>) -> Value {
        let mut object = Map::new();
        for (name, value) in self.fields() {
            if let Some(value) = value {
                object.insert(
                    wire_name(name, separator).into_owned(),
                    value.to_json(separator),
                );
            }
        }
        Value::Object(object)
    }

    /// Build an instance of `schema` from a plain JSON object. Keys the schema
    /// does not declare are ignored.
    pub fn from_dikt(
        schema: &Arc<Schema>,
        value: &Value,
        options: &ImportOptions,
    ) -> Result<Model, ValidationError> {
        let object = value.as_object().ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::TypeMismatch {
                    expected: schema.name().to_string(),
                    actual: json_kind(value),
                },
                Origin::Model(schema.name().to_string()),
                schema.name(),
                Some(FieldValue::Raw(value.clone())),
            )
        })?;

        let model = Self::import(schema, object, options);
        if options.validate {
            model.validate()?;
        }
        Ok(model)
    }

    fn import(schema: &Arc<Schema>, object: &Map<String, Value>, options: &ImportOptions) -> Model {
        let values = schema
            .fields()
            .map(|(name, field)| match object.get(wire_name(name, options.separator).as_ref()) {
                None | Some(Value::Null) => field.default_value().cloned(),
                Some(raw) => Some(convert(raw, &field.data_type(), options)),
            })
            .collect();
        Model {
            schema: schema.clone(),
            values,
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.schema.is_same(&other.schema) && self.values == other.values
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export(None).serialize(serializer)
    }
}

fn convert(raw: &Value, data_type: &DataType, options: &ImportOptions) -> FieldValue {
    match (data_type, raw) {
        (DataType::Object(schema), Value::Object(object)) => {
            FieldValue::Object(Box::new(Model::import(schema, object, options)))
        }
        (DataType::Array(item), Value::Array(items)) => FieldValue::Array(
            items
                .iter()
                .map(|value| convert(value, item, options))
                .collect(),
        ),
        _ => {
            let plain = FieldValue::from_json(raw);
            if options.coerce {
                coerce(plain, data_type)
            } else {
                plain
            }
        }
    }
}

/// Best-effort scalar coercion toward `target`:
///
/// | from    | to    | rule                                      |
/// |---------|-------|-------------------------------------------|
/// | string  | int   | decimal `i64`, surrounding whitespace ok  |
/// | string  | float | `f64` parse                               |
/// | string  | bool  | `true`/`1`, `false`/`0`, case-insensitive |
/// | int     | float | widening                                  |
///
/// Anything else, including a failed parse, returns the value unchanged.
pub fn coerce(value: FieldValue, target: &DataType) -> FieldValue {
    match (target, value) {
        (DataType::Int, FieldValue::Str(s)) => match s.trim().parse::<i64>() {
            Ok(i) => FieldValue::Int(i),
            Err(_) => FieldValue::Str(s),
        },
        (DataType::Float, FieldValue::Str(s)) => match s.trim().parse::<f64>() {
            Ok(f) => FieldValue::Float(f),
            Err(_) => FieldValue::Str(s),
        },
        (DataType::Float, FieldValue::Int(i)) => FieldValue::Float(i as f64),
        (DataType::Bool, FieldValue::Str(s)) => {
            let parsed = match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            };
            match parsed {
                Some(b) => FieldValue::Bool(b),
                None => FieldValue::Str(s),
            }
        }
        (_, value) => value,
    }
}

fn wire_name(name: &str, separator: Option<char>) -> Cow<'_, str> {
    match separator {
        Some(sep) if name.contains('_') => Cow::Owned(
            name.chars()
                .map(|ch| if ch == '_' { sep } else { ch })
                .collect(),
        ),
        _ => Cow::Borrowed(name),
    }
}

fn unknown_field(schema: &Schema, name: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::UnknownField {
            model: schema.name().to_string(),
        },
        Origin::Model(schema.name().to_string()),
        name,
        None,
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

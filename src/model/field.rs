use std::fmt::Display;
use std::sync::Arc;

use regex::Regex;

use super::error::{FieldKind, Origin, SchemaError, ValidationError, ValidationErrorKind};
use super::schema::Schema;
use super::value::{DataType, FieldValue};

/// Settings shared by every field kind
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    pub required: bool,
    pub default: Option<FieldValue>,
    pub description: Option<String>,
}

/// A finalized field: constraints plus options, with its default already
/// accepted by its own rules. Built from one of the `*Field` builders through
/// [`IntoField`].
#[derive(Debug, Clone)]
pub struct Field {
    rules: Rules,
    options: FieldOptions,
}

#[derive(Debug, Clone)]
enum Rules {
    String(StringRules),
    Int(Bounds<i64>),
    Float(Bounds<f64>),
    Bool,
    Array(ArrayRules),
    Object(Arc<Schema>),
}

#[derive(Debug, Clone)]
struct StringRules {
    max_length: Option<usize>,
    min_length: Option<usize>,
    pattern: Option<(String, Regex)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bounds<T> {
    maximum: Option<T>,
    minimum: Option<T>,
    exclusive_maximum: bool,
    exclusive_minimum: bool,
}

#[derive(Debug, Clone)]
struct ArrayRules {
    item: Box<Field>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl Field {
    pub fn data_type(&self) -> DataType {
        match &self.rules {
            Rules::String(_) => DataType::String,
            Rules::Int(_) => DataType::Int,
            Rules::Float(_) => DataType::Float,
            Rules::Bool => DataType::Bool,
            Rules::Array(rules) => DataType::Array(Box::new(rules.item.data_type())),
            Rules::Object(schema) => DataType::Object(schema.clone()),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match &self.rules {
            Rules::String(_) => FieldKind::String,
            Rules::Int(_) => FieldKind::Int,
            Rules::Float(_) => FieldKind::Float,
            Rules::Bool => FieldKind::Bool,
            Rules::Array(_) => FieldKind::Array,
            Rules::Object(_) => FieldKind::Object,
        }
    }

    pub fn is_required(&self) -> bool {
        self.options.required
    }

    pub fn default_value(&self) -> Option<&FieldValue> {
        self.options.default.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.options.description.as_deref()
    }

    /// Item field of an array field
    pub fn item_field(&self) -> Option<&Field> {
        match &self.rules {
            Rules::Array(rules) => Some(&rules.item),
            _ => None,
        }
    }

    /// Check `value`, assigned under `name`, against this field.
    ///
    /// `None` is the absent value: it passes when the field is optional and
    /// fails with `RequiredField` otherwise. No other check looks at an absent
    /// value.
    pub fn validate(
        &self,
        value: Option<&FieldValue>,
        name: &str,
    ) -> Result<(), ValidationError> {
        let value = match value {
            Some(value) => value,
            None if self.options.required => {
                return Err(self.error(ValidationErrorKind::RequiredField, name, None));
            }
            None => return Ok(()),
        };

        let outcome = match (&self.rules, value) {
            (Rules::String(rules), FieldValue::Str(s)) => rules.check(s),
            (Rules::Int(bounds), FieldValue::Int(i)) => bounds.check(*i),
            (Rules::Float(bounds), FieldValue::Float(f)) => bounds.check(*f),
            (Rules::Bool, FieldValue::Bool(_)) => Ok(()),
            (Rules::Array(rules), FieldValue::Array(items)) => {
                return rules.validate(self, items, name, value);
            }
            (Rules::Object(schema), FieldValue::Object(model))
                if model.schema().is_same(schema) =>
            {
                for (field_name, field) in schema.fields() {
                    field
                        .validate(model.get(field_name), field_name)
                        .map_err(|mut err| {
                            err.field = format!("{}.{}", name, err.field);
                            err
                        })?;
                }
                return Ok(());
            }
            _ => Err(ValidationErrorKind::TypeMismatch {
                expected: self.data_type().to_string(),
                actual: value.kind_name(),
            }),
        };

        outcome.map_err(|kind| self.error(kind, name, Some(value.clone())))
    }

    fn error(
        &self,
        kind: ValidationErrorKind,
        name: &str,
        data: Option<FieldValue>,
    ) -> ValidationError {
        ValidationError::new(kind, Origin::Field(self.kind()), name, data)
    }

    fn finish(rules: Rules, options: FieldOptions) -> Result<Field, SchemaError> {
        let field = Field { rules, options };
        if let Some(default) = &field.options.default {
            field
                .validate(Some(default), "default")
                .map_err(SchemaError::InvalidDefault)?;
        }
        Ok(field)
    }
}

impl StringRules {
    fn check(&self, value: &str) -> Result<(), ValidationErrorKind> {
        let length = value.chars().count();
        if let Some(max) = self.max_length {
            if length > max {
                return Err(ValidationErrorKind::StringTooLong { max });
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(ValidationErrorKind::StringTooShort { min });
            }
        }
        if let Some((source, regex)) = &self.pattern {
            if !regex.is_match(value) {
                return Err(ValidationErrorKind::PatternMismatch {
                    pattern: source.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<T: PartialOrd + Copy + Display> Bounds<T> {
    // A bound equal to the value is only accepted when the bound is inclusive.
    // A bound of zero is enforced like any other.
    fn check(&self, value: T) -> Result<(), ValidationErrorKind> {
        if let Some(maximum) = self.maximum {
            if value > maximum || (value == maximum && self.exclusive_maximum) {
                return Err(ValidationErrorKind::NumberMaxExceeded {
                    maximum: maximum.to_string(),
                    exclusive: self.exclusive_maximum,
                });
            }
        }
        if let Some(minimum) = self.minimum {
            if value < minimum || (value == minimum && self.exclusive_minimum) {
                return Err(ValidationErrorKind::NumberMinBelow {
                    minimum: minimum.to_string(),
                    exclusive: self.exclusive_minimum,
                });
            }
        }
        Ok(())
    }
}

impl ArrayRules {
    fn validate(
        &self,
        field: &Field,
        items: &[FieldValue],
        name: &str,
        value: &FieldValue,
    ) -> Result<(), ValidationError> {
        if let Some(min) = self.min_items {
            if items.len() < min {
                return Err(field.error(
                    ValidationErrorKind::ArrayTooFewItems { min },
                    name,
                    Some(value.clone()),
                ));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                return Err(field.error(
                    ValidationErrorKind::ArrayTooManyItems { max },
                    name,
                    Some(value.clone()),
                ));
            }
        }
        let item_type = self.item.data_type();
        for (index, item) in items.iter().enumerate() {
            let item_name = format!("{}[{}]", name, index);
            if !item_type.accepts(item) {
                return Err(self.item.error(
                    ValidationErrorKind::TypeMismatch {
                        expected: item_type.to_string(),
                        actual: item.kind_name(),
                    },
                    &item_name,
                    Some(item.clone()),
                ));
            }
            self.item.validate(Some(item), &item_name)?;
        }
        Ok(())
    }
}

/// Finalize a field builder. Rejects defaults the field would not accept.
pub trait IntoField {
    fn into_field(self) -> Result<Field, SchemaError>;
}

impl IntoField for Field {
    fn into_field(self) -> Result<Field, SchemaError> {
        Ok(self)
    }
}

macro_rules! field_options {
    ($($builder:ty),* $(,)?) => {
        $(
            impl $builder {
                pub fn required(mut self, required: bool) -> Self {
                    self.options.required = required;
                    self
                }

                pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
                    self.options.default = Some(value.into());
                    self
                }

                pub fn description(mut self, description: impl Into<String>) -> Self {
                    self.options.description = Some(description.into());
                    self
                }
            }
        )*
    };
}

field_options!(StringField, IntField, FloatField, BoolField, ArrayField, ObjectField);

#[derive(Debug, Clone, Default)]
pub struct StringField {
    options: FieldOptions,
    max_length: Option<usize>,
    min_length: Option<usize>,
    pattern: Option<String>,
}

impl StringField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Case-sensitive regular expression the whole value must match
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

impl IntoField for StringField {
    fn into_field(self) -> Result<Field, SchemaError> {
        let pattern = match self.pattern {
            Some(source) => {
                let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
                    SchemaError::InvalidPattern {
                        pattern: source.clone(),
                        message: e.to_string(),
                    }
                })?;
                Some((source, regex))
            }
            None => None,
        };
        let rules = StringRules {
            max_length: self.max_length,
            min_length: self.min_length,
            pattern,
        };
        Field::finish(Rules::String(rules), self.options)
    }
}

macro_rules! number_field {
    ($builder:ident, $ty:ty, $variant:ident) => {
        #[derive(Debug, Clone, Default)]
        pub struct $builder {
            options: FieldOptions,
            bounds: Bounds<$ty>,
        }

        impl $builder {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn maximum(mut self, maximum: $ty) -> Self {
                self.bounds.maximum = Some(maximum);
                self
            }

            pub fn minimum(mut self, minimum: $ty) -> Self {
                self.bounds.minimum = Some(minimum);
                self
            }

            pub fn exclusive_maximum(mut self, exclusive: bool) -> Self {
                self.bounds.exclusive_maximum = exclusive;
                self
            }

            pub fn exclusive_minimum(mut self, exclusive: bool) -> Self {
                self.bounds.exclusive_minimum = exclusive;
                self
            }
        }

        impl IntoField for $builder {
            fn into_field(self) -> Result<Field, SchemaError> {
                Field::finish(Rules::$variant(self.bounds), self.options)
            }
        }
    };
}

number_field!(IntField, i64, Int);
number_field!(FloatField, f64, Float);

#[derive(Debug, Clone, Default)]
pub struct BoolField {
    options: FieldOptions,
}

impl BoolField {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntoField for BoolField {
    fn into_field(self) -> Result<Field, SchemaError> {
        Field::finish(Rules::Bool, self.options)
    }
}

/// List of values that each satisfy `item`
#[derive(Debug, Clone)]
pub struct ArrayField {
    options: FieldOptions,
    item: Result<Field, SchemaError>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl ArrayField {
    pub fn of(item: impl IntoField) -> Self {
        Self {
            options: FieldOptions::default(),
            item: item.into_field(),
            min_items: None,
            max_items: None,
        }
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }
}

impl IntoField for ArrayField {
    fn into_field(self) -> Result<Field, SchemaError> {
        let rules = ArrayRules {
            item: Box::new(self.item?),
            min_items: self.min_items,
            max_items: self.max_items,
        };
        Field::finish(Rules::Array(rules), self.options)
    }
}

/// Nested model of a fixed schema
#[derive(Debug, Clone)]
pub struct ObjectField {
    options: FieldOptions,
    schema: Arc<Schema>,
}

impl ObjectField {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            options: FieldOptions::default(),
            schema,
        }
    }
}

impl IntoField for ObjectField {
    fn into_field(self) -> Result<Field, SchemaError> {
        Field::finish(Rules::Object(self.schema), self.options)
    }
}

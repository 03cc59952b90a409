use std::collections::HashMap;
use std::sync::Arc;

use super::error::SchemaError;
use super::field::{Field, IntoField};

/// A model kind: a name and its ordered fields, shared by every instance.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<(String, Field)>,
    positions: HashMap<String, usize>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|index| &self.fields[index].1)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Two handles describe the same model kind. Kinds are compared by
    /// identity; a separately built schema with the same name is a different kind.
    pub fn is_same(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other)
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, Field)>,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    /// Declare the next field. Declaration errors are reported by `build`.
    pub fn field(mut self, name: impl Into<String>, field: impl IntoField) -> Self {
        if self.error.is_some() {
            return self;
        }
        let name = name.into();
        if self.fields.iter().any(|(existing, _)| *existing == name) {
            self.error = Some(SchemaError::DuplicateField {
                model: self.name.clone(),
                field: name,
            });
            return self;
        }
        match field.into_field() {
            Ok(field) => self.fields.push((name, field)),
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let positions = self
            .fields
            .iter()
            .enumerate()
            .map(|(index, (name, _))| (name.clone(), index))
            .collect();
        tracing::debug!("Declared model {} with {} fields", self.name, self.fields.len());
        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            positions,
        }))
    }
}

// Declarative models: fields with validation rules, model kinds (schemas)
// and validated instances that convert to and from plain JSON structures.

pub mod error;
pub mod field;
pub mod instance;
pub mod schema;
pub mod value;

use std::sync::Arc;

pub use error::{FieldKind, Origin, SchemaError, ValidationError, ValidationErrorKind};
pub use field::{
    ArrayField, BoolField, Field, FieldOptions, FloatField, IntField, IntoField, ObjectField,
    StringField,
};
pub use instance::{coerce, ExportOptions, ImportOptions, Model};
pub use schema::{Schema, SchemaBuilder};
pub use value::{DataType, FieldValue};

/// A statically declared model kind, usually produced by [`define_model!`].
pub trait ModelKind {
    fn schema() -> &'static Arc<Schema>;

    fn new<I, K, V>(values: I) -> Result<Model, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        Model::new(Self::schema(), values)
    }

    fn from_dikt(
        value: &serde_json::Value,
        options: &ImportOptions,
    ) -> Result<Model, ValidationError> {
        Model::from_dikt(Self::schema(), value, options)
    }
}

/// Declare a model kind with a process-wide schema.
///
/// ```ignore
/// define_model! {
///     pub User {
///         name: StringField::new().max_length(20),
///         age: IntField::new().minimum(0).maximum(100),
///         tags: ArrayField::of(StringField::new()).max_items(8),
///         home: ObjectField::new(Address::schema().clone()),
///     }
/// }
/// ```
///
/// Field expressions are evaluated inside a closure returning
/// `Result<_, SchemaError>`, so `?` may be used in them. The schema is built
/// on first use; an invalid declaration panics there.
#[macro_export]
macro_rules! define_model {
    ($(#[$meta:meta])* $vis:vis $name:ident { $($field:ident : $spec:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::model::ModelKind for $name {
            fn schema() -> &'static ::std::sync::Arc<$crate::model::Schema> {
                static SCHEMA: $crate::__private::Lazy<::std::sync::Arc<$crate::model::Schema>> =
                    $crate::__private::Lazy::new(|| {
                        #[allow(unused_imports)]
                        use $crate::model::{IntoField as _, ModelKind as _};
                        let declare = || -> ::std::result::Result<
                            ::std::sync::Arc<$crate::model::Schema>,
                            $crate::model::SchemaError,
                        > {
                            $crate::model::Schema::builder(stringify!($name))
                                $(.field(stringify!($field), $spec))*
                                .build()
                        };
                        match declare() {
                            Ok(schema) => schema,
                            Err(err) => panic!("invalid model {}: {}", stringify!($name), err),
                        }
                    });
                &SCHEMA
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::define_model! {
        Address {
            city: StringField::new().required(true),
        }
    }

    crate::define_model! {
        /// A person with an address
        Person {
            name: StringField::new().max_length(20),
            age: IntField::new().minimum(0).maximum(100),
            address: ObjectField::new(Address::schema().clone()),
            scores: ArrayField::of(IntField::new().maximum(10).into_field()?).max_items(3),
        }
    }

    #[test]
    fn declared_models_share_one_schema() {
        assert!(Arc::ptr_eq(Person::schema(), Person::schema()));
        assert_eq!(Person::schema().name(), "Person");
        assert_eq!(Person::schema().len(), 4);
    }

    #[test]
    fn declared_models_build_instances() {
        let address = Address::new([("city", "Raccoon City")]).unwrap();
        let person = Person::new([
            ("name", FieldValue::from("Jill")),
            ("address", FieldValue::from(address)),
            ("scores", FieldValue::from(vec![1, 2])),
        ])
        .unwrap();
        assert_eq!(
            person.to_dikt(&ExportOptions::default()).unwrap(),
            json!({"name": "Jill", "address": {"city": "Raccoon City"}, "scores": [1, 2]})
        );

        let err = Person::from_dikt(
            &json!({"scores": [1, 2, 3, 4]}),
            &ImportOptions::default().validated(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::ArrayTooManyItems { max: 3 });
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::format::{JsonFormat, WireFormat};
use crate::api::{Body, RequestView, Response, ResponseHeaders};
use crate::chain::{Handler, HandlerResult, Next};
use crate::context::ServiceContext;
use crate::error::{RequestPart, SerializationError};
use crate::model::{ExportOptions, ImportOptions, Model, Schema};

/// Validated request models published by the serialization stage.
/// Each part is present only when the stage was given a schema for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    pub headers: Option<Model>,
    pub args: Option<Model>,
    pub data: Option<Model>,
}

/// Parses headers, query arguments and body into models before the inner
/// stages run, and encodes model-valued responses on the way out.
pub struct SerializationStage {
    format: Arc<dyn WireFormat>,
    headers: Option<Arc<Schema>>,
    args: Option<Arc<Schema>>,
    data: Option<Arc<Schema>>,
    coerce_strings: bool,
}

impl SerializationStage {
    pub fn new(format: impl WireFormat + 'static) -> Self {
        Self {
            format: Arc::new(format),
            headers: None,
            args: None,
            data: None,
            coerce_strings: true,
        }
    }

    pub fn json() -> Self {
        Self::new(JsonFormat)
    }

    pub fn headers(mut self, schema: &Arc<Schema>) -> Self {
        self.headers = Some(schema.clone());
        self
    }

    pub fn args(mut self, schema: &Arc<Schema>) -> Self {
        self.args = Some(schema.clone());
        self
    }

    pub fn data(mut self, schema: &Arc<Schema>) -> Self {
        self.data = Some(schema.clone());
        self
    }

    /// Coerce header and query strings toward declared scalar kinds (on by default)
    pub fn coerce_strings(mut self, coerce: bool) -> Self {
        self.coerce_strings = coerce;
        self
    }

    pub fn format(&self) -> &dyn WireFormat {
        self.format.as_ref()
    }

    pub fn parse(&self, request: &RequestView) -> Result<ParsedRequest, SerializationError> {
        self.check_mimetype(request)?;

        let mut parsed = ParsedRequest::default();
        let strings = ImportOptions {
            coerce: self.coerce_strings,
            validate: true,
            ..Default::default()
        };

        if let Some(schema) = &self.headers {
            let headers = string_map(request.headers());
            parsed.headers = Some(
                Model::from_dikt(schema, &headers, &strings.separator('-'))
                    .map_err(|e| SerializationError::invalid_part(RequestPart::Headers, e))?,
            );
        }

        if let Some(schema) = &self.args {
            let args = string_map(request.args());
            parsed.args = Some(
                Model::from_dikt(schema, &args, &strings)
                    .map_err(|e| SerializationError::invalid_part(RequestPart::Query, e))?,
            );
        }

        if let Some(schema) = &self.data {
            let body = self
                .format
                .from_data(request.data())
                .map_err(|e| SerializationError::invalid_part(RequestPart::Body, e))?;
            parsed.data = Some(
                Model::from_dikt(schema, &body, &ImportOptions::default().validated())
                    .map_err(|e| SerializationError::invalid_part(RequestPart::Body, e))?,
            );
        }

        Ok(parsed)
    }

    // Requests that declare no mimetype are accepted unless a body schema is
    // configured.
    fn check_mimetype(&self, request: &RequestView) -> Result<(), SerializationError> {
        let declared = request.mimetype().filter(|mimetype| !mimetype.is_empty());
        if declared.is_none() && self.data.is_none() {
            return Ok(());
        }
        let expected = self.format.mimetype();
        match declared {
            Some(mimetype) if mimetype.eq_ignore_ascii_case(expected) => Ok(()),
            other => Err(SerializationError::unsupported_mimetype(other, expected)),
        }
    }
}

impl Handler for SerializationStage {
    fn name(&self) -> &'static str {
        "serialization"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        let request = ctx.require::<RequestView>()?;
        let parsed = self.parse(&request)?;
        ctx.insert(parsed);

        match next.run(ctx)? {
            Some(response) => Ok(Some(encode_response(response, self.format.as_ref())?)),
            None => Ok(None),
        }
    }
}

/// Encode model-valued headers and body. A model body replaces the mimetype
/// with the format's. Failures here are server faults and carry no response.
pub fn encode_response(
    mut response: Response,
    format: &dyn WireFormat,
) -> Result<Response, SerializationError> {
    if let ResponseHeaders::Model(model) = &response.headers {
        let dikt = model
            .to_dikt(&ExportOptions::default().separator('-').validated())
            .map_err(|e| SerializationError::new(format!("Invalid response headers: {}", e)))?;
        response.headers = ResponseHeaders::Map(header_map(dikt));
    }

    if let Body::Model(model) = &response.data {
        let dikt = model
            .to_dikt(&ExportOptions::default().validated())
            .map_err(|e| SerializationError::new(format!("Invalid response body: {}", e)))?;
        let raw = format.to_data(&dikt)?;
        response.data = if format.is_binary() {
            Body::Bytes(raw)
        } else {
            Body::Text(String::from_utf8(raw).map_err(|e| {
                SerializationError::new(format!("Encoded body is not text: {}", e))
            })?)
        };
        response.mimetype = Some(format.mimetype().to_string());
    }

    Ok(response)
}

fn string_map(source: &BTreeMap<String, String>) -> Value {
    Value::Object(
        source
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}

fn header_map(dikt: Value) -> BTreeMap<String, String> {
    match dikt {
        Value::Object(object) => object
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(text) => (key, text),
                other => (key, other.to_string()),
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

use std::collections::BTreeMap;

use serde_json::json;

use crate::model::Model;

/// Response headers: a plain map, or a model serialized on the way out
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseHeaders {
    Map(BTreeMap<String, String>),
    Model(Model),
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        ResponseHeaders::Map(BTreeMap::new())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Model(Model),
}

/// Outbound response value produced by the handler chain
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub mimetype: Option<String>,
    pub data: Body,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: ResponseHeaders::default(),
            mimetype: None,
            data: Body::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            mimetype: Some("text/plain".to_string()),
            data: Body::Text(text.into()),
            ..Self::new(status)
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            mimetype: Some("application/json".to_string()),
            data: Body::Text(value.to_string()),
            ..Self::new(status)
        }
    }

    /// Model body, encoded by the serialization stage
    pub fn model(status: u16, model: Model) -> Self {
        Self {
            data: Body::Model(model),
            ..Self::new(status)
        }
    }

    /// Canned failure response: `{"error": true, "message": ..., "code": ...}`
    pub fn error(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &json!({
                "error": true,
                "message": message.into(),
                "code": code,
            }),
        )
    }

    /// Add a header to a map-valued header set. Model-valued headers are left
    /// untouched.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name: String = name.into();
        match &mut self.headers {
            ResponseHeaders::Map(map) => {
                map.insert(name, value.into());
            }
            ResponseHeaders::Model(model) => {
                tracing::warn!(
                    "Ignoring header {} on response with model headers ({})",
                    name,
                    model.schema().name()
                );
            }
        }
        self
    }

    pub fn with_model_headers(mut self, headers: Model) -> Self {
        self.headers = ResponseHeaders::Model(headers);
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Header value from a map-valued header set (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        match &self.headers {
            ResponseHeaders::Map(map) => map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            ResponseHeaders::Model(_) => None,
        }
    }

    /// Encoded body bytes; `None` while the body is still a model
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            Body::Empty => Some(&[]),
            Body::Text(text) => Some(text.as_bytes()),
            Body::Bytes(bytes) => Some(bytes),
            Body::Model(_) => None,
        }
    }

    /// Body parsed as JSON, for inspecting canned and encoded responses
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body_bytes()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_error_shape() {
        let response = Response::error(401, "UNAUTHORIZED", "Missing Authorization header")
            .with_header("WWW-Authenticate", "Bearer");
        assert_eq!(response.status, 401);
        assert_eq!(response.mimetype.as_deref(), Some("application/json"));
        assert_eq!(response.header("www-authenticate"), Some("Bearer"));
        assert_eq!(
            response.json_body(),
            Some(json!({
                "error": true,
                "message": "Missing Authorization header",
                "code": "UNAUTHORIZED"
            }))
        );
    }
}

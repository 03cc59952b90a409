// Service error taxonomy. Protocol-level failures carry the response the
// outer boundary should send; anything else is treated as a server fault.

use std::fmt;

use thiserror::Error;

use crate::api::Response;
use crate::model::ValidationError;

/// Part of an inbound request parsed by the serialization stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Headers,
    Query,
    Body,
}

impl fmt::Display for RequestPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPart::Headers => "headers",
            RequestPart::Query => "query",
            RequestPart::Body => "body",
        };
        f.write_str(name)
    }
}

/// Conversion between wire bytes and models failed
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SerializationError {
    pub message: String,
    pub part: Option<RequestPart>,
    pub response: Option<Response>,
}

impl SerializationError {
    /// Server-side fault: no canned response
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            part: None,
            response: None,
        }
    }

    pub fn unsupported_mimetype(actual: Option<&str>, expected: &str) -> Self {
        let message = format!(
            "Unsupported content type '{}', expected '{}'",
            actual.unwrap_or(""),
            expected
        );
        Self {
            response: Some(Response::error(415, "UNSUPPORTED_MEDIA_TYPE", message.clone())),
            message,
            part: None,
        }
    }

    pub fn invalid_part(part: RequestPart, detail: impl fmt::Display) -> Self {
        let message = format!("Invalid request {}: {}", part, detail);
        Self {
            response: Some(Response::error(400, "VALIDATION_ERROR", message.clone())),
            message,
            part: Some(part),
        }
    }
}

/// Credential extraction or validation failed. Always carries its response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthenticationError {
    pub message: String,
    pub response: Response,
}

impl AuthenticationError {
    /// 401 with a `WWW-Authenticate` challenge
    pub fn unauthorized(message: impl Into<String>, challenge: &str) -> Self {
        let message = message.into();
        Self {
            response: Response::error(401, "UNAUTHORIZED", message.clone())
                .with_header("WWW-Authenticate", challenge),
            message,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            response: Response::error(403, "FORBIDDEN", message.clone()),
            message,
        }
    }
}

/// Transport-level precondition failed before business logic ran
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FoundationError {
    pub message: String,
    pub response: Response,
}

impl FoundationError {
    pub fn request_too_large(length: u64, maximum: u64) -> Self {
        let message = format!(
            "Request body of {} bytes exceeds the limit of {} bytes",
            length, maximum
        );
        Self {
            response: Response::error(413, "PAYLOAD_TOO_LARGE", message.clone()),
            message,
        }
    }
}

/// A context proxy was dereferenced without a usable per-request context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("no service context is installed on this thread")]
    NotInstalled,

    #[error("service context has no {what}")]
    Missing { what: &'static str },
}

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Foundation(#[from] FoundationError),

    #[error(transparent)]
    Context(#[from] ContextError),

    /// Deliberate protocol failure raised by business logic
    #[error("request rejected with status {}", .0.status)]
    Rejected(Box<Response>),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl ServiceError {
    pub fn handler(message: impl Into<String>) -> Self {
        ServiceError::Handler(message.into())
    }

    pub fn rejected(response: Response) -> Self {
        ServiceError::Rejected(Box::new(response))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::rejected(Response::error(400, "BAD_REQUEST", message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::rejected(Response::error(404, "NOT_FOUND", message))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::rejected(Response::error(409, "CONFLICT", message))
    }

    /// The response attached where the error was raised, if any
    pub fn response(&self) -> Option<&Response> {
        match self {
            ServiceError::Serialization(err) => err.response.as_ref(),
            ServiceError::Authentication(err) => Some(&err.response),
            ServiceError::Foundation(err) => Some(&err.response),
            ServiceError::Rejected(response) => Some(response),
            ServiceError::Validation(_)
            | ServiceError::Context(_)
            | ServiceError::Handler(_) => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.response().map(|response| response.status).unwrap_or(500)
    }

    /// Attached response, or a generic 500 for server faults
    pub fn into_response(self) -> Response {
        match self {
            ServiceError::Serialization(SerializationError {
                response: Some(response),
                ..
            }) => response,
            ServiceError::Authentication(err) => err.response,
            ServiceError::Foundation(err) => err.response,
            ServiceError::Rejected(response) => *response,
            other => {
                tracing::error!("Unhandled service error: {}", other);
                Response::error(
                    500,
                    "INTERNAL_SERVER_ERROR",
                    "An error occurred while processing your request",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldKind, Origin, ValidationErrorKind};

    #[test]
    fn protocol_errors_keep_their_response() {
        let err = ServiceError::from(AuthenticationError::unauthorized("Missing token", "Bearer"));
        assert_eq!(err.status_code(), 401);
        let response = err.into_response();
        assert_eq!(response.header("WWW-Authenticate"), Some("Bearer"));

        let err = ServiceError::from(FoundationError::request_too_large(2048, 1024));
        assert_eq!(err.into_response().status, 413);

        let err =
            ServiceError::from(SerializationError::invalid_part(RequestPart::Query, "bad page"));
        let body = err.into_response().json_body().unwrap();
        assert_eq!(body["message"], "Invalid request query: bad page");
    }

    #[test]
    fn unattached_errors_become_server_faults() {
        let validation = ValidationError::new(
            ValidationErrorKind::RequiredField,
            Origin::Field(FieldKind::String),
            "name",
            None,
        );
        let err = ServiceError::from(validation);
        assert!(err.response().is_none());
        assert_eq!(err.into_response().status, 500);

        let err = ServiceError::from(SerializationError::new("encode failed"));
        assert_eq!(err.status_code(), 500);

        let err = ServiceError::from(ContextError::NotInstalled);
        assert_eq!(err.into_response().status, 500);
    }
}

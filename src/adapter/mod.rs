// axum adapter: routes every endpoint of a `Service`, turns axum requests
// into `RequestView`s and runs each dispatch on a blocking thread, since the
// current context is thread-local.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body as HttpBody},
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use http_body_util::LengthLimitError;

use crate::api::{Body, RequestView, Response, ResponseHeaders};
use crate::config;
use crate::error::FoundationError;
use crate::serialization::{encode_response, JsonFormat};
use crate::service::{Endpoint, Service};

/// Router for `service`, reading bodies up to `api.max_request_size_bytes`
pub fn router(service: Arc<Service>) -> Router {
    let limit = usize::try_from(config::config().api.max_request_size_bytes).unwrap_or(usize::MAX);
    router_with_body_limit(service, limit)
}

pub fn router_with_body_limit(service: Arc<Service>, body_limit: usize) -> Router {
    let mut routes: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for endpoint in service.endpoints() {
        let filter = match MethodFilter::try_from(endpoint.method().clone()) {
            Ok(filter) => filter,
            Err(_) => {
                tracing::warn!(
                    "Skipping endpoint '{}': method {} cannot be routed",
                    endpoint.name(),
                    endpoint.method()
                );
                continue;
            }
        };

        let service = service.clone();
        let target = endpoint.clone();
        let handler = move |request: Request| handle(service, target, request, body_limit);

        let method_router = routes
            .remove(endpoint.rule())
            .unwrap_or_else(MethodRouter::new);
        routes.insert(endpoint.rule().to_string(), method_router.on(filter, handler));
    }

    routes
        .into_iter()
        .fold(Router::new(), |router, (rule, method_router)| {
            router.route(&rule, method_router)
        })
}

impl Service {
    pub fn into_router(self) -> Router {
        router(Arc::new(self))
    }
}

async fn handle(
    service: Arc<Service>,
    endpoint: Arc<Endpoint>,
    request: Request,
    body_limit: usize,
) -> HttpResponse {
    let view = match request_view(request, body_limit).await {
        Ok(view) => view,
        Err(response) => return response.into_response(),
    };

    let name = endpoint.name().to_string();
    match tokio::task::spawn_blocking(move || service.dispatch(&endpoint, view)).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!("Dispatch of '{}' did not complete: {}", name, e);
            internal_error().into_response()
        }
    }
}

/// Buffer the body and flatten the request into a [`RequestView`]
pub async fn request_view(request: Request, body_limit: usize) -> Result<RequestView, Response> {
    let (parts, body) = request.into_parts();

    let declared = parts
        .headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let bytes = to_bytes(body, body_limit).await.map_err(|e| {
        tracing::warn!("Failed to read request body for {}: {}", parts.uri, e);
        body_read_failure(e, declared, body_limit)
    })?;

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut builder = RequestView::builder(url);
    for (name, value) in header_pairs(&parts.headers) {
        builder = builder.header(name, value);
    }
    Ok(builder.body(bytes.to_vec()).build())
}

/// Only an exceeded limit is the client's oversized payload; any other read
/// failure is reported as a bad request.
fn body_read_failure(err: axum::Error, declared: Option<u64>, body_limit: usize) -> Response {
    if err.into_inner().is::<LengthLimitError>() {
        let limit = body_limit as u64;
        FoundationError::request_too_large(declared.unwrap_or(limit), limit).response
    } else {
        Response::error(400, "BAD_REQUEST", "Failed to read request body")
    }
}

// Repeated headers are joined with ", "; values that are not valid text are dropped.
fn header_pairs(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            tracing::debug!("Dropping non-text header {}", name);
            continue;
        };
        pairs
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    pairs
}

fn internal_error() -> Response {
    Response::error(
        500,
        "INTERNAL_SERVER_ERROR",
        "An error occurred while processing your request",
    )
}

impl IntoResponse for Response {
    fn into_response(self) -> HttpResponse {
        // Chains without a serialization stage may still return models
        let needs_encoding = matches!(self.data, Body::Model(_))
            || matches!(self.headers, ResponseHeaders::Model(_));
        let response = if needs_encoding {
            match encode_response(self, &JsonFormat) {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Failed to encode response: {}", e);
                    internal_error()
                }
            }
        } else {
            self
        };

        let status =
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = axum::http::Response::builder().status(status);
        if let Some(mimetype) = &response.mimetype {
            builder = builder.header(CONTENT_TYPE, mimetype.as_str());
        }
        if let ResponseHeaders::Map(headers) = &response.headers {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let body = match response.data {
            Body::Empty | Body::Model(_) => HttpBody::empty(),
            Body::Text(text) => HttpBody::from(text),
            Body::Bytes(bytes) => HttpBody::from(bytes),
        };

        builder.body(body).unwrap_or_else(|e| {
            tracing::error!("Failed to build HTTP response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flattens_axum_requests() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/users?dry_run=true")
            .header("Content-Type", "application/json")
            .header("X-Tag", "a")
            .header("X-Tag", "b")
            .body(HttpBody::from("{\"name\":\"Ada\"}"))
            .unwrap();

        let view = request_view(request, 1024).await.unwrap();
        assert_eq!(view.path(), "/users");
        assert_eq!(view.arg("dry_run"), Some("true"));
        assert_eq!(view.mimetype(), Some("application/json"));
        assert_eq!(view.header("x-tag"), Some("a, b"));
        assert_eq!(view.text(), "{\"name\":\"Ada\"}");
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused_while_reading() {
        let request = axum::http::Request::builder()
            .uri("/upload")
            .body(HttpBody::from(vec![b'x'; 64]))
            .unwrap();
        let response = request_view(request, 16).await.unwrap_err();
        assert_eq!(response.status, 413);
    }

    #[test]
    fn interrupted_bodies_are_bad_requests() {
        let err = axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        ));
        let response = body_read_failure(err, Some(10), 1024);
        assert_eq!(response.status, 400);
        assert_eq!(response.json_body().unwrap()["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn converts_responses() {
        let response = Response::error(401, "UNAUTHORIZED", "nope")
            .with_header("WWW-Authenticate", "Bearer")
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "nope");
    }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData};
use serde_json::{json, Value};
use tower::ServiceExt;

use servekit::context::PARSED_REQUEST;
use servekit::model::{ArrayField, IntField, ModelKind, ObjectField, StringField};
use servekit::serialization::SerializationStage;
use servekit::stages::{
    AuthenticationStage, BearerHeaderExtractor, FoundationStage, JwtValidator, LoggingStage,
    TracingStage,
};
use servekit::testing::mint_token;
use servekit::{handler_fn, Chain, Endpoint, RequestView, Response, Service, ServiceError};

pub const SECRET: &str = "integration-secret";
pub const MAX_CONTENT_LENGTH: u64 = 1024;

servekit::define_model! {
    pub Address {
        city: StringField::new().required(true),
    }
}

servekit::define_model! {
    pub Profile {
        name: StringField::new().required(true).max_length(20),
        address: ObjectField::new(Address::schema().clone()),
        scores: ArrayField::of(IntField::new().maximum(10)).min_items(1),
    }
}

servekit::define_model! {
    pub Paging {
        page: IntField::new().minimum(1).with_default(1),
    }
}

servekit::define_model! {
    pub PageHeaders {
        x_page: IntField::new().required(true),
    }
}

/// A service with one fully staged endpoint and a couple of bare ones
pub struct Fixture {
    pub service: Arc<Service>,
    pub calls: Arc<AtomicUsize>,
    pub spans: InMemorySpanExporter,
}

impl Fixture {
    pub fn new() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let spans = InMemorySpanExporter::default();

        let counter = calls.clone();
        let create_profile = Chain::builder()
            .handler(handler_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                let parsed = PARSED_REQUEST.get()?;
                let profile = parsed
                    .data
                    .clone()
                    .ok_or_else(|| ServiceError::bad_request("Missing profile"))?;
                let page = parsed
                    .args
                    .as_ref()
                    .and_then(|args| args.get_int("page"))
                    .unwrap_or(1);
                let headers = PageHeaders::new([("x_page", page)])?;
                Ok(Response::model(201, profile).with_model_headers(headers))
            }))
            .serialization(
                SerializationStage::json()
                    .data(Profile::schema())
                    .args(Paging::schema()),
            )
            .tracing(
                TracingStage::new("profiles")
                    .exporter(spans.clone())
                    .attribute("suite", "integration"),
            )
            .logging(LoggingStage::new("profiles::access"))
            .authentication(AuthenticationStage::new(
                BearerHeaderExtractor,
                JwtValidator::hs256(SECRET),
            ))
            .foundation(FoundationStage::new(MAX_CONTENT_LENGTH))
            .build()
            .expect("profile chain");

        let health = Chain::builder()
            .handler(handler_fn(|_| Ok(Response::json(200, &json!({"status": "ok"})))))
            .build()
            .expect("health chain");

        let silent = Chain::builder()
            .handler(handler_fn(|_| Ok(None::<Response>)))
            .build()
            .expect("silent chain");

        let service = Service::new("integration")
            .endpoint(
                Endpoint::post("profile.create", "/profiles", create_profile)
                    .extra("team", "identity"),
            )
            .and_then(|s| s.endpoint(Endpoint::get("health", "/health", health)))
            .and_then(|s| s.endpoint(Endpoint::get("silent", "/silent", silent)))
            .expect("service");

        Self {
            service: Arc::new(service),
            calls,
            spans,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Dispatch synchronously on the current thread
    pub fn dispatch(&self, name: &str, request: RequestView) -> Response {
        let endpoint = self.service.find(name).expect("endpoint").clone();
        self.service.dispatch(&endpoint, request)
    }

    /// Spans finished so far
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().expect("finished spans")
    }

    pub fn router(&self) -> Router {
        servekit::adapter::router(self.service.clone())
    }
}

pub fn token(subject: &str) -> String {
    mint_token(SECRET, subject, 300).expect("token")
}

pub fn profile_body() -> Value {
    json!({
        "name": "Leon",
        "address": {"city": "Raccoon City"},
        "scores": [1, 2],
    })
}

/// Send one request through the router and decode the JSON body (null when empty)
pub async fn send(
    router: Router,
    request: Request<Body>,
) -> Result<(StatusCode, HeaderMap, Value)> {
    let response = router.oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, headers, body))
}

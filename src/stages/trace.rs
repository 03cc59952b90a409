use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{
    Span as _, SpanContext, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, Key, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, SpanExporter, TracerProviderBuilder};
use opentelemetry_sdk::Resource;
use serde_json::Value;
use thiserror::Error;

use crate::api::RequestView;
use crate::chain::{Handler, HandlerResult, Next};
use crate::config;
use crate::context::ServiceContext;
use crate::error::ServiceError;
use crate::service::Endpoint;

const INSTRUMENTATION_NAME: &str = "servekit";

/// Span context of the request span, published for inner stages
#[derive(Debug, Clone, PartialEq)]
pub struct TraceContext {
    span_context: SpanContext,
}

impl TraceContext {
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    pub fn trace_id(&self) -> String {
        self.span_context.trace_id().to_string()
    }

    pub fn span_id(&self) -> String {
        self.span_context.span_id().to_string()
    }

    pub fn is_sampled(&self) -> bool {
        self.span_context.is_sampled()
    }

    /// `tracestate` header value, empty when the caller sent none
    pub fn trace_state(&self) -> String {
        self.span_context.trace_state().header()
    }

    /// `traceparent` header value for outgoing calls
    pub fn traceparent(&self) -> String {
        let cx = Context::new().with_remote_span_context(self.span_context.clone());
        let mut carrier = HashMap::new();
        TraceContextPropagator::new().inject_context(&cx, &mut carrier);
        carrier.remove("traceparent").unwrap_or_default()
    }
}

impl From<SpanContext> for TraceContext {
    fn from(span_context: SpanContext) -> Self {
        Self { span_context }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceContextError {
    #[error("request carries no trace context")]
    Missing,

    #[error("malformed traceparent '{0}'")]
    Malformed(String),
}

/// Reads the caller's trace context off a request
pub trait TraceContextExtractor: Send + Sync {
    fn extract(&self, request: &RequestView) -> Result<Context, TraceContextError>;
}

struct RequestHeaders<'a>(&'a RequestView);

impl Extractor for RequestHeaders<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.header(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.headers().keys().map(String::as_str).collect()
    }
}

/// `traceparent` / `tracestate` headers
#[derive(Debug, Default)]
pub struct W3cTraceContextExtractor {
    propagator: TraceContextPropagator,
}

impl W3cTraceContextExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceContextExtractor for W3cTraceContextExtractor {
    fn extract(&self, request: &RequestView) -> Result<Context, TraceContextError> {
        let traceparent = request
            .header("traceparent")
            .ok_or(TraceContextError::Missing)?;
        let cx = self.propagator.extract(&RequestHeaders(request));
        if cx.span().span_context().is_valid() {
            Ok(cx)
        } else {
            Err(TraceContextError::Malformed(traceparent.to_string()))
        }
    }
}

fn provider_builder(service_name: &str) -> TracerProviderBuilder {
    SdkTracerProvider::builder().with_resource(
        Resource::builder()
            .with_service_name(service_name.to_string())
            .build(),
    )
}

/// Wraps the inner stages in a server span, continuing the caller's trace
/// when propagation is on. Finished spans go to the configured exporter and
/// are also logged.
pub struct TracingStage {
    service_name: String,
    extractor: Arc<dyn TraceContextExtractor>,
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    propagate: bool,
    quiet: bool,
    attributes: Vec<KeyValue>,
}

impl TracingStage {
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let provider = provider_builder(&service_name).build();
        let tracer = provider.tracer(INSTRUMENTATION_NAME);
        Self {
            service_name,
            extractor: Arc::new(W3cTraceContextExtractor::new()),
            provider,
            tracer,
            propagate: true,
            quiet: true,
            attributes: Vec::new(),
        }
    }

    pub fn from_config() -> Self {
        let tracing = &config::config().tracing;
        Self::new(tracing.service_name.clone())
            .propagate(tracing.propagate)
            .quiet(tracing.quiet_extraction)
    }

    pub fn extractor(mut self, extractor: impl TraceContextExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Export each finished span as soon as it ends
    pub fn exporter(mut self, exporter: impl SpanExporter + 'static) -> Self {
        self.provider = provider_builder(&self.service_name)
            .with_simple_exporter(exporter)
            .build();
        self.tracer = self.provider.tracer(INSTRUMENTATION_NAME);
        self
    }

    /// Continue trace contexts sent by the caller
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate = propagate;
        self
    }

    /// Start a fresh trace instead of failing when the caller's context is malformed
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Attribute recorded on every span
    pub fn attribute(
        mut self,
        key: impl Into<Key>,
        value: impl Into<opentelemetry::Value>,
    ) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    fn parent(&self, request: &RequestView) -> Result<Context, ServiceError> {
        if !self.propagate {
            return Ok(Context::new());
        }
        match self.extractor.extract(request) {
            Ok(parent) => Ok(parent),
            Err(TraceContextError::Missing) => Ok(Context::new()),
            Err(err) if self.quiet => {
                tracing::warn!("Ignoring trace context on {}: {}", request.path(), err);
                Ok(Context::new())
            }
            Err(err) => Err(ServiceError::bad_request(format!("Invalid trace context: {}", err))),
        }
    }

    fn span_attributes(&self, endpoint: Option<&Endpoint>) -> Vec<KeyValue> {
        let mut attributes = self.attributes.clone();
        attributes.push(KeyValue::new("service.name", self.service_name.clone()));
        if let Some(endpoint) = endpoint {
            attributes.push(KeyValue::new("endpoint.name", endpoint.name().to_string()));
            attributes.push(KeyValue::new("endpoint.rule", endpoint.rule().to_string()));
            attributes.push(KeyValue::new("http.method", endpoint.method().as_str().to_string()));
            for (key, value) in endpoint.extras() {
                attributes.push(json_attribute(format!("endpoint.extras.{}", key), value));
            }
        }
        attributes
    }
}

fn json_attribute(key: String, value: &Value) -> KeyValue {
    match value {
        Value::Bool(b) => KeyValue::new(key, *b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => KeyValue::new(key, i),
            None => KeyValue::new(key, n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => KeyValue::new(key, s.clone()),
        other => KeyValue::new(key, other.to_string()),
    }
}

impl Handler for TracingStage {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        let request = ctx.require::<RequestView>()?;
        let parent = self.parent(&request)?;

        let endpoint = ctx.get::<Arc<Endpoint>>();
        let name = endpoint
            .as_ref()
            .map(|endpoint| endpoint.name().to_string())
            .unwrap_or_else(|| request.path().to_string());

        let mut span = self
            .tracer
            .span_builder(name.clone())
            .with_kind(SpanKind::Server)
            .with_attributes(self.span_attributes(endpoint.as_deref().map(|e| e.as_ref())))
            .start_with_context(&self.tracer, &parent);
        let trace = TraceContext::from(span.span_context().clone());
        ctx.insert(trace.clone());

        let log_span = tracing::info_span!(
            "request",
            service = %self.service_name,
            endpoint = %name,
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
        );
        let started = std::time::Instant::now();
        let result = log_span.in_scope(|| next.run(ctx));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                if let Some(response) = response {
                    span.set_attribute(KeyValue::new(
                        "http.status_code",
                        i64::from(response.status),
                    ));
                }
                span.set_status(Status::Ok);
                tracing::info!(
                    trace_id = %trace.trace_id(),
                    span_id = %trace.span_id(),
                    elapsed_ms,
                    "span {} finished",
                    name
                );
            }
            Err(err) => {
                span.set_attribute(KeyValue::new("http.status_code", i64::from(err.status_code())));
                span.set_status(Status::error(err.to_string()));
                tracing::warn!(
                    trace_id = %trace.trace_id(),
                    span_id = %trace.span_id(),
                    elapsed_ms,
                    error = %err,
                    "span {} failed",
                    name
                );
            }
        }
        span.end();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Response;
    use crate::chain::{handler_fn, Chain};
    use crate::testing::{span_attribute, LogCapture};
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn run(
        stage: TracingStage,
        request: RequestView,
        fail: bool,
    ) -> (HandlerResult, ServiceContext) {
        let chain = Chain::builder()
            .tracing(stage)
            .handler(handler_fn(move |ctx: &ServiceContext| {
                // the published context is visible to inner stages
                ctx.require::<TraceContext>()?;
                if fail {
                    Err(ServiceError::handler("boom"))
                } else {
                    Ok(Response::ok())
                }
            }))
            .build()
            .unwrap();
        let ctx = ServiceContext::new();
        ctx.insert(request);
        (chain.run(&ctx), ctx)
    }

    #[test]
    fn extracts_traceparent_headers() {
        let extractor = W3cTraceContextExtractor::new();
        let request = RequestView::builder("/").header("TraceParent", PARENT).build();
        let cx = extractor.extract(&request).unwrap();
        let parent = TraceContext::from(cx.span().span_context().clone());
        assert_eq!(parent.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parent.span_id(), "00f067aa0ba902b7");
        assert!(parent.is_sampled());
        assert_eq!(parent.traceparent(), PARENT);

        let missing = extractor.extract(&RequestView::builder("/").build());
        assert!(matches!(missing, Err(TraceContextError::Missing)));

        for bad in [
            "",
            "garbage",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
        ] {
            let request = RequestView::builder("/").header("traceparent", bad).build();
            assert!(
                matches!(extractor.extract(&request), Err(TraceContextError::Malformed(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn continues_the_callers_trace() {
        let exporter = InMemorySpanExporter::default();
        let request = RequestView::builder("/orders")
            .header("traceparent", PARENT)
            .header("tracestate", "vendor=abc")
            .build();
        let stage = TracingStage::new("orders")
            .exporter(exporter.clone())
            .attribute("deployment", "test");
        let (result, ctx) = run(stage, request, false);
        assert!(result.is_ok());

        let trace = ctx.require::<TraceContext>().unwrap();
        assert_eq!(trace.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_ne!(trace.span_id(), "00f067aa0ba902b7");
        assert_eq!(trace.trace_state(), "vendor=abc");

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "/orders");
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(span.parent_span_id.to_string(), "00f067aa0ba902b7");
        assert_eq!(span.status, Status::Ok);
        assert_eq!(span_attribute(span, "service.name"), Some("orders".into()));
        assert_eq!(span_attribute(span, "deployment"), Some("test".into()));
        assert_eq!(span_attribute(span, "http.status_code"), Some(200i64.into()));
    }

    #[test]
    fn starts_a_root_trace_without_propagation() {
        let exporter = InMemorySpanExporter::default();
        let request = RequestView::builder("/").header("traceparent", PARENT).build();
        let stage = TracingStage::new("svc").propagate(false).exporter(exporter.clone());
        let (_, ctx) = run(stage, request, false);

        let trace = ctx.require::<TraceContext>().unwrap();
        assert_ne!(trace.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(trace.trace_id().len(), 32);
        assert_eq!(trace.span_id().len(), 16);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].parent_span_id, opentelemetry::trace::SpanId::INVALID);
    }

    #[test]
    fn ends_the_span_when_the_inner_stage_fails() {
        let exporter = InMemorySpanExporter::default();
        let stage = TracingStage::new("svc").exporter(exporter.clone());
        let (result, _) = run(stage, RequestView::builder("/").build(), true);

        assert!(matches!(result, Err(ServiceError::Handler(_))));
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error("handler failed: boom"));
        assert_eq!(span_attribute(&spans[0], "http.status_code"), Some(500i64.into()));
    }

    #[test]
    fn malformed_context_is_quiet_or_rejected() {
        let request = || RequestView::builder("/").header("traceparent", "garbage").build();

        let logs = LogCapture::new();
        let exporter = InMemorySpanExporter::default();
        let (result, _) = logs.capture(|| {
            run(TracingStage::new("svc").exporter(exporter.clone()), request(), false)
        });
        assert!(result.is_ok());
        assert_eq!(logs.matching("Ignoring trace context").len(), 1);
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].parent_span_id, opentelemetry::trace::SpanId::INVALID);

        let exporter = InMemorySpanExporter::default();
        let stage = TracingStage::new("svc").quiet(false).exporter(exporter.clone());
        let (result, ctx) = run(stage, request(), false);
        assert_eq!(result.unwrap_err().status_code(), 400);
        assert!(!ctx.contains::<TraceContext>());
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn finished_spans_are_logged() {
        let logs = LogCapture::new();
        let stage = TracingStage::new("svc");
        logs.capture(|| run(stage, RequestView::builder("/ping").build(), false));
        let lines = logs.matching("span /ping finished");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("trace_id="));
    }
}

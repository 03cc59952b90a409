mod common;

use opentelemetry::trace::Status;
use serde_json::json;

use common::{profile_body, token, Fixture, MAX_CONTENT_LENGTH};
use servekit::context::{REQUEST, SERVICE_CONTEXT};
use servekit::error::ContextError;
use servekit::testing::{span_attribute, LogCapture};
use servekit::RequestView;

fn profile_request(url: &str, bearer: Option<String>) -> RequestView {
    let mut builder = RequestView::builder(url).json(&profile_body());
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.build()
}

#[test]
fn full_chain_round_trip() {
    let fixture = Fixture::new();
    let logs = LogCapture::new();

    let response = logs.capture(|| {
        fixture.dispatch("profile.create", profile_request("/profiles?page=3", Some(token("leon"))))
    });

    assert_eq!(response.status, 201);
    assert_eq!(response.mimetype.as_deref(), Some("application/json"));
    assert_eq!(response.header("x-page"), Some("3"));
    assert_eq!(response.json_body(), Some(profile_body()));
    assert_eq!(fixture.calls(), 1);

    assert_eq!(logs.matching("entering").len(), 1);
    assert_eq!(logs.matching("exiting").len(), 1);
    assert!(logs.matching("exiting")[0].contains("endpoint=profile.create"));

    let spans = fixture.finished_spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "profile.create");
    assert_eq!(span.status, Status::Ok);
    assert_eq!(span_attribute(span, "endpoint.rule"), Some("/profiles".into()));
    assert_eq!(span_attribute(span, "endpoint.extras.team"), Some("identity".into()));
    assert_eq!(span_attribute(span, "suite"), Some("integration".into()));
    assert_eq!(span_attribute(span, "http.status_code"), Some(201i64.into()));
}

#[test]
fn rejected_credential_short_circuits_inner_stages() {
    let fixture = Fixture::new();
    let logs = LogCapture::new();

    let forged = servekit::testing::mint_token("not-the-secret", "leon", 300).unwrap();
    let response = logs.capture(|| {
        fixture.dispatch("profile.create", profile_request("/profiles", Some(forged)))
    });

    assert_eq!(response.status, 403);
    assert_eq!(response.json_body().unwrap()["code"], "FORBIDDEN");
    assert_eq!(fixture.calls(), 0);
    assert!(logs.matching("entering").is_empty());
    assert!(logs.matching("exiting").is_empty());
    assert_eq!(logs.matching("Credential rejected").len(), 1);
    assert!(fixture.finished_spans().is_empty());
}

#[test]
fn missing_credential_is_challenged() {
    let fixture = Fixture::new();
    let response = fixture.dispatch("profile.create", profile_request("/profiles", None));

    assert_eq!(response.status, 401);
    assert_eq!(response.header("WWW-Authenticate"), Some("Bearer"));
    assert_eq!(fixture.calls(), 0);
}

#[test]
fn oversized_requests_stop_at_the_foundation() {
    let fixture = Fixture::new();
    let request = RequestView::builder("/profiles")
        .header("Authorization", format!("Bearer {}", token("leon")))
        .header("Content-Type", "application/json")
        .content_length(MAX_CONTENT_LENGTH)
        .build();

    let response = fixture.dispatch("profile.create", request);
    assert_eq!(response.status, 413);
    assert_eq!(fixture.calls(), 0);
}

#[test]
fn invalid_body_fails_inside_logging_and_tracing() {
    let fixture = Fixture::new();
    let logs = LogCapture::new();
    let request = RequestView::builder("/profiles")
        .header("Authorization", format!("Bearer {}", token("leon")))
        .json(&json!({"name": "Leon", "scores": [2, 3, 11]}))
        .build();

    let response = logs.capture(|| fixture.dispatch("profile.create", request));

    assert_eq!(response.status, 400);
    let body = response.json_body().unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().starts_with("Invalid request body"));
    assert_eq!(fixture.calls(), 0);

    // logging saw the request go in but not come back out
    assert_eq!(logs.matching("entering").len(), 1);
    assert!(logs.matching("exiting").is_empty());

    // tracing still closed its span
    let spans = fixture.finished_spans();
    assert_eq!(spans.len(), 1);
    assert!(matches!(spans[0].status, Status::Error { .. }));
    assert_eq!(span_attribute(&spans[0], "http.status_code"), Some(400i64.into()));
}

#[test]
fn invalid_query_is_reported_as_query() {
    let fixture = Fixture::new();
    let response = fixture.dispatch(
        "profile.create",
        profile_request("/profiles?page=0", Some(token("leon"))),
    );

    assert_eq!(response.status, 400);
    let message = response.json_body().unwrap()["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.starts_with("Invalid request query"), "{}", message);
}

#[test]
fn context_is_torn_down_after_dispatch() {
    let fixture = Fixture::new();

    assert_eq!(REQUEST.get().unwrap_err(), ContextError::NotInstalled);
    let response = fixture.dispatch("silent", RequestView::builder("/silent").build());
    assert_eq!(response.status, 204);
    assert!(!SERVICE_CONTEXT.is_bound());
    assert_eq!(REQUEST.get().unwrap_err(), ContextError::NotInstalled);

    // a failing dispatch tears down too
    let response = fixture.dispatch("profile.create", profile_request("/profiles", None));
    assert_eq!(response.status, 401);
    assert!(!SERVICE_CONTEXT.is_bound());
}

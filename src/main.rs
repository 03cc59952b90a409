use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use servekit::config;
use servekit::context::{CREDENTIAL, PARSED_REQUEST, SERVICE};
use servekit::model::{FieldValue, IntField, ModelKind, StringField};
use servekit::serialization::SerializationStage;
use servekit::stages::{AuthenticationStage, FoundationStage, LoggingStage, TracingStage};
use servekit::{handler_fn, Chain, ChainBuilder, Endpoint, Response, Service, ServiceError};

#[derive(Parser)]
#[command(name = "servekit")]
#[command(about = "Demo service built on the servekit pipeline")]
#[command(version)]
struct Args {
    #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(long, help = "Port to bind (defaults to SERVICE_PORT / PORT)")]
    port: Option<u16>,
}

servekit::define_model! {
    /// Body of `POST /users`
    NewUser {
        name: StringField::new().required(true).min_length(1).max_length(64),
        email: StringField::new().required(true).pattern(r"[^@\s]+@[^@\s]+\.[^@\s]+"),
        age: IntField::new().minimum(0).maximum(150),
    }
}

servekit::define_model! {
    CreatedUser {
        id: StringField::new().required(true),
        name: StringField::new().required(true),
        email: StringField::new().required(true),
        age: IntField::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up JWT_SECRET, SERVICE_PORT, etc.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = config::config();

    let filter =
        EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("Starting servekit demo in {:?} mode", config.environment);

    let mut app = demo_service()?
        .into_router()
        .layer(TraceLayer::new_for_http());
    if config.security.enable_cors {
        if servekit::is_production!() {
            tracing::warn!("SECURITY_ENABLE_CORS ignored: no permissive CORS in production");
        } else {
            app = app.layer(CorsLayer::permissive());
        }
    }

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("{}:{}", args.host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await.context("server")?;
    Ok(())
}

/// Stages every demo endpoint shares
fn pipeline() -> ChainBuilder {
    let builder = Chain::builder()
        .foundation(FoundationStage::from_config())
        .tracing(TracingStage::from_config());
    if config::config().api.enable_request_logging {
        builder.logging(LoggingStage::from_config())
    } else {
        builder
    }
}

fn demo_service() -> anyhow::Result<Service> {
    let health = pipeline()
        .handler(handler_fn(|_| {
            let service = SERVICE.with(|info| info.name.clone())?;
            Ok(Response::json(
                200,
                &json!({
                    "status": "ok",
                    "service": service,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ))
        }))
        .build()?;

    let create_user = pipeline()
        .serialization(SerializationStage::json().data(NewUser::schema()))
        .handler(handler_fn(|_| {
            let user = PARSED_REQUEST
                .with(|parsed| parsed.data.clone())?
                .ok_or_else(|| ServiceError::bad_request("Missing user body"))?;

            let mut values = vec![("id", FieldValue::from(Uuid::new_v4().to_string()))];
            for (name, value) in user.fields() {
                if let Some(value) = value {
                    values.push((name, value.clone()));
                }
            }
            Ok(Response::model(201, CreatedUser::new(values)?))
        }))
        .build()?;

    let whoami = pipeline()
        .authentication(AuthenticationStage::from_config())
        .handler(handler_fn(|_| {
            let (subject, claims) = CREDENTIAL.with(|credential| {
                (credential.subject().map(str::to_string), credential.claims.clone())
            })?;
            Ok(Response::json(200, &json!({"subject": subject, "claims": claims})))
        }))
        .build()?;

    let service = Service::new(config::config().tracing.service_name.clone())
        .endpoint(Endpoint::get("health", "/health", health))?
        .endpoint(Endpoint::post("users.create", "/users", create_user).extra("resource", "user"))?
        .endpoint(Endpoint::get("whoami", "/whoami", whoami))?;
    Ok(service)
}

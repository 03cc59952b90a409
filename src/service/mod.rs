// A named set of endpoints and the per-request dispatch that runs their chains.

mod endpoint;

use std::rc::Rc;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use crate::api::{RequestView, Response};
use crate::context::{self, ServiceContext};

pub use endpoint::Endpoint;

/// Published into every request context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("endpoint '{0}' is already registered")]
    DuplicateName(String),

    #[error("{method} {rule} is already routed to '{existing}'")]
    DuplicateRoute {
        method: Method,
        rule: String,
        existing: String,
    },

    #[error("invalid route rule '{0}': rules start with '/'")]
    InvalidRule(String),

    #[error("unsupported method {0}")]
    UnsupportedMethod(Method),
}

#[derive(Debug)]
pub struct Service {
    info: ServiceInfo,
    endpoints: Vec<Arc<Endpoint>>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: ServiceInfo { name: name.into() },
            endpoints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Result<Self, RouteError> {
        self.register(endpoint)?;
        Ok(self)
    }

    pub fn register(&mut self, endpoint: Endpoint) -> Result<Arc<Endpoint>, RouteError> {
        if !endpoint.rule().starts_with('/') {
            return Err(RouteError::InvalidRule(endpoint.rule().to_string()));
        }
        if !is_standard(endpoint.method()) {
            return Err(RouteError::UnsupportedMethod(endpoint.method().clone()));
        }
        if self.find(endpoint.name()).is_some() {
            return Err(RouteError::DuplicateName(endpoint.name().to_string()));
        }
        if let Some(existing) = self
            .endpoints
            .iter()
            .find(|e| e.rule() == endpoint.rule() && e.method() == endpoint.method())
        {
            return Err(RouteError::DuplicateRoute {
                method: endpoint.method().clone(),
                rule: endpoint.rule().to_string(),
                existing: existing.name().to_string(),
            });
        }

        tracing::debug!(
            "Registered {} {} as '{}' ({:?})",
            endpoint.method(),
            endpoint.rule(),
            endpoint.name(),
            endpoint.chain().stage_names()
        );
        let endpoint = Arc::new(endpoint);
        self.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.iter().find(|endpoint| endpoint.name() == name)
    }

    /// Run `endpoint`'s chain against `request` in a fresh context.
    ///
    /// The context is installed as the thread's current context for the
    /// duration of the chain and torn down on return. A chain that produces
    /// no response answers 204; errors become their attached response, or a
    /// generic 500.
    pub fn dispatch(&self, endpoint: &Arc<Endpoint>, request: RequestView) -> Response {
        let ctx = Rc::new(ServiceContext::new());
        ctx.insert(self.info.clone());
        ctx.insert(endpoint.clone());
        ctx.insert(request);

        let result = {
            let _guard = context::install(ctx.clone());
            endpoint.chain().run(&ctx)
        };

        match result {
            Ok(Some(response)) => response,
            Ok(None) => Response::no_content(),
            Err(err) => {
                if err.response().is_some() {
                    tracing::debug!("{} answered with error: {}", endpoint.name(), err);
                }
                err.into_response()
            }
        }
    }
}

fn is_standard(method: &Method) -> bool {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
        Method::TRACE,
    ]
    .contains(method)
}

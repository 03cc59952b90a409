use axum::http::Method;
use serde_json::{Map, Value};

use crate::chain::Chain;

/// A routed operation: immutable once registered with a [`Service`](super::Service)
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    rule: String,
    method: Method,
    chain: Chain,
    extras: Map<String, Value>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        method: Method,
        rule: impl Into<String>,
        chain: Chain,
    ) -> Self {
        Self {
            name: name.into(),
            rule: rule.into(),
            method,
            chain,
            extras: Map::new(),
        }
    }

    pub fn get(name: impl Into<String>, rule: impl Into<String>, chain: Chain) -> Self {
        Self::new(name, Method::GET, rule, chain)
    }

    pub fn post(name: impl Into<String>, rule: impl Into<String>, chain: Chain) -> Self {
        Self::new(name, Method::POST, rule, chain)
    }

    /// Free-form metadata, recorded as span attributes by the tracing stage
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }
}

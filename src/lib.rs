pub mod adapter;
pub mod api;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod serialization;
pub mod service;
pub mod stages;
pub mod testing;

pub use api::{Body, RequestView, Response, ResponseHeaders};
pub use chain::{handler_fn, Chain, ChainBuilder, Handler, HandlerResult, Next};
pub use context::ServiceContext;
pub use error::ServiceError;
pub use model::{Model, ModelKind, Schema};
pub use service::{Endpoint, Service};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

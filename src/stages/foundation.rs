use crate::api::RequestView;
use crate::chain::{Handler, HandlerResult, Next};
use crate::config;
use crate::context::ServiceContext;
use crate::error::FoundationError;

/// Transport preconditions checked before anything else runs
#[derive(Debug, Clone, Copy)]
pub struct FoundationStage {
    max_content_length: u64,
}

impl FoundationStage {
    /// Requests whose declared length reaches `max_content_length` are refused
    pub fn new(max_content_length: u64) -> Self {
        Self { max_content_length }
    }

    pub fn from_config() -> Self {
        Self::new(config::config().api.max_request_size_bytes)
    }

    pub fn max_content_length(&self) -> u64 {
        self.max_content_length
    }
}

impl Handler for FoundationStage {
    fn name(&self) -> &'static str {
        "foundation"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        let request = ctx.require::<RequestView>()?;
        if let Some(length) = request.content_length() {
            if length >= self.max_content_length {
                tracing::warn!(
                    "Refusing {} byte request to {} (limit {})",
                    length,
                    request.path(),
                    self.max_content_length
                );
                return Err(
                    FoundationError::request_too_large(length, self.max_content_length).into(),
                );
            }
        }
        next.run(ctx)
    }
}

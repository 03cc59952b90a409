use std::sync::Arc;
use std::time::Instant;

use tracing::Level;

use crate::chain::{Handler, HandlerResult, Next};
use crate::config;
use crate::context::ServiceContext;
use crate::service::Endpoint;

// Level is only known at runtime; the tracing macros want it at the callsite.
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

/// Access log around the inner stages. The `exiting` event is only emitted
/// when the inner stages return normally.
#[derive(Debug, Clone)]
pub struct LoggingStage {
    level: Level,
    logger: String,
}

impl LoggingStage {
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            level: Level::INFO,
            logger: logger.into(),
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn from_config() -> Self {
        Self::new(config::config().logging.target.clone())
    }
}

impl Default for LoggingStage {
    fn default() -> Self {
        Self::new("servekit::access")
    }
}

impl Handler for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        let endpoint = ctx
            .get::<Arc<Endpoint>>()
            .map(|endpoint| endpoint.name().to_string())
            .unwrap_or_else(|| "-".to_string());

        log_at!(self.level, logger = %self.logger, endpoint = %endpoint, "entering");
        let started = Instant::now();

        let response = next.run(ctx)?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log_at!(
            self.level,
            logger = %self.logger,
            endpoint = %endpoint,
            status = response.as_ref().map(|r| r.status).unwrap_or(204),
            elapsed_ms,
            "exiting"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Response;
    use crate::chain::{handler_fn, Chain};
    use crate::error::ServiceError;
    use crate::testing::LogCapture;

    fn chain(fail: bool) -> Chain {
        Chain::builder()
            .logging(LoggingStage::new("test::access").level(Level::DEBUG))
            .handler(handler_fn(move |_| {
                if fail {
                    Err(ServiceError::handler("boom"))
                } else {
                    Ok(Response::ok())
                }
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn logs_both_events_on_success() {
        let logs = LogCapture::new();
        let result = logs.capture(|| chain(false).run(&ServiceContext::new()));
        assert!(result.is_ok());

        let entering = logs.matching("entering");
        let exiting = logs.matching("exiting");
        assert_eq!(entering.len(), 1);
        assert_eq!(exiting.len(), 1);
        assert!(entering[0].contains("DEBUG"));
        assert!(entering[0].contains("logger=test::access"));
        assert!(exiting[0].contains("status=200"));
        assert!(exiting[0].contains("elapsed_ms="));
    }

    #[test]
    fn skips_exiting_when_inner_stage_fails() {
        let logs = LogCapture::new();
        let result = logs.capture(|| chain(true).run(&ServiceContext::new()));
        assert!(result.is_err());
        assert_eq!(logs.matching("entering").len(), 1);
        assert!(logs.matching("exiting").is_empty());
    }
}

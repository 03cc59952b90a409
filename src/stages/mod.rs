// Built-in pipeline stages. Each one is optional in a chain; see
// `ChainBuilder` for the order they run in.

pub mod auth;
pub mod foundation;
pub mod logging;
pub mod trace;

pub use auth::{
    AuthHooks, AuthenticationStage, BearerHeaderExtractor, Credential, CredentialExtractor,
    CredentialRejected, CredentialValidator, JwtValidator, QueryTokenExtractor,
    StaticTokenValidator,
};
pub use foundation::FoundationStage;
pub use logging::LoggingStage;
pub use trace::{
    TraceContext, TraceContextError, TraceContextExtractor, TracingStage, W3cTraceContextExtractor,
};

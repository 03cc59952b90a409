use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use thiserror::Error;

use crate::api::RequestView;
use crate::chain::{Handler, HandlerResult, Next};
use crate::config::{self, AuthMode};
use crate::context::ServiceContext;
use crate::error::AuthenticationError;

const CHALLENGE: &str = "Bearer";

/// Token presented by the caller. Validators that decode the token store its
/// claims here.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub scheme: String,
    pub token: String,
    pub claims: Option<Value>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: "Bearer".to_string(),
            token: token.into(),
            claims: None,
        }
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.as_ref()?.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claim("sub")?.as_str()
    }
}

/// A validator refused the credential
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CredentialRejected(pub String);

impl CredentialRejected {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Pulls a credential out of the request. A missing or malformed credential is
/// reported as a 401.
pub trait CredentialExtractor: Send + Sync {
    fn extract(&self, request: &RequestView) -> Result<Credential, AuthenticationError>;
}

pub trait CredentialValidator: Send + Sync {
    fn validate(&self, credential: &mut Credential) -> Result<(), CredentialRejected>;
}

/// Callbacks around validation
pub trait AuthHooks: Send + Sync {
    /// Runs before validation; returning a validator replaces the stage's own
    /// for this request only.
    fn before(
        &self,
        _credential: &Credential,
        _request: &RequestView,
    ) -> Option<Arc<dyn CredentialValidator>> {
        None
    }

    /// Runs once the accepted credential is published
    fn after(&self, _credential: &Credential) {}
}

fn unauthorized(message: &str) -> AuthenticationError {
    AuthenticationError::unauthorized(message, CHALLENGE)
}

/// `Authorization: Bearer <token>`
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerHeaderExtractor;

impl CredentialExtractor for BearerHeaderExtractor {
    fn extract(&self, request: &RequestView) -> Result<Credential, AuthenticationError> {
        let header = request
            .header("authorization")
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or_else(|| unauthorized("Authorization header must use Bearer token format"))?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(unauthorized("Authorization header must use Bearer token format"));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(unauthorized("Empty bearer token"));
        }
        Ok(Credential::bearer(token))
    }
}

/// Token passed as a query argument, `?access_token=<token>` by default
#[derive(Debug, Clone)]
pub struct QueryTokenExtractor {
    param: String,
}

impl QueryTokenExtractor {
    pub fn new(param: impl Into<String>) -> Self {
        Self { param: param.into() }
    }
}

impl Default for QueryTokenExtractor {
    fn default() -> Self {
        Self::new("access_token")
    }
}

impl CredentialExtractor for QueryTokenExtractor {
    fn extract(&self, request: &RequestView) -> Result<Credential, AuthenticationError> {
        match request.arg(&self.param).map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Credential::bearer(token)),
            Some(_) => Err(unauthorized("Empty access token")),
            None => Err(unauthorized(&format!("Missing {} query parameter", self.param))),
        }
    }
}

/// HS256 JWT validation. Decoded claims are stored on the credential.
pub struct JwtValidator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtValidator {
    pub fn hs256(secret: &str) -> Self {
        Self {
            key: (!secret.is_empty()).then(|| DecodingKey::from_secret(secret.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    pub fn from_config() -> Self {
        let security = &config::config().security;
        Self::hs256(&security.jwt_secret).leeway(security.jwt_leeway_secs)
    }
}

impl CredentialValidator for JwtValidator {
    fn validate(&self, credential: &mut Credential) -> Result<(), CredentialRejected> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| CredentialRejected::new("JWT secret not configured"))?;

        let token_data = decode::<Value>(&credential.token, key, &self.validation)
            .map_err(|e| CredentialRejected(format!("Invalid JWT token: {}", e)))?;

        credential.claims = Some(token_data.claims);
        Ok(())
    }
}

/// Accepts a fixed set of opaque tokens
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashSet<String>,
}

impl StaticTokenValidator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialValidator for StaticTokenValidator {
    fn validate(&self, credential: &mut Credential) -> Result<(), CredentialRejected> {
        if self.tokens.contains(&credential.token) {
            Ok(())
        } else {
            Err(CredentialRejected::new("Unknown access token"))
        }
    }
}

pub struct AuthenticationStage {
    extractor: Arc<dyn CredentialExtractor>,
    validator: Arc<dyn CredentialValidator>,
    hooks: Option<Arc<dyn AuthHooks>>,
}

impl AuthenticationStage {
    pub fn new(
        extractor: impl CredentialExtractor + 'static,
        validator: impl CredentialValidator + 'static,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            validator: Arc::new(validator),
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: impl AuthHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Extractor chosen by `security.auth_mode`, JWT validation with the configured secret
    pub fn from_config() -> Self {
        let security = &config::config().security;
        match security.auth_mode {
            AuthMode::Header => Self::new(BearerHeaderExtractor, JwtValidator::from_config()),
            AuthMode::Query => Self::new(
                QueryTokenExtractor::new(security.token_query_param.clone()),
                JwtValidator::from_config(),
            ),
        }
    }
}

impl Handler for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        let request = ctx.require::<RequestView>()?;

        let mut credential = self.extractor.extract(&request).map_err(|err| {
            tracing::warn!("Credential extraction failed for {}: {}", request.path(), err);
            err
        })?;

        let replacement = self
            .hooks
            .as_ref()
            .and_then(|hooks| hooks.before(&credential, &request));
        let validator = replacement.as_ref().unwrap_or(&self.validator);

        if let Err(rejected) = validator.validate(&mut credential) {
            tracing::warn!("Credential rejected for {}: {}", request.path(), rejected);
            return Err(AuthenticationError::forbidden(rejected.to_string()).into());
        }

        ctx.insert(credential.clone());
        if let Some(hooks) = &self.hooks {
            hooks.after(&credential);
        }

        next.run(ctx)
    }
}

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub tracing: TracingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: u64,
}

/// Where the authentication stage looks for the caller's token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Header,
    Query,
}

impl AuthMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "header" => Some(AuthMode::Header),
            "query" => Some(AuthMode::Query),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_leeway_secs: u64,
    pub auth_mode: AuthMode,
    pub token_query_param: String,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    /// Continue trace contexts sent by callers
    pub propagate: bool,
    /// Fall back to a fresh trace instead of failing on a malformed `traceparent`
    pub quiet_extraction: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    /// Logger name recorded on every access-log event
    pub target: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::preset(environment).with_overrides(|key| env::var(key).ok())
    }

    pub fn preset(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    /// Apply overrides from any key/value source (the process environment in production)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // API overrides
        if let Some(v) = lookup("SERVICE_PORT").or_else(|| lookup("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Some(v) = lookup("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Some(v) = lookup("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Some(v) = lookup("SECURITY_JWT_LEEWAY_SECS") {
            self.security.jwt_leeway_secs = v.parse().unwrap_or(self.security.jwt_leeway_secs);
        }
        if let Some(v) = lookup("SECURITY_AUTH_MODE") {
            self.security.auth_mode = AuthMode::parse(&v).unwrap_or(self.security.auth_mode);
        }
        if let Some(v) = lookup("SECURITY_TOKEN_QUERY_PARAM") {
            self.security.token_query_param = v;
        }
        if let Some(v) = lookup("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }

        // Tracing overrides
        if let Some(v) = lookup("TRACING_SERVICE_NAME") {
            self.tracing.service_name = v;
        }
        if let Some(v) = lookup("TRACING_PROPAGATE") {
            self.tracing.propagate = v.parse().unwrap_or(self.tracing.propagate);
        }
        if let Some(v) = lookup("TRACING_QUIET_EXTRACTION") {
            self.tracing.quiet_extraction = v.parse().unwrap_or(self.tracing.quiet_extraction);
        }

        // Logging overrides
        if let Some(v) = lookup("LOG_FILTER").or_else(|| lookup("RUST_LOG")) {
            self.logging.filter = v;
        }
        if let Some(v) = lookup("LOG_TARGET") {
            self.logging.target = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_leeway_secs: 60,
                auth_mode: AuthMode::Header,
                token_query_param: "access_token".to_string(),
                enable_cors: true,
            },
            tracing: TracingConfig {
                service_name: "servekit".to_string(),
                propagate: true,
                quiet_extraction: true,
            },
            logging: LoggingConfig {
                filter: "servekit=debug,tower_http=debug".to_string(),
                target: "servekit::access".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_leeway_secs: 30,
                auth_mode: AuthMode::Header,
                token_query_param: "access_token".to_string(),
                enable_cors: true,
            },
            tracing: TracingConfig {
                service_name: "servekit".to_string(),
                propagate: true,
                quiet_extraction: true,
            },
            logging: LoggingConfig {
                filter: "servekit=info,tower_http=info".to_string(),
                target: "servekit::access".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                port: 8000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_leeway_secs: 0,
                auth_mode: AuthMode::Header,
                token_query_param: "access_token".to_string(),
                enable_cors: false,
            },
            tracing: TracingConfig {
                service_name: "servekit".to_string(),
                propagate: false,
                quiet_extraction: true,
            },
            logging: LoggingConfig {
                filter: "servekit=info".to_string(),
                target: "servekit::access".to_string(),
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

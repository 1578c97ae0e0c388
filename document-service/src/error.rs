use document_authz::AuthzError;
use thiserror::Error;

/// Errors returned by document operations
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown user: {user_id}")]
    Unauthorized { user_id: String },

    #[error("Resource not found: {resource_type}")]
    NotFound { resource_type: String },

    /// Covers explicit denials and checks that failed closed alike
    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Authorization backend error: {0}")]
    Authorization(#[from] AuthzError),
}

impl ServiceError {
    pub fn unauthorized(user_id: impl ToString) -> Self {
        Self::Unauthorized {
            user_id: user_id.to_string(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// HTTP status a transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Unauthorized { .. } => 401,
            ServiceError::NotFound { .. } => 404,
            ServiceError::Forbidden => 403,
            ServiceError::BadRequest { .. } => 400,
            ServiceError::Authorization(AuthzError::StorageError(_)) => 503,
            ServiceError::Authorization(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized { .. } => "unauthorized",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Forbidden => "forbidden",
            ServiceError::BadRequest { .. } => "bad_request",
            ServiceError::Authorization(_) => "authorization_backend_error",
        }
    }
}

/// Errors raised while wiring the service together
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Authorization(#[from] AuthzError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Concurrent update on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Request,
    Auth,
    State,
    Upstream,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PortalError {
    pub fn validation(message: impl Into<String>) -> Self {
        PortalError::ValidationError {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        PortalError::MalformedPayload {
            message: message.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        PortalError::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        PortalError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// HTTP status returned to the caller of a function.
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::ValidationError { .. } | PortalError::MalformedPayload { .. } => 400,
            PortalError::SerializationError(_) => 400,
            PortalError::Unauthorized { .. } => 401,
            PortalError::NotFound { .. } => 404,
            PortalError::MethodNotAllowed { .. } => 405,
            PortalError::InvalidTransition { .. } | PortalError::Conflict { .. } => 409,
            PortalError::ApiError(_) | PortalError::Upstream { .. } => 502,
            _ => 500,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PortalError::ConfigError { .. }
            | PortalError::MissingConfigError { .. }
            | PortalError::InvalidConfigValueError { .. }
            | PortalError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            PortalError::ValidationError { .. }
            | PortalError::MalformedPayload { .. }
            | PortalError::SerializationError(_)
            | PortalError::MethodNotAllowed { .. } => ErrorCategory::Request,
            PortalError::Unauthorized { .. } => ErrorCategory::Auth,
            PortalError::NotFound { .. }
            | PortalError::InvalidTransition { .. }
            | PortalError::Conflict { .. } => ErrorCategory::State,
            PortalError::ApiError(_) | PortalError::Upstream { .. } => ErrorCategory::Upstream,
            PortalError::IoError(_) | PortalError::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::State => ErrorSeverity::Low,
            ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Request | ErrorCategory::Auth => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the config file and environment variables",
            ErrorCategory::Request => "Check the request payload shape",
            ErrorCategory::Auth => "Check the webhook secret or service token",
            ErrorCategory::State => "Re-read the record; it may have changed",
            ErrorCategory::Upstream => "The hosted API failed; retry later",
            ErrorCategory::System => "Check disk permissions and paths",
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;

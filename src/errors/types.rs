//! # Error Types
//!
//! Error types for the gateway using `thiserror`.

use std::fmt;

/// Main error type for the authentication gateway
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing or invalid provider configuration, missing endpoints
    #[error("{message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bad password or failed directory bind
    #[error("{message}")]
    CredentialMismatch { message: String },

    /// More than one directory entry matched the principal
    #[error("{message}")]
    IdentityAmbiguous { message: String },

    /// No principal matched
    #[error("{message}")]
    IdentityNotFound { message: String },

    /// Non-2xx from an identity provider, malformed token or claims
    #[error("{message}")]
    ProviderProtocol {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A REST-action override field has the wrong shape
    #[error("{message}")]
    FieldValidation { message: String, field: String },

    /// CSR create/approve/timeout or unexpected duplicate
    #[error("{message}")]
    Issuance {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Store read/write failure
    #[error("{message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed request input
    #[error("{message}")]
    Validation { message: String, field: Option<String> },

    /// Credentials were not presented at all
    #[error("{message}")]
    Unauthorized { message: String },

    /// No API server URL configured and not running inside a cluster
    #[error("unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined")]
    NotInCluster,

    /// Network transport errors
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal server errors
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Flat classification of [`Error`], handy for metrics labels and matching in tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    CredentialMismatch,
    IdentityAmbiguous,
    IdentityNotFound,
    ProviderProtocol,
    FieldValidation,
    Issuance,
    Persistence,
    Validation,
    Unauthorized,
    NotInCluster,
    Transport,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::CredentialMismatch => "credential_mismatch",
            ErrorKind::IdentityAmbiguous => "identity_ambiguous",
            ErrorKind::IdentityNotFound => "identity_not_found",
            ErrorKind::ProviderProtocol => "provider_protocol",
            ErrorKind::FieldValidation => "field_validation",
            ErrorKind::Issuance => "issuance",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotInCluster => "not_in_cluster",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Configuration { message: message.into(), source: Some(source) }
    }

    /// Create a credential mismatch error
    pub fn credential_mismatch<S: Into<String>>(message: S) -> Self {
        Self::CredentialMismatch { message: message.into() }
    }

    pub fn identity_ambiguous<S: Into<String>>(message: S) -> Self {
        Self::IdentityAmbiguous { message: message.into() }
    }

    pub fn identity_not_found<S: Into<String>>(message: S) -> Self {
        Self::IdentityNotFound { message: message.into() }
    }

    /// Create a provider protocol error
    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::ProviderProtocol { message: message.into(), source: None }
    }

    /// Create a provider protocol error with source
    pub fn provider_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::ProviderProtocol { message: message.into(), source: Some(source) }
    }

    /// Create a field validation error for a REST-action override field
    pub fn field_validation<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::FieldValidation { message: message.into(), field: field.into() }
    }

    /// Create an issuance error
    pub fn issuance<S: Into<String>>(message: S) -> Self {
        Self::Issuance { message: message.into(), source: None }
    }

    /// Create an issuance error with source
    pub fn issuance_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Issuance { message: message.into(), source: Some(source) }
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence { message: message.into(), source: None }
    }

    /// Create a persistence error with source
    pub fn persistence_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Persistence { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::CredentialMismatch { .. } => ErrorKind::CredentialMismatch,
            Error::IdentityAmbiguous { .. } => ErrorKind::IdentityAmbiguous,
            Error::IdentityNotFound { .. } => ErrorKind::IdentityNotFound,
            Error::ProviderProtocol { .. } => ErrorKind::ProviderProtocol,
            Error::FieldValidation { .. } => ErrorKind::FieldValidation,
            Error::Issuance { .. } => ErrorKind::Issuance,
            Error::Persistence { .. } => ErrorKind::Persistence,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::NotInCluster => ErrorKind::NotInCluster,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Configuration => 417,
            ErrorKind::CredentialMismatch => 403,
            ErrorKind::IdentityAmbiguous => 300,
            ErrorKind::IdentityNotFound => 404,
            ErrorKind::ProviderProtocol => 500,
            ErrorKind::FieldValidation => 500,
            ErrorKind::Issuance => 500,
            ErrorKind::Persistence => 500,
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotInCluster => 500,
            ErrorKind::Transport => 500,
            ErrorKind::Internal => 500,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Self::Internal {
            message: format!("kubernetes api call failed: {}", error),
            source: Some(Box::new(error)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::provider_with_source(format!("request to identity provider failed: {}", error), Box::new(error))
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Internal { message: format!("I/O operation failed: {}", error), source: Some(Box::new(error)) }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization failed: {}", error),
            source: Some(Box::new(error)),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::configuration(format!("Validation failed: {}", message))
    }
}

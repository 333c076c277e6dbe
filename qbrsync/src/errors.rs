use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Configuration is missing, malformed, or inconsistent
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// An upstream service could not be reached or answered with a non-success status
    #[error("{service} request failed while trying to {operation}: {message}")]
    Upstream {
        service: &'static str,
        operation: String,
        message: String,
    },

    /// An upstream response did not match the expected shape
    #[error("Failed to decode {service} response: {message}")]
    Decode { service: &'static str, message: String },

    /// The sheet service rejected a request or the sheet does not fit the row schema
    #[error("Sheet {sheet} error (result code {result_code:?}): {message}")]
    Sheet {
        sheet: String,
        result_code: Option<i64>,
        message: String,
    },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config { message: message.into() }
    }

    pub fn upstream(service: &'static str, operation: impl Into<String>, message: impl ToString) -> Self {
        Error::Upstream {
            service,
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(service: &'static str, message: impl ToString) -> Self {
        Error::Decode {
            service,
            message: message.to_string(),
        }
    }

    /// Name of the external service this error originated from, if any
    pub fn service(&self) -> Option<&'static str> {
        match self {
            Error::Upstream { service, .. } | Error::Decode { service, .. } => Some(service),
            Error::Sheet { .. } => Some("Smartsheet"),
            Error::Config { .. } | Error::Other(_) => None,
        }
    }
}

/// Type alias for sync operation results
pub type Result<T> = std::result::Result<T, Error>;

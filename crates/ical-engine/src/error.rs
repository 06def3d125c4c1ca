//! Error types for reading calendars.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while retrieving, parsing or expanding a calendar.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The source could not be opened or read. Never retried internally.
    #[error("failed to retrieve {location}: {source}")]
    RetrievalFailure {
        location: String,
        #[source]
        source: BoxError,
    },

    /// A structural grammar violation: unbalanced BEGIN/END, or a line that
    /// cannot be split into name, parameters and value.
    /// Includes the 1-based logical line number where the error was detected.
    #[error("malformed document at line {line}: {message}")]
    MalformedDocument { line: usize, message: String },

    /// A single property could not be parsed under its declared value type,
    /// or a required property is missing (in which case `value` is empty).
    #[error("invalid {property} value {value:?}{}", reason_suffix(.reason))]
    InvalidPropertyValue {
        property: String,
        value: String,
        reason: Option<String>,
    },

    /// An open-ended recurrence rule was expanded without an upper bound.
    #[error("recurrence rule of {uid:?} has neither COUNT nor UNTIL and no bound was given")]
    UnboundedRecurrence { uid: String },

    /// The requested interval ends before it starts.
    #[error("invalid interval: {after} is after {before}")]
    InvalidInterval { after: String, before: String },

    /// A configuration value could not be used.
    #[error("config error: {0}")]
    Config(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl ReadError {
    pub(crate) fn invalid(property: &str, value: &str) -> Self {
        ReadError::InvalidPropertyValue {
            property: property.to_string(),
            value: value.to_string(),
            reason: None,
        }
    }

    pub(crate) fn invalid_because(property: &str, value: &str, reason: impl Into<String>) -> Self {
        ReadError::InvalidPropertyValue {
            property: property.to_string(),
            value: value.to_string(),
            reason: Some(reason.into()),
        }
    }

    pub(crate) fn missing(property: &str) -> Self {
        ReadError::invalid_because(property, "", "required property is missing")
    }

    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        ReadError::MalformedDocument {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn retrieval(location: &str, source: impl Into<BoxError>) -> Self {
        ReadError::RetrievalFailure {
            location: location.to_string(),
            source: source.into(),
        }
    }

    /// Name of the offending property for `InvalidPropertyValue`.
    pub fn property(&self) -> Option<&str> {
        match self {
            ReadError::InvalidPropertyValue { property, .. } => Some(property),
            _ => None,
        }
    }
}

/// Convenience alias used throughout ical-engine.
pub type Result<T> = std::result::Result<T, ReadError>;

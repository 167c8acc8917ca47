//! Error types for telemetry acquisition and emission

use thiserror::Error;

/// Boxed source error from an external API client
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while resolving cluster placement
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no pod matching {selector} was found")]
    NotFound { selector: String },

    #[error("failed to look up {resource}: {source}")]
    Lookup {
        resource: String,
        #[source]
        source: BoxError,
    },

    #[error("service {service} has no cluster IP")]
    NoAddress { service: String },
}

impl AcquisitionError {
    pub fn lookup(resource: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Lookup {
            resource: resource.into(),
            source: source.into(),
        }
    }
}

/// Failures while sending a sample to the collection endpoint
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to serialize sample: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid collection URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{}", rejection_message(.status, .body))]
    RemoteRejection { status: u16, body: Option<String> },
}

fn rejection_message(status: &u16, body: &Option<String>) -> String {
    match body {
        Some(body) => format!("unexpected response status: {} with message {}", status, body),
        None => format!("unexpected response status: {}", status),
    }
}

/// Anything that can abort a single tick
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

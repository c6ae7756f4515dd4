use thiserror::Error;

/// Rejection of a top-level collection or environment document. Fatal when
/// loading; never raised once a run is in progress.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid {0} format: expected a JSON object")]
    NotAnObject(&'static str),
    #[error("invalid collection schema `{0}`")]
    SchemaMismatch(String),
    #[error("environment name is required")]
    MissingEnvironmentName,
    #[error("environment values must be an array")]
    InvalidEnvironmentValues,
    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),
    #[error("failed to parse {kind}: {source}")]
    Invalid {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Declared auth schemes the engine does not implement must fail loudly so
/// coverage gaps stay visible.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unsupported auth type `{0}`")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("unsupported body mode `{0}`")]
    UnsupportedMode(String),
}

/// Transport failures are absorbed into the owning request's result; they
/// never abort a run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("invalid proxy URL: {0}")]
    InvalidProxy(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Send(String),
    #[error("failed to read response: {0}")]
    Read(String),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(i64),
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

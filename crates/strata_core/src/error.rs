use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-specific errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors reported by a streaming source while a fetch is running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The external query reported a failure on its error stream.
    #[error("upstream query failed: {0}")]
    Upstream(String),

    /// The streaming context was cancelled before the stream finished.
    #[error("stream cancelled")]
    Cancelled,

    /// The stream ended in a way the source could not interpret.
    #[error("stream closed unexpectedly: {0}")]
    Closed(String),
}

impl SourceError {
    pub fn upstream(cause: impl Into<String>) -> Self {
        Self::Upstream(cause.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    #[error("Unknown facet '{facet}' for collection {collection}")]
    #[diagnostic(
        code(strata_core::unknown_facet),
        help("Available facets: {}", available.join(", "))
    )]
    UnknownFacet {
        collection: String,
        facet: String,
        available: Vec<String>,
    },

    #[error("Fetch for store {store} failed during {operation}")]
    #[diagnostic(
        code(strata_core::fetch_failed),
        help("The last streaming fetch produced no data before failing; reload to retry")
    )]
    FetchFailed {
        store: String,
        operation: String,
        #[source]
        cause: SourceError,
    },

    #[error("{operation} on collection {collection} failed: {cause}")]
    #[diagnostic(
        code(strata_core::crud_failed),
        help("The backing system rejected the change; the cached data was not modified")
    )]
    CrudFailed {
        collection: String,
        operation: String,
        cause: String,
    },

    #[error("Operation {operation} is not supported on {collection}/{facet}")]
    #[diagnostic(code(strata_core::unsupported_operation))]
    UnsupportedOperation {
        collection: String,
        facet: String,
        operation: String,
    },

    #[error("Cannot sort by '{field}': {reason}")]
    #[diagnostic(
        code(strata_core::invalid_sort),
        help("Check the sort specification sent by the view")
    )]
    Sort { field: String, reason: String },

    #[error("Unknown collection '{name}'")]
    #[diagnostic(
        code(strata_core::unknown_collection),
        help("Available collections: {}", available.join(", "))
    )]
    UnknownCollection { name: String, available: Vec<String> },

    #[error("Invalid {collection} payload for {operation}: {reason}")]
    #[diagnostic(code(strata_core::invalid_payload))]
    InvalidPayload {
        collection: String,
        operation: String,
        reason: String,
    },

    #[error("Cannot start a fetch for store {store} outside a tokio runtime")]
    #[diagnostic(
        code(strata_core::no_runtime),
        help("Load data from a task or thread that runs inside a tokio runtime")
    )]
    NoRuntime { store: String },

    #[error("Store {store} is registered with a different item type")]
    #[diagnostic(
        code(strata_core::store_type_mismatch),
        help("Each store key must be used with exactly one item type")
    )]
    StoreTypeMismatch { store: String },

    #[error("Configuration error for field '{field}'")]
    #[diagnostic(
        code(strata_core::configuration_error),
        help("Check the cache configuration")
    )]
    Configuration {
        field: String,
        #[source]
        cause: ConfigError,
    },
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    pub fn unknown_facet(
        collection: impl Into<String>,
        facet: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::UnknownFacet {
            collection: collection.into(),
            facet: facet.into(),
            available,
        }
    }

    pub fn fetch_failed(
        store: impl Into<String>,
        operation: impl Into<String>,
        cause: SourceError,
    ) -> Self {
        Self::FetchFailed {
            store: store.into(),
            operation: operation.into(),
            cause,
        }
    }

    pub fn crud_failed(
        collection: impl Into<String>,
        operation: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::CrudFailed {
            collection: collection.into(),
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    pub fn unsupported(
        collection: impl Into<String>,
        facet: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::UnsupportedOperation {
            collection: collection.into(),
            facet: facet.into(),
            operation: operation.into(),
        }
    }

    pub fn sort_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sort {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_collection(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownCollection {
            name: name.into(),
            available,
        }
    }

    pub fn invalid_payload(
        collection: impl Into<String>,
        operation: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidPayload {
            collection: collection.into(),
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(field: impl Into<String>, cause: ConfigError) -> Self {
        Self::Configuration {
            field: field.into(),
            cause,
        }
    }

    /// True for validation failures the caller should not retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownFacet { .. }
                | Self::UnknownCollection { .. }
                | Self::UnsupportedOperation { .. }
                | Self::InvalidPayload { .. }
                | Self::Sort { .. }
        )
    }

    /// The upstream cause when this error came from a streaming fetch.
    pub fn source_cause(&self) -> Option<&SourceError> {
        match self {
            Self::FetchFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

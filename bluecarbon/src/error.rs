//! Error types for the blue-carbon statistics engine

use crate::collect::engine::EngineError;
use crate::geo_core::{GridSpec, ProjectionError};

/// Main error type for explorer operations
///
/// A reduction without contributing pixels and a dataset without a region
/// field are not errors: they surface as `None` values.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A region selector does not normalize to any reference boundary
    #[error("Unresolved region: '{selector}' matches no reference boundary")]
    UnresolvedRegion { selector: String },

    /// The compute engine failed while evaluating a request
    #[error("Engine evaluation failed for {request}: {source}")]
    Upstream {
        request: String,
        #[source]
        source: EngineError,
    },

    /// Layers on different grids were combined in one area computation
    #[error("Grid mismatch: expected {expected}, got {actual}")]
    GridMismatch {
        expected: GridSpec,
        actual: GridSpec,
    },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid GeoJSON in '{source_name}': {message}")]
    InvalidGeoJson {
        source_name: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Wrap an engine failure with the parameters of the request that caused it
    pub fn upstream(request: impl Into<String>, source: EngineError) -> Self {
        Error::Upstream {
            request: request.into(),
            source,
        }
    }
}

/// Result type alias for explorer operations
pub type Result<T> = std::result::Result<T, Error>;

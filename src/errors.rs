use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ExampleIdString;

/// Error type for example generation, store persistence, and lookup failures.
#[derive(Debug, Error)]
pub enum ExampleError {
    /// Malformed arguments or settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An append or read disagrees with a store's recorded attributes.
    #[error("schema mismatch on '{field}': {details}")]
    SchemaMismatch {
        /// Attribute that differs.
        field: &'static str,
        /// Stored and offered values.
        details: String,
    },
    /// An identifier universe holds the same id more than once.
    #[error("identifier universe has {total} items, but only {unique} unique")]
    DuplicateIds {
        /// Ids in the universe.
        total: usize,
        /// Distinct ids in the universe.
        unique: usize,
    },
    /// Desired ids absent from the universe.
    #[error("{} of {desired} desired ids are missing: {}", missing.len(), missing.join(", "))]
    MissingIds {
        /// Every absent id, in request order.
        missing: Vec<ExampleIdString>,
        /// Number of ids requested.
        desired: usize,
    },
    /// A file that must exist does not.
    #[error("missing {kind} file: {}", path.display())]
    MissingResource {
        /// What the file holds, e.g. "predictor".
        kind: &'static str,
        /// Where it was expected.
        path: PathBuf,
    },
    /// A generator went through all of its times or files without usable data.
    #[error("no usable data: {0}")]
    Exhausted(String),
    /// Container or payload codec failure.
    #[error("example store failure: {0}")]
    Store(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<rusqlite::Error> for ExampleError {
    fn from(err: rusqlite::Error) -> Self {
        ExampleError::Store(err.to_string())
    }
}

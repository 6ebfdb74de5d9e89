//! Typed failures of the decision pipeline and the retraining loop.
//!
//! Pipeline errors are local to one request. Retraining errors always leave the
//! previously committed artifact pair in place.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream page fetch failed; terminal for the request, never retried here.
    #[error("content unavailable: {0}")]
    Fetch(String),

    /// Corpus or feedback log does not have the expected shape.
    #[error("schema error in {path}: {message}")]
    Schema { path: PathBuf, message: String },

    /// Training data has fewer than two distinct labels.
    #[error("degenerate training data: need 2 distinct labels, found {distinct}")]
    DegenerateTraining { distinct: usize },

    /// A durable write (feedback append, artifact commit) did not complete.
    #[error("persistence failed ({context}): {source}")]
    Persistence {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("a retrain is already in progress")]
    RetrainInProgress,

    /// Request rejected before scoring (missing title or body source).
    #[error("invalid article: {0}")]
    InvalidArticle(String),

    /// Persisted artifact pair is missing, unreadable, or mixes generations.
    #[error("artifacts unavailable: {0}")]
    Artifacts(String),
}

impl Error {
    pub(crate) fn persistence(context: impl Into<String>, source: io::Error) -> Self {
        Self::Persistence {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short, stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Schema { .. } => "schema",
            Self::DegenerateTraining { .. } => "degenerate_training",
            Self::Persistence { .. } => "persistence",
            Self::RetrainInProgress => "retrain_in_progress",
            Self::InvalidArticle(_) => "invalid_article",
            Self::Artifacts(_) => "artifacts",
        }
    }
}

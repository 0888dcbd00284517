/*!
Error types shared by every stage of the bootstrapping loop.

Configuration errors are fatal and surface at startup. Acquisition and filter runtime errors are
reported per document; the selection pipeline logs them and moves on.
*/
use crate::iteration::IterationState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bootstrap root does not exist. It must be created beforehand, together with the
    /// annotated seed corpus in `iteration_0/base`.
    #[error("bootstrap folder does not exist: {0}")]
    MissingRoot(PathBuf),

    /// The installation directory of the external trainer does not exist.
    #[error("trainer installation folder does not exist: {0}")]
    MissingTrainer(PathBuf),

    #[error("seed corpus not found in {0}")]
    MissingBaseCorpus(PathBuf),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Construction-time validation of a filter failed (e.g. a reserved answer label).
    #[error("invalid filter configuration: {0}")]
    FilterConfig(String),

    #[error("delegated model failed: {0}")]
    Model(String),

    #[error("could not acquire document {id}: {reason}")]
    Acquisition { id: String, reason: String },

    #[error("interchange format error in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("document {0} is already present in the dataset")]
    DuplicateDocument(String),

    #[error("entity {text:?} at offset {offset} does not fit in a part of {len} characters")]
    EntityOutOfBounds {
        offset: usize,
        text: String,
        len: usize,
    },

    #[error("cannot split {documents} documents into {folds} folds")]
    InvalidFolds { documents: usize, folds: usize },

    #[error("cannot {action} while iteration {iteration} is {state}")]
    InvalidTransition {
        iteration: u32,
        state: IterationState,
        action: &'static str,
    },

    #[error("iteration {0} has no candidate documents")]
    NoCandidates(u32),

    #[error("operator input closed")]
    InputClosed,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn model(reason: impl Into<String>) -> Self {
        Error::Model(reason.into())
    }

    pub fn acquisition(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Acquisition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the whole run instead of skipping the current document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingRoot(_)
                | Error::MissingTrainer(_)
                | Error::MissingBaseCorpus(_)
                | Error::Pattern(_)
                | Error::FilterConfig(_)
                | Error::InputClosed
        )
    }
}

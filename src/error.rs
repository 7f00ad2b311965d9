use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::DecodeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed artifact uri {0:?}")]
    MalformedUri(String),

    #[error("no run {run_id} found in experiment {experiment_id}")]
    RunNotFound {
        experiment_id: String,
        run_id: String,
    },

    #[error("{matches} runs match {run_id} in experiment {experiment_id}")]
    AmbiguousRun {
        experiment_id: String,
        run_id: String,
        matches: usize,
    },

    #[error("corrupt manifest entry {key}")]
    CorruptManifestEntry {
        key: String,
        #[source]
        source: DecodeError,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("ambiguous artifact {path}: {matches} manifest entries")]
    AmbiguousArtifact { path: String, matches: usize },

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("metadata store failed: {0}")]
    Metadata(String),

    #[error("path is not valid utf-8: {0:?}")]
    NonUtf8Path(PathBuf),

    #[error(transparent)]
    Walk(#[from] ignore::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

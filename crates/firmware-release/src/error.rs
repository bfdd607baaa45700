//! Error type shared by every stage of the release step.

use std::path::PathBuf;

use thiserror::Error;

use crate::flash_map::ImageKind;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can stop a release run.
///
/// None of these are recoverable: the caller reports the error and the
/// firmware build step fails.
#[derive(Debug, Error)]
pub enum Error {
    /// A required `-D` build definition is absent or has no value.
    #[error("build definition `{0}` is not set")]
    MissingDefine(String),

    /// No auxiliary flash image was classified as this kind.
    #[error("no {0} image in FLASH_EXTRA_IMAGES")]
    MissingImage(ImageKind),

    /// A file the build was expected to produce does not exist.
    #[error("build artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// A source file already is its packaged destination. Copying it would
    /// truncate it.
    #[error("{} is both source and destination", .0.display())]
    SameFile(PathBuf),

    /// Filesystem failure, tagged with the path being touched.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory the operation was acting on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The build environment file could not be read or understood.
    #[error("invalid build environment {}: {reason}", path.display())]
    Config {
        /// The build environment file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Flash map (de)serialisation failed.
    #[error("flash map JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

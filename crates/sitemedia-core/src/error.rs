use std::io;
use std::path::{Path, PathBuf};

use crate::codec::CodecError;

/// Failure of a single file (or folder-level action). Every variant is caught at
/// the per-file boundary and turned into an audit record; none aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("source vanished before processing: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("unsupported extension: {}", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("conversion of {} failed: {source}", .path.display())]
    Conversion {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("no free file name left in {} for {name}", .dir.display())]
    CollisionExhausted { dir: PathBuf, name: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MediaError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        MediaError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn conversion(path: &Path, source: CodecError) -> Self {
        MediaError::Conversion {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this failure means the file is skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            MediaError::SourceMissing(_) | MediaError::UnsupportedExtension(_)
        )
    }
}

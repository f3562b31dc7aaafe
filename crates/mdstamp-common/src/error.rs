//! Error types for mdstamp
//!
//! A missing record is not an error on the fetch path (it is `Ok(None)`);
//! everything here fails the filesystem operation that triggered it.

use crate::types::Gfid;
use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Common result type for mdstamp operations
pub type Result<T> = std::result::Result<T, MdataError>;

/// Common error type for mdstamp
#[derive(Debug, Error)]
pub enum MdataError {
    #[error("extended attributes not supported")]
    Unsupported,

    #[error("no timestamp record for gfid {0}")]
    Missing(Gfid),

    #[error("malformed timestamp record: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },

    #[error("unsupported timestamp record version {0}")]
    UnsupportedVersion(u8),

    #[error("{op} failed on {}: {errno}", path.display())]
    Xattr {
        op: &'static str,
        path: PathBuf,
        errno: Errno,
    },

    #[error("handle path unavailable for gfid {0}")]
    HandleUnavailable(Gfid),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MdataError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a missing-record error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Missing(_))
    }

    /// Errno the calling filesystem operation should fail with
    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            Self::Unsupported => Errno::EOPNOTSUPP,
            Self::Missing(_) => Errno::ENODATA,
            Self::Malformed { .. } | Self::UnsupportedVersion(_) | Self::HandleUnavailable(_) => {
                Errno::EIO
            }
            Self::Xattr { errno, .. } => *errno,
            Self::InvalidArgument(_) | Self::Config(_) => Errno::EINVAL,
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Page pipeline errors --
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("no document boundary found")]
    BoundaryNotFound,

    #[error("singular transform: {0}")]
    SingularTransform(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("page {index} could not be embedded: {reason}")]
    PageEmbed { index: usize, reason: String },

    // -- Resource / control errors --
    #[error("memory budget exhausted: {used_bytes} of {budget_bytes} bytes in use")]
    ResourceExhausted { used_bytes: u64, budget_bytes: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("page pipeline panicked: {0}")]
    Panicked(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`ScanError`], carried on failed pages so that
/// callers can route them without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeFailure,
    BoundaryNotFound,
    SingularTransform,
    EncodeFailure,
    ResourceExhausted,
    InvalidConfig,
    Cancelled,
    Internal,
}

impl ScanError {
    /// The routing class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::DecodeFailure,
            Self::BoundaryNotFound => ErrorKind::BoundaryNotFound,
            Self::SingularTransform(_) => ErrorKind::SingularTransform,
            Self::Encode(_) | Self::PageEmbed { .. } => ErrorKind::EncodeFailure,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Panicked(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error ends processing of the page it occurred on.
    ///
    /// Boundary and transform failures are recovered inside the page
    /// pipeline; memory pressure only refuses new captures.
    pub fn is_page_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::BoundaryNotFound | ErrorKind::SingularTransform | ErrorKind::ResourceExhausted
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds_are_not_page_fatal() {
        assert!(!ScanError::BoundaryNotFound.is_page_fatal());
        assert!(!ScanError::SingularTransform("det=0".into()).is_page_fatal());
        assert!(
            !ScanError::ResourceExhausted {
                used_bytes: 10,
                budget_bytes: 10
            }
            .is_page_fatal()
        );
    }

    #[test]
    fn decode_and_encode_are_page_fatal() {
        assert!(ScanError::Decode("truncated".into()).is_page_fatal());
        assert!(ScanError::Encode("jpeg".into()).is_page_fatal());
    }

    #[test]
    fn page_embed_reports_index_and_encode_kind() {
        let err = ScanError::PageEmbed {
            index: 3,
            reason: "bad jpeg".into(),
        };
        assert_eq!(err.kind(), ErrorKind::EncodeFailure);
        assert!(err.to_string().contains("page 3"));
    }
}

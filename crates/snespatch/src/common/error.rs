//! Error types shared by the patch codec and the assembler integration

use std::fmt;

use thiserror::Error;

/// Which of the three BPS trailer checksums failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumTarget {
    Source,
    Target,
    Patch,
}

impl fmt::Display for ChecksumTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumTarget::Source => write!(f, "source"),
            ChecksumTarget::Target => write!(f, "target"),
            ChecksumTarget::Patch => write!(f, "patch"),
        }
    }
}

/// Errors produced while creating, applying or assembling patches
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid {format} patch: {message}")]
    Format { format: &'static str, message: String },

    #[error("{target} checksum mismatch: expected {expected:#010X}, found {actual:#010X}")]
    Checksum {
        target: ChecksumTarget,
        expected: u32,
        actual: u32,
    },

    #[error("{what} size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("ROM size ({size} bytes) exceeds IPS format limit ({limit:#X} bytes)")]
    SizeLimit { size: usize, limit: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("assembler not initialized")]
    NotInitialized,

    #[error("incompatible assembler API version: {found} (expected >= {required})")]
    IncompatibleVersion { found: u32, required: u32 },

    #[error("symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("assembler error: {message}")]
    Assembler { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchError {
    pub fn format(format: &'static str, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            message: message.into(),
        }
    }

    pub fn checksum(target: ChecksumTarget, expected: u32, actual: u32) -> Self {
        Self::Checksum {
            target,
            expected,
            actual,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn assembler(message: impl Into<String>) -> Self {
        Self::Assembler {
            message: message.into(),
        }
    }

    /// Whether the error means a produced buffer must not be trusted
    pub fn is_data_loss(&self) -> bool {
        matches!(self, PatchError::Checksum { .. } | PatchError::SizeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_message() {
        let err = PatchError::checksum(ChecksumTarget::Target, 0xDEADBEEF, 0x1234);
        assert_eq!(
            err.to_string(),
            "target checksum mismatch: expected 0xDEADBEEF, found 0x00001234"
        );
        assert!(err.is_data_loss());
    }

    #[test]
    fn test_size_limit_message() {
        let err = PatchError::SizeLimit {
            size: 0x100_0000,
            limit: 0xFF_FFFF,
        };
        assert!(err.to_string().contains("exceeds IPS format limit"));
        assert!(!err.is_data_loss());
    }
}

//! Squeeze Error Types
//!
//! 单文件搜索可能遇到的全部故障。`Unsatisfiable` 不在这里：它是搜索的正常
//! 终态（见 `search::CompressionResult`），由调用方回退为原样复制。

use crate::types::{CeilingError, IterationError, QualityError, SsimError};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 只影响当前文件，批处理继续
    Recoverable,
    /// 整个批处理无法继续
    Fatal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SqueezeError {
    #[error("Encode failed: {reason}")]
    EncodeFailure { reason: String },

    #[error("Decode failed: {reason}")]
    DecodeFailure { reason: String },

    #[error("Dimension mismatch: original {expected:?} vs candidate {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    IterationLimit(#[from] IterationError),

    #[error("Search cancelled")]
    Cancelled,
}

impl SqueezeError {
    pub fn encode(reason: impl fmt::Display) -> Self {
        SqueezeError::EncodeFailure {
            reason: reason.to_string(),
        }
    }

    pub fn decode(reason: impl fmt::Display) -> Self {
        SqueezeError::DecodeFailure {
            reason: reason.to_string(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        SqueezeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SqueezeError::EncodeFailure { .. }
            | SqueezeError::DecodeFailure { .. }
            | SqueezeError::DimensionMismatch { .. }
            | SqueezeError::IterationLimit(_)
            | SqueezeError::Io { .. } => ErrorCategory::Recoverable,
            SqueezeError::InvalidConfig(_) | SqueezeError::Cancelled => ErrorCategory::Fatal,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SqueezeError::Cancelled)
    }
}

impl From<QualityError> for SqueezeError {
    fn from(e: QualityError) -> Self {
        SqueezeError::InvalidConfig(e.to_string())
    }
}

impl From<SsimError> for SqueezeError {
    fn from(e: SsimError) -> Self {
        SqueezeError::InvalidConfig(e.to_string())
    }
}

impl From<CeilingError> for SqueezeError {
    fn from(e: CeilingError) -> Self {
        SqueezeError::InvalidConfig(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SqueezeError>;

/// 打印错误及其 source 链到 stderr，并写入日志
pub fn report_error<E: std::error::Error + ?Sized>(context: &str, error: &E) {
    eprintln!("❌ {}: {}", context, error);
    tracing::error!(context = context, error = %error, "operation failed");

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        eprintln!("   {}. Caused by: {}", level, err);
        tracing::error!(depth = level, cause = %err, "caused by");
        source = err.source();
        level += 1;
    }
}

//! SSIM (Structural Similarity Index) Type-Safe Wrapper
//!
//! 相似度分数与相似度下限共用同一类型，范围 [0.0, 1.0]，1.0 表示完全相同。

use serde::{Serialize, Serializer};
use std::fmt;

/// 比较时的容差：低于下限不足 1e-4 的分数视为达标
pub const SSIM_EPSILON: f64 = 1e-4;

pub const SSIM_MIN: f64 = 0.0;

pub const SSIM_MAX: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SsimError {
    OutOfRange { value: f64 },
    InvalidFloat,
}

impl fmt::Display for SsimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsimError::OutOfRange { value } => {
                write!(f, "SSIM {:.6} out of range [0.0, 1.0]", value)
            }
            SsimError::InvalidFloat => write!(f, "Invalid SSIM: NaN or Infinity"),
        }
    }
}

impl std::error::Error for SsimError {}

/// 类型安全的 SSIM 值
///
/// # Examples
/// ```
/// use shared_utils::types::ssim::Ssim;
///
/// let floor = Ssim::new(0.9).unwrap();
/// let score = Ssim::new(0.93).unwrap();
/// assert!(score.meets(floor));
/// assert!(Ssim::new(1.5).is_err());
/// ```
#[derive(Clone, Copy)]
pub struct Ssim(f64);

impl Ssim {
    pub const PERFECT: Ssim = Ssim(1.0);

    pub fn new(value: f64) -> Result<Self, SsimError> {
        if value.is_nan() || value.is_infinite() {
            return Err(SsimError::InvalidFloat);
        }
        if !(SSIM_MIN..=SSIM_MAX).contains(&value) {
            return Err(SsimError::OutOfRange { value });
        }
        Ok(Self(value))
    }

    /// 原始 SSIM 在负相关窗口上可能小于 0，这里钳制到合法区间；NaN 记为 0
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() || value.is_infinite() {
            return Self(0.0);
        }
        Self(value.clamp(SSIM_MIN, SSIM_MAX))
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// 分数是否达到下限（带 SSIM_EPSILON 容差）
    #[inline]
    pub fn meets(&self, floor: Ssim) -> bool {
        self.0 >= floor.0 - SSIM_EPSILON
    }

    pub fn quality_description(&self) -> &'static str {
        if self.0 >= 0.99 {
            "Excellent (visually lossless)"
        } else if self.0 >= 0.95 {
            "Very Good"
        } else if self.0 >= 0.90 {
            "Good"
        } else if self.0 >= 0.80 {
            "Fair"
        } else {
            "Poor"
        }
    }
}

impl fmt::Debug for Ssim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssim({:.6})", self.0)
    }
}

impl fmt::Display for Ssim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl PartialEq for Ssim {
    fn eq(&self, other: &Self) -> bool {
        (self.0 - other.0).abs() < SSIM_EPSILON
    }
}

impl PartialOrd for Ssim {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Serialize for Ssim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

//! Quality Type-Safe Wrapper
//!
//! 编码质量（1-100）以及质量搜索区间的类型安全包装。
//!
//! ## 设计原理
//! - `Quality` 创建时验证范围，搜索代码中不再重复检查
//! - `QualityBounds` 保证 `1 <= min <= max <= 100`

use std::fmt;

/// 最低有效质量
pub const QUALITY_MIN: u8 = 1;

/// 最高有效质量
pub const QUALITY_MAX: u8 = 100;

/// 默认搜索下界
pub const DEFAULT_MIN_QUALITY: u8 = 10;

/// 默认搜索上界（95 以上体积增长远快于画质提升）
pub const DEFAULT_MAX_QUALITY: u8 = 95;

// ============================================================================
// QualityError
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum QualityError {
    /// 质量值超出 [1, 100]
    OutOfRange { value: i64 },
    /// 下界大于上界
    InvertedBounds { min: u8, max: u8 },
}

impl fmt::Display for QualityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityError::OutOfRange { value } => {
                write!(
                    f,
                    "quality {} out of range [{}, {}]",
                    value, QUALITY_MIN, QUALITY_MAX
                )
            }
            QualityError::InvertedBounds { min, max } => {
                write!(f, "quality bounds inverted: min {} > max {}", min, max)
            }
        }
    }
}

impl std::error::Error for QualityError {}

// ============================================================================
// Quality Newtype
// ============================================================================

/// 类型安全的编码质量
///
/// # Examples
/// ```
/// use shared_utils::types::quality::Quality;
///
/// let q = Quality::new(85).unwrap();
/// assert_eq!(q.value(), 85);
/// assert!(Quality::new(0).is_err());
/// assert!(Quality::new(101).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Result<Self, QualityError> {
        if !(QUALITY_MIN..=QUALITY_MAX).contains(&value) {
            return Err(QualityError::OutOfRange {
                value: value as i64,
            });
        }
        Ok(Self(value))
    }

    /// 钳制到有效范围（不返回错误）
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(QUALITY_MIN as i64, QUALITY_MAX as i64) as u8)
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quality({})", self.0)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> u8 {
        q.0
    }
}

// ============================================================================
// QualityBounds
// ============================================================================

/// 质量搜索区间 `[min, max]`，两端都包含
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityBounds {
    min: Quality,
    max: Quality,
}

impl QualityBounds {
    pub fn new(min: u8, max: u8) -> Result<Self, QualityError> {
        let min = Quality::new(min)?;
        let max = Quality::new(max)?;
        if min > max {
            return Err(QualityError::InvertedBounds {
                min: min.value(),
                max: max.value(),
            });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> Quality {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Quality {
        self.max
    }

    #[inline]
    pub fn contains(&self, q: Quality) -> bool {
        q >= self.min && q <= self.max
    }

    /// 区间内的质量档位数量
    pub fn span(&self) -> u32 {
        (self.max.value() - self.min.value()) as u32 + 1
    }

    /// 钳制到区间内
    pub fn clamp(&self, value: i64) -> Quality {
        Quality::clamped(value.clamp(self.min.value() as i64, self.max.value() as i64))
    }
}

impl Default for QualityBounds {
    fn default() -> Self {
        Self {
            min: Quality(DEFAULT_MIN_QUALITY),
            max: Quality(DEFAULT_MAX_QUALITY),
        }
    }
}

impl fmt::Display for QualityBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min.value(), self.max.value())
    }
}

//! FileSize / SizeCeiling Type-Safe Wrappers
//!
//! 文件大小与体积上限（含容差）的类型安全操作。

use std::fmt;

/// 默认体积上限 2 MiB
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;

// ============================================================================
// FileSize Newtype
// ============================================================================

/// 类型安全的文件大小（字节）
///
/// # Examples
/// ```
/// use shared_utils::types::file_size::FileSize;
///
/// let size = FileSize::from_mb(2);
/// assert_eq!(size.bytes(), 2_097_152);
/// assert_eq!(size.display(), "2.00 MB");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileSize(u64);

impl FileSize {
    pub const KB: u64 = 1024;
    pub const MB: u64 = 1024 * 1024;
    pub const GB: u64 = 1024 * 1024 * 1024;

    #[inline]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb * Self::MB)
    }

    #[inline]
    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// 解析带单位的大小：`500000`、`800K`、`2M`、`1.5MB`、`1G`（1024 进制）
    pub fn parse(text: &str) -> Option<FileSize> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        let number = upper.trim_end_matches(['B', 'I']);
        let (digits, multiplier) = match number.chars().last()? {
            'K' => (&number[..number.len() - 1], Self::KB),
            'M' => (&number[..number.len() - 1], Self::MB),
            'G' => (&number[..number.len() - 1], Self::GB),
            _ => (number, 1),
        };
        let value: f64 = digits.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(FileSize((value * multiplier as f64).round() as u64))
    }

    pub fn display(&self) -> String {
        if self.0 >= Self::GB {
            format!("{:.2} GB", self.0 as f64 / Self::GB as f64)
        } else if self.0 >= Self::MB {
            format!("{:.2} MB", self.0 as f64 / Self::MB as f64)
        } else if self.0 >= Self::KB {
            format!("{:.2} KB", self.0 as f64 / Self::KB as f64)
        } else {
            format!("{} B", self.0)
        }
    }
}

impl fmt::Debug for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileSize({} = {})", self.0, self.display())
    }
}

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<u64> for FileSize {
    fn from(bytes: u64) -> Self {
        Self::new(bytes)
    }
}

// ============================================================================
// SizeCeiling
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CeilingError {
    Zero,
    InvalidTolerance { value: f64 },
}

impl fmt::Display for CeilingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeilingError::Zero => write!(f, "size ceiling must be greater than zero"),
            CeilingError::InvalidTolerance { value } => {
                write!(f, "tolerance {} must be a finite value >= 0", value)
            }
        }
    }
}

impl std::error::Error for CeilingError {}

/// 体积上限：`bytes × (1 + tolerance)` 以内都算达标
///
/// # Examples
/// ```
/// use shared_utils::types::file_size::SizeCeiling;
///
/// let ceiling = SizeCeiling::new(100_000, 0.05).unwrap();
/// assert_eq!(ceiling.accepted_limit(), 105_000);
/// assert!(ceiling.fits(105_000));
/// assert!(!ceiling.fits(105_001));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeCeiling {
    bytes: u64,
    tolerance: f64,
}

impl SizeCeiling {
    pub fn new(bytes: u64, tolerance: f64) -> Result<Self, CeilingError> {
        if bytes == 0 {
            return Err(CeilingError::Zero);
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(CeilingError::InvalidTolerance { value: tolerance });
        }
        Ok(Self { bytes, tolerance })
    }

    pub fn strict(bytes: u64) -> Result<Self, CeilingError> {
        Self::new(bytes, 0.0)
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// 实际接受的最大字节数（向下取整）
    pub fn accepted_limit(&self) -> u64 {
        let widened = self.bytes as f64 * (1.0 + self.tolerance);
        if widened >= u64::MAX as f64 {
            u64::MAX
        } else {
            (widened.floor() as u64).max(self.bytes)
        }
    }

    #[inline]
    pub fn fits(&self, size: u64) -> bool {
        size <= self.accepted_limit()
    }

    /// 原始输入是否无需压缩（与未放宽的上限比较）
    #[inline]
    pub fn already_within(&self, input_size: u64) -> bool {
        input_size <= self.bytes
    }
}

impl fmt::Display for SizeCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tolerance > 0.0 {
            write!(
                f,
                "{} (+{:.1}% → {})",
                FileSize(self.bytes),
                self.tolerance * 100.0,
                FileSize(self.accepted_limit())
            )
        } else {
            write!(f, "{}", FileSize(self.bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size_creation() {
        assert_eq!(FileSize::new(1024).display(), "1.00 KB");
        assert_eq!(FileSize::from_mb(2).bytes(), DEFAULT_MAX_BYTES);
    }

    #[test]
    fn test_display() {
        assert_eq!(FileSize::new(500).display(), "500 B");
        assert_eq!(FileSize::new(1536).display(), "1.50 KB");
        assert_eq!(FileSize::from_mb(1).display(), "1.00 MB");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(FileSize::parse("500000"), Some(FileSize::new(500_000)));
        assert_eq!(FileSize::parse("800K"), Some(FileSize::new(800 * 1024)));
        assert_eq!(FileSize::parse("2M"), Some(FileSize::new(2_097_152)));
        assert_eq!(FileSize::parse("2mb"), Some(FileSize::new(2_097_152)));
        assert_eq!(FileSize::parse("1.5MiB"), Some(FileSize::new(1_572_864)));
        assert_eq!(FileSize::parse("1G"), Some(FileSize::new(FileSize::GB)));
        assert_eq!(FileSize::parse("abc"), None);
        assert_eq!(FileSize::parse(""), None);
        assert_eq!(FileSize::parse("-5M"), None);
    }

    #[test]
    fn test_ceiling_validation() {
        assert_eq!(SizeCeiling::new(0, 0.0).unwrap_err(), CeilingError::Zero);
        assert!(SizeCeiling::new(100, -0.1).is_err());
        assert!(SizeCeiling::new(100, f64::NAN).is_err());
        assert!(SizeCeiling::new(100, 0.0).is_ok());
    }

    #[test]
    fn test_ceiling_tolerance() {
        let strict = SizeCeiling::strict(2_097_152).unwrap();
        assert_eq!(strict.accepted_limit(), 2_097_152);
        assert!(strict.fits(2_097_152));
        assert!(!strict.fits(2_097_153));

        let loose = SizeCeiling::new(2_097_152, 0.05).unwrap();
        assert_eq!(loose.accepted_limit(), 2_202_009);
        assert!(loose.fits(2_200_000));
    }

    #[test]
    fn test_already_within_ignores_tolerance() {
        let ceiling = SizeCeiling::new(1000, 0.5).unwrap();
        assert!(ceiling.already_within(1000));
        assert!(!ceiling.already_within(1001));
        assert!(ceiling.fits(1400));
    }
}

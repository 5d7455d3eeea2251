//! Type-Safe Wrappers Module
//!
//! 把搜索算法依赖的数值假设放进类型系统：
//! - `quality`: 编码质量与搜索区间
//! - `ssim`: 相似度分数 / 下限
//! - `file_size`: 文件大小与带容差的体积上限
//! - `iteration`: 编码次数守卫

pub mod file_size;
pub mod iteration;
pub mod quality;
pub mod ssim;

pub use file_size::{CeilingError, FileSize, SizeCeiling, DEFAULT_MAX_BYTES};
pub use iteration::{IterationError, IterationGuard, DEFAULT_MAX_ATTEMPTS};
pub use quality::{Quality, QualityBounds, QualityError};
pub use ssim::{Ssim, SsimError, SSIM_EPSILON};

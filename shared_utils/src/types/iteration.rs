//! IterationGuard - 编码次数守卫
//!
//! 单次搜索的编码次数上限，防止非单调编码器或错误参数导致的失控循环。

use std::fmt;

/// 默认每次搜索最多编码次数（覆盖 1-100 全区间线性扫描仍有余量）
pub const DEFAULT_MAX_ATTEMPTS: u32 = 128;

/// 任何配置都不能超过的硬上限
pub const EMERGENCY_MAX_ATTEMPTS: u32 = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct IterationError {
    pub current: u32,
    pub max: u32,
    pub context: String,
}

impl fmt::Display for IterationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Iteration limit exceeded: {}/{} in {}",
            self.current, self.max, self.context
        )
    }
}

impl std::error::Error for IterationError {}

#[derive(Debug, Clone)]
pub struct IterationGuard {
    current: u32,
    max: u32,
    context: String,
}

impl IterationGuard {
    pub fn new(max: u32, context: &str) -> Self {
        Self {
            current: 0,
            max: max.clamp(1, EMERGENCY_MAX_ATTEMPTS),
            context: context.to_string(),
        }
    }

    pub fn increment(&mut self) -> Result<u32, IterationError> {
        self.current += 1;
        if self.current > self.max {
            Err(IterationError {
                current: self.current,
                max: self.max,
                context: self.context.clone(),
            })
        } else {
            Ok(self.current)
        }
    }

    #[inline]
    pub fn current(&self) -> u32 {
        self.current
    }

    #[inline]
    pub fn max(&self) -> u32 {
        self.max
    }

}

impl Default for IterationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, "quality search")
    }
}

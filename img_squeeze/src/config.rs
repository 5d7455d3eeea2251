//! Squeeze Configuration
//!
//! 配置来源优先级：命令行 > `--config` JSON 文件 > 默认值。
//! `validate()` 把原始数值转换成搜索引擎使用的类型，非法值统一报 `InvalidConfig`。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared_utils::errors::SqueezeError;
use shared_utils::image_metrics::DEFAULT_SSIM_MAX_SIDE;
use shared_utils::search::{SearchOptions, SearchPolicy, DEFAULT_STEP};
use shared_utils::types::quality::{DEFAULT_MAX_QUALITY, DEFAULT_MIN_QUALITY};
use shared_utils::types::{
    QualityBounds, SizeCeiling, Ssim, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BYTES,
};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqueezeConfig {
    /// 每个输出文件的体积上限（字节）
    pub max_bytes: u64,
    /// 允许超出上限的比例，0.05 = 5%
    pub tolerance: f64,
    pub min_quality: u8,
    pub max_quality: u8,
    /// 设置后启用相似度门控
    pub min_similarity: Option<f64>,
    pub policy: SearchPolicy,
    pub step: u8,
    /// None → thread_manager 默认值
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub include_hidden: bool,
    /// 单文件出错时仍复制原文件到输出树
    pub copy_on_error: bool,
    /// SSIM 评分前的最长边，0 表示不缩放
    pub ssim_max_side: u32,
    pub max_attempts: u32,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            tolerance: 0.0,
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: DEFAULT_MAX_QUALITY,
            min_similarity: None,
            policy: SearchPolicy::Binary,
            step: DEFAULT_STEP,
            jobs: None,
            timeout_secs: None,
            include_hidden: false,
            copy_on_error: true,
            ssim_max_side: DEFAULT_SSIM_MAX_SIDE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// 校验后的设置，直接交给 squeeze_api / runner
#[derive(Debug, Clone)]
pub struct SqueezeSettings {
    pub ceiling: SizeCeiling,
    pub bounds: QualityBounds,
    pub similarity_floor: Option<Ssim>,
    pub options: SearchOptions,
    pub ssim_max_side: u32,
    pub jobs: Option<usize>,
    pub timeout: Option<Duration>,
    pub include_hidden: bool,
    pub copy_on_error: bool,
}

impl SqueezeConfig {
    /// 读取 JSON 配置；`path` 为 None 时返回默认值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<SqueezeSettings, SqueezeError> {
        let ceiling = SizeCeiling::new(self.max_bytes, self.tolerance)?;
        let bounds = QualityBounds::new(self.min_quality, self.max_quality)?;
        let similarity_floor = self.min_similarity.map(Ssim::new).transpose()?;

        if self.step == 0 {
            return Err(SqueezeError::InvalidConfig(
                "step must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SqueezeError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.jobs == Some(0) {
            return Err(SqueezeError::InvalidConfig(
                "jobs must be at least 1".to_string(),
            ));
        }

        Ok(SqueezeSettings {
            ceiling,
            bounds,
            similarity_floor,
            options: SearchOptions::new(self.policy, self.step)
                .with_max_attempts(self.max_attempts),
            ssim_max_side: self.ssim_max_side,
            jobs: self.jobs,
            timeout: self.timeout_secs.map(Duration::from_secs),
            include_hidden: self.include_hidden,
            copy_on_error: self.copy_on_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SqueezeConfig::default();
        assert_eq!(config.max_bytes, 2_097_152);
        assert_eq!(config.min_quality, 10);
        assert_eq!(config.max_quality, 95);
        assert_eq!(config.step, 5);
        assert_eq!(config.policy, SearchPolicy::Binary);
        assert!(config.copy_on_error);

        let settings = config.validate().unwrap();
        assert_eq!(settings.ceiling.accepted_limit(), 2_097_152);
        assert!(settings.similarity_floor.is_none());
        assert_eq!(settings.options.max_attempts, 128);
    }

    #[test]
    fn test_load_partial_json_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("squeeze.json");
        std::fs::write(
            &path,
            r#"{ "max_bytes": 500000, "min_similarity": 0.92, "policy": "linear" }"#,
        )
        .unwrap();

        let config = SqueezeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_bytes, 500_000);
        assert_eq!(config.min_similarity, Some(0.92));
        assert_eq!(config.policy, SearchPolicy::Linear);
        assert_eq!(config.max_quality, 95);
    }

    #[test]
    fn test_load_rejects_unknown_fields_and_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, r#"{ "max_bites": 1 }"#).unwrap();
        assert!(SqueezeConfig::load(Some(&path)).is_err());
        assert!(SqueezeConfig::load(Some(&temp.path().join("missing.json"))).is_err());
        assert_eq!(SqueezeConfig::load(None).unwrap(), SqueezeConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            SqueezeConfig { max_bytes: 0, ..Default::default() },
            SqueezeConfig { tolerance: -0.1, ..Default::default() },
            SqueezeConfig { min_quality: 0, ..Default::default() },
            SqueezeConfig { min_quality: 90, max_quality: 80, ..Default::default() },
            SqueezeConfig { max_quality: 101, ..Default::default() },
            SqueezeConfig { min_similarity: Some(1.5), ..Default::default() },
            SqueezeConfig { step: 0, ..Default::default() },
            SqueezeConfig { jobs: Some(0), ..Default::default() },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, SqueezeError::InvalidConfig(_)),
                "{:?} gave {:?}",
                config,
                err
            );
        }
    }
}

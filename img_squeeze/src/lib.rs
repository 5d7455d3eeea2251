//! img-squeeze: 把目录树中的 JPEG 压到体积上限以内
//!
//! - `config`: JSON 配置与校验
//! - `squeeze_api`: 单文件处理（搜索、写出、回退复制）
//! - `runner`: 并行镜像整个目录树

pub mod config;
pub mod runner;
pub mod squeeze_api;

pub use config::{SqueezeConfig, SqueezeSettings};
pub use runner::{run_batch, BatchRun};
pub use squeeze_api::{
    probe_bytes, probe_file, squeeze_file, FallbackReason, FileAction, FileOutcome, ProbeReport,
};

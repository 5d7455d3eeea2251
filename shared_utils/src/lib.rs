//! Shared Utilities for img-squeeze
//!
//! - `search`: 体积上限下的 JPEG 质量搜索（二分 / 线性 / 回退上扫，相似度门控）
//! - `codec` / `image_metrics`: JPEG 重编码、解码与 SSIM 评分
//! - `types` / `errors`: 类型安全的数值包装与统一错误
//! - `batch` / `file_copier` / `safety`: 目录扫描、树镜像、原子写入、安全检查
//! - `logging` / `progress` / `report` / `thread_manager`: 日志、进度条、汇总报告、线程数

pub mod batch;
pub mod codec;
pub mod errors;
pub mod file_copier;
pub mod image_metrics;
pub mod logging;
pub mod progress;
pub mod report;
pub mod safety;
pub mod search;
pub mod thread_manager;
pub mod types;

pub use batch::{scan_tree, BatchResult, SourceTree};
pub use codec::{decode_to_raster, ImageKind, JpegReencoder, JPEG_EXTENSIONS};
pub use errors::{report_error, ErrorCategory, SqueezeError};
pub use file_copier::{copy_original, mirror_dirs, mirror_path, preserve_mtime, write_atomic};
pub use image_metrics::{calculate_ssim, SsimScorer, DEFAULT_SSIM_MAX_SIDE};
pub use logging::{init_logging, LogConfig};
pub use progress::{create_progress_bar, format_bytes, format_duration};
pub use report::{print_summary_report, render_summary_report, BatchSummary};
pub use safety::{check_dangerous_directory, check_mirror_roots};
pub use search::{
    compress, detect_non_monotonic, CancelToken, Compliance, CompressionAttempt,
    CompressionRequest, CompressionResult, QualityEncoder, SearchOptions, SearchOutcome,
    SearchPolicy, SimilarityScorer,
};
pub use thread_manager::{get_optimal_threads, resolve_jobs};
pub use types::{FileSize, Quality, QualityBounds, SizeCeiling, Ssim};

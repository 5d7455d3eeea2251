//! Squeeze API Module
//!
//! 单文件处理层：决定一个源文件在输出树中变成什么。
//! - 非 JPEG → 原样复制
//! - 已在上限内 → 原样复制
//! - 搜索成功且结果比原文件小 → 写入重新编码的字节
//! - 其余情况 → 原样复制（回退）
//!
//! 任何情况下输出都保留源文件的修改时间。

use crate::config::SqueezeSettings;
use serde::Serialize;
use shared_utils::codec::{ImageKind, JpegReencoder};
use shared_utils::errors::{Result, SqueezeError};
use shared_utils::file_copier::{copy_original, preserve_mtime, write_atomic};
use shared_utils::image_metrics::SsimScorer;
use shared_utils::search::{
    compress, detect_non_monotonic, CancelToken, Compliance, CompressionRequest,
    CompressionResult, SearchOutcome, SimilarityScorer,
};
use shared_utils::types::Ssim;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// 没有任何质量满足约束
    Unsatisfiable,
    /// 接受的质量不比原文件小
    NotSmaller,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileAction {
    Compressed {
        quality: u8,
        similarity: Option<Ssim>,
        compliance: Compliance,
    },
    WithinBudget,
    PassedThrough,
    FallbackCopied { reason: FallbackReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub action: FileAction,
    pub input_size: u64,
    pub output_size: u64,
    pub encodes: u32,
}

/// 对内存中的 JPEG 运行质量搜索。
///
/// 输入已在上限内时不解码、不编码。设置了相似度下限时，
/// 参考图取自解码后的源图。
pub fn probe_bytes(
    input: &[u8],
    settings: &SqueezeSettings,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    let request = CompressionRequest::new(input, settings.ceiling, settings.bounds)
        .with_similarity_floor(settings.similarity_floor)
        .with_options(settings.options);
    if !request.needs_compression() {
        return Ok(SearchOutcome::not_needed(request.input_size()));
    }

    cancel.check()?;
    let mut encoder = JpegReencoder::from_bytes(input)?;
    let mut scorer = settings
        .similarity_floor
        .map(|_| SsimScorer::new(encoder.raster(), settings.ssim_max_side));

    compress(
        &request,
        &mut encoder,
        scorer.as_mut().map(|s| s as &mut dyn SimilarityScorer),
        cancel,
    )
}

fn copy_through(src: &Path, dest: &Path) -> Result<u64> {
    let written = copy_original(src, dest)?;
    preserve_mtime(src, dest);
    Ok(written)
}

/// 处理一个文件，写出 `dest`。出错时不产生输出，由调用方决定是否回退复制。
pub fn squeeze_file(
    src: &Path,
    dest: &Path,
    settings: &SqueezeSettings,
    cancel: &CancelToken,
) -> Result<FileOutcome> {
    cancel.check()?;
    let input_size = std::fs::metadata(src)
        .map_err(|e| SqueezeError::io(src, e))?
        .len();

    let outcome = |action: FileAction, output_size: u64, encodes: u32| FileOutcome {
        source: src.to_path_buf(),
        output: dest.to_path_buf(),
        action,
        input_size,
        output_size,
        encodes,
    };

    if !ImageKind::from_path(src).is_searchable() {
        let written = copy_through(src, dest)?;
        debug!(path = ?src, "passed through");
        return Ok(outcome(FileAction::PassedThrough, written, 0));
    }
    if settings.ceiling.already_within(input_size) {
        let written = copy_through(src, dest)?;
        debug!(path = ?src, size = input_size, "within budget");
        return Ok(outcome(FileAction::WithinBudget, written, 0));
    }

    let input = std::fs::read(src).map_err(|e| SqueezeError::io(src, e))?;
    let search = probe_bytes(&input, settings, cancel)?;

    match search.result {
        CompressionResult::NotNeeded { .. } => {
            let written = copy_through(src, dest)?;
            Ok(outcome(FileAction::WithinBudget, written, 0))
        }
        CompressionResult::Satisfied {
            quality,
            size,
            similarity,
            compliance,
        } => {
            let Some(bytes) = search.output else {
                return Err(SqueezeError::encode(format!(
                    "no output retained for accepted {}",
                    quality
                )));
            };
            if size >= input_size {
                let written = copy_through(src, dest)?;
                info!(
                    path = ?src,
                    quality = quality.value(),
                    size,
                    input_size,
                    "re-encode not smaller, copying original"
                );
                return Ok(outcome(
                    FileAction::FallbackCopied {
                        reason: FallbackReason::NotSmaller,
                    },
                    written,
                    search.encodes,
                ));
            }

            write_atomic(dest, &bytes)?;
            preserve_mtime(src, dest);
            info!(
                path = ?src,
                quality = quality.value(),
                input_size,
                output_size = size,
                encodes = search.encodes,
                %compliance,
                "compressed"
            );
            Ok(outcome(
                FileAction::Compressed {
                    quality: quality.value(),
                    similarity,
                    compliance,
                },
                size,
                search.encodes,
            ))
        }
        CompressionResult::Unsatisfiable => {
            let written = copy_through(src, dest)?;
            info!(
                path = ?src,
                input_size,
                limit = settings.ceiling.accepted_limit(),
                encodes = search.encodes,
                "no quality satisfies constraints, copying original"
            );
            Ok(outcome(
                FileAction::FallbackCopied {
                    reason: FallbackReason::Unsatisfiable,
                },
                written,
                search.encodes,
            ))
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Probe (dry run)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub quality: u8,
    pub size: u64,
    pub similarity: Option<Ssim>,
}

/// `probe` 子命令的输出：完整的探测轨迹，不写任何文件
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub path: PathBuf,
    pub input_size: u64,
    pub ceiling: u64,
    pub accepted_limit: u64,
    pub outcome: &'static str,
    pub quality: Option<u8>,
    pub output_size: Option<u64>,
    pub similarity: Option<Ssim>,
    pub compliance: Option<Compliance>,
    pub encodes: u32,
    pub attempts: Vec<AttemptRecord>,
    /// (较低质量, 较高质量)：较高质量的输出反而更小
    pub non_monotonic: Option<(u8, u8)>,
}

pub fn probe_file(
    path: &Path,
    settings: &SqueezeSettings,
    cancel: &CancelToken,
) -> Result<ProbeReport> {
    if !ImageKind::from_path(path).is_searchable() {
        return Err(SqueezeError::decode(format!(
            "{} is not a JPEG file",
            path.display()
        )));
    }
    let input = std::fs::read(path).map_err(|e| SqueezeError::io(path, e))?;
    let search = probe_bytes(&input, settings, cancel)?;

    let (outcome, quality, output_size, similarity, compliance) = match search.result {
        CompressionResult::NotNeeded { size } => ("not_needed", None, Some(size), None, None),
        CompressionResult::Satisfied {
            quality,
            size,
            similarity,
            compliance,
        } => (
            "satisfied",
            Some(quality.value()),
            Some(size),
            similarity,
            Some(compliance),
        ),
        CompressionResult::Unsatisfiable => ("unsatisfiable", None, None, None, None),
    };

    Ok(ProbeReport {
        path: path.to_path_buf(),
        input_size: input.len() as u64,
        ceiling: settings.ceiling.bytes(),
        accepted_limit: settings.ceiling.accepted_limit(),
        outcome,
        quality,
        output_size,
        similarity,
        compliance,
        encodes: search.encodes,
        non_monotonic: detect_non_monotonic(&search.attempts)
            .map(|(low, high)| (low.value(), high.value())),
        attempts: search
            .attempts
            .iter()
            .map(|a| AttemptRecord {
                quality: a.quality.value(),
                size: a.size,
                similarity: a.similarity,
            })
            .collect(),
    })
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::codecs::jpeg::JpegEncoder;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::path::Path;

    /// 平滑渐变叠加伪随机纹理，高质量下体积大、低质量下仍可辨认
    pub fn textured(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            let noise = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) % 48;
            Rgb([
                ((x * 255 / w.max(1)) as u8).saturating_add(noise as u8),
                ((y * 255 / h.max(1)) as u8).saturating_sub(noise as u8),
                (((x + y) * 2) % 200) as u8 + (noise as u8 / 2),
            ])
        }))
    }

    pub fn jpeg_bytes(img: &DynamicImage, quality: u8) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
            .unwrap();
        out
    }

    pub fn write_jpeg(path: &Path, w: u32, h: u32, quality: u8) -> u64 {
        let bytes = jpeg_bytes(&textured(w, h), quality);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, &bytes).unwrap();
        bytes.len() as u64
    }
}

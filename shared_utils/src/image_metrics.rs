//! Image Similarity Metrics
//!
//! 11x11 高斯窗口的 SSIM（Wang et al. 2004），在亮度图上计算。
//! 两幅图先统一为 8-bit 亮度，RGB / 灰度 / 带 alpha 的来源因此可以直接比较。
//! 尺寸不一致返回错误，不会静默给出 0 分。

use crate::codec::decode_to_raster;
use crate::errors::{Result, SqueezeError};
use crate::search::SimilarityScorer;
use crate::types::Ssim;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use rayon::prelude::*;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;
/// (k_i * L)^2，避免低对比度区域除零
const C1: f64 = (K1 * L) * (K1 * L);
const C2: f64 = (K2 * L) * (K2 * L);

const WINDOW_SIZE: usize = 11;

/// 默认评分前把长边缩到 1024 以内
pub const DEFAULT_SSIM_MAX_SIDE: u32 = 1024;

fn gaussian_window() -> [[f64; WINDOW_SIZE]; WINDOW_SIZE] {
    let sigma = 1.5;
    let center = (WINDOW_SIZE / 2) as f64;
    let mut window = [[0.0f64; WINDOW_SIZE]; WINDOW_SIZE];
    let mut sum = 0.0;

    for (i, row) in window.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let dy = i as f64 - center;
            let dx = j as f64 - center;
            *cell = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            sum += *cell;
        }
    }
    window
        .iter_mut()
        .flat_map(|row| row.iter_mut())
        .for_each(|cell| *cell /= sum);
    window
}

/// 两幅图的 SSIM，先统一为 8-bit 亮度
pub fn calculate_ssim(original: &DynamicImage, candidate: &DynamicImage) -> Result<f64> {
    let expected = original.dimensions();
    let actual = candidate.dimensions();
    if expected != actual {
        return Err(SqueezeError::DimensionMismatch { expected, actual });
    }
    ssim_luma(&original.to_luma8(), &candidate.to_luma8())
}

/// 亮度图 SSIM；小于窗口的图走全局统计
pub fn ssim_luma(original: &GrayImage, candidate: &GrayImage) -> Result<f64> {
    let expected = original.dimensions();
    let actual = candidate.dimensions();
    if expected != actual {
        return Err(SqueezeError::DimensionMismatch { expected, actual });
    }

    let width = expected.0 as usize;
    let height = expected.1 as usize;
    if width == 0 || height == 0 {
        return Err(SqueezeError::decode("empty raster"));
    }
    if width < WINDOW_SIZE || height < WINDOW_SIZE {
        return Ok(global_ssim(original.as_raw(), candidate.as_raw()));
    }

    let window = gaussian_window();
    let a = original.as_raw();
    let b = candidate.as_raw();
    let cols = width - WINDOW_SIZE + 1;
    let rows = height - WINDOW_SIZE + 1;

    let total: f64 = (0..rows)
        .into_par_iter()
        .map(|y| {
            (0..cols)
                .map(|x| window_ssim(a, b, width, x, y, &window))
                .sum::<f64>()
        })
        .sum();

    Ok(total / (rows * cols) as f64)
}

fn window_ssim(
    a: &[u8],
    b: &[u8],
    stride: usize,
    x: usize,
    y: usize,
    window: &[[f64; WINDOW_SIZE]; WINDOW_SIZE],
) -> f64 {
    let mut mean_a = 0.0;
    let mut mean_b = 0.0;
    let mut sq_a = 0.0;
    let mut sq_b = 0.0;
    let mut cross = 0.0;

    for (i, weights) in window.iter().enumerate() {
        let offset = (y + i) * stride + x;
        let row_a = &a[offset..offset + WINDOW_SIZE];
        let row_b = &b[offset..offset + WINDOW_SIZE];
        for ((&w, &pa), &pb) in weights.iter().zip(row_a).zip(row_b) {
            let pa = f64::from(pa);
            let pb = f64::from(pb);
            mean_a += w * pa;
            mean_b += w * pb;
            sq_a += w * pa * pa;
            sq_b += w * pb * pb;
            cross += w * pa * pb;
        }
    }

    let var_a = sq_a - mean_a * mean_a;
    let var_b = sq_b - mean_b * mean_b;
    let cov = cross - mean_a * mean_b;

    let numerator = (2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2);
    numerator / denominator
}

fn global_ssim(a: &[u8], b: &[u8]) -> f64 {
    let n = a.len() as f64;
    let (mut sum_a, mut sum_b, mut sum_aa, mut sum_bb, mut sum_ab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&pa, &pb) in a.iter().zip(b) {
        let pa = f64::from(pa);
        let pb = f64::from(pb);
        sum_a += pa;
        sum_b += pb;
        sum_aa += pa * pa;
        sum_bb += pb * pb;
        sum_ab += pa * pb;
    }

    let mean_a = sum_a / n;
    let mean_b = sum_b / n;
    // 单像素时方差项为零，只剩亮度项
    let (var_a, var_b, cov) = if n > 1.0 {
        let n1 = n - 1.0;
        (
            (sum_aa - n * mean_a * mean_a) / n1,
            (sum_bb - n * mean_b * mean_b) / n1,
            (sum_ab - n * mean_a * mean_b) / n1,
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let numerator = (2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2);
    numerator / denominator
}

/// 长边超过 `max_side` 时按比例缩小；`max_side == 0` 表示不缩放
fn downsample(gray: GrayImage, max_side: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if max_side == 0 || longest <= max_side {
        return gray;
    }
    let scale = f64::from(max_side) / f64::from(longest);
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    image::imageops::resize(&gray, nw, nh, FilterType::Triangle)
}

// ═══════════════════════════════════════════════════════════════
// SsimScorer
// ═══════════════════════════════════════════════════════════════

/// 持有原图（已转亮度并缩放）的评分器，每个候选只需解码一次
pub struct SsimScorer {
    reference: GrayImage,
    dimensions: (u32, u32),
    max_side: u32,
}

impl SsimScorer {
    pub fn new(original: &DynamicImage, max_side: u32) -> Self {
        Self {
            reference: downsample(original.to_luma8(), max_side),
            dimensions: original.dimensions(),
            max_side,
        }
    }

    pub fn score_raster(&self, candidate: &DynamicImage) -> Result<Ssim> {
        let actual = candidate.dimensions();
        if actual != self.dimensions {
            return Err(SqueezeError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        let gray = downsample(candidate.to_luma8(), self.max_side);
        Ok(Ssim::clamped(ssim_luma(&self.reference, &gray)?))
    }
}

impl SimilarityScorer for SsimScorer {
    fn score(&mut self, candidate: &[u8]) -> Result<Ssim> {
        let raster = decode_to_raster(candidate)?;
        self.score_raster(&raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_gaussian_window_normalised() {
        let window = gaussian_window();
        let sum: f64 = window.iter().flat_map(|row| row.iter()).sum();
        assert!((sum - 1.0).abs() < 1e-10);
        assert!(window[5][5] > window[0][0]);
    }

    #[test]
    fn test_identical_images_score_one() {
        let img = gradient(64, 48);
        let ssim = calculate_ssim(&img, &img).unwrap();
        assert!((ssim - 1.0).abs() < 1e-9, "ssim = {}", ssim);
    }

    #[test]
    fn test_opposite_images_score_low() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([255, 255, 255])));
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([0, 0, 0])));
        assert!(calculate_ssim(&white, &black).unwrap() < 0.1);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let err = calculate_ssim(&gradient(50, 50), &gradient(60, 50)).unwrap_err();
        match err {
            SqueezeError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, (50, 50));
                assert_eq!(actual, (60, 50));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_small_images_use_global_path() {
        let a = GrayImage::from_pixel(8, 8, Luma([100]));
        assert!((ssim_luma(&a, &a).unwrap() - 1.0).abs() < 1e-9);

        let one = GrayImage::from_pixel(1, 1, Luma([100]));
        assert!((ssim_luma(&one, &one).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_counts_normalised_to_luma() {
        let rgb = gradient(32, 32);
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 32, |x, y| {
            let p = rgb.get_pixel(x, y);
            Rgba([p[0], p[1], p[2], 255])
        }));
        let grey = DynamicImage::ImageLuma8(rgb.to_luma8());
        assert!(calculate_ssim(&rgb, &rgba).unwrap() > 0.999);
        assert!(calculate_ssim(&rgb, &grey).unwrap() > 0.999);
    }

    #[test]
    fn test_downsample_keeps_aspect() {
        let big = GrayImage::from_pixel(400, 200, Luma([10]));
        let small = downsample(big, 100);
        assert_eq!(small.dimensions(), (100, 50));

        let untouched = downsample(GrayImage::from_pixel(50, 20, Luma([10])), 100);
        assert_eq!(untouched.dimensions(), (50, 20));

        let unlimited = downsample(GrayImage::from_pixel(300, 20, Luma([10])), 0);
        assert_eq!(unlimited.dimensions(), (300, 20));
    }

    #[test]
    fn test_scorer_rejects_dimension_mismatch() {
        let scorer = SsimScorer::new(&gradient(64, 64), 32);
        assert!((scorer.score_raster(&gradient(64, 64)).unwrap().value() - 1.0).abs() < 1e-6);
        assert!(matches!(
            scorer.score_raster(&gradient(32, 64)),
            Err(SqueezeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_scorer_decode_failure() {
        let mut scorer = SsimScorer::new(&gradient(16, 16), 0);
        assert!(matches!(
            scorer.score(b"not an image"),
            Err(SqueezeError::DecodeFailure { .. })
        ));
    }
}

//! JPEG Codec
//!
//! 把 `image` crate 包装成搜索引擎需要的编码 / 解码接口。
//! 源图只解码一次，之后每个质量只做一次编码。

use crate::errors::{Result, SqueezeError};
use crate::search::QualityEncoder;
use crate::types::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView};
use std::path::Path;

/// 参与质量搜索的扩展名（小写比较）
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "jfif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// 有质量参数的有损格式，参与搜索
    Jpeg,
    /// 其它一切文件，原样复制
    PassThrough,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if JPEG_EXTENSIONS.contains(&ext.as_str()) => ImageKind::Jpeg,
            _ => ImageKind::PassThrough,
        }
    }

    #[inline]
    pub fn is_searchable(&self) -> bool {
        matches!(self, ImageKind::Jpeg)
    }
}

pub fn decode_to_raster(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(SqueezeError::decode)
}

/// JPEG 不支持 alpha 和 16-bit：灰度类转 L8，其余转 RGB8
fn normalise_for_jpeg(raster: DynamicImage) -> DynamicImage {
    match raster.color() {
        ColorType::L8 | ColorType::Rgb8 => raster,
        ColorType::La8 | ColorType::L16 | ColorType::La16 => {
            DynamicImage::ImageLuma8(raster.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(raster.to_rgb8()),
    }
}

pub struct JpegReencoder {
    raster: DynamicImage,
    /// 首次编码后记录的输出大小，用于预分配
    size_hint: usize,
}

impl JpegReencoder {
    /// 源图解码失败意味着无法重新编码，归为 `EncodeFailure`
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let raster = image::load_from_memory(input)
            .map_err(|e| SqueezeError::encode(format!("cannot decode source: {}", e)))?;
        Ok(Self::from_raster(raster))
    }

    pub fn from_raster(raster: DynamicImage) -> Self {
        Self {
            raster: normalise_for_jpeg(raster),
            size_hint: 0,
        }
    }

    pub fn raster(&self) -> &DynamicImage {
        &self.raster
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    pub fn encode_at(&mut self, quality: Quality) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size_hint);
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.value());
        self.raster
            .write_with_encoder(encoder)
            .map_err(|e| SqueezeError::encode(format!("jpeg encode at {}: {}", quality, e)))?;
        self.size_hint = self.size_hint.max(out.len());
        Ok(out)
    }
}

impl QualityEncoder for JpegReencoder {
    fn encode(&mut self, quality: Quality) -> Result<Vec<u8>> {
        self.encode_at(quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    fn noisy(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) as u8;
            Rgb([v, (x * 3) as u8, (y * 5) as u8])
        }))
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("a/b.jpg")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("B.JPEG")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("x.jfif")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("x.jpe")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("x.png")), ImageKind::PassThrough);
        assert_eq!(ImageKind::from_path(Path::new("README")), ImageKind::PassThrough);
        assert!(!ImageKind::PassThrough.is_searchable());
    }

    #[test]
    fn test_reencode_roundtrip_dimensions() {
        let mut encoder = JpegReencoder::from_raster(noisy(64, 40));
        let bytes = encoder.encode(Quality::new(80).unwrap()).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = decode_to_raster(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 40));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let mut encoder = JpegReencoder::from_raster(noisy(128, 128));
        let high = encoder.encode(Quality::new(95).unwrap()).unwrap();
        let low = encoder.encode(Quality::new(10).unwrap()).unwrap();
        assert!(low.len() < high.len(), "{} vs {}", low.len(), high.len());
    }

    #[test]
    fn test_deterministic_output() {
        let mut encoder = JpegReencoder::from_raster(noisy(48, 48));
        let q = Quality::new(60).unwrap();
        assert_eq!(encoder.encode(q).unwrap(), encoder.encode(q).unwrap());
    }

    #[test]
    fn test_alpha_sources_are_normalised() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 128])));
        let encoder = JpegReencoder::from_raster(rgba);
        assert_eq!(encoder.raster().color(), ColorType::Rgb8);

        let la = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(8, 8, LumaA([9u8, 200])));
        let mut encoder = JpegReencoder::from_raster(la);
        assert_eq!(encoder.raster().color(), ColorType::L8);
        assert!(encoder.encode(Quality::new(50).unwrap()).is_ok());
    }

    #[test]
    fn test_garbage_source_is_encode_failure() {
        let err = JpegReencoder::from_bytes(b"definitely not a jpeg").err().unwrap();
        assert!(matches!(err, SqueezeError::EncodeFailure { .. }));

        let err = decode_to_raster(b"junk").unwrap_err();
        assert!(matches!(err, SqueezeError::DecodeFailure { .. }));
    }
}

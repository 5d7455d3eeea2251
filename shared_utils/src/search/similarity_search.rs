//! Similarity-Gated Search Engine
//!
//! 在体积上限之外再加一个相似度下限：
//! 1. 严格阶段：`体积达标 AND 相似度达标`，取最高质量
//!    - 按步长下降会跳过档位；步进无解时在放得下的区间内逐档补扫，
//!      已探测过的同时达标候选作为补扫的下界
//! 2. 放宽阶段（严格阶段无解时）：半步上扫，`体积达标 OR 相似度达标` 即接受，
//!    结果记录为 `SizeOnly` / `SimilarityOnly` 并输出警告
//! 3. 仍无解则 `Unsatisfiable`，由调用方复制原文件

use super::{
    binary_search, linear_descent, upward_sweep, CancelToken, Compliance, CompressionAttempt,
    CompressionResult, Prober, QualityEncoder, SearchOptions, SearchOutcome, SearchPolicy,
    SimilarityScorer,
};
use crate::errors::Result;
use crate::types::{QualityBounds, SizeCeiling, Ssim};
use tracing::{debug, warn};

#[allow(clippy::too_many_arguments)]
pub fn search<E>(
    encoder: &mut E,
    scorer: &mut dyn SimilarityScorer,
    ceiling: SizeCeiling,
    floor: Ssim,
    bounds: QualityBounds,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<SearchOutcome>
where
    E: QualityEncoder + ?Sized,
{
    let limit = ceiling.accepted_limit();
    let fits = |a: &CompressionAttempt| ceiling.fits(a.size);
    let similar = |a: &CompressionAttempt| a.meets_similarity(floor);
    let both = |a: &CompressionAttempt| fits(a) && similar(a);

    let mut prober = Prober::new(
        encoder,
        Some(scorer),
        cancel,
        options.max_attempts,
        "similarity search",
    );

    let strict = match options.policy {
        SearchPolicy::Binary => match binary_search(&mut prober, bounds, limit, fits)? {
            Some(top) if both(&top) => Some(top),
            Some(top) if top.quality > bounds.min() => {
                debug!(
                    quality = top.quality.value(),
                    ssim = top.similarity.map(|s| s.value()),
                    floor = floor.value(),
                    "highest fitting quality is below the similarity floor, descending"
                );
                let start = bounds.clamp(
                    i64::from(top.quality.value()) - i64::from(options.step()),
                );
                linear_descent(&mut prober, start, bounds, options.step(), limit, both)?
            }
            _ => None,
        },
        SearchPolicy::Linear => {
            linear_descent(&mut prober, bounds.max(), bounds, options.step(), limit, both)?
        }
    };

    let strict = match strict {
        Some(attempt) => Some(attempt),
        None => gap_scan(&mut prober, bounds, limit, fits, both)?,
    };

    if let Some(attempt) = strict {
        return prober.finish(CompressionResult::accept(&attempt, Compliance::Full));
    }

    let loose = |a: &CompressionAttempt| fits(a) || similar(a);
    let relaxed = upward_sweep(&mut prober, bounds, options, limit, loose)?;

    let result = match relaxed {
        Some(attempt) => {
            let compliance = match (fits(&attempt), similar(&attempt)) {
                (true, true) => Compliance::Full,
                (true, false) => Compliance::SizeOnly,
                (false, _) => Compliance::SimilarityOnly,
            };
            if compliance != Compliance::Full {
                warn!(
                    quality = attempt.quality.value(),
                    size = attempt.size,
                    limit,
                    ssim = attempt.similarity.map(|s| s.value()),
                    floor = floor.value(),
                    compliance = %compliance,
                    "no quality meets both constraints, accepting relaxed candidate"
                );
            }
            CompressionResult::accept(&attempt, compliance)
        }
        None => {
            debug!(limit, floor = floor.value(), "no quality meets either constraint");
            CompressionResult::Unsatisfiable
        }
    };
    prober.finish(result)
}

/// 逐档补扫：从最低的放不下质量之下一档开始，下降到缓存中最佳的
/// 同时达标候选（没有则到 qmin）。缓存命中不重新编码。
fn gap_scan<E, F, B>(
    prober: &mut Prober<'_, E>,
    bounds: QualityBounds,
    limit: u64,
    fits: F,
    both: B,
) -> Result<Option<CompressionAttempt>>
where
    E: QualityEncoder + ?Sized,
    F: Fn(&CompressionAttempt) -> bool,
    B: Fn(&CompressionAttempt) -> bool,
{
    let top = match prober.lowest_cached(|a| !fits(a)) {
        Some(q) if q <= bounds.min() => return Ok(prober.best_cached(&both)),
        Some(q) => q.value() - 1,
        None => bounds.max().value(),
    };
    let bottom = prober
        .best_cached(&both)
        .map_or(bounds.min().value(), |a| a.quality.value());
    if bottom > top {
        return Ok(prober.best_cached(&both));
    }

    debug!(from = top, to = bottom, "scanning skipped qualities one by one");
    let gap = QualityBounds::new(bottom, top)?;
    linear_descent(prober, gap.max(), gap, 1, limit, both)
}

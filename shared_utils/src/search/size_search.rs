//! Size-Search Engine
//!
//! 找到输出不超过体积上限的最高质量。二分为默认策略，线性下降作为对照；
//! 仅当主搜索失败且探测记录显示编码器非单调时，才启用半步上扫回退。

use super::{
    binary_search, detect_non_monotonic, linear_descent, upward_sweep, CancelToken, Compliance,
    CompressionResult, Prober, QualityEncoder, SearchOptions, SearchOutcome, SearchPolicy,
};
use crate::errors::Result;
use crate::types::{QualityBounds, SizeCeiling};
use tracing::{debug, warn};

pub fn search<E>(
    encoder: &mut E,
    ceiling: SizeCeiling,
    bounds: QualityBounds,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<SearchOutcome>
where
    E: QualityEncoder + ?Sized,
{
    let limit = ceiling.accepted_limit();
    let fits = |a: &super::CompressionAttempt| ceiling.fits(a.size);
    let mut prober = Prober::new(encoder, None, cancel, options.max_attempts, "size search");

    let primary = match options.policy {
        SearchPolicy::Binary => binary_search(&mut prober, bounds, limit, fits)?,
        SearchPolicy::Linear => {
            linear_descent(&mut prober, bounds.max(), bounds, options.step(), limit, fits)?
        }
    };

    let found = match primary {
        Some(found) => Some(found),
        None => match detect_non_monotonic(&prober.attempts()) {
            Some((lower, higher)) => {
                warn!(
                    lower = lower.value(),
                    higher = higher.value(),
                    "encoder output is not monotonic in quality, sweeping upward"
                );
                upward_sweep(&mut prober, bounds, options, limit, fits)?
            }
            None => None,
        },
    };

    let result = match found {
        Some(attempt) => CompressionResult::accept(&attempt, Compliance::Full),
        None => {
            debug!(limit, bounds = %bounds, "no quality fits the ceiling");
            CompressionResult::Unsatisfiable
        }
    };
    prober.finish(result)
}

//! Quality Search
//!
//! 在体积上限（及可选的相似度下限）内寻找最高编码质量。
//!
//! ## 结构
//! 1. `QualityEncoder` / `SimilarityScorer`：编码与评分的黑盒接口，闭包即可实现
//! 2. `Prober`：所有策略共享的探测上下文（按质量缓存、次数守卫、取消检查）
//! 3. 三种策略：二分（默认）、线性下降（对照）、半步上扫（回退）
//! 4. `size_search` / `similarity_search`：两个引擎，`compress` 是统一入口

pub mod cancel;
pub mod similarity_search;
pub mod size_search;

pub use cancel::CancelToken;

use crate::errors::{Result, SqueezeError};
use crate::types::{
    IterationGuard, Quality, QualityBounds, SizeCeiling, Ssim, DEFAULT_MAX_ATTEMPTS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

// ═══════════════════════════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════════════════════════

/// 以给定质量重新编码原图，返回完整的输出字节
pub trait QualityEncoder {
    fn encode(&mut self, quality: Quality) -> Result<Vec<u8>>;
}

impl<F> QualityEncoder for F
where
    F: FnMut(Quality) -> Result<Vec<u8>>,
{
    fn encode(&mut self, quality: Quality) -> Result<Vec<u8>> {
        self(quality)
    }
}

/// 对候选字节评分（与评分器持有的原图比较）
pub trait SimilarityScorer {
    fn score(&mut self, candidate: &[u8]) -> Result<Ssim>;
}

impl<F> SimilarityScorer for F
where
    F: FnMut(&[u8]) -> Result<Ssim>,
{
    fn score(&mut self, candidate: &[u8]) -> Result<Ssim> {
        self(candidate)
    }
}

// ═══════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPolicy {
    /// 二分搜索（默认）
    #[default]
    Binary,
    /// 从 qmax 按步长下降
    Linear,
}

impl fmt::Display for SearchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPolicy::Binary => write!(f, "binary"),
            SearchPolicy::Linear => write!(f, "linear"),
        }
    }
}

impl std::str::FromStr for SearchPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(SearchPolicy::Binary),
            "linear" => Ok(SearchPolicy::Linear),
            other => Err(format!("unknown search policy '{}'", other)),
        }
    }
}

pub const DEFAULT_STEP: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub policy: SearchPolicy,
    /// 线性下降 / 门控下降的步长，至少为 1
    pub step: u8,
    pub max_attempts: u32,
}

impl SearchOptions {
    pub fn new(policy: SearchPolicy, step: u8) -> Self {
        Self {
            policy,
            step: step.max(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[inline]
    fn step(&self) -> u8 {
        self.step.max(1)
    }

    #[inline]
    fn half_step(&self) -> u8 {
        (self.step / 2).max(1)
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new(SearchPolicy::Binary, DEFAULT_STEP)
    }
}

// ═══════════════════════════════════════════════════════════════
// Request / Result
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CompressionRequest<'a> {
    pub input: &'a [u8],
    pub ceiling: SizeCeiling,
    pub bounds: QualityBounds,
    pub similarity_floor: Option<Ssim>,
    pub options: SearchOptions,
}

impl<'a> CompressionRequest<'a> {
    pub fn new(input: &'a [u8], ceiling: SizeCeiling, bounds: QualityBounds) -> Self {
        Self {
            input,
            ceiling,
            bounds,
            similarity_floor: None,
            options: SearchOptions::default(),
        }
    }

    pub fn with_similarity_floor(mut self, floor: Option<Ssim>) -> Self {
        self.similarity_floor = floor;
        self
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn input_size(&self) -> u64 {
        self.input.len() as u64
    }

    pub fn needs_compression(&self) -> bool {
        !self.ceiling.already_within(self.input_size())
    }
}

/// 单次编码的记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionAttempt {
    pub quality: Quality,
    pub size: u64,
    pub similarity: Option<Ssim>,
}

impl CompressionAttempt {
    pub fn meets_similarity(&self, floor: Ssim) -> bool {
        self.similarity.is_some_and(|s| s.meets(floor))
    }

    /// 质量更高优先，其次体积更大，最后相似度更高
    pub fn is_better_than(&self, other: &CompressionAttempt) -> bool {
        if self.quality != other.quality {
            return self.quality > other.quality;
        }
        if self.size != other.size {
            return self.size > other.size;
        }
        match (self.similarity, other.similarity) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// 接受的候选满足了哪些约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compliance {
    Full,
    SizeOnly,
    SimilarityOnly,
}

impl fmt::Display for Compliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compliance::Full => write!(f, "full"),
            Compliance::SizeOnly => write!(f, "size only"),
            Compliance::SimilarityOnly => write!(f, "similarity only"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionResult {
    /// 输入已在上限内，未调用编码器
    NotNeeded { size: u64 },
    Satisfied {
        quality: Quality,
        size: u64,
        similarity: Option<Ssim>,
        compliance: Compliance,
    },
    /// 没有任何探测满足约束，调用方应原样复制
    Unsatisfiable,
}

impl CompressionResult {
    fn accept(attempt: &CompressionAttempt, compliance: Compliance) -> Self {
        CompressionResult::Satisfied {
            quality: attempt.quality,
            size: attempt.size,
            similarity: attempt.similarity,
            compliance,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, CompressionResult::Satisfied { .. })
    }

    pub fn accepted_quality(&self) -> Option<Quality> {
        match self {
            CompressionResult::Satisfied { quality, .. } => Some(*quality),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: CompressionResult,
    /// 仅 `Satisfied` 时为 Some：接受质量的编码结果
    pub output: Option<Vec<u8>>,
    /// 按探测顺序排列，每个质量最多一条
    pub attempts: Vec<CompressionAttempt>,
    pub encodes: u32,
}

impl SearchOutcome {
    pub fn not_needed(size: u64) -> Self {
        Self {
            result: CompressionResult::NotNeeded { size },
            output: None,
            attempts: Vec::new(),
            encodes: 0,
        }
    }
}

/// 统一入口：先判断是否需要压缩，再按是否设置相似度下限选择引擎
pub fn compress<E>(
    request: &CompressionRequest<'_>,
    encoder: &mut E,
    scorer: Option<&mut dyn SimilarityScorer>,
    cancel: &CancelToken,
) -> Result<SearchOutcome>
where
    E: QualityEncoder + ?Sized,
{
    if !request.needs_compression() {
        debug!(
            size = request.input_size(),
            limit = request.ceiling.bytes(),
            "input already within ceiling"
        );
        return Ok(SearchOutcome::not_needed(request.input_size()));
    }

    match (request.similarity_floor, scorer) {
        (Some(floor), Some(scorer)) => similarity_search::search(
            encoder,
            scorer,
            request.ceiling,
            floor,
            request.bounds,
            &request.options,
            cancel,
        ),
        (Some(_), None) => Err(SqueezeError::InvalidConfig(
            "similarity floor requires a scorer".to_string(),
        )),
        (None, _) => size_search::search(
            encoder,
            request.ceiling,
            request.bounds,
            &request.options,
            cancel,
        ),
    }
}

/// 在探测记录中寻找单调性破坏：更高质量的输出严格小于某个更低质量的输出。
/// 返回 (较低质量, 较高质量)。
pub fn detect_non_monotonic(attempts: &[CompressionAttempt]) -> Option<(Quality, Quality)> {
    let mut sorted: Vec<&CompressionAttempt> = attempts.iter().collect();
    sorted.sort_by_key(|a| a.quality);

    let mut largest: Option<&CompressionAttempt> = None;
    for attempt in sorted {
        if let Some(prev) = largest {
            if attempt.size < prev.size {
                return Some((prev.quality, attempt.quality));
            }
        }
        if largest.is_none_or(|prev| attempt.size >= prev.size) {
            largest = Some(attempt);
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════
// Prober - 策略共享的探测上下文
// ═══════════════════════════════════════════════════════════════

pub(crate) struct Prober<'a, E: ?Sized> {
    encoder: &'a mut E,
    scorer: Option<&'a mut dyn SimilarityScorer>,
    cancel: &'a CancelToken,
    guard: IterationGuard,
    cache: BTreeMap<Quality, CompressionAttempt>,
    order: Vec<Quality>,
    retained: Option<(Quality, Vec<u8>)>,
}

impl<'a, E> Prober<'a, E>
where
    E: QualityEncoder + ?Sized,
{
    pub(crate) fn new(
        encoder: &'a mut E,
        scorer: Option<&'a mut dyn SimilarityScorer>,
        cancel: &'a CancelToken,
        max_attempts: u32,
        context: &str,
    ) -> Self {
        Self {
            encoder,
            scorer,
            cancel,
            guard: IterationGuard::new(max_attempts, context),
            cache: BTreeMap::new(),
            order: Vec::new(),
            retained: None,
        }
    }

    fn encode_once(&mut self, quality: Quality) -> Result<Vec<u8>> {
        self.cancel.check()?;
        self.guard.increment()?;
        self.encoder.encode(quality)
    }

    /// 探测一个质量；已探测过的直接返回缓存。
    /// 返回的字节仅在本次真正编码时为 Some。
    pub(crate) fn probe(
        &mut self,
        quality: Quality,
        limit: u64,
    ) -> Result<(CompressionAttempt, Option<Vec<u8>>)> {
        if let Some(cached) = self.cache.get(&quality) {
            return Ok((*cached, None));
        }

        let bytes = self.encode_once(quality)?;
        let similarity = match self.scorer.as_mut() {
            Some(scorer) => Some(scorer.score(&bytes)?),
            None => None,
        };
        let attempt = CompressionAttempt {
            quality,
            size: bytes.len() as u64,
            similarity,
        };

        debug!(
            quality = quality.value(),
            size = attempt.size,
            limit,
            ssim = similarity.map(|s| s.value()),
            "probe"
        );

        self.cache.insert(quality, attempt);
        self.order.push(quality);
        Ok((attempt, Some(bytes)))
    }

    /// 保留当前最佳候选的字节，丢弃之前保留的
    pub(crate) fn retain(&mut self, quality: Quality, bytes: Option<Vec<u8>>) {
        if let Some(bytes) = bytes {
            self.retained = Some((quality, bytes));
        }
    }

    /// 缓存中满足 `accept` 的最佳候选，不触发编码
    pub(crate) fn best_cached<P>(&self, accept: P) -> Option<CompressionAttempt>
    where
        P: Fn(&CompressionAttempt) -> bool,
    {
        self.cache
            .values()
            .filter(|a| accept(a))
            .copied()
            .reduce(|best, a| if a.is_better_than(&best) { a } else { best })
    }

    /// 缓存中满足 `pred` 的最低质量
    pub(crate) fn lowest_cached<P>(&self, pred: P) -> Option<Quality>
    where
        P: Fn(&CompressionAttempt) -> bool,
    {
        self.cache.values().find(|a| pred(a)).map(|a| a.quality)
    }

    pub(crate) fn attempts(&self) -> Vec<CompressionAttempt> {
        self.order
            .iter()
            .filter_map(|q| self.cache.get(q).copied())
            .collect()
    }

    /// 生成最终结果；接受质量的字节若已被丢弃则重新编码一次
    pub(crate) fn finish(mut self, result: CompressionResult) -> Result<SearchOutcome> {
        let output = match result.accepted_quality() {
            Some(quality) => match self.retained.take() {
                Some((q, bytes)) if q == quality => Some(bytes),
                _ => Some(self.encode_once(quality)?),
            },
            None => None,
        };

        Ok(SearchOutcome {
            result,
            output,
            attempts: self.attempts(),
            encodes: self.guard.current(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════
// Strategies
// ═══════════════════════════════════════════════════════════════

/// 二分搜索：返回满足 `accept` 的最佳候选（假设单调）
pub(crate) fn binary_search<E, P>(
    prober: &mut Prober<'_, E>,
    bounds: QualityBounds,
    limit: u64,
    accept: P,
) -> Result<Option<CompressionAttempt>>
where
    E: QualityEncoder + ?Sized,
    P: Fn(&CompressionAttempt) -> bool,
{
    let mut low = i32::from(bounds.min().value());
    let mut high = i32::from(bounds.max().value());
    let mut best: Option<CompressionAttempt> = None;

    while low <= high {
        let mid = (low + high) / 2;
        let quality = bounds.clamp(i64::from(mid));
        let (attempt, bytes) = prober.probe(quality, limit)?;

        if accept(&attempt) {
            if best.is_none_or(|b| attempt.is_better_than(&b)) {
                best = Some(attempt);
                prober.retain(quality, bytes);
            }
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }

    Ok(best)
}

/// 从 `start` 按 `step` 下降到 `bounds.min()`（最后一步夹到 qmin），首个满足者胜出
pub(crate) fn linear_descent<E, P>(
    prober: &mut Prober<'_, E>,
    start: Quality,
    bounds: QualityBounds,
    step: u8,
    limit: u64,
    accept: P,
) -> Result<Option<CompressionAttempt>>
where
    E: QualityEncoder + ?Sized,
    P: Fn(&CompressionAttempt) -> bool,
{
    let floor = i64::from(bounds.min().value());
    let mut current = i64::from(start.value());

    loop {
        let quality = bounds.clamp(current);
        let (attempt, bytes) = prober.probe(quality, limit)?;
        if accept(&attempt) {
            prober.retain(quality, bytes);
            return Ok(Some(attempt));
        }
        if current <= floor {
            return Ok(None);
        }
        current = (current - i64::from(step)).max(floor);
    }
}

/// 半步上扫：从 `qmin + step/2` 以 `max(step/2, 1)` 向上，首个满足者胜出
pub(crate) fn upward_sweep<E, P>(
    prober: &mut Prober<'_, E>,
    bounds: QualityBounds,
    options: &SearchOptions,
    limit: u64,
    accept: P,
) -> Result<Option<CompressionAttempt>>
where
    E: QualityEncoder + ?Sized,
    P: Fn(&CompressionAttempt) -> bool,
{
    let ceiling = i64::from(bounds.max().value());
    let mut current = (i64::from(bounds.min().value()) + i64::from(options.step / 2)).min(ceiling);

    while current <= ceiling {
        let quality = bounds.clamp(current);
        let (attempt, bytes) = prober.probe(quality, limit)?;
        if accept(&attempt) {
            prober.retain(quality, bytes);
            return Ok(Some(attempt));
        }
        current += i64::from(options.half_step());
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 测试用的合成编码器：输出长度由质量决定
    use super::*;
    use std::cell::Cell;

    /// size = base * q / 100，严格单调
    pub fn proportional(base: u64) -> impl FnMut(Quality) -> Result<Vec<u8>> {
        move |q: Quality| Ok(vec![0u8; (base * u64::from(q.value()) / 100) as usize])
    }

    /// 根据查表返回长度
    pub fn from_table(sizes: Vec<u64>) -> impl FnMut(Quality) -> Result<Vec<u8>> {
        move |q: Quality| Ok(vec![0u8; sizes[usize::from(q.value())] as usize])
    }

    /// 统计调用次数的包装
    pub struct Counting<F> {
        pub inner: F,
        pub calls: Cell<u32>,
    }

    impl<F> Counting<F> {
        pub fn new(inner: F) -> Self {
            Self {
                inner,
                calls: Cell::new(0),
            }
        }
    }

    impl<F: FnMut(Quality) -> Result<Vec<u8>>> QualityEncoder for Counting<F> {
        fn encode(&mut self, quality: Quality) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            (self.inner)(quality)
        }
    }

    /// 相似度只与输出长度有关：长度 -> ssim 的线性映射
    pub fn ssim_by_len(full_len: u64) -> impl FnMut(&[u8]) -> Result<Ssim> {
        move |bytes: &[u8]| Ok(Ssim::clamped(bytes.len() as f64 / full_len as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::errors::SqueezeError;

    fn attempt(q: u8, size: u64) -> CompressionAttempt {
        CompressionAttempt {
            quality: Quality::new(q).unwrap(),
            size,
            similarity: None,
        }
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("binary".parse::<SearchPolicy>().unwrap(), SearchPolicy::Binary);
        assert_eq!("LINEAR".parse::<SearchPolicy>().unwrap(), SearchPolicy::Linear);
        assert!("golden".parse::<SearchPolicy>().is_err());
        assert_eq!(SearchPolicy::default().to_string(), "binary");
    }

    #[test]
    fn test_options_step_floor() {
        let options = SearchOptions::new(SearchPolicy::Linear, 0);
        assert_eq!(options.step(), 1);
        assert_eq!(options.half_step(), 1);
        assert_eq!(SearchOptions::default().half_step(), 2);
    }

    #[test]
    fn test_candidate_ordering() {
        assert!(attempt(50, 10).is_better_than(&attempt(49, 100)));
        assert!(attempt(50, 11).is_better_than(&attempt(50, 10)));
        let mut a = attempt(50, 10);
        let mut b = attempt(50, 10);
        a.similarity = Some(Ssim::clamped(0.95));
        b.similarity = Some(Ssim::clamped(0.90));
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));
    }

    #[test]
    fn test_detect_non_monotonic() {
        let monotone = vec![attempt(90, 900), attempt(50, 500), attempt(70, 700)];
        assert_eq!(detect_non_monotonic(&monotone), None);

        let flat = vec![attempt(10, 500), attempt(20, 500)];
        assert_eq!(detect_non_monotonic(&flat), None);

        let broken = vec![attempt(50, 500), attempt(60, 800), attempt(70, 600)];
        assert_eq!(
            detect_non_monotonic(&broken),
            Some((Quality::new(60).unwrap(), Quality::new(70).unwrap()))
        );
    }

    #[test]
    fn test_compress_not_needed_skips_encoder() {
        let input = vec![0u8; 500_000];
        let ceiling = SizeCeiling::strict(2_097_152).unwrap();
        let request = CompressionRequest::new(&input, ceiling, QualityBounds::default());
        let mut encoder = Counting::new(proportional(5_000_000));

        let outcome = compress(&request, &mut encoder, None, &CancelToken::new()).unwrap();
        assert_eq!(outcome.result, CompressionResult::NotNeeded { size: 500_000 });
        assert_eq!(outcome.encodes, 0);
        assert!(outcome.output.is_none());
        assert_eq!(encoder.calls.get(), 0);
    }

    #[test]
    fn test_compress_routes_to_gated_engine() {
        let input = vec![0u8; 5_000_000];
        let ceiling = SizeCeiling::strict(2_097_152).unwrap();
        let floor = Ssim::new(0.3).unwrap();
        let request = CompressionRequest::new(&input, ceiling, QualityBounds::default())
            .with_similarity_floor(Some(floor));
        let mut encoder = proportional(5_000_000);
        let mut scorer = ssim_by_len(5_000_000);

        let outcome = compress(&request, &mut encoder, Some(&mut scorer), &CancelToken::new())
            .unwrap();
        match outcome.result {
            CompressionResult::Satisfied {
                quality,
                similarity,
                compliance,
                ..
            } => {
                assert_eq!(quality.value(), 41);
                assert!(similarity.is_some());
                assert_eq!(compliance, Compliance::Full);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_compress_rejects_floor_without_scorer() {
        let input = vec![0u8; 5_000_000];
        let ceiling = SizeCeiling::strict(2_097_152).unwrap();
        let request = CompressionRequest::new(&input, ceiling, QualityBounds::default())
            .with_similarity_floor(Some(Ssim::new(0.9).unwrap()));
        let mut encoder = Counting::new(proportional(5_000_000));

        let err = compress(&request, &mut encoder, None, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, SqueezeError::InvalidConfig(_)));
        assert_eq!(encoder.calls.get(), 0);
    }

    #[test]
    fn test_best_cached_prefers_highest_quality() {
        let mut encoder = proportional(1_000_000);
        let cancel = CancelToken::new();
        let mut prober = Prober::new(&mut encoder, None, &cancel, 16, "cache test");
        for q in [30u8, 70, 50] {
            prober.probe(Quality::new(q).unwrap(), 600_000).unwrap();
        }

        let fits = |a: &CompressionAttempt| a.size <= 600_000;
        assert_eq!(
            prober.best_cached(fits).map(|a| a.quality.value()),
            Some(50)
        );
        assert_eq!(
            prober.lowest_cached(|a| !fits(a)).map(|q| q.value()),
            Some(70)
        );
        assert!(prober.best_cached(|a| a.size > 900_000).is_none());
    }

    #[test]
    fn test_compress_cancelled_before_first_encode() {
        let input = vec![0u8; 5_000_000];
        let ceiling = SizeCeiling::strict(2_097_152).unwrap();
        let request = CompressionRequest::new(&input, ceiling, QualityBounds::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut encoder = Counting::new(proportional(5_000_000));

        let err = compress(&request, &mut encoder, None, &cancel).unwrap_err();
        assert!(matches!(err, SqueezeError::Cancelled));
        assert_eq!(encoder.calls.get(), 0);
    }
}

//! Thread Manager
//!
//! 工作线程数：CPU 核数减去预留（20%，1..=2），上限 16。
//! 每个工作线程同一时刻只跑一个文件的搜索，编码在进程内完成。

use std::sync::OnceLock;

static OPTIMAL_THREADS: OnceLock<usize> = OnceLock::new();

/// 允许的最大并行任务数（内存占用随每个任务的解码图像线性增长）
pub const MAX_PARALLEL_TASKS: usize = 16;

pub fn balanced_worker_count(total_cores: usize) -> usize {
    let reserved = ((total_cores as f64 * 0.2).ceil() as usize).clamp(1, 2);
    total_cores
        .saturating_sub(reserved)
        .clamp(1, MAX_PARALLEL_TASKS)
}

/// 缓存的默认工作线程数
pub fn get_optimal_threads() -> usize {
    *OPTIMAL_THREADS.get_or_init(|| balanced_worker_count(num_cpus::get()))
}

/// `--jobs` 优先；0 或未设置时使用默认值
pub fn resolve_jobs(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n.min(num_cpus::get().max(1) * 4),
        _ => get_optimal_threads(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_worker_count() {
        assert_eq!(balanced_worker_count(1), 1);
        assert_eq!(balanced_worker_count(2), 1);
        assert_eq!(balanced_worker_count(4), 3);
        assert_eq!(balanced_worker_count(10), 8);
        assert_eq!(balanced_worker_count(64), MAX_PARALLEL_TASKS);
    }

    #[test]
    fn test_default_thread_calculation() {
        let threads = get_optimal_threads();
        assert!(threads >= 1);
        assert!(threads <= MAX_PARALLEL_TASKS);
    }

    #[test]
    fn test_resolve_jobs() {
        assert_eq!(resolve_jobs(Some(3)), 3);
        assert_eq!(resolve_jobs(None), get_optimal_threads());
        assert_eq!(resolve_jobs(Some(0)), get_optimal_threads());
    }
}

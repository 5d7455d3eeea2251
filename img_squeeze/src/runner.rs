//! Batch Runner
//!
//! 把输入树镜像到输出树：先建目录（含空目录），再在固定大小的 rayon
//! 线程池里逐文件处理。每个工作线程折叠自己的 `BatchResult`，最后合并。
//! 单个文件失败不会中止批处理；取消后尚未开始的文件记为跳过。

use crate::config::SqueezeSettings;
use crate::squeeze_api::{squeeze_file, FileAction};
use anyhow::{Context, Result};
use rayon::prelude::*;
use shared_utils::batch::{scan_tree, BatchResult};
use shared_utils::file_copier::{copy_original, mirror_dirs, mirror_path, preserve_mtime};
use shared_utils::progress::create_progress_bar;
use shared_utils::safety::check_mirror_roots;
use shared_utils::search::CancelToken;
use shared_utils::thread_manager::resolve_jobs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
pub struct BatchRun {
    pub result: BatchResult,
    pub duration: Duration,
    /// 运行结束时取消令牌已触发（Ctrl-C 或超时）
    pub cancelled: bool,
}

impl BatchRun {
    /// 0 = 全部成功，1 = 有文件失败，130 = 被取消
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if self.result.failed > 0 {
            1
        } else {
            0
        }
    }
}

pub fn run_batch(
    input: &Path,
    output: &Path,
    settings: &SqueezeSettings,
    cancel: &CancelToken,
    show_progress: bool,
) -> Result<BatchRun> {
    check_mirror_roots(input, output)?;
    let start = Instant::now();

    let tree = scan_tree(input, settings.include_hidden);
    mirror_dirs(output, &tree.dirs)?;

    let jobs = resolve_jobs(settings.jobs);
    info!(
        input = ?input,
        output = ?output,
        files = tree.files.len(),
        dirs = tree.dirs.len(),
        jobs,
        ceiling = %settings.ceiling,
        bounds = %settings.bounds,
        policy = %settings.options.policy,
        "batch started"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("squeeze-{}", i))
        .build()
        .context("Failed to build worker pool")?;

    let pb = create_progress_bar(tree.files.len() as u64, "Squeezing", show_progress);
    let mut result = pool.install(|| {
        tree.files
            .par_iter()
            .fold(BatchResult::new, |mut acc, path| {
                process_one(&mut acc, input, output, path, settings, cancel);
                pb.inc(1);
                acc
            })
            .reduce(BatchResult::new, BatchResult::merge)
    });
    pb.finish_and_clear();

    for (path, reason) in tree.unreadable {
        result.fail(path, reason, 0, 0);
    }
    result.sort_errors();

    let run = BatchRun {
        result,
        duration: start.elapsed(),
        cancelled: cancel.is_cancelled(),
    };
    info!(
        total = run.result.total,
        compressed = run.result.compressed,
        failed = run.result.failed,
        skipped = run.result.skipped,
        cancelled = run.cancelled,
        elapsed_ms = run.duration.as_millis() as u64,
        "batch finished"
    );
    Ok(run)
}

fn process_one(
    acc: &mut BatchResult,
    input_root: &Path,
    output_root: &Path,
    path: &Path,
    settings: &SqueezeSettings,
    cancel: &CancelToken,
) {
    if cancel.is_cancelled() {
        acc.skip();
        return;
    }
    let Some(dest) = mirror_path(input_root, output_root, path) else {
        acc.fail(
            path.to_path_buf(),
            "path is outside the input root".to_string(),
            0,
            0,
        );
        return;
    };

    match squeeze_file(path, &dest, settings, cancel) {
        Ok(outcome) => match outcome.action {
            FileAction::Compressed { .. } => {
                acc.compressed(outcome.input_size, outcome.output_size)
            }
            FileAction::WithinBudget => acc.within_budget(outcome.output_size),
            FileAction::PassedThrough => acc.passed_through(outcome.output_size),
            FileAction::FallbackCopied { .. } => acc.fallback_copied(outcome.output_size),
        },
        Err(e) if e.is_cancelled() => acc.skip(),
        Err(e) => {
            let input_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let written = if settings.copy_on_error {
                match copy_original(path, &dest) {
                    Ok(n) => {
                        preserve_mtime(path, &dest);
                        n
                    }
                    Err(copy_err) => {
                        warn!(path = ?path, error = %copy_err, "fallback copy failed");
                        0
                    }
                }
            } else {
                0
            };
            warn!(
                path = ?path,
                error = %e,
                category = %e.category(),
                copied = written > 0,
                "file failed"
            );
            acc.fail(path.to_path_buf(), e.to_string(), input_size, written);
        }
    }
}

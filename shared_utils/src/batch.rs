//! Batch Processing Module
//!
//! 源目录扫描与批处理结果累加。`BatchResult` 是可折叠的累加器：
//! 每个 rayon 工作线程持有自己的一份，最后 `merge`，不需要共享计数器。

use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// 扫描得到的源目录结构
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub root: PathBuf,
    /// 相对于 root 的子目录，父目录在前
    pub dirs: Vec<PathBuf>,
    /// 绝对路径（root.join(rel)）
    pub files: Vec<PathBuf>,
    /// 无法访问的条目
    pub unreadable: Vec<(PathBuf, String)>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// 递归扫描 `root`；隐藏文件与隐藏目录默认跳过
pub fn scan_tree(root: &Path, include_hidden: bool) -> SourceTree {
    let mut tree = SourceTree {
        root: root.to_path_buf(),
        ..SourceTree::default()
    };

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::warn!(path = ?path, error = %e, "Skipping unreadable entry");
                tree.unreadable.push((path, e.to_string()));
                continue;
            }
        };

        if entry.depth() == 0 {
            continue;
        }
        if entry.file_type().is_dir() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                tree.dirs.push(rel.to_path_buf());
            }
        } else if entry.file_type().is_file() {
            tree.files.push(entry.into_path());
        }
    }

    tree
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    /// 重新编码后写出
    pub compressed: usize,
    /// 已在上限内，原样复制
    pub within_budget: usize,
    /// 非 JPEG，原样复制
    pub passed_through: usize,
    /// 搜索无解或结果不比原文件小，原样复制
    pub fallback_copied: usize,
    pub failed: usize,
    /// 取消后未开始的文件
    pub skipped: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_bytes(&mut self, input: u64, output: u64) {
        self.total += 1;
        self.input_bytes += input;
        self.output_bytes += output;
    }

    pub fn compressed(&mut self, input: u64, output: u64) {
        self.add_bytes(input, output);
        self.compressed += 1;
    }

    pub fn within_budget(&mut self, size: u64) {
        self.add_bytes(size, size);
        self.within_budget += 1;
    }

    pub fn passed_through(&mut self, size: u64) {
        self.add_bytes(size, size);
        self.passed_through += 1;
    }

    pub fn fallback_copied(&mut self, size: u64) {
        self.add_bytes(size, size);
        self.fallback_copied += 1;
    }

    /// `output` 为回退复制写出的字节数（未能复制时为 0）
    pub fn fail(&mut self, path: PathBuf, error: String, input: u64, output: u64) {
        self.add_bytes(input, output);
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn merge(mut self, other: BatchResult) -> BatchResult {
        self.total += other.total;
        self.compressed += other.compressed;
        self.within_budget += other.within_budget;
        self.passed_through += other.passed_through;
        self.fallback_copied += other.fallback_copied;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.input_bytes += other.input_bytes;
        self.output_bytes += other.output_bytes;
        self.errors.extend(other.errors);
        self
    }

    pub fn succeeded(&self) -> usize {
        self.compressed + self.within_budget + self.passed_through + self.fallback_copied
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded() as f64 / self.total as f64) * 100.0
        }
    }

    /// 错误列表按路径排序，便于输出稳定
    pub fn sort_errors(&mut self) {
        self.errors.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

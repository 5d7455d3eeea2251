//! File Copier Module
//!
//! 输出树镜像：每个源文件在目标树中恰好对应一个输出。
//! - 重新编码的字节经同目录临时文件写入后原子 rename
//! - 其余情况（非 JPEG、已达标、无解、出错）原样复制
//! - 输出保留源文件的修改时间

use crate::errors::{Result, SqueezeError};
use filetime::FileTime;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `src_root/a/b.jpg` → `dest_root/a/b.jpg`；path 不在 src_root 下时返回 None
pub fn mirror_path(src_root: &Path, dest_root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(src_root).ok().map(|rel| dest_root.join(rel))
}

/// 按相对路径列表在目标根下创建目录（含空目录）
pub fn mirror_dirs(dest_root: &Path, rel_dirs: &[PathBuf]) -> Result<()> {
    std::fs::create_dir_all(dest_root).map_err(|e| SqueezeError::io(dest_root, e))?;
    for rel in rel_dirs {
        let dir = dest_root.join(rel);
        std::fs::create_dir_all(&dir).map_err(|e| SqueezeError::io(&dir, e))?;
    }
    Ok(())
}

fn ensure_parent(dest: &Path) -> Result<&Path> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| SqueezeError::io(parent, e))?;
    Ok(parent)
}

/// 同目录临时文件 + persist，读者永远看不到半个文件
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = ensure_parent(dest)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| SqueezeError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| SqueezeError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SqueezeError::io(tmp.path(), e))?;
    tmp.persist(dest).map_err(|e| SqueezeError::io(dest, e.error))?;
    Ok(())
}

/// 原样复制，同样经过临时文件；返回写出的字节数
pub fn copy_original(src: &Path, dest: &Path) -> Result<u64> {
    let parent = ensure_parent(dest)?;
    let tmp = NamedTempFile::new_in(parent).map_err(|e| SqueezeError::io(parent, e))?;
    let copied = std::fs::copy(src, tmp.path()).map_err(|e| SqueezeError::io(src, e))?;
    tmp.persist(dest).map_err(|e| SqueezeError::io(dest, e.error))?;
    Ok(copied)
}

/// 把源文件的修改时间设置到输出上；失败只记录日志
pub fn preserve_mtime(src: &Path, dest: &Path) {
    let meta = match std::fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!(path = ?src, error = %e, "Cannot read source metadata");
            return;
        }
    };
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_mtime(dest, mtime) {
        tracing::debug!(path = ?dest, error = %e, "Failed to preserve modification time");
    }
}

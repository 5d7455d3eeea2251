//! Safety Module
//!
//! 防止误操作系统目录，以及输出树与输入树重叠（会导致处理自己的输出）。

use crate::errors::{Result, SqueezeError};
use std::path::{Path, PathBuf};

const DANGEROUS_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/tmp",
    "/opt",
];

/// 存在则 canonicalize；不存在则 canonicalize 最近的已存在祖先再拼回剩余部分
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut tail = Vec::new();
    let mut current = path;
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(base) = parent.canonicalize() {
            return tail.iter().rev().fold(base, |acc, name| acc.join(name));
        }
        current = parent;
    }
    path.to_path_buf()
}

pub fn check_dangerous_directory(path: &Path) -> Result<()> {
    let canonical = normalize(path);
    let raw = path.to_string_lossy();
    let resolved = canonical.to_string_lossy();

    if let Some(dangerous) = DANGEROUS_DIRS
        .iter()
        .find(|d| raw == **d || resolved == **d)
    {
        return Err(SqueezeError::InvalidConfig(format!(
            "🚨 DANGEROUS OPERATION BLOCKED: '{}' is a protected system directory, \
             please specify a safe subdirectory instead",
            dangerous
        )));
    }

    let depth = canonical.components().count();
    if depth <= 3 && (resolved.starts_with("/Users/") || resolved.starts_with("/home/")) {
        return Err(SqueezeError::InvalidConfig(format!(
            "🚨 DANGEROUS OPERATION BLOCKED: '{}' is too close to a home directory root, \
             please specify a subdirectory like ~/Pictures/export instead",
            path.display()
        )));
    }

    Ok(())
}

/// 输入必须是目录；输出不能等于输入，也不能位于输入之内
pub fn check_mirror_roots(input: &Path, output: &Path) -> Result<()> {
    if !input.is_dir() {
        return Err(SqueezeError::InvalidConfig(format!(
            "input '{}' is not a directory",
            input.display()
        )));
    }
    check_dangerous_directory(input)?;
    check_dangerous_directory(output)?;

    let input = normalize(input);
    let output = normalize(output);
    if output == input {
        return Err(SqueezeError::InvalidConfig(format!(
            "output directory is the input directory: {}",
            output.display()
        )));
    }
    if output.starts_with(&input) {
        return Err(SqueezeError::InvalidConfig(format!(
            "output directory {} is inside the input directory {}",
            output.display(),
            input.display()
        )));
    }
    Ok(())
}

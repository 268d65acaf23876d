//! 全有或全无的提交
//!
//! 先把全部文件写进 `<root>/.staging-<uuid>/`，全部成功后再逐个 rename 到 `<root>/<project>/`。
//! 目标已存在的文件先挪到备份目录；任一步失败则撤回已移动的文件、恢复备份、删除暂存目录。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::AgentError;
use crate::plan::model::is_path_segment;
use crate::plan::CodeFile;

/// 提交文件名只允许单个普通路径段
fn checked_file_name(name: &str) -> Result<&str, AgentError> {
    if is_path_segment(name) {
        Ok(name)
    } else {
        Err(AgentError::PathEscape(name.to_string()))
    }
}

/// 把 files 提交到 `<root>/<project>/`，返回写入的路径；失败时磁盘上不留下任何新文件
pub fn commit_files(root: &Path, project: &str, files: &[CodeFile]) -> Result<Vec<PathBuf>, AgentError> {
    let project = checked_file_name(project.trim())?;
    let mut seen = HashSet::new();
    for f in files {
        checked_file_name(&f.file_name)?;
        if !seen.insert(f.file_name.as_str()) {
            return Err(AgentError::InvalidPlan(format!(
                "two files named {} in one submission",
                f.file_name
            )));
        }
    }
    if files.is_empty() {
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(root)?;
    let staging = root.join(format!(".staging-{}", uuid::Uuid::new_v4()));
    let result = stage_and_move(&staging, &root.join(project), files);
    if let Err(e) = std::fs::remove_dir_all(&staging) {
        tracing::debug!(path = %staging.display(), error = %e, "staging cleanup failed");
    }
    result
}

fn stage_and_move(staging: &Path, target_dir: &Path, files: &[CodeFile]) -> Result<Vec<PathBuf>, AgentError> {
    let backup = staging.join(".backup");
    std::fs::create_dir_all(&backup)?;
    for f in files {
        std::fs::write(staging.join(&f.file_name), &f.code)?;
    }

    let created_dir = !target_dir.exists();
    std::fs::create_dir_all(target_dir)?;

    let mut moved: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(files.len());
    for f in files {
        let dest = target_dir.join(&f.file_name);
        match move_into_place(staging, &backup, &f.file_name, &dest) {
            Ok(backed_up) => moved.push((dest, backed_up)),
            Err(e) => {
                rollback(&moved, target_dir, created_dir);
                return Err(e);
            }
        }
    }
    Ok(moved.into_iter().map(|(dest, _)| dest).collect())
}

fn move_into_place(
    staging: &Path,
    backup: &Path,
    file_name: &str,
    dest: &Path,
) -> Result<Option<PathBuf>, AgentError> {
    let backed_up = if dest.exists() {
        let b = backup.join(file_name);
        std::fs::rename(dest, &b)?;
        Some(b)
    } else {
        None
    };
    if let Err(e) = std::fs::rename(staging.join(file_name), dest) {
        if let Some(b) = &backed_up {
            let _ = std::fs::rename(b, dest);
        }
        return Err(e.into());
    }
    Ok(backed_up)
}

fn rollback(moved: &[(PathBuf, Option<PathBuf>)], target_dir: &Path, created_dir: bool) {
    for (dest, backed_up) in moved.iter().rev() {
        let _ = std::fs::remove_file(dest);
        if let Some(b) = backed_up {
            let _ = std::fs::rename(b, dest);
        }
    }
    if created_dir {
        let _ = std::fs::remove_dir(target_dir);
    }
    tracing::warn!(target = %target_dir.display(), files = moved.len(), "commit rolled back");
}

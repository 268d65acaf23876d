//! 沙箱文件系统
//!
//! SafeFs 绑定 root_dir，所有相对路径先做词法归一化再拼到 root 下：绝对路径、越过 root 的 `..` 一律 PathEscape。
//! 目标文件可以尚不存在（写文件 / 初始化项目），所以不依赖 canonicalize。

use std::path::{Component, Path, PathBuf};

use crate::core::AgentError;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

/// 文件编辑结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSummary {
    /// 起始标记所在行（从 1 开始）
    pub start_line: usize,
    /// 被替换掉的行数
    pub replaced_lines: usize,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 相对路径 -> root 下的绝对路径（词法校验）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let trimmed = path.trim();
        let mut normalized = PathBuf::new();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(AgentError::PathEscape(trimmed.to_string())); // 如 ../../etc/passwd
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AgentError::PathEscape(trimmed.to_string()));
                }
            }
        }
        Ok(self.root_dir.join(normalized))
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        Ok(std::fs::read_to_string(resolved)?)
    }

    /// 写文件，父目录不存在时创建
    pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, AgentError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&resolved, content)?;
        Ok(resolved)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = self.resolve(path)?;
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)? {
            let e = e?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// 目录存在时返回其条目，不存在返回 None
    pub fn check_directory(&self, path: &str) -> Result<Option<Vec<String>>, AgentError> {
        let resolved = self.resolve(path)?;
        if !resolved.is_dir() {
            return Ok(None);
        }
        self.list_dir(path).map(Some)
    }

    /// 在 `<dir>/<project>` 创建项目目录（已存在不报错）
    pub fn initialize_project(&self, project: &str, dir: &str) -> Result<PathBuf, AgentError> {
        let project = project.trim();
        if project.is_empty() || project.contains(&['/', '\\'][..]) || project == ".." {
            return Err(AgentError::PathEscape(project.to_string()));
        }
        let resolved = self.resolve(dir)?.join(project);
        std::fs::create_dir_all(&resolved)?;
        Ok(resolved)
    }

    /// 替换起止标记之间的行（保留标记行）；没有结束标记时替换起始标记所在行
    pub fn edit_between_markers(
        &self,
        path: &str,
        start_marker: &str,
        end_marker: Option<&str>,
        replacement: &str,
    ) -> Result<EditSummary, AgentError> {
        let resolved = self.resolve(path)?;
        let original = std::fs::read_to_string(&resolved)?;
        let lines: Vec<&str> = original.lines().collect();

        let start = lines
            .iter()
            .position(|l| l.contains(start_marker))
            .ok_or_else(|| marker_missing(path, start_marker))?;

        let (keep_head, resume_at) = match end_marker.filter(|m| !m.is_empty()) {
            Some(end_marker) => {
                let end = lines
                    .iter()
                    .skip(start + 1)
                    .position(|l| l.contains(end_marker))
                    .map(|i| i + start + 1)
                    .ok_or_else(|| marker_missing(path, end_marker))?;
                (start + 1, end)
            }
            None => (start, start + 1),
        };

        let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
        out.extend_from_slice(&lines[..keep_head]);
        out.extend(replacement.lines());
        out.extend_from_slice(&lines[resume_at..]);
        let mut content = out.join("\n");
        if original.ends_with('\n') {
            content.push('\n');
        }
        std::fs::write(&resolved, content)?;

        Ok(EditSummary {
            start_line: start + 1,
            replaced_lines: resume_at - keep_head,
        })
    }
}

fn marker_missing(path: &str, marker: &str) -> AgentError {
    AgentError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("marker '{marker}' not found in {path}"),
    ))
}

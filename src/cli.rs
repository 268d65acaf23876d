//! 行式命令解析
//!
//! `/create agency <name> <n>`、`/assign plan <name>`、`/implement code <name>`、`/destroy agency <name>`、
//! `/agencies`、`/ask <question>`、`/search <query>`、`/read <path>`、`/init <project> <dir>`、
//! `/checkdir <dir>`、`/build <name> <n> <idea>`、`exit`；其余自由文本交给 Planner。

use thiserror::Error;

/// 用户命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateAgency { name: String, developers: usize },
    AssignPlan { agency: String },
    ImplementCode { agency: String },
    DestroyAgency { agency: String },
    ListAgencies,
    /// Browser 研究，带对话历史
    Ask(String),
    Search(String),
    Read(String),
    Init { project: String, dir: String },
    CheckDir(String),
    /// 计划 → 建机构 → 分配 → 实现
    Build {
        agency: String,
        developers: usize,
        idea: String,
    },
    /// 自由文本：项目想法
    Idea(String),
    Exit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("'{0}' is not a positive number")]
    BadCount(String),
}

fn count(s: &str) -> Result<usize, CommandError> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::BadCount(s.to_string())),
    }
}

/// 解析一行输入；空行返回 None
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Ok(Some(Command::Exit));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Idea(line.to_string())));
    };

    let (head, tail) = match rest.split_once(char::is_whitespace) {
        Some((h, t)) => (h, t.trim()),
        None => (rest, ""),
    };
    let words: Vec<&str> = tail.split_whitespace().collect();

    let cmd = match head {
        "create" => match words.as_slice() {
            ["agency", name, n] => Command::CreateAgency {
                name: name.to_string(),
                developers: count(n)?,
            },
            _ => return Err(CommandError::Usage("/create agency <name> <developers>")),
        },
        "assign" => match words.as_slice() {
            ["plan", name] => Command::AssignPlan {
                agency: name.to_string(),
            },
            _ => return Err(CommandError::Usage("/assign plan <agency>")),
        },
        "implement" => match words.as_slice() {
            ["code", name] => Command::ImplementCode {
                agency: name.to_string(),
            },
            _ => return Err(CommandError::Usage("/implement code <agency>")),
        },
        "destroy" => match words.as_slice() {
            ["agency", name] => Command::DestroyAgency {
                agency: name.to_string(),
            },
            _ => return Err(CommandError::Usage("/destroy agency <agency>")),
        },
        "agencies" => Command::ListAgencies,
        "ask" if !tail.is_empty() => Command::Ask(tail.to_string()),
        "ask" => return Err(CommandError::Usage("/ask <question>")),
        "search" if !tail.is_empty() => Command::Search(tail.to_string()),
        "search" => return Err(CommandError::Usage("/search <query>")),
        "read" => match words.as_slice() {
            [path] => Command::Read(path.to_string()),
            _ => return Err(CommandError::Usage("/read <path>")),
        },
        "init" => match words.as_slice() {
            [project, dir] => Command::Init {
                project: project.to_string(),
                dir: dir.to_string(),
            },
            _ => return Err(CommandError::Usage("/init <project> <dir>")),
        },
        "checkdir" => match words.as_slice() {
            [dir] => Command::CheckDir(dir.to_string()),
            _ => return Err(CommandError::Usage("/checkdir <dir>")),
        },
        "build" => match words.as_slice() {
            [name, n, _, ..] => {
                let developers = count(n)?;
                // tail 已 trim，依次以 name、n 开头
                let after_name = tail[name.len()..].trim_start();
                let idea = after_name[n.len()..].trim().to_string();
                Command::Build {
                    agency: name.to_string(),
                    developers,
                    idea,
                }
            }
            _ => return Err(CommandError::Usage("/build <agency> <developers> <idea>")),
        },
        other => return Err(CommandError::Unknown(format!("/{other}"))),
    };
    Ok(Some(cmd))
}

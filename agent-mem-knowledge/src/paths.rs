//! Path safety for the write-memory flow.
//!
//! All writes are confined to the caller's project root; traversal is
//! rejected lexically before any file is created.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::parser::{extract_title, front_str, parse_front_matter};
use crate::text::slugify;

/// Resolved target of a write: absolute root, absolute file path, and the
/// project-relative path (forward slashes).
#[derive(Debug, Clone)]
pub struct ResolvedWrite {
    pub root: PathBuf,
    pub target: PathBuf,
    pub relative: String,
}

/// Resolve `relative_path` against `project_root`, creating the root if
/// missing and rejecting absolute or escaping inputs.
pub fn safe_resolve_path(project_root: &str, relative_path: &str) -> KnowledgeResult<ResolvedWrite> {
    let root = agent_mem_core::config::expand_home(project_root);
    if project_root.trim().is_empty() {
        return Err(KnowledgeError::InvalidInput("project_root 无效".to_string()));
    }
    std::fs::create_dir_all(&root)?;
    let root = root.canonicalize()?;

    if Path::new(relative_path).is_absolute() {
        return Err(KnowledgeError::InvalidInput(
            "relative_path 必须是相对路径".to_string(),
        ));
    }

    let mut rel = clean_path(Path::new(relative_path));
    if rel.as_os_str().is_empty() || rel == Path::new(".") {
        rel = PathBuf::from(default_filename());
    }
    if relative_path.ends_with('/') || relative_path.ends_with(std::path::MAIN_SEPARATOR) {
        rel = rel.join(default_filename());
    }

    let mut target = clean_path(&root.join(&rel));
    if !is_within(&root, &target) {
        return Err(KnowledgeError::PathOutsideRoot(PathBuf::from(relative_path)));
    }

    if target.is_dir() {
        target = target.join(default_filename());
    }
    if target.extension().is_none() {
        target.set_extension("md");
    }

    let relative = target
        .strip_prefix(&root)
        .map(to_slash)
        .unwrap_or_else(|_| target.to_string_lossy().to_string());

    Ok(ResolvedWrite {
        root,
        target,
        relative,
    })
}

/// Pick a default relative path from the memory's type, per the layout the
/// watcher understands: dialogue extracts to `chat_history/`, lessons to
/// `lessons/`, insights to `insights/`, everything else to `notes/`.
pub fn auto_relative_path(content: &str, knowledge_type: &str, insight_type: &str) -> String {
    let (front, body) = parse_front_matter(content);
    let knowledge_type = if knowledge_type.is_empty() {
        front_str(&front, "knowledge_type").unwrap_or_default()
    } else {
        knowledge_type
    }
    .trim()
    .to_lowercase();
    let insight_type = if insight_type.is_empty() {
        front_str(&front, "insight_type").unwrap_or_default()
    } else {
        insight_type
    }
    .trim()
    .to_lowercase();

    let base_dir = if knowledge_type == "dialogue_extract" {
        "chat_history"
    } else if insight_type == "lesson" {
        "lessons"
    } else if knowledge_type == "insight"
        || matches!(insight_type.as_str(), "solution" | "pattern" | "decision")
    {
        "insights"
    } else {
        "notes"
    };

    let title = extract_title(&body, "memory");
    let mut slug = slugify(&title);
    if slug.is_empty() {
        slug = "memory".to_string();
    }
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    format!("{base_dir}/{stamp}_{slug}.md")
}

pub fn default_filename() -> String {
    format!("memory_{}.md", Utc::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Append a timestamp before the extension, for non-overwriting collisions.
pub fn append_suffix(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{stamp}{ext}"))
}

/// Lexically normalize `.` and `..` components without touching the
/// filesystem. `..` at the start is preserved so escapes stay visible.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

pub fn is_within(root: &Path, target: &Path) -> bool {
    let root = clean_path(root);
    let target = clean_path(target);
    target == root || target.starts_with(&root)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

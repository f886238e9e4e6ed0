//! File classification: deciding whether a path is knowledge, and what kind.
//!
//! Turns a filesystem path plus raw content into a [`KnowledgeIngest`]
//! carrying the inferred doc type, knowledge type, categories, tags and
//! decay rule. Returns `None` (not an error) for anything outside the watch
//! scope.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;

use agent_mem_core::Settings;

use crate::errors::KnowledgeResult;
use crate::models::{DecayRule, KnowledgeIngest, KnowledgeType, SourceType};
use crate::parser::{extract_title, front_str, front_str_list, parse_front_matter};
use crate::text::{md5_hex, normalize_tags};

static DOC_TYPE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"docs/background/", "background"),
        (r"docs/requirements?/", "requirements"),
        (r"docs/arch(itecture)?/", "architecture"),
        (r"docs/design/", "design"),
        (r"docs/implementation/", "implementation"),
        (r"docs/progress/", "progress"),
        (r"docs/testing/", "testing"),
        (r"docs/deploy(ment)?/", "deployment"),
        (r"docs/delivery/", "delivery"),
    ]
    .into_iter()
    .map(|(pattern, doc_type)| (Regex::new(pattern).expect("doc-type rule"), doc_type))
    .collect()
});

static INSIGHT_PATH_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"insights?/", "pattern"),
        (r"lessons?/", "lesson"),
        (r"postmortem/", "lesson"),
    ]
    .into_iter()
    .map(|(pattern, insight)| (Regex::new(pattern).expect("insight rule"), insight))
    .collect()
});

static DIALOGUE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"chat_history/", r"\.claude/", r"\.codex/", r"\.gemini/"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("dialogue rule"))
        .collect()
});

fn root_file_doc_type(basename: &str) -> Option<&'static str> {
    match basename {
        "readme.md" => Some("delivery"),
        "tasks.md" | "changelog.md" | "todo.md" | "notes.md" => Some("progress"),
        "design.md" | "architecture.md" => Some("architecture"),
        _ => None,
    }
}

/// Project identity resolved from the project root.
#[derive(Debug, Clone)]
pub struct ProjectMeta {
    pub project_id: String,
    pub project_name: String,
    pub root_path: PathBuf,
}

/// Classify a file for ingestion.
///
/// `Ok(None)` means the file is out of scope: missing, a directory, empty,
/// oversized, or not under a watched location.
pub async fn process_file(
    settings: &Settings,
    file_path: &Path,
    project_root: Option<&Path>,
    machine_id: &str,
) -> KnowledgeResult<Option<KnowledgeIngest>> {
    let Ok(meta) = tokio::fs::metadata(file_path).await else {
        return Ok(None);
    };
    if meta.is_dir() {
        return Ok(None);
    }
    if settings.watcher.max_file_size_kb > 0
        && meta.len() > settings.watcher.max_file_size_kb * 1024
    {
        return Ok(None);
    }

    let root_path = match project_root {
        Some(root) => root.to_path_buf(),
        None => find_project_root(settings, file_path)
            .unwrap_or_else(|| file_path.parent().unwrap_or(Path::new(".")).to_path_buf()),
    };

    let relative = file_path
        .strip_prefix(&root_path)
        .map(|rel| rel.to_path_buf())
        .unwrap_or_else(|_| file_path.to_path_buf());
    let relative = to_slash(&relative);

    if !should_watch_file(settings, &relative) && !is_dialogue_path(&relative) {
        return Ok(None);
    }

    let Some(content) = read_file_lossy(file_path).await else {
        return Ok(None);
    };
    if content.trim().is_empty() {
        return Ok(None);
    }

    let (front, body) = parse_front_matter(&content);
    let project = load_project_meta(settings, &root_path).await;
    let doc_type = infer_doc_type(&relative, &front);
    let (knowledge_type, insight_type, source_type) = infer_knowledge_type(&relative, &front);

    let basename = relative.rsplit('/').next().unwrap_or(&relative);
    let title = extract_title(&body, basename);
    let file_hash = md5_hex(&content);
    let (category_l1, category_l2, category_l3) = extract_categories(&relative);
    let tags = normalize_tags(&front_str_list(&front, "tags"));
    let is_high_value = matches!(
        knowledge_type,
        KnowledgeType::Insight | KnowledgeType::DialogueExtract
    );

    Ok(Some(KnowledgeIngest {
        project_id: project.project_id,
        project_name: project.project_name,
        machine_id: machine_id.to_string(),
        file_path: file_path.to_string_lossy().to_string(),
        relative_path: relative,
        raw_content_path: String::new(),
        file_hash,
        title,
        content: body,
        summary: String::new(),
        structured: None,
        knowledge_type,
        doc_type: doc_type.to_string(),
        insight_type,
        source_type,
        category_l1,
        category_l2,
        category_l3,
        tags,
        related_ids: Vec::new(),
        decay_rule: DecayRule::for_doc_type(doc_type),
        is_high_value,
        reproducible: None,
        applicable_to: Vec::new(),
    }))
}

/// Front-matter `doc_type` wins, then the root-file table, then path rules.
pub fn infer_doc_type<'a>(relative_path: &str, front: &'a serde_yaml::Mapping) -> &'a str {
    if let Some(value) = front_str(front, "doc_type") {
        return value;
    }
    let basename = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_lowercase();
    if let Some(value) = root_file_doc_type(&basename) {
        return value;
    }
    let path_lower = relative_path.to_lowercase();
    for (rule, doc_type) in DOC_TYPE_RULES.iter() {
        if rule.is_match(&path_lower) {
            return doc_type;
        }
    }
    ""
}

/// Dialogue paths force `dialogue_extract`; insight paths force `insight`;
/// otherwise front matter or the `doc` default.
pub fn infer_knowledge_type(
    relative_path: &str,
    front: &serde_yaml::Mapping,
) -> (KnowledgeType, String, SourceType) {
    let mut knowledge_type = KnowledgeType::Doc;
    if let Some(value) = front_str(front, "knowledge_type") {
        if let Ok(parsed) = value.trim().parse() {
            knowledge_type = parsed;
        }
    }
    let insight_type = front_str(front, "insight_type")
        .map(|value| value.trim().to_string())
        .unwrap_or_default();

    let path_lower = relative_path.to_lowercase();
    if DIALOGUE_RULES.iter().any(|rule| rule.is_match(&path_lower)) {
        return (KnowledgeType::DialogueExtract, insight_type, SourceType::Dialogue);
    }

    for (rule, rule_insight) in INSIGHT_PATH_RULES.iter() {
        if rule.is_match(&path_lower) {
            let insight = if insight_type.is_empty() {
                rule_insight.to_string()
            } else {
                insight_type
            };
            return (KnowledgeType::Insight, insight, SourceType::File);
        }
    }

    (knowledge_type, insight_type, SourceType::File)
}

/// Whether a relative path falls inside the configured watch scope.
pub fn should_watch_file(settings: &Settings, relative_path: &str) -> bool {
    let basename = relative_path.rsplit('/').next().unwrap_or(relative_path);
    if settings
        .watcher
        .watch_root_files
        .iter()
        .any(|name| name.eq_ignore_ascii_case(basename))
    {
        return true;
    }

    if let Some(ext) = extension_of(relative_path) {
        if !settings.watcher.extensions.iter().any(|e| e == &ext) {
            return false;
        }
    }

    let parts: Vec<&str> = relative_path.split('/').collect();
    for part in &parts {
        if settings.watcher.ignore_dirs.iter().any(|d| d == part) {
            return false;
        }
    }

    match parts.first() {
        Some(top) => settings.watcher.watch_dirs.iter().any(|d| d == top),
        None => false,
    }
}

pub fn is_dialogue_path(relative_path: &str) -> bool {
    let path_lower = relative_path.to_lowercase();
    DIALOGUE_RULES.iter().any(|rule| rule.is_match(&path_lower))
}

/// Path segments minus `docs`/`doc`/`specs`, extension stripped from the last.
pub fn extract_categories(relative_path: &str) -> (String, String, String) {
    let mut parts: Vec<String> = relative_path
        .split('/')
        .filter(|part| !matches!(*part, "docs" | "doc" | "specs"))
        .map(str::to_string)
        .collect();
    if let Some(last) = parts.last_mut() {
        if let Some(idx) = last.rfind('.') {
            if idx > 0 {
                last.truncate(idx);
            }
        }
    }
    let mut iter = parts.into_iter();
    (
        iter.next().unwrap_or_default(),
        iter.next().unwrap_or_default(),
        iter.next().unwrap_or_default(),
    )
}

/// Walk ancestors until a configured root marker is found.
pub fn find_project_root(settings: &Settings, file_path: &Path) -> Option<PathBuf> {
    let mut dir = file_path.parent()?.to_path_buf();
    loop {
        for marker in &settings.project.root_markers {
            if dir.join(marker).exists() {
                return Some(dir);
            }
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Resolve project identity: root basename, overridden by `.project.yaml`.
pub async fn load_project_meta(settings: &Settings, project_root: &Path) -> ProjectMeta {
    let mut meta = ProjectMeta {
        project_id: settings.project.default_project_id.clone(),
        project_name: String::new(),
        root_path: project_root.to_path_buf(),
    };
    if let Some(base) = project_root.file_name().and_then(|name| name.to_str()) {
        if !base.is_empty() {
            meta.project_id = base.to_string();
        }
    }

    let config_path = project_root.join(".project.yaml");
    let Ok(data) = tokio::fs::read_to_string(&config_path).await else {
        return meta;
    };
    let Ok(Value::Mapping(raw)) = serde_yaml::from_str::<Value>(&data) else {
        return meta;
    };
    if let Some(value) = front_str(&raw, &settings.project.project_id_key) {
        if !value.is_empty() {
            meta.project_id = value.to_string();
        }
    }
    if let Some(value) = front_str(&raw, &settings.project.project_name_key) {
        if !value.is_empty() {
            meta.project_name = value.to_string();
        }
    }
    meta
}

/// Read a file as UTF-8, falling back to a Latin-1 interpretation.
async fn read_file_lossy(path: &Path) -> Option<String> {
    let data = tokio::fs::read(path).await.ok()?;
    match String::from_utf8(data) {
        Ok(text) => Some(text),
        Err(err) => Some(err.as_bytes().iter().map(|&b| b as char).collect()),
    }
}

fn extension_of(path: &str) -> Option<String> {
    let basename = path.rsplit('/').next().unwrap_or(path);
    basename.rfind('.').map(|idx| basename[idx..].to_string())
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

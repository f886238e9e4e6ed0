//! YAML front-matter parsing and emission.
//!
//! The parser is deliberately forgiving: a missing or malformed block never
//! fails an ingest, it just yields an empty mapping and the raw content.

use serde_yaml::{Mapping, Value};

/// Split `---` fenced YAML front matter from a document.
///
/// Returns the front-matter mapping and the body. A document without a
/// leading fence, with an unterminated fence, or with YAML that does not
/// parse yields an empty mapping; in the malformed-YAML case the body is
/// the unmodified input.
pub fn parse_front_matter(content: &str) -> (Mapping, String) {
    if !content.starts_with("---") {
        return (Mapping::new(), content.to_string());
    }
    let mut parts = content.splitn(3, "---");
    parts.next();
    let (Some(raw), Some(rest)) = (parts.next(), parts.next()) else {
        return (Mapping::new(), content.to_string());
    };

    let raw = raw.trim();
    let body = rest.trim_start_matches('\n').to_string();
    if raw.is_empty() {
        return (Mapping::new(), body);
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(map)) => (map, body),
        _ => (Mapping::new(), content.to_string()),
    }
}

/// String value of a front-matter key, if present.
pub fn front_str<'a>(front: &'a Mapping, key: &str) -> Option<&'a str> {
    front
        .get(Value::String(key.to_string()))
        .and_then(Value::as_str)
}

/// String-sequence value of a front-matter key (non-strings skipped).
pub fn front_str_list(front: &Mapping, key: &str) -> Vec<String> {
    front
        .get(Value::String(key.to_string()))
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Prepend a front-matter block unless the content already has one.
///
/// Emits nothing when no field is set, so plain notes stay plain.
pub fn ensure_front_matter(
    content: &str,
    knowledge_type: &str,
    insight_type: &str,
    tags: &[String],
) -> String {
    if content.trim_start().starts_with("---") {
        return content.to_string();
    }
    if knowledge_type.is_empty() && insight_type.is_empty() && tags.is_empty() {
        return content.to_string();
    }
    let front = build_front_matter(knowledge_type, insight_type, tags);
    format!("{}\n{}\n", front, content.trim())
}

pub fn build_front_matter(knowledge_type: &str, insight_type: &str, tags: &[String]) -> String {
    let mut out = String::from("---\n");
    if !knowledge_type.is_empty() {
        out.push_str("knowledge_type: ");
        out.push_str(knowledge_type);
        out.push('\n');
    }
    if !insight_type.is_empty() {
        out.push_str("insight_type: ");
        out.push_str(insight_type);
        out.push('\n');
    }
    if !tags.is_empty() {
        out.push_str("tags:\n");
        for tag in tags {
            out.push_str("  - ");
            out.push_str(tag);
            out.push('\n');
        }
    }
    out.push_str("---");
    out
}

/// First `# ` heading, else the fallback (usually the basename).
pub fn extract_title(content: &str, fallback: &str) -> String {
    for line in content.lines() {
        let line = line.trim();
        if let Some(title) = line.strip_prefix("# ") {
            return title.trim().to_string();
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_front_matter() {
        let content = "---\nknowledge_type: insight\ntags:\n  - a\n  - b\n---\n# Title\n\nbody";
        let (front, body) = parse_front_matter(content);
        assert_eq!(front_str(&front, "knowledge_type"), Some("insight"));
        assert_eq!(front_str_list(&front, "tags"), vec!["a", "b"]);
        assert_eq!(body, "# Title\n\nbody");
    }

    #[test]
    fn missing_block_yields_raw_content() {
        let content = "# Just a doc\n\nno front matter";
        let (front, body) = parse_front_matter(content);
        assert!(front.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn unterminated_block_yields_raw_content() {
        let content = "---\nknowledge_type: doc\nno closing fence";
        let (front, body) = parse_front_matter(content);
        assert!(front.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn malformed_yaml_yields_raw_content() {
        let content = "---\n{ unclosed flow\n---\nbody";
        let (front, body) = parse_front_matter(content);
        assert!(front.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn empty_block_yields_body() {
        let content = "---\n---\nbody here";
        let (front, body) = parse_front_matter(content);
        assert!(front.is_empty());
        assert_eq!(body, "body here");
    }

    #[test]
    fn round_trip_preserves_fields_and_body() {
        let original = "# Note\n\nSome body text.";
        let tags = vec!["db".to_string(), "infra".to_string()];
        let emitted = ensure_front_matter(original, "insight", "decision", &tags);

        let (front, body) = parse_front_matter(&emitted);
        assert_eq!(front_str(&front, "knowledge_type"), Some("insight"));
        assert_eq!(front_str(&front, "insight_type"), Some("decision"));
        assert_eq!(front_str_list(&front, "tags"), tags);
        assert_eq!(body.trim_end(), original.trim());
    }

    #[test]
    fn ensure_front_matter_is_a_no_op_when_already_present() {
        let content = "---\nknowledge_type: doc\n---\nbody";
        let emitted = ensure_front_matter(content, "insight", "", &[]);
        assert_eq!(emitted, content);
    }

    #[test]
    fn ensure_front_matter_skips_when_nothing_to_emit() {
        let content = "plain body";
        assert_eq!(ensure_front_matter(content, "", "", &[]), content);
    }

    #[test]
    fn title_extraction() {
        assert_eq!(extract_title("# Heading\nbody", "f.md"), "Heading");
        assert_eq!(extract_title("text\n  # Indented\nrest", "f.md"), "Indented");
        assert_eq!(extract_title("no heading", "f.md"), "f.md");
        assert_eq!(extract_title("## second level only", "f.md"), "f.md");
    }
}

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::{
    error::{Error, Result},
    types::{SKILL_FILENAME, SkillDocument},
};

const DELIMITER: &str = "---";

/// Normalized frontmatter fields. Unknown keys are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub allowed_tools: Vec<String>,
    pub version: Option<String>,
    pub author: Option<String>,
}

/// Split `SKILL.md` content into (frontmatter, body).
///
/// Frontmatter is recognised only when the content starts with `---`. An
/// opening delimiter with no closing `\n---` is not an error: the whole
/// content becomes the body. Back-to-back delimiters give an empty, present
/// frontmatter.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(after_open) = content.strip_prefix(DELIMITER) else {
        return (None, content);
    };
    let rest = trim_leading_newlines(after_open);

    if let Some(body) = rest.strip_prefix(DELIMITER) {
        return (Some(""), trim_leading_newlines(body));
    }

    let Some(close) = rest.find("\n---") else {
        return (None, content);
    };
    let frontmatter = rest[..close].trim();
    let body = trim_leading_newlines(&rest[close + 1 + DELIMITER.len()..]);
    (Some(frontmatter), body)
}

fn trim_leading_newlines(s: &str) -> &str {
    s.trim_start_matches(['\r', '\n'])
}

/// Parse and normalize a YAML frontmatter block.
///
/// `origin` is only used for error messages.
pub fn parse_frontmatter(yaml: &str, origin: &Path) -> Result<Frontmatter> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::default());
    }

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::parse(origin, format!("invalid YAML frontmatter: {e}")))?;

    match value {
        Value::Null => Ok(Frontmatter::default()),
        Value::Mapping(map) => Ok(normalize(&map)),
        _ => Err(Error::parse(
            origin,
            "frontmatter must be a mapping of keys to values",
        )),
    }
}

fn normalize(map: &Mapping) -> Frontmatter {
    let field = |key: &str| map.get(key).and_then(scalar_string);

    let hyphenated = map.get("allowed-tools").map(string_list).unwrap_or_default();
    let allowed_tools = if hyphenated.is_empty() {
        map.get("allowed_tools").map(string_list).unwrap_or_default()
    } else {
        hyphenated
    };

    Frontmatter {
        name: field("name").filter(|n| !n.trim().is_empty()),
        description: field("description"),
        allowed_tools,
        version: field("version"),
        author: field("author"),
    }
}

/// Scalars become strings (`1.0` stays `"1.0"`); everything else is absent.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// A list of scalars, or a single scalar as a one-element list.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other)
            .filter(|s| !s.trim().is_empty())
            .into_iter()
            .collect(),
    }
}

/// Parse `SKILL.md` content belonging to `skill_dir`.
pub fn parse_skill(content: &str, skill_dir: &Path) -> Result<SkillDocument> {
    let (frontmatter, body) = split_frontmatter(content);
    let meta = match frontmatter {
        Some(yaml) => parse_frontmatter(yaml, &skill_dir.join(SKILL_FILENAME))?,
        None => Frontmatter::default(),
    };

    Ok(SkillDocument {
        name: meta.name.unwrap_or_else(|| dir_name(skill_dir)),
        description: meta.description.unwrap_or_default(),
        instructions: body.to_string(),
        path: skill_dir.to_path_buf(),
        allowed_tools: meta.allowed_tools,
        version: meta.version,
        author: meta.author,
    })
}

/// Load the skill in `dir`.
pub fn load_skill(dir: &Path) -> Result<SkillDocument> {
    if !dir.exists() {
        return Err(Error::SkillDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(Error::parse(dir, "not a directory"));
    }

    let skill_md = dir.join(SKILL_FILENAME);
    if !skill_md.is_file() {
        return Err(Error::parse(dir, format!("no {SKILL_FILENAME} in directory")));
    }

    let content = std::fs::read_to_string(&skill_md).map_err(|e| Error::io(&skill_md, e))?;
    let dir = dir.canonicalize().map_err(|e| Error::io(dir, e))?;
    parse_skill(&content, &dir)
}

/// Read only the frontmatter of a `SKILL.md` file. The body is never
/// materialized into a [`SkillDocument`].
pub fn read_metadata(skill_md: &Path) -> Result<Frontmatter> {
    let content = std::fs::read_to_string(skill_md).map_err(|e| Error::io(skill_md, e))?;
    match split_frontmatter(&content) {
        (Some(yaml), _) => parse_frontmatter(yaml, skill_md),
        (None, _) => Ok(Frontmatter::default()),
    }
}

pub(crate) fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::error::ErrorKind, rstest::rstest};

    #[test]
    fn split_basic() {
        let (fm, body) = split_frontmatter("---\nname: greeting\n---\n\n# Greeting\nHi.\n");
        assert_eq!(fm, Some("name: greeting"));
        assert_eq!(body, "# Greeting\nHi.\n");
    }

    #[test]
    fn split_without_frontmatter() {
        let content = "# Just markdown\n---\nnot frontmatter\n";
        assert_eq!(split_frontmatter(content), (None, content));
    }

    #[test]
    fn split_requires_delimiter_at_start() {
        let content = "\n---\nname: x\n---\nbody";
        assert_eq!(split_frontmatter(content), (None, content));
    }

    #[test]
    fn split_empty_frontmatter() {
        assert_eq!(
            split_frontmatter("---\n---\n# Body\n"),
            (Some(""), "# Body\n")
        );
    }

    #[test]
    fn split_unclosed_keeps_everything_as_body() {
        let content = "---\nname: broken\nno closing here\n";
        assert_eq!(split_frontmatter(content), (None, content));
    }

    #[test]
    fn split_handles_crlf() {
        let (fm, body) = split_frontmatter("---\r\nname: win\r\n---\r\n# Body\r\n");
        assert_eq!(fm, Some("name: win"));
        assert_eq!(body, "# Body\r\n");
    }

    #[test]
    fn parse_full_document() {
        let content = r#"---
name: rapid-interviewing
description: Conduct rapid discovery interviews
allowed-tools:
  - Bash
  - Read
version: 1.0
author: Event Team
unknown_key: ignored
---

# Rapid Interviewing

Ask short questions.
"#;
        let skill = parse_skill(content, Path::new("/skills/rapid-interviewing")).unwrap();
        assert_eq!(skill.name, "rapid-interviewing");
        assert_eq!(skill.description, "Conduct rapid discovery interviews");
        assert_eq!(skill.allowed_tools, vec!["Bash", "Read"]);
        assert_eq!(skill.version.as_deref(), Some("1.0"));
        assert_eq!(skill.author.as_deref(), Some("Event Team"));
        assert!(skill.instructions.starts_with("# Rapid Interviewing"));
        assert!(!skill.instructions.contains("---"));
    }

    #[rstest]
    #[case("allowed-tools: Bash", vec!["Bash"])]
    #[case("allowed_tools: Read", vec!["Read"])]
    #[case("allowed_tools: [Read, Write]", vec!["Read", "Write"])]
    #[case("allowed-tools: []\nallowed_tools: [Grep]", vec!["Grep"])]
    #[case("allowed-tools: [Bash]\nallowed_tools: [Grep]", vec!["Bash"])]
    #[case("allowed-tools:\nallowed_tools: Grep", vec!["Grep"])]
    #[case("description: none", vec![])]
    fn tool_list_coercion(#[case] yaml: &str, #[case] expected: Vec<&str>) {
        let fm = parse_frontmatter(yaml, Path::new("SKILL.md")).unwrap();
        assert_eq!(fm.allowed_tools, expected);
    }

    #[test]
    fn numeric_version_is_a_string() {
        let fm = parse_frontmatter("version: 2", Path::new("SKILL.md")).unwrap();
        assert_eq!(fm.version.as_deref(), Some("2"));
    }

    #[test]
    fn name_falls_back_to_directory() {
        let skill = parse_skill("Just instructions.", Path::new("/skills/fallback")).unwrap();
        assert_eq!(skill.name, "fallback");
        assert_eq!(skill.description, "");
        assert_eq!(skill.instructions, "Just instructions.");

        let skill = parse_skill("---\n---\nBody", Path::new("/skills/empty-fm")).unwrap();
        assert_eq!(skill.name, "empty-fm");
        assert_eq!(skill.instructions, "Body");
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = parse_skill("---\nname: [unclosed\n---\nbody", Path::new("/s/x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn non_mapping_frontmatter_is_rejected() {
        let err = parse_frontmatter("- a\n- b", Path::new("SKILL.md")).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn load_skill_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("greeting");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(SKILL_FILENAME),
            "---\nname: greeting\ndescription: \"Welcome users\"\n---\n# Greeting\nSay hello.\n",
        )
        .unwrap();

        let skill = load_skill(&dir).unwrap();
        assert_eq!(skill.name, "greeting");
        assert_eq!(skill.path, dir.canonicalize().unwrap());
        assert!(skill.path.is_absolute());
        assert!(!skill.has_tools());
    }

    #[test]
    fn load_skill_failures() {
        let tmp = tempfile::tempdir().unwrap();

        let missing = load_skill(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(load_skill(&file).unwrap_err().kind(), ErrorKind::Parse);

        let empty = tmp.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert_eq!(load_skill(&empty).unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn read_metadata_ignores_body() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SKILL_FILENAME);
        std::fs::write(&path, "---\nname: meta\nversion: 0.3\n---\n# Huge body\n").unwrap();

        let fm = read_metadata(&path).unwrap();
        assert_eq!(fm.name.as_deref(), Some("meta"));
        assert_eq!(fm.version.as_deref(), Some("0.3"));
    }
}

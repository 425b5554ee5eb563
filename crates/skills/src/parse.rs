use std::path::Path;

use {
    indexmap::IndexMap,
    serde::Serialize,
    serde_yaml::{Mapping, Value},
};

/// Manifest file every skill bundle carries at its root.
pub const MANIFEST_FILE: &str = "SKILL.md";

const DELIMITER: &str = "---";

/// Skill names are lowercase ASCII letters, digits and hyphens.
pub fn is_valid_skill_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("SKILL.md file is empty")]
    Empty,
    #[error("no YAML frontmatter found, SKILL.md must start with ---")]
    MissingOpening,
    #[error("frontmatter is not closed by a second ---")]
    MissingClosing,
    #[error("invalid YAML in frontmatter: {0}")]
    Yaml(String),
    #[error("YAML frontmatter must be a mapping")]
    NotAMapping,
}

/// Split manifest content into `(frontmatter, body)`.
///
/// The content must open with `---`; the frontmatter runs until the next
/// `---`, wherever it occurs. The body is everything after that.
pub fn split_frontmatter(content: &str) -> Result<(&str, &str), ManifestError> {
    if content.trim().is_empty() {
        return Err(ManifestError::Empty);
    }
    let rest = content
        .strip_prefix(DELIMITER)
        .ok_or(ManifestError::MissingOpening)?;
    let close = rest.find(DELIMITER).ok_or(ManifestError::MissingClosing)?;
    Ok((rest[..close].trim(), &rest[close + DELIMITER.len()..]))
}

/// A parsed `SKILL.md`: the raw frontmatter mapping plus the markdown body.
#[derive(Debug, Clone)]
pub struct SkillManifest {
    pub frontmatter: Mapping,
    pub body: String,
}

impl SkillManifest {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.frontmatter.get(key)
    }

    pub fn header(&self) -> ManifestHeader {
        ManifestHeader::from_mapping(&self.frontmatter)
    }
}

pub fn parse_manifest(content: &str) -> Result<SkillManifest, ManifestError> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let value: Value =
        serde_yaml::from_str(frontmatter).map_err(|e| ManifestError::Yaml(e.to_string()))?;
    match value {
        Value::Mapping(frontmatter) => Ok(SkillManifest {
            frontmatter,
            body: body.trim().to_string(),
        }),
        _ => Err(ManifestError::NotAMapping),
    }
}

/// Display-oriented view of the frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Every other string-keyed entry, in document order.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ManifestHeader {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut header = Self::default();
        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                continue;
            };
            let text = value.as_str().map(str::to_string);
            match key {
                "name" if text.is_some() => header.name = text,
                "description" if text.is_some() => header.description = text,
                "license" if text.is_some() => header.license = text,
                _ => {
                    header.extra.insert(key.to_string(), value.clone());
                },
            }
        }
        header
    }
}

/// Read the frontmatter of `<skill_dir>/SKILL.md`.
/// Returns `None` if the file is missing, unreadable, or has no valid frontmatter.
pub fn read_frontmatter(skill_dir: &Path) -> Option<ManifestHeader> {
    let content = std::fs::read_to_string(skill_dir.join(MANIFEST_FILE)).ok()?;
    parse_manifest(&content).ok().map(|m| m.header())
}

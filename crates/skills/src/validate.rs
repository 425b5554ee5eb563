//! Structural validation of a skill bundle directory.
//!
//! A bundle is valid when it has a readable `SKILL.md` whose frontmatter is a
//! YAML mapping with non-empty `name` and `description`. Everything else
//! (size, naming style, body, optional directories) only produces warnings.

use std::path::{Component, Path};

use {
    serde::Serialize,
    serde_yaml::Value,
    tracing::debug,
    walkdir::WalkDir,
};

use crate::parse::{MANIFEST_FILE, is_valid_skill_name, parse_manifest};

/// Recommended ceiling on the total size of a bundle.
pub const MAX_SKILL_SIZE_BYTES: u64 = 10 * 1024 * 1024;

const REQUIRED_FIELDS: &[&str] = &["name", "description"];

/// Optional directories and the file extensions allowed inside them.
/// An empty list means any file is accepted.
const OPTIONAL_DIRS: &[(&str, &[&str])] = &[
    ("scripts", &["py", "sh", "bash"]),
    ("reference", &["md", "txt"]),
    ("assets", &[]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// What the finding is about: `path`, `SKILL.md`, `frontmatter.name`, `scripts/files`, ...
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity.to_string().to_uppercase(),
            self.field,
            self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// `true` when no finding has severity `error`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.by_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.by_severity(Severity::Warning)
    }

    /// Error findings joined into one line, as stored in `validation_errors`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }

    fn push(&mut self, severity: Severity, field: impl Into<String>, message: impl Into<String>) {
        self.findings.push(Finding {
            field: field.into(),
            message: message.into(),
            severity,
        });
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, field, message);
    }

    fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, field, message);
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, finding) in self.findings.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{finding}")?;
        }
        Ok(())
    }
}

/// Validate a candidate skill directory.
pub fn validate_skill_dir(dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !dir.exists() {
        report.error(
            "path",
            format!("skill directory does not exist: {}", dir.display()),
        );
        return report;
    }
    if !dir.is_dir() {
        report.error("path", format!("path is not a directory: {}", dir.display()));
        return report;
    }
    if dir.components().any(|c| matches!(c, Component::ParentDir)) {
        report.error(
            "path",
            format!("path contains a parent-directory component: {}", dir.display()),
        );
        return report;
    }

    let total = tree_size(dir);
    if total > MAX_SKILL_SIZE_BYTES {
        report.warning(
            "size",
            format!(
                "skill size ({:.2}MB) exceeds recommended limit ({}MB)",
                total as f64 / 1024.0 / 1024.0,
                MAX_SKILL_SIZE_BYTES / 1024 / 1024
            ),
        );
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        report.error(
            MANIFEST_FILE,
            format!("required file SKILL.md not found in {}", dir.display()),
        );
        return report;
    }

    check_manifest(&manifest_path, &mut report);
    check_optional_dirs(dir, &mut report);

    debug!(
        path = %dir.display(),
        findings = report.findings.len(),
        valid = report.is_valid(),
        "validated skill directory"
    );
    report
}

fn check_manifest(path: &Path, report: &mut ValidationReport) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            report.error(MANIFEST_FILE, format!("error reading SKILL.md: {e}"));
            return;
        },
    };
    let manifest = match parse_manifest(&content) {
        Ok(manifest) => manifest,
        Err(e) => {
            report.error(MANIFEST_FILE, e.to_string());
            return;
        },
    };

    for field in REQUIRED_FIELDS {
        match manifest.get(field) {
            None => report.error(
                format!("frontmatter.{field}"),
                format!("required field '{field}' is missing"),
            ),
            Some(value) if is_blank(value) => report.error(
                format!("frontmatter.{field}"),
                format!("required field '{field}' is empty"),
            ),
            Some(_) => {},
        }
    }

    if let Some(name) = manifest.get("name").and_then(Value::as_str)
        && !name.is_empty()
        && !is_valid_skill_name(name)
    {
        report.warning(
            "frontmatter.name",
            "skill name should contain only lowercase letters, numbers, and hyphens",
        );
    }

    if manifest.body.is_empty() {
        report.warning(MANIFEST_FILE, "SKILL.md has no content after frontmatter");
    }
}

fn check_optional_dirs(dir: &Path, report: &mut ValidationReport) {
    for (name, allowed) in OPTIONAL_DIRS {
        let sub = dir.join(name);
        if !sub.exists() {
            continue;
        }
        if !sub.is_dir() {
            report.warning(*name, format!("{name} exists but is not a directory"));
            continue;
        }
        if allowed.is_empty() {
            continue;
        }

        for entry in WalkDir::new(&sub)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !ext.is_empty() && !allowed.contains(&ext) {
                report.warning(
                    format!("{name}/files"),
                    format!(
                        "file {} has unexpected extension .{ext}",
                        entry.file_name().to_string_lossy()
                    ),
                );
            }
        }
    }
}

fn tree_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Null, `false`, zero, blank strings and empty collections all count as empty.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        Value::Tagged(tagged) => is_blank(&tagged.value),
    }
}

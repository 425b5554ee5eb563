use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::StoreConfig,
};

/// Standard config file names, checked in order inside the project root.
const CONFIG_FILENAMES: &[&str] = &[
    "skillshelf.toml",
    "skillshelf.yaml",
    "skillshelf.yml",
    "skillshelf.json",
];

/// Load config from `path` (any supported format) and anchor it at `project_root`.
pub fn load_config(project_root: &Path, path: &Path) -> Result<StoreConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    config.project_root = project_root.to_path_buf();
    Ok(config)
}

/// Load `skillshelf.{toml,yaml,yml,json}` from `project_root`, falling back to
/// the default layout, then apply environment overrides.
pub fn discover_and_load(project_root: &Path) -> StoreConfig {
    let mut config = match find_config_file(project_root) {
        Some(path) => {
            debug!(path = %path.display(), "loading store config");
            load_config(project_root, &path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load store config, using defaults");
                StoreConfig::new(project_root)
            })
        },
        None => {
            debug!(root = %project_root.display(), "no store config found, using defaults");
            StoreConfig::new(project_root)
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `SKILLSHELF_*` and `GITHUB_TOKEN` environment overrides.
pub fn apply_env_overrides(config: &mut StoreConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut StoreConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(dir) = lookup("SKILLSHELF_DATA_DIR") {
        config.paths.data_dir = PathBuf::from(dir);
    }
    if let Some(dir) = lookup("SKILLSHELF_DISCOVERY_DIR") {
        config.paths.discovery_dir = PathBuf::from(dir);
    }
    if let Some(base) = lookup("SKILLSHELF_GITHUB_API") {
        config.github.api_base = base;
    }
    if let Some(token) = lookup("SKILLSHELF_GITHUB_TOKEN").or_else(|| lookup("GITHUB_TOKEN")) {
        config.github.token = Some(Secret::new(token));
    }
}

fn find_config_file(project_root: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| project_root.join(name))
        .find(|p| p.is_file())
}

fn parse_config(raw: &str, path: &Path) -> Result<StoreConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("config file has no extension: {}", path.display()))?;

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = discover_and_load(tmp.path());
        assert_eq!(config.project_root, tmp.path());
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert_eq!(config.github.metadata_timeout_secs, 10);
    }

    #[test]
    fn toml_overrides_partial_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("skillshelf.toml");
        std::fs::write(
            &path,
            "[paths]\ndiscovery_dir = \".claude/skills\"\n\n[github]\nraw_base = \"http://127.0.0.1:9\"\n",
        )
        .unwrap();

        let config = load_config(tmp.path(), &path).unwrap();
        assert_eq!(config.discovery_dir(), tmp.path().join(".claude/skills"));
        assert_eq!(config.github.raw_base, "http://127.0.0.1:9");
        // Untouched sections keep their defaults.
        assert_eq!(config.paths.catalog_file, "skills-registry.json");
        assert_eq!(config.github.api_base, "https://api.github.com");
    }

    #[test]
    fn json_and_yaml_are_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let json = tmp.path().join("skillshelf.json");
        std::fs::write(&json, r#"{"paths":{"data_dir":"state"}}"#).unwrap();
        let config = load_config(tmp.path(), &json).unwrap();
        assert_eq!(config.data_dir(), tmp.path().join("state"));

        let yaml = tmp.path().join("skillshelf.yaml");
        std::fs::write(&yaml, "github:\n  user_agent: custom-agent\n").unwrap();
        let config = load_config(tmp.path(), &yaml).unwrap();
        assert_eq!(config.github.user_agent, "custom-agent");
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("skillshelf.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(tmp.path(), &path).unwrap_err(),
            Error::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn env_overrides_apply_token_and_dirs() {
        let mut config = StoreConfig::new("/srv/project");
        apply_env_overrides_with(&mut config, |name| match name {
            "GITHUB_TOKEN" => Some("ghp_fallback".into()),
            "SKILLSHELF_DISCOVERY_DIR" => Some("/opt/discovery".into()),
            "SKILLSHELF_DATA_DIR" => Some("   ".into()),
            _ => None,
        });

        assert_eq!(config.discovery_dir(), PathBuf::from("/opt/discovery"));
        assert_eq!(config.data_dir(), PathBuf::from("/srv/project/data"));
        assert_eq!(
            config.github.token.as_ref().unwrap().expose_secret(),
            "ghp_fallback"
        );
    }

    #[test]
    fn dedicated_token_wins_over_github_token() {
        let mut config = StoreConfig::new("/srv/project");
        apply_env_overrides_with(&mut config, |name| match name {
            "GITHUB_TOKEN" => Some("ghp_fallback".into()),
            "SKILLSHELF_GITHUB_TOKEN" => Some("ghp_dedicated".into()),
            _ => None,
        });
        assert_eq!(
            config.github.token.as_ref().unwrap().expose_secret(),
            "ghp_dedicated"
        );
    }
}

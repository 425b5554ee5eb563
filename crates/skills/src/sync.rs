//! Remote catalog synchronisation.
//!
//! The remote config document lists GitHub repositories that publish a
//! catalog file. A refresh asks each enabled source in priority order for
//! that file through the contents API (conditionally, with the stored ETag)
//! and caches the first catalog it gets back.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    chrono::{DateTime, NaiveDateTime, TimeDelta, Utc},
    reqwest::{Client, StatusCode, header},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    skillshelf_common::json::{read_json, write_json_atomic},
    skillshelf_config::GithubConfig,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    fetch::FetchError,
    types::{CatalogSnapshot, CatalogStats, SkillSource},
};

/// Cache file written next to the remote config document.
pub const CACHE_FILE: &str = "remote-registry-cache.json";

const DEFAULT_SOURCE_URL: &str = "https://github.com/zongwu233/skills-registry";
const DEFAULT_SKILLS_PATH: &str = "skills/skills-registry.json";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to persist remote sync state: {0}")]
    Persist(#[from] skillshelf_common::Error),
}

// ── Remote config document ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSyncConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sources: Vec<RemoteSource>,
    #[serde(default)]
    pub cache: CachePolicy,
    #[serde(default)]
    pub auto_sync: AutoSync,
}

fn default_version() -> String {
    "1.0.0".into()
}

impl Default for RemoteSyncConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            sources: vec![RemoteSource {
                name: "skills-registry".into(),
                kind: "github".into(),
                url: DEFAULT_SOURCE_URL.into(),
                branch: SkillSource::DEFAULT_BRANCH.into(),
                skills_path: DEFAULT_SKILLS_PATH.into(),
                enabled: true,
                priority: Some(1),
            }],
            cache: CachePolicy::default(),
            auto_sync: AutoSync::default(),
        }
    }
}

/// A repository that publishes a catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Repository URL, e.g. `https://github.com/owner/repo`.
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Path of the catalog document inside the repository.
    pub skills_path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower runs first; sources without a priority run last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

fn default_kind() -> String {
    "github".into()
}

fn default_branch() -> String {
    SkillSource::DEFAULT_BRANCH.into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl")]
    pub ttl_hours: u64,
    /// Time of the last successful refresh.
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
}

fn default_ttl() -> u64 {
    24
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: default_ttl(),
            last_check: None,
            etag: None,
        }
    }
}

/// When the lifecycle manager refreshes the catalog on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSync {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub on_search: bool,
    #[serde(default = "default_true")]
    pub on_list_all: bool,
}

impl Default for AutoSync {
    fn default() -> Self {
        Self {
            enabled: true,
            on_search: true,
            on_list_all: true,
        }
    }
}

/// Accepts RFC 3339 as well as offset-less ISO timestamps, read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// `owner/repo` from a repository URL or a bare slug.
fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let s = url.trim().trim_end_matches('/').trim_end_matches(".git");
    let s = s
        .strip_prefix("https://github.com/")
        .or_else(|| s.strip_prefix("http://github.com/"))
        .or_else(|| s.strip_prefix("github.com/"))
        .unwrap_or(s);
    let mut parts = s.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Some((owner.to_string(), repo.to_string()))
        },
        _ => None,
    }
}

#[derive(Deserialize)]
struct ContentsFile {
    content: String,
}

/// What one source returned.
enum SourceReply {
    NotModified,
    Updated {
        snapshot: CatalogSnapshot,
        etag: Option<String>,
    },
}

// ── Synchroniser ─────────────────────────────────────────────────────────────

pub struct RemoteCatalogSync {
    config_path: PathBuf,
    cache_path: PathBuf,
    config: RemoteSyncConfig,
    client: Client,
    api_base: String,
    user_agent: String,
    token: Option<Secret<String>>,
    timeout: Duration,
}

impl RemoteCatalogSync {
    /// Open the remote config at `config_path`, writing the default document if absent.
    pub fn open(config_path: impl Into<PathBuf>, github: &GithubConfig) -> Result<Self> {
        let config_path = config_path.into();
        let config = if config_path.exists() {
            read_json(&config_path)?
        } else {
            let config = RemoteSyncConfig::default();
            write_json_atomic(&config_path, &config)?;
            info!(path = %config_path.display(), "created default remote sync config");
            config
        };
        let cache_path = config_path
            .parent()
            .map(|dir| dir.join(CACHE_FILE))
            .unwrap_or_else(|| PathBuf::from(CACHE_FILE));

        Ok(Self {
            config_path,
            cache_path,
            config,
            client: Client::new(),
            api_base: github.api_base.trim_end_matches('/').to_string(),
            user_agent: github.user_agent.clone(),
            token: github.token.clone(),
            timeout: Duration::from_secs(github.metadata_timeout_secs),
        })
    }

    pub fn config(&self) -> &RemoteSyncConfig {
        &self.config
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether a non-forced refresh would run now.
    pub fn should_refresh(&self) -> bool {
        self.should_refresh_at(Utc::now())
    }

    fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        let cache = &self.config.cache;
        if !cache.enabled {
            return false;
        }
        if !self.cache_path.exists() {
            return true;
        }
        let Some(last_check) = cache.last_check.as_deref().and_then(parse_timestamp) else {
            return true;
        };
        // A TTL too large to represent never expires.
        let Some(ttl) = i64::try_from(cache.ttl_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
        else {
            return false;
        };
        last_check
            .checked_add_signed(ttl)
            .is_some_and(|expiry| now > expiry)
    }

    /// The last cached remote catalog, if any.
    pub fn cached(&self) -> Result<Option<CatalogSnapshot>> {
        if !self.cache_path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&self.cache_path)?))
    }

    /// Ask the configured sources for a newer catalog.
    ///
    /// Returns `None` when no refresh was due or every source either failed
    /// or reported no change. Only failures to persist the cache or the
    /// config document are errors.
    pub async fn refresh(
        &mut self,
        force: bool,
    ) -> std::result::Result<Option<CatalogSnapshot>, SyncError> {
        if !force && !self.should_refresh() {
            debug!("remote catalog cache is fresh");
            return Ok(None);
        }

        let mut sources: Vec<RemoteSource> = self
            .config
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.priority.unwrap_or(u32::MAX));

        let mut not_modified = false;
        for source in &sources {
            if source.kind != "github" {
                warn!(source = %source.name, kind = %source.kind, "skipping unsupported remote source type");
                continue;
            }
            info!(source = %source.name, url = %source.url, "checking remote catalog");
            match self.fetch_source(source).await {
                Ok(SourceReply::NotModified) => {
                    info!(source = %source.name, "remote catalog not modified");
                    not_modified = true;
                },
                Ok(SourceReply::Updated { snapshot, etag }) => {
                    write_json_atomic(&self.cache_path, &snapshot)?;
                    self.config.cache.last_check = Some(Utc::now().to_rfc3339());
                    if etag.is_some() {
                        self.config.cache.etag = etag;
                    }
                    write_json_atomic(&self.config_path, &self.config)?;
                    info!(
                        source = %source.name,
                        skills = snapshot.skills.len(),
                        "remote catalog updated"
                    );
                    return Ok(Some(snapshot));
                },
                Err(e) => {
                    warn!(source = %source.name, error = %e, "remote catalog source failed");
                },
            }
        }

        if not_modified {
            debug!("no remote source has a newer catalog");
        } else {
            warn!("no remote source returned a catalog");
        }
        Ok(None)
    }

    async fn fetch_source(
        &self,
        source: &RemoteSource,
    ) -> std::result::Result<SourceReply, FetchError> {
        let (owner, repo) = parse_repo_url(&source.url).ok_or_else(|| {
            FetchError::InvalidSource(format!("invalid repository URL '{}'", source.url))
        })?;
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{}",
            self.api_base,
            source.skills_path.trim_start_matches('/')
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[("ref", source.branch.as_str())])
            .timeout(self.timeout)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(header::USER_AGENT, &self.user_agent);
        if let Some(token) = &self.token {
            request = request.header(
                header::AUTHORIZATION,
                format!("token {}", token.expose_secret()),
            );
        }
        if let Some(etag) = &self.config.cache.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(SourceReply::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::from_status(status, response.headers(), &url));
        }
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;
        let file: ContentsFile = serde_json::from_slice(&body)
            .map_err(|e| FetchError::InvalidSource(format!("unexpected contents reply: {e}")))?;
        let encoded: String = file
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| FetchError::InvalidSource(format!("invalid base64 content: {e}")))?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&decoded)
            .map_err(|e| FetchError::InvalidSource(format!("invalid remote catalog: {e}")))?;
        if let Some((key, name)) = snapshot.mismatched_key() {
            return Err(FetchError::InvalidSource(format!(
                "remote catalog entry '{key}' is named '{name}'"
            )));
        }

        Ok(SourceReply::Updated { snapshot, etag })
    }
}

/// Combine a remote catalog with the local one.
///
/// The remote copy wins for names present in both; local-only entries (and
/// local-only categories) are appended in their local order.
pub fn merge_with_local(local: &CatalogSnapshot, remote: &CatalogSnapshot) -> CatalogSnapshot {
    let mut merged = remote.clone();
    for (name, skill) in &local.skills {
        if !merged.skills.contains_key(name) {
            merged.skills.insert(name.clone(), skill.clone());
        }
    }
    for (name, category) in &local.categories {
        if !merged.categories.contains_key(name) {
            merged.categories.insert(name.clone(), category.clone());
        }
    }
    merged.stats = CatalogStats {
        total_skills: Some(merged.skills.len()),
        local_skills: Some(local.skills.len()),
        remote_skills: Some(remote.skills.len()),
        last_sync: Some(Utc::now().to_rfc3339()),
        extra: Default::default(),
    };
    merged
}

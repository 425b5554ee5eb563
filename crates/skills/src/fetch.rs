//! Retrieve a skill bundle's file tree into a destination directory.

use std::{
    future::Future,
    path::{Component, Path, PathBuf},
    pin::Pin,
};

use {
    async_trait::async_trait,
    reqwest::{Client, RequestBuilder, StatusCode, header::HeaderMap},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    skillshelf_config::GithubConfig,
    tracing::{debug, warn},
    walkdir::WalkDir,
};

use crate::types::SkillSource;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("source directory does not exist: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("rate limited while requesting {url}")]
    RateLimited { url: String },

    #[error("unauthorized (HTTP {status}) for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSource(reason.into())
    }

    fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Classify a non-success HTTP response.
    pub(crate) fn from_status(status: StatusCode, headers: &HeaderMap, url: &str) -> Self {
        let url = url.to_string();
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        match status {
            StatusCode::NOT_FOUND => Self::NotFound { url },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { url },
            StatusCode::FORBIDDEN if exhausted => Self::RateLimited { url },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized {
                status: status.as_u16(),
                url,
            },
            _ => Self::Http {
                status: status.as_u16(),
                url,
            },
        }
    }
}

/// Retrieves a skill's file tree into `dest`.
///
/// On error `dest` may hold a partial tree; the caller discards it.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &SkillSource, dest: &Path) -> Result<(), FetchError>;
}

/// Default fetcher: GitHub sources over HTTP, local sources by copy.
pub struct DefaultFetcher {
    github: GithubFetcher,
}

impl DefaultFetcher {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            github: GithubFetcher::new(config),
        }
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, source: &SkillSource, dest: &Path) -> Result<(), FetchError> {
        match source {
            SkillSource::Github {
                repo,
                path_in_repo,
                branch,
                ..
            } => {
                let branch = branch.as_deref().unwrap_or(SkillSource::DEFAULT_BRANCH);
                self.github
                    .fetch_tree(repo, path_in_repo, branch, dest)
                    .await
            },
            SkillSource::Local { path } => {
                check_local(path)?;
                let (src, dst) = (path.clone(), dest.to_path_buf());
                tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
                    .await
                    .map_err(|e| FetchError::io("copy", path, std::io::Error::other(e)))?
                    .map_err(|e| FetchError::io("copy", path, e))
            },
        }
    }
}

/// A local source must be an existing directory.
pub fn check_local(path: &Path) -> Result<(), FetchError> {
    if !path.exists() {
        return Err(FetchError::SourceMissing {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(FetchError::invalid(format!(
            "source path is not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

/// `owner/repo`, exactly two non-empty segments.
pub fn check_repo(repo: &str) -> Result<(), FetchError> {
    let parts: Vec<&str> = repo.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
        return Err(FetchError::invalid(format!(
            "invalid repository '{repo}': expected 'owner/repo'"
        )));
    }
    Ok(())
}

pub fn check_repo_path(path: &str) -> Result<(), FetchError> {
    if path.contains("..") {
        return Err(FetchError::invalid(format!(
            "path in repository must not contain '..': {path}"
        )));
    }
    Ok(())
}

/// A listing entry name must be exactly one plain path component.
pub(crate) fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Downloads a directory of a GitHub repository through the contents API
/// (one listing per level) and the raw content host (one request per file).
pub struct GithubFetcher {
    client: Client,
    api_base: String,
    raw_base: String,
    user_agent: String,
    token: Option<Secret<String>>,
}

impl GithubFetcher {
    pub fn new(config: &GithubConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &GithubConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_base: config.raw_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            token: config.token.clone(),
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", &self.user_agent);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {}", token.expose_secret())),
            None => request,
        }
    }

    /// Fetch `repo@branch:path` into `dest`, recreating the tree.
    pub async fn fetch_tree(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<(), FetchError> {
        check_repo(repo)?;
        check_repo_path(path)?;
        self.fetch_dir(repo, path.trim_matches('/'), branch, dest)
            .await
    }

    fn fetch_dir<'a>(
        &'a self,
        repo: &'a str,
        path: &'a str,
        branch: &'a str,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), FetchError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(dest)
                .await
                .map_err(|e| FetchError::io("create", dest, e))?;

            let entries = self.list(repo, path, branch).await?;
            if entries.is_empty() {
                warn!(%repo, %path, "directory appears to be empty");
            }

            for entry in entries {
                if !is_plain_component(&entry.name) {
                    return Err(FetchError::invalid(format!(
                        "listing entry '{}' is not a plain file name",
                        entry.name
                    )));
                }
                let target = dest.join(&entry.name);
                match entry.kind.as_str() {
                    "file" => self.download(repo, branch, &entry.path, &target).await?,
                    "dir" => self.fetch_dir(repo, &entry.path, branch, &target).await?,
                    other => {
                        warn!(%repo, path = %entry.path, kind = other, "skipping unsupported entry");
                    },
                }
            }
            Ok(())
        })
    }

    async fn list(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Vec<ContentEntry>, FetchError> {
        let url = format!("{}/repos/{repo}/contents/{path}", self.api_base);
        let response = self.get(&url).query(&[("ref", branch)]).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status, response.headers(), &url));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            FetchError::invalid(format!("unexpected listing for {repo}:{path}: {e}"))
        })
    }

    async fn download(
        &self,
        repo: &str,
        branch: &str,
        file_path: &str,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let url = format!("{}/{repo}/{branch}/{file_path}", self.raw_base);
        let response = self.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status, response.headers(), &url));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| FetchError::io("write", dest, e))?;
        debug!(%repo, path = %file_path, bytes = bytes.len(), "downloaded file");
        Ok(())
    }
}

/// Copy the tree at `src` into `dst`, following symlinks.
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

//! Exposes installed skills to the host application through a discovery directory.
//!
//! Each skill gets one entry `<discovery>/<name>` pointing at its install
//! directory. Strategies are tried in order (symlink, junction, copy) and the
//! first that succeeds wins.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use {
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fetch::copy_dir_recursive,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Symlink,
    Junction,
    Copy,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symlink => write!(f, "symlink"),
            Self::Junction => write!(f, "junction"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// One way of making `link` resolve to `target`.
pub trait LinkStrategy: Send + Sync {
    fn kind(&self) -> LinkKind;

    /// Whether this strategy can work on the current platform at all.
    fn is_available(&self) -> bool;

    fn create(&self, target: &Path, link: &Path) -> io::Result<()>;
}

pub struct SymlinkStrategy;

impl LinkStrategy for SymlinkStrategy {
    fn kind(&self) -> LinkKind {
        LinkKind::Symlink
    }

    fn is_available(&self) -> bool {
        cfg!(any(unix, windows))
    }

    #[cfg(unix)]
    fn create(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn create(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_dir(target, link)
    }

    #[cfg(not(any(unix, windows)))]
    fn create(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// NTFS directory junction via `mklink /J`; needs no special privileges.
pub struct JunctionStrategy;

impl LinkStrategy for JunctionStrategy {
    fn kind(&self) -> LinkKind {
        LinkKind::Junction
    }

    fn is_available(&self) -> bool {
        cfg!(windows)
    }

    #[cfg(windows)]
    fn create(&self, target: &Path, link: &Path) -> io::Result<()> {
        let output = std::process::Command::new("cmd")
            .arg("/C")
            .arg("mklink")
            .arg("/J")
            .arg(link)
            .arg(target)
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    #[cfg(not(windows))]
    fn create(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// Full copy of the install directory. Works everywhere but goes stale on update.
pub struct CopyStrategy;

impl LinkStrategy for CopyStrategy {
    fn kind(&self) -> LinkKind {
        LinkKind::Copy
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create(&self, target: &Path, link: &Path) -> io::Result<()> {
        copy_dir_recursive(target, link)
    }
}

/// Result of [`DiscoveryLinker::link`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    /// Path of the discovery entry.
    pub path: PathBuf,
    /// Strategy that succeeded, `None` if every strategy failed.
    pub kind: Option<LinkKind>,
    /// Failures encountered on the way, in order.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlinkOutcome {
    Absent,
    Removed,
}

pub struct DiscoveryLinker {
    dir: PathBuf,
    strategies: Vec<Box<dyn LinkStrategy>>,
}

impl DiscoveryLinker {
    /// Linker using symlink, then junction, then copy.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_strategies(dir, vec![
            Box::new(SymlinkStrategy),
            Box::new(JunctionStrategy),
            Box::new(CopyStrategy),
        ])
    }

    pub fn with_strategies(dir: impl Into<PathBuf>, strategies: Vec<Box<dyn LinkStrategy>>) -> Self {
        Self {
            dir: dir.into(),
            strategies,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Point `<dir>/<name>` at `target`, replacing whatever is there.
    /// Never fails; the outcome says which tier, if any, was achieved.
    ///
    /// A relative `target` is made absolute against the current directory,
    /// since a link stores its target verbatim and would otherwise resolve
    /// from the discovery directory.
    pub fn link(&self, name: &str, target: &Path) -> LinkOutcome {
        let path = self.entry_path(name);
        let mut outcome = LinkOutcome {
            path: path.clone(),
            kind: None,
            failures: Vec::new(),
        };

        let target = match std::path::absolute(target) {
            Ok(target) => target,
            Err(e) => {
                outcome
                    .failures
                    .push(format!("resolve {}: {e}", target.display()));
                warn!(skill = %name, error = %e, "cannot resolve link target");
                return outcome;
            },
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            outcome
                .failures
                .push(format!("create {}: {e}", self.dir.display()));
            warn!(dir = %self.dir.display(), error = %e, "cannot create discovery directory");
            return outcome;
        }
        if fs::symlink_metadata(&path).is_ok()
            && let Err(e) = remove_entry(&path)
        {
            outcome
                .failures
                .push(format!("remove existing {}: {e}", path.display()));
            warn!(path = %path.display(), error = %e, "cannot replace discovery entry");
            return outcome;
        }

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if !strategy.is_available() {
                debug!(%kind, "link strategy unavailable on this platform");
                continue;
            }
            let created = strategy.create(&target, &path).and_then(|()| {
                // A dangling entry is no better than none.
                if fs::metadata(&path).is_ok_and(|m| m.is_dir()) {
                    Ok(())
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("entry does not resolve to {}", target.display()),
                    ))
                }
            });
            match created {
                Ok(()) => {
                    info!(skill = %name, %kind, path = %path.display(), "created discovery link");
                    outcome.kind = Some(kind);
                    return outcome;
                },
                Err(e) => {
                    warn!(skill = %name, %kind, error = %e, "link strategy failed, trying next");
                    outcome.failures.push(format!("{kind}: {e}"));
                    // Clear anything a half-finished attempt left behind.
                    if fs::symlink_metadata(&path).is_ok()
                        && let Err(e) = remove_entry(&path)
                    {
                        warn!(path = %path.display(), error = %e, "failed to clear partial discovery entry");
                    }
                },
            }
        }

        warn!(skill = %name, "no link strategy succeeded");
        outcome
    }

    /// Remove `<dir>/<name>` whatever it is. The link target is never touched.
    pub fn unlink(&self, name: &str) -> Result<UnlinkOutcome> {
        let path = self.entry_path(name);
        if fs::symlink_metadata(&path).is_err() {
            return Ok(UnlinkOutcome::Absent);
        }
        remove_entry(&path).map_err(|e| Error::io("remove discovery entry", &path, e))?;
        debug!(path = %path.display(), "removed discovery entry");
        Ok(UnlinkOutcome::Removed)
    }
}

/// Unlink, else recursive delete, else plain directory removal.
/// `remove_dir_all` does not follow a symlink, so a target is never emptied.
fn remove_entry(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
        .or_else(|_| fs::remove_dir_all(path))
        .or_else(|_| fs::remove_dir(path))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(LinkKind);

    impl LinkStrategy for Failing {
        fn kind(&self) -> LinkKind {
            self.0
        }

        fn is_available(&self) -> bool {
            true
        }

        fn create(&self, _target: &Path, link: &Path) -> io::Result<()> {
            // Leave debris behind to check it gets cleared.
            fs::create_dir_all(link)?;
            Err(io::Error::other("simulated failure"))
        }
    }

    fn installed_skill(root: &Path) -> PathBuf {
        let target = root.join("skills/pdf");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("SKILL.md"), "manifest").unwrap();
        target
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_first_choice() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::new(tmp.path().join("plugin-skills"));

        let outcome = linker.link("pdf", &target);
        assert_eq!(outcome.kind, Some(LinkKind::Symlink));
        assert!(outcome.failures.is_empty());
        assert_eq!(fs::read_link(&outcome.path).unwrap(), target);
    }

    #[cfg(unix)]
    #[test]
    fn relative_target_still_resolves_from_discovery_dir() {
        let cwd = std::env::current_dir().unwrap();
        let tmp = tempfile::tempdir_in(&cwd).unwrap();
        let relative_root = tmp.path().strip_prefix(&cwd).unwrap();
        installed_skill(tmp.path());

        let linker = DiscoveryLinker::new(relative_root.join("plugin-skills"));
        let outcome = linker.link("pdf", &relative_root.join("skills/pdf"));
        assert_eq!(outcome.kind, Some(LinkKind::Symlink));
        assert!(fs::read_link(&outcome.path).unwrap().is_absolute());
        assert!(outcome.path.join("SKILL.md").exists());
    }

    /// Reports success but leaves a link pointing nowhere.
    #[cfg(unix)]
    struct Dangling;

    #[cfg(unix)]
    impl LinkStrategy for Dangling {
        fn kind(&self) -> LinkKind {
            LinkKind::Symlink
        }

        fn is_available(&self) -> bool {
            true
        }

        fn create(&self, _target: &Path, link: &Path) -> io::Result<()> {
            std::os::unix::fs::symlink("does/not/exist", link)
        }
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_falls_through_to_next_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::with_strategies(tmp.path().join("plugin-skills"), vec![
            Box::new(Dangling),
            Box::new(CopyStrategy),
        ]);

        let outcome = linker.link("pdf", &target);
        assert_eq!(outcome.kind, Some(LinkKind::Copy));
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.path.join("SKILL.md").is_file());
    }

    #[test]
    fn falls_back_to_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::with_strategies(tmp.path().join("plugin-skills"), vec![
            Box::new(Failing(LinkKind::Symlink)),
            Box::new(JunctionStrategy),
            Box::new(CopyStrategy),
        ]);

        let outcome = linker.link("pdf", &target);
        assert_eq!(outcome.kind, Some(LinkKind::Copy));
        assert_eq!(outcome.failures.len(), if cfg!(windows) { 2 } else { 1 });
        assert_eq!(
            fs::read_to_string(outcome.path.join("SKILL.md")).unwrap(),
            "manifest"
        );
    }

    #[test]
    fn every_strategy_failing_yields_no_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::with_strategies(tmp.path().join("plugin-skills"), vec![
            Box::new(Failing(LinkKind::Symlink)),
            Box::new(Failing(LinkKind::Copy)),
        ]);

        let outcome = linker.link("pdf", &target);
        assert_eq!(outcome.kind, None);
        assert_eq!(outcome.failures.len(), 2);
        assert!(fs::symlink_metadata(&outcome.path).is_err());
    }

    #[test]
    fn existing_entry_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let stale = tmp.path().join("plugin-skills/pdf");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.txt"), "stale").unwrap();

        let linker = DiscoveryLinker::with_strategies(tmp.path().join("plugin-skills"), vec![
            Box::new(CopyStrategy),
        ]);
        let outcome = linker.link("pdf", &target);
        assert_eq!(outcome.kind, Some(LinkKind::Copy));
        assert!(!stale.join("old.txt").exists());
        assert!(stale.join("SKILL.md").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unlink_removes_symlink_but_not_target() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::new(tmp.path().join("plugin-skills"));
        linker.link("pdf", &target);

        assert_eq!(linker.unlink("pdf").unwrap(), UnlinkOutcome::Removed);
        assert!(fs::symlink_metadata(linker.entry_path("pdf")).is_err());
        assert!(target.join("SKILL.md").exists());
    }

    #[test]
    fn unlink_removes_copies_and_tolerates_absence() {
        let tmp = tempfile::tempdir().unwrap();
        let target = installed_skill(tmp.path());
        let linker = DiscoveryLinker::with_strategies(tmp.path().join("plugin-skills"), vec![
            Box::new(CopyStrategy),
        ]);
        linker.link("pdf", &target);

        assert_eq!(linker.unlink("pdf").unwrap(), UnlinkOutcome::Removed);
        assert_eq!(linker.unlink("pdf").unwrap(), UnlinkOutcome::Absent);
        assert!(target.join("SKILL.md").exists());
    }

    #[test]
    fn link_kind_display() {
        assert_eq!(LinkKind::Junction.to_string(), "junction");
        assert_eq!(
            serde_json::to_value(LinkKind::Symlink).unwrap(),
            serde_json::json!("symlink")
        );
    }
}

//! Skill store: catalog, fetching, validation, installation, and discovery links.
//!
//! A skill is a directory holding a `SKILL.md` file with YAML frontmatter and
//! markdown instructions, plus optional `scripts/`, `reference/` and `assets/`.
//! [`SkillManager`] is the entry point; the other modules are usable on their own.

pub mod catalog;
pub mod error;
pub mod fetch;
pub mod installed;
pub mod lifecycle;
pub mod link;
pub mod parse;
pub mod sync;
pub mod types;
pub mod validate;

pub use {
    catalog::{CatalogRegistry, SearchFilter},
    error::{Error, Result},
    fetch::{DefaultFetcher, FetchError, GithubFetcher, SourceFetcher},
    installed::InstalledRegistry,
    lifecycle::{
        InstallOutcome, InstallRequest, InstallTarget, InstalledSkill, SkillInfo, SkillManager,
        UninstallOutcome, ValidateTarget,
    },
    link::{DiscoveryLinker, LinkKind, LinkOutcome, UnlinkOutcome},
    sync::{RemoteCatalogSync, RemoteSyncConfig, SyncError},
    types::{CatalogSnapshot, InstalledSkillRecord, SkillDescriptor, SkillSource},
    validate::{Severity, ValidationReport, validate_skill_dir},
};

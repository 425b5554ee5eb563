//! Store configuration: where the catalog, installation record, remote sync
//! state, install root and discovery directory live, and how to reach GitHub.
//!
//! Config file: `skillshelf.toml`, `skillshelf.yaml`, or `skillshelf.json`
//! inside an explicitly supplied project root. Nothing is inferred from the
//! current working directory or the executable location.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, discover_and_load, load_config},
    schema::{GithubConfig, PathsConfig, StoreConfig},
};

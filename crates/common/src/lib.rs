//! Shared error plumbing and document persistence used across skillshelf crates.

pub mod error;
pub mod json;

pub use error::{Error, FromMessage, Result};

//! Whole-document JSON persistence.
//!
//! Every document this workspace owns is read into memory in full, mutated,
//! and written back in full. Writes go through a sibling temp file followed by
//! a rename so a crash mid-write never leaves a truncated document behind.
//! There is no advisory locking: two processes writing the same document can
//! still lose each other's updates.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| Error::json(path, e))
}

/// Serialize `value` as pretty JSON and replace `path` atomically via temp file + rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let data = serde_json::to_string_pretty(value).map_err(|e| Error::json(path, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).map_err(|e| Error::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote document");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde::Deserialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        version: String,
        items: Vec<u32>,
    }

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/doc.json");
        let doc = Doc {
            version: "1.0.0".into(),
            items: vec![3, 1, 2],
        };

        write_json_atomic(&path, &doc).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded: Doc = read_json(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_read_missing_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        let err = read_json::<Doc>(&path).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_read_corrupt_is_json_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_json::<Doc>(&path).unwrap_err(),
            Error::Json { .. }
        ));
    }
}

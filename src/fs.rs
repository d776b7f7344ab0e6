//! Blocking file helpers used by the ledger and recommendation stores.
//!
//! The stores rewrite their whole file on every mutation from inside a synchronous call, so these
//! use `std::fs` rather than `tokio::fs`.

use crate::error::{ErrorType, IntoResult};
use crate::Result;
use anyhow::Context;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const TMP_SUFFIX: &str = "tmp";

pub(crate) fn create_parent_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    std::fs::create_dir_all(parent)
        .context(format!("Unable to create directory {}", parent.display()))
        .typed(ErrorType::Persistence)
}

/// Reads the file at `path`, returning `None` if it does not exist.
pub(crate) fn read_optional(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e)
            .context(format!("Unable to read file {}", path.display()))
            .typed(ErrorType::Persistence),
    }
}

/// Reads the file at `path` like `read_optional`, but replaces bytes that are not valid UTF-8 with
/// U+FFFD instead of failing. Returns `None` if the file does not exist.
pub(crate) fn read_optional_lossy(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .context(format!("Unable to read file {}", path.display()))
                .typed(ErrorType::Persistence)
        }
    };
    match String::from_utf8(bytes) {
        Ok(s) => Ok(Some(s)),
        Err(e) => {
            warn!(
                "{} contains bytes that are not valid UTF-8 (first at byte {}), replacing them",
                path.display(),
                e.utf8_error().valid_up_to()
            );
            Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
        }
    }
}

/// Truncates and rewrites the file at `path`.
pub(crate) fn write_all(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    let mut f = std::fs::File::create(path)
        .context(format!("Unable to create file {}", path.display()))
        .typed(ErrorType::Persistence)?;
    f.write_all(data)
        .context(format!("Unable to write data to {}", path.display()))
        .typed(ErrorType::Persistence)
}

/// Writes `data` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let tmp = tmp_path(path);
    create_parent_dir(path)?;
    {
        let mut f = std::fs::File::create(&tmp)
            .context(format!("Unable to create file {}", tmp.display()))
            .typed(ErrorType::Persistence)?;
        f.write_all(data)
            .and_then(|_| f.sync_all())
            .context(format!("Unable to write data to {}", tmp.display()))
            .typed(ErrorType::Persistence)?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| {
            format!(
                "Unable to move '{}' to '{}'",
                tmp.display(),
                path.display()
            )
        })
        .typed(ErrorType::Persistence)
}

/// Rewrites `path`, atomically if `atomic` is set.
pub(crate) fn rewrite(path: impl AsRef<Path>, data: &[u8], atomic: bool) -> Result<()> {
    if atomic {
        write_atomic(path, data)
    } else {
        write_all(path, data)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_optional_missing() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(dir.path().join("nope.csv")).unwrap().is_none());
    }

    #[test]
    fn test_read_optional_lossy_replaces_invalid_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.csv");
        std::fs::write(&path, b"caf\xE9\nok\n").unwrap();
        assert!(read_optional(&path).is_err());
        let text = read_optional_lossy(&path).unwrap().unwrap();
        assert_eq!(text, "caf\u{FFFD}\nok\n");
        assert!(read_optional_lossy(dir.path().join("nope.csv"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.csv");
        write_atomic(&path, b"abc").unwrap();
        assert_eq!(read_optional(&path).unwrap().unwrap(), "abc");
        assert!(!dir.path().join("nested").join("ledger.csv.tmp").exists());
    }

    #[test]
    fn test_tmp_path() {
        assert_eq!(tmp_path(Path::new("a/b.json")), PathBuf::from("a/b.json.tmp"));
        assert_eq!(tmp_path(Path::new("a/b")), PathBuf::from("a/b.tmp"));
    }
}

//! File-backed string index.
//!
//! The mapping is stored as a JSON object of `string -> index`. The whole
//! file is rewritten (temp file + rename) each time a new string is
//! interned; lookups of known strings never touch the disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::memory::Interner;
use crate::traits::StringIndex;

/// A [`StringIndex`] persisted to a single mapping file.
#[derive(Debug)]
pub struct FileBasedIndex {
    path: PathBuf,
    inner: RwLock<Interner>,
}

impl FileBasedIndex {
    /// Open the index at `path`, creating an empty mapping file if none
    /// exists yet.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let interner = if path.exists() {
            let raw = fs::read(path)?;
            let map: BTreeMap<String, u32> = if raw.iter().all(u8::is_ascii_whitespace) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&raw).map_err(|e| IndexError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            };
            Interner::from_pairs(map.into_iter().collect()).map_err(|reason| {
                IndexError::Corrupt {
                    path: path.to_path_buf(),
                    reason,
                }
            })?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let interner = Interner::default();
            write_mapping(path, &interner)?;
            interner
        };

        debug!(path = %path.display(), entries = interner.len(), "string index loaded");
        Ok(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(interner),
        })
    }

    /// Location of the mapping file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StringIndex for FileBasedIndex {
    fn string_to_index(&self, s: &str) -> IndexResult<u32> {
        if let Some(index) = self.inner.read().get(s) {
            return Ok(index);
        }
        let mut inner = self.inner.write();
        if let Some(index) = inner.get(s) {
            return Ok(index);
        }
        let index = inner.push(s);
        if let Err(e) = write_mapping(&self.path, &inner) {
            inner.pop();
            return Err(e);
        }
        debug!(path = %self.path.display(), string = s, index, "interned string");
        Ok(index)
    }

    fn index_to_string(&self, index: u32) -> Option<String> {
        self.inner.read().lookup(index).map(str::to_string)
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn entries(&self) -> Vec<(String, u32)> {
        self.inner.read().entries()
    }
}

fn write_mapping(path: &Path, interner: &Interner) -> IndexResult<()> {
    let map: BTreeMap<String, u32> = interner.entries().into_iter().collect();
    let json =
        serde_json::to_vec_pretty(&map).map_err(|e| IndexError::Serialization(e.to_string()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.json");
        let index = FileBasedIndex::open(&path).unwrap();
        assert!(path.exists());
        assert!(index.is_empty());
    }

    #[test]
    fn mapping_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.json");
        let (title, body) = {
            let index = FileBasedIndex::open(&path).unwrap();
            (
                index.string_to_index("title").unwrap(),
                index.string_to_index("body").unwrap(),
            )
        };

        let reopened = FileBasedIndex::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.string_to_index("title").unwrap(), title);
        assert_eq!(reopened.string_to_index("body").unwrap(), body);
        assert_eq!(reopened.string_to_index("new").unwrap(), 2);
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            FileBasedIndex::open(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn duplicate_indices_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.json");
        fs::write(&path, br#"{"a": 0, "b": 0}"#).unwrap();
        assert!(matches!(
            FileBasedIndex::open(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn empty_file_is_an_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.json");
        fs::write(&path, b"").unwrap();
        let index = FileBasedIndex::open(&path).unwrap();
        assert!(index.is_empty());
    }
}

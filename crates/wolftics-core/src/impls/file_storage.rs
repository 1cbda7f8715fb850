//! FileStorage - ディレクトリ配下に 1 key = 1 ファイルで保存
//!
//! 書き込みは一時ファイル + rename で行い、途中で落ちても
//! 壊れた値を読まないようにします。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::errors::StorageError;
use crate::ports::storage::Storage;

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (and creates, if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

/// Keys such as `wolftics:q:pk` are not valid file names everywhere, so
/// anything outside `[A-Za-z0-9._-]` is hex-escaped.
fn file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => name.push(byte as char),
            other => name.push_str(&format!("%{other:02X}")),
        }
    }
    name
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{}.tmp", file_name(key)));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.set("wolftics:q:pk_live", "[1,2,3]").unwrap();
        }

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("wolftics:q:pk_live").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn missing_keys_read_as_none_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested")).unwrap();

        assert_eq!(storage.get("wolftics:visitor").unwrap(), None);
        storage.remove("wolftics:visitor").unwrap();

        storage.set("wolftics:visitor", "v").unwrap();
        storage.remove("wolftics:visitor").unwrap();
        assert_eq!(storage.get("wolftics:visitor").unwrap(), None);
    }

    #[test]
    fn dotted_keys_do_not_clobber_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("wolftics:q:pk.tmp", "other").unwrap();
        storage.set("wolftics:q:pk.live", "live").unwrap();

        assert_eq!(storage.get("wolftics:q:pk.tmp").unwrap().as_deref(), Some("other"));
        assert_eq!(storage.get("wolftics:q:pk.live").unwrap().as_deref(), Some("live"));
    }

    #[test]
    fn keys_are_escaped_into_file_names() {
        assert_eq!(file_name("wolftics:q:pk"), "wolftics%3Aq%3Apk");
        assert_eq!(file_name("../etc"), "..%2Fetc");
        assert_ne!(file_name("a:b"), file_name("a_b"));
    }
}

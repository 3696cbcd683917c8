use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Subject/session pair a persisted queue belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub subject: String,
    pub session: u32,
}

impl SessionKey {
    pub fn new(subject: impl Into<String>, session: u32) -> Self {
        Self {
            subject: subject.into(),
            session,
        }
    }
}

/// Durable storage for session snapshots. `save` replaces the whole record
/// so a reader never sees a partially written one.
pub trait SessionStore {
    fn save(&mut self, key: &SessionKey, snapshot: &[u8]) -> io::Result<()>;

    fn load(&self, key: &SessionKey) -> io::Result<Option<Vec<u8>>>;
}

impl<S: SessionStore + ?Sized> SessionStore for &mut S {
    fn save(&mut self, key: &SessionKey, snapshot: &[u8]) -> io::Result<()> {
        (**self).save(key, snapshot)
    }

    fn load(&self, key: &SessionKey) -> io::Result<Option<Vec<u8>>> {
        (**self).load(key)
    }
}

pub const SNAPSHOT_FILE: &str = "taskData.json";

/// Snapshots under `<root>/<subject>/session<N>/taskData.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.root.join(subject)
    }

    pub fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.subject_dir(&key.subject)
            .join(format!("session{}", key.session))
    }

    pub fn snapshot_path(&self, key: &SessionKey) -> PathBuf {
        self.session_dir(key).join(SNAPSHOT_FILE)
    }

    /// First unused session number for `subject`: one past the highest
    /// existing `session<N>` directory, 0 when there is none.
    pub fn next_session(&self, subject: &str) -> io::Result<u32> {
        let dir = self.subject_dir(subject);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut next = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(n) = name
                .to_str()
                .and_then(|s| s.strip_prefix("session"))
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            next = next.max(n + 1);
        }
        Ok(next)
    }
}

impl SessionStore for FileStore {
    fn save(&mut self, key: &SessionKey, snapshot: &[u8]) -> io::Result<()> {
        let dir = self.session_dir(key);
        fs::create_dir_all(&dir)?;
        // Same directory as the target so the rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(snapshot)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(SNAPSHOT_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<SessionKey, Vec<u8>>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SessionStore for MemoryStore {
    fn save(&mut self, key: &SessionKey, snapshot: &[u8]) -> io::Result<()> {
        self.records.insert(key.clone(), snapshot.to_vec());
        self.saves += 1;
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> io::Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let key = SessionKey::new("s01", 2);

        assert_eq!(store.load(&key).unwrap(), None);
        store.save(&key, b"first").unwrap();
        store.save(&key, b"second").unwrap();
        assert_eq!(store.load(&key).unwrap().as_deref(), Some(&b"second"[..]));

        let path = dir.path().join("s01").join("session2").join("taskData.json");
        assert_eq!(store.snapshot_path(&key), path);
        // no temp files left behind
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(SNAPSHOT_FILE)]);
    }

    #[test]
    fn next_session_skips_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.next_session("s01").unwrap(), 0);

        for name in ["session0", "session3", "sessionX", "notes"] {
            fs::create_dir_all(dir.path().join("s01").join(name)).unwrap();
        }
        fs::write(dir.path().join("s01").join("session9"), b"").unwrap();
        assert_eq!(store.next_session("s01").unwrap(), 4);
    }

    #[test]
    fn memory_store_counts_saves() {
        let mut store = MemoryStore::new();
        let key = SessionKey::new("a", 0);
        store.save(&key, b"x").unwrap();
        store.save(&key, b"y").unwrap();
        assert_eq!(store.saves(), 2);
        assert_eq!(store.load(&key).unwrap(), Some(b"y".to_vec()));
        assert_eq!(store.load(&SessionKey::new("a", 1)).unwrap(), None);
    }
}

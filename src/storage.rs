use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Hierarchical key-value archive (`device/partition/yyyy/mm/dd/hh/mm/...`).
///
/// A prefix matches whole `/`-separated segments: `a/b` covers `a/b` and
/// `a/b/c` but not `a/bc`.
pub trait ArchiveStore: Send + Sync {
    /// True if an object is stored at `key` or anywhere beneath it.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Every blob at or beneath `prefix`, ordered by key.
    fn fetch_batch(&self, prefix: &str) -> Result<Vec<Vec<u8>>>;

    fn put(&self, key: &str, blob: &[u8]) -> Result<()>;
}

fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim_end_matches('/');
    if key.is_empty() {
        return Err(anyhow!("archive key is empty"));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(anyhow!("invalid archive key segment in {:?}", key));
        }
    }
    Ok(key)
}

/// Exclusive upper bound of the keys strictly beneath `prefix/`.
/// `'0'` is the character after `'/'`.
fn child_range(prefix: &str) -> (String, String) {
    (format!("{}/", prefix), format!("{}0", prefix))
}

// -------------------- In-memory --------------------

#[derive(Debug, Default)]
pub struct InMemoryArchiveStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArchiveStore for InMemoryArchiveStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        let blobs = self
            .blobs
            .read()
            .map_err(|_| anyhow!("archive lock poisoned"))?;
        if blobs.contains_key(key) {
            return Ok(true);
        }
        let (lo, hi) = child_range(key);
        Ok(blobs.range(lo..hi).next().is_some())
    }

    fn fetch_batch(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let prefix = validate_key(prefix)?;
        let blobs = self
            .blobs
            .read()
            .map_err(|_| anyhow!("archive lock poisoned"))?;
        let mut out = Vec::new();
        if let Some(blob) = blobs.get(prefix) {
            out.push(blob.clone());
        }
        let (lo, hi) = child_range(prefix);
        out.extend(blobs.range(lo..hi).map(|(_, blob)| blob.clone()));
        Ok(out)
    }

    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        self.blobs
            .write()
            .map_err(|_| anyhow!("archive lock poisoned"))?
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

// -------------------- Filesystem --------------------

/// Archive mirrored onto a directory tree; each key segment is a directory
/// and each blob a file.
#[derive(Clone, Debug)]
pub struct FilesystemArchiveStore {
    root: PathBuf,
}

impl FilesystemArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let key = validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, s| p.join(s)))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to list archive dir {}: {}", dir.display(), e))?;
    let mut paths = Vec::new();
    for entry in entries {
        paths.push(entry?.path());
    }
    paths.sort();
    for path in paths {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if !is_temp_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tmp")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| anyhow!("failed to write archive blob {}: {}", tmp.display(), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| anyhow!("failed to move archive blob into {}: {}", path.display(), e))?;
    Ok(())
}

impl ArchiveStore for FilesystemArchiveStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.exists())
    }

    fn fetch_batch(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let path = self.path_for(prefix)?;
        let mut files = Vec::new();
        if path.is_dir() {
            collect_files(&path, &mut files)?;
        } else if path.is_file() {
            files.push(path);
        }
        files
            .into_iter()
            .map(|file| {
                fs::read(&file)
                    .map_err(|e| anyhow!("failed to read archive blob {}: {}", file.display(), e))
            })
            .collect()
    }

    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow!("failed to create archive dir {}: {}", parent.display(), e))?;
        }
        write_atomic(&path, blob)
    }
}

// -------------------- SQLite --------------------

pub struct SqliteArchiveStore {
    conn: Mutex<Connection>,
}

impl SqliteArchiveStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow!("failed to open archive db {}: {}", db_path, e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS archive_blobs (
              key TEXT PRIMARY KEY,
              blob BLOB NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("archive db lock poisoned"))
    }
}

impl ArchiveStore for SqliteArchiveStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        let (lo, hi) = child_range(key);
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM archive_blobs WHERE key = ?1 OR (key >= ?2 AND key < ?3) LIMIT 1",
                params![key, lo, hi],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn fetch_batch(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let prefix = validate_key(prefix)?;
        let (lo, hi) = child_range(prefix);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT blob FROM archive_blobs WHERE key = ?1 OR (key >= ?2 AND key < ?3) ORDER BY key ASC",
        )?;
        let mut rows = stmt.query(params![prefix, lo, hi])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get::<_, Vec<u8>>(0)?);
        }
        Ok(out)
    }

    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        self.conn()?.execute(
            r#"
            INSERT INTO archive_blobs(key, blob) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET blob = excluded.blob
            "#,
            params![key, blob],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ArchiveStore) -> Result<()> {
        store.put("dev/00/2024/01/02/03/04/a.json", b"first")?;
        store.put("dev/00/2024/01/02/03/04/b.json", b"second")?;
        store.put("dev/00/2024/01/02/03/05/a.json", b"other")?;
        store.put("dev/000/x", b"sibling")?;

        assert!(store.exists("dev/00")?);
        assert!(store.exists("dev/00/2024/01/02/03/04")?);
        assert!(!store.exists("dev/01")?);
        assert!(!store.exists("dev/00/2024/01/02/03/06")?);

        let minute = store.fetch_batch("dev/00/2024/01/02/03/04/")?;
        assert_eq!(minute, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(store.fetch_batch("dev/00")?.len(), 3);
        assert!(store.fetch_batch("dev/02")?.is_empty());
        Ok(())
    }

    #[test]
    fn in_memory_prefix_semantics() -> Result<()> {
        exercise(&InMemoryArchiveStore::new())
    }

    #[test]
    fn filesystem_prefix_semantics() -> Result<()> {
        let dir = tempfile::tempdir()?;
        exercise(&FilesystemArchiveStore::new(dir.path()))
    }

    #[test]
    fn sqlite_prefix_semantics() -> Result<()> {
        exercise(&SqliteArchiveStore::open_in_memory()?)
    }

    #[test]
    fn sqlite_put_overwrites() -> Result<()> {
        let store = SqliteArchiveStore::open_in_memory()?;
        store.put("dev/00/k", b"one")?;
        store.put("dev/00/k", b"two")?;
        assert_eq!(store.fetch_batch("dev/00/k")?, vec![b"two".to_vec()]);
        Ok(())
    }

    #[test]
    fn rejects_path_escapes() {
        let store = InMemoryArchiveStore::new();
        assert!(store.put("dev/../etc", b"x").is_err());
        assert!(store.exists("").is_err());
        assert!(store.fetch_batch("dev//00").is_err());
    }
}

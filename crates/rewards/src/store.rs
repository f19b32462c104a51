//! Keyed persistence for claim markers, rate-limit windows and account books.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;

pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError>;
    fn set(&self, key: &str, value: V) -> Result<(), StoreError>;
    /// Removes `key`, returning the value it held.
    fn remove(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Read-modify-write of one entry. `f` sees the current value and returns
    /// the replacement, or `None` to leave the entry as it is. Returns the
    /// value `f` saw.
    ///
    /// The default is a plain `get` then `set`. Stores shared between threads
    /// or processes override it so nothing can write in between.
    fn update<F>(&self, key: &str, f: F) -> Result<Option<V>, StoreError>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let current = self.get(key)?;
        if let Some(next) = f(current.as_ref()) {
            self.set(key, next)?;
        }
        Ok(current)
    }
}

impl<V, T: KeyValueStore<V> + ?Sized> KeyValueStore<V> for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<Option<V>, StoreError> {
        (**self).remove(key)
    }

    fn update<F>(&self, key: &str, f: F) -> Result<Option<V>, StoreError>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        (**self).update(key, f)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-lifetime store.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> KeyValueStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        lock(&self.entries)?.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(lock(&self.entries)?.remove(key))
    }

    fn update<F>(&self, key: &str, f: F) -> Result<Option<V>, StoreError>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut entries = lock(&self.entries)?;
        let current = entries.get(key).cloned();
        if let Some(next) = f(current.as_ref()) {
            entries.insert(key.to_owned(), next);
        }
        Ok(current)
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// A whole-file JSON map shared by every process that opens the same path.
///
/// Nothing is cached: each operation takes an advisory lock on a sibling
/// `.lock` file (shared for reads, exclusive for writes), re-reads the map and,
/// for writes, rewrites it through a `.tmp` file renamed over the original. A
/// missing or empty file is an empty store.
#[derive(Debug)]
pub struct JsonFileStore<V> {
    path: PathBuf,
    lock_path: PathBuf,
    _values: PhantomData<fn() -> V>,
}

/// Held advisory lock; released when dropped.
struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl<V: Serialize + DeserializeOwned> JsonFileStore<V> {
    /// Opens the store, checking that any existing file parses.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            lock_path: path.with_extension("lock"),
            path,
            _values: PhantomData,
        };
        let _lock = store.acquire(false)?;
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn acquire(&self, exclusive: bool) -> Result<FileLock, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| self.io_err(e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| self.io_err(e))?;
        Ok(FileLock(file))
    }

    fn load(&self) -> Result<BTreeMap<String, V>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(body) if body.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(body) => serde_json::from_str(&body).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn flush(&self, entries: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    /// Runs `f` over the freshly loaded map under the exclusive lock and
    /// writes the map back when `f` reports a change.
    fn modify<T>(&self, f: impl FnOnce(&mut BTreeMap<String, V>) -> (T, bool)) -> Result<T, StoreError> {
        let _lock = self.acquire(true)?;
        let mut entries = self.load()?;
        let (out, changed) = f(&mut entries);
        if changed {
            self.flush(&entries)?;
        }
        Ok(out)
    }
}

impl<V> KeyValueStore<V> for JsonFileStore<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let _lock = self.acquire(false)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.modify(|entries| {
            entries.insert(key.to_owned(), value);
            ((), true)
        })
    }

    fn remove(&self, key: &str) -> Result<Option<V>, StoreError> {
        self.modify(|entries| {
            let previous = entries.remove(key);
            let changed = previous.is_some();
            (previous, changed)
        })
    }

    fn update<F>(&self, key: &str, f: F) -> Result<Option<V>, StoreError>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        self.modify(|entries| {
            let current = entries.get(key).cloned();
            match f(current.as_ref()) {
                Some(next) => {
                    entries.insert(key.to_owned(), next);
                    (current, true)
                }
                None => (current, false),
            }
        })
    }
}

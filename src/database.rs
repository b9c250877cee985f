//! The database: named collections multiplexed over one on-disk root.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/manifest.json          active collection names, version-checked
//! <root>/.lock                  exclusive process lock, removed on drop
//! <root>/<name>/collection.bin  header + record store + index adjacency
//! ```
//!
//! Collections are materialized lazily: opening a database reads only the
//! manifest, and a collection file is decoded on the first `get_collection`
//! for its name.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::persistence::{self, Manifest};

const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = ".lock";
const COLLECTION_FILE: &str = "collection.bin";

/// A process-local store of named collections under a single directory.
///
/// All methods take `&self`; the handle is safe to share across threads.
/// Operations on distinct names never block each other, while operations on
/// the same name serialize. The root directory is exclusively owned by one
/// `Database` instance, enforced with a lock file.
#[derive(Debug)]
pub struct Database {
    root: PathBuf,
    manifest: RwLock<Manifest>,
    resident: DashMap<String, Arc<RwLock<Collection>>>,
    /// Per-name mutation locks so same-name save/get/delete serialize
    /// without blocking other names.
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    lock: LockFile,
}

impl Database {
    /// Opens the database at `path`, creating the directory and an empty
    /// manifest if absent. Fails with [`Error::Locked`] when another live
    /// instance owns the path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        // Held as a guard from here on: an error on any later step drops it
        // and releases the path for the next open attempt.
        let lock = LockFile::acquire(&root)?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            persistence::read_manifest(&manifest_path)?
        } else {
            let manifest = Manifest::new();
            persistence::write_manifest(&manifest_path, &manifest)?;
            manifest
        };

        let database = Self {
            root,
            manifest: RwLock::new(manifest),
            resident: DashMap::new(),
            name_locks: DashMap::new(),
            lock,
        };
        database.sweep_temp_files();
        debug!(
            path = %database.root.display(),
            collections = database.len(),
            "database opened"
        );
        Ok(database)
    }

    /// Alias for [`Database::open`].
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path)
    }

    /// The root directory this database persists to.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Persists a collection under `name`, replacing any previous entry with
    /// the same name. The on-disk write is atomic: a crash mid-save leaves
    /// the prior copy untouched.
    pub fn save_collection(&self, name: &str, collection: &Collection) -> Result<()> {
        validate_name(name)?;
        let bytes = collection.to_bytes()?;
        let lock = self.name_lock(name);
        let _guard = lock.lock().expect("name lock must not be poisoned");

        let dir = self.collection_dir(name);
        fs::create_dir_all(&dir)?;
        persistence::write_atomic(&dir.join(COLLECTION_FILE), &bytes)?;

        {
            let mut manifest = self
                .manifest
                .write()
                .expect("manifest lock must not be poisoned");
            if manifest.collections.insert(name.to_string()) {
                if let Err(error) =
                    persistence::write_manifest(&self.root.join(MANIFEST_FILE), &manifest)
                {
                    // Keep bookkeeping aligned with the persisted manifest.
                    manifest.collections.remove(name);
                    return Err(error);
                }
            }
        }

        self.resident
            .insert(name.to_string(), Arc::new(RwLock::new(collection.clone())));
        debug!(name, records = collection.len(), "collection saved");
        Ok(())
    }

    /// Returns a shared handle to the named collection, loading it from disk
    /// on first access. Fails with [`Error::CollectionNotFound`] for names
    /// absent from the manifest; an IO or decode failure is fatal to this
    /// call only.
    pub fn get_collection(&self, name: &str) -> Result<Arc<RwLock<Collection>>> {
        validate_name(name)?;
        if let Some(handle) = self.resident.get(name) {
            return Ok(Arc::clone(&handle));
        }

        let lock = self.name_lock(name);
        let _guard = lock.lock().expect("name lock must not be poisoned");
        // Another thread may have loaded it while we waited.
        if let Some(handle) = self.resident.get(name) {
            return Ok(Arc::clone(&handle));
        }

        {
            let manifest = self
                .manifest
                .read()
                .expect("manifest lock must not be poisoned");
            if !manifest.collections.contains(name) {
                return Err(Error::CollectionNotFound(name.to_string()));
            }
        }

        let path = self.collection_dir(name).join(COLLECTION_FILE);
        let bytes = fs::read(&path)?;
        let collection = Collection::from_bytes(&bytes)?;
        debug!(name, records = collection.len(), "collection loaded");

        let handle = Arc::new(RwLock::new(collection));
        self.resident.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Removes the named collection from the manifest, memory, and disk.
    /// Fails with [`Error::CollectionNotFound`] when the name is absent.
    ///
    /// The manifest entry goes first: a crash between the manifest write and
    /// the directory removal leaves an orphan directory, never a manifest
    /// entry pointing at missing data.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock().expect("name lock must not be poisoned");

        {
            let mut manifest = self
                .manifest
                .write()
                .expect("manifest lock must not be poisoned");
            if !manifest.collections.remove(name) {
                return Err(Error::CollectionNotFound(name.to_string()));
            }
            if let Err(error) =
                persistence::write_manifest(&self.root.join(MANIFEST_FILE), &manifest)
            {
                manifest.collections.insert(name.to_string());
                return Err(error);
            }
        }

        self.resident.remove(name);
        match fs::remove_dir_all(self.collection_dir(name)) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        debug!(name, "collection deleted");
        Ok(())
    }

    /// Names of all registered collections, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let manifest = self
            .manifest
            .read()
            .expect("manifest lock must not be poisoned");
        manifest.collections.iter().cloned().collect()
    }

    /// Number of registered collections. O(1) against the manifest,
    /// independent of which collections are resident.
    pub fn len(&self) -> usize {
        let manifest = self
            .manifest
            .read()
            .expect("manifest lock must not be poisoned");
        manifest.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.name_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Deletes `*.tmp` leftovers from writes interrupted by a crash. The
    /// rename discipline means such files were never the authoritative copy.
    fn sweep_temp_files(&self) {
        let names: BTreeSet<String> = {
            let manifest = self
                .manifest
                .read()
                .expect("manifest lock must not be poisoned");
            manifest.collections.clone()
        };

        let mut dirs = vec![self.root.clone()];
        dirs.extend(names.iter().map(|name| self.collection_dir(name)));
        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|extension| extension == "tmp") {
                    warn!(path = %path.display(), "removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }
}

/// Exclusive ownership of `<root>/.lock`. The file is removed when the
/// guard drops, whether the owning `Database` is dropped or `open` fails
/// after acquisition.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                Err(Error::Locked(root.to_path_buf()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != ErrorKind::NotFound {
                warn!(
                    path = %self.path.display(),
                    %error,
                    "failed to release database lock file"
                );
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name == MANIFEST_FILE
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;

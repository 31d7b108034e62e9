//! File-backed link state store.
//!
//! Each link's row lives in its own postcard-encoded file named after the
//! SHA-256 digest of the sequence key, so arbitrarily long keys still map to
//! a fixed-length file name. Writes go to a `.tmp` file first and are then
//! renamed into place, so a crash never leaves a half-written row behind.
//!
//! Compare-and-set holds an exclusive advisory lock on a per-key `.lock` file
//! across read, version check and rename. Every store instance on the same
//! directory, in this process or another, goes through that lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;

use linkdedup_core::{LinkState, LinkStateRow, SequenceKey};

use crate::codec;
use crate::error::StoreError;
use crate::traits::LinkStateStore;

/// Extension used for row files.
const ROW_EXTENSION: &str = "state";
/// Extension of the per-key lock files.
const LOCK_EXTENSION: &str = "lock";

pub struct FileLinkStateStore {
    base_dir: PathBuf,
    /// Keeps tasks of this instance from parking blocking threads on the
    /// file lock.
    write_lock: Mutex<()>,
}

impl FileLinkStateStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    ///
    /// # Note
    /// This performs blocking I/O (`create_dir_all`). Call at startup before the async runtime is under load.
    pub fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a store at the default path (`~/.linkdedup/state`).
    pub fn default_path() -> Result<Self, StoreError> {
        Self::new(Self::default_dir()?)
    }

    /// The default state directory, `~/.linkdedup/state`. Nothing is created.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StoreError::Directory("could not determine home directory".into()))?;
        Ok(home.join(".linkdedup").join("state"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Hex SHA-256 of the key: 64 characters whatever the key length.
    fn file_stem(key: &SequenceKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }

    fn row_path(&self, key: &SequenceKey) -> PathBuf {
        self.base_dir
            .join(format!("{}.{ROW_EXTENSION}", Self::file_stem(key)))
    }

    fn lock_path(&self, key: &SequenceKey) -> PathBuf {
        self.base_dir
            .join(format!("{}.{LOCK_EXTENSION}", Self::file_stem(key)))
    }

    async fn read_row(&self, key: &SequenceKey) -> Result<Option<LinkStateRow>, StoreError> {
        match fs::read(self.row_path(key)).await {
            Ok(bytes) => Ok(Some(codec::decode_row(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Block (off the runtime) until this key's lock file is held exclusively.
    /// The lock is released when the returned handle is dropped.
    async fn lock_row(&self, key: &SequenceKey) -> Result<File, StoreError> {
        let path = self.lock_path(key);
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        Ok(locked?)
    }

    /// Write data atomically: write to a `.tmp` file then rename.
    async fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

impl LinkStateStore for FileLinkStateStore {
    async fn load(&self, key: &SequenceKey) -> Result<LinkState, StoreError> {
        match self.read_row(key).await? {
            Some(row) => Ok(LinkState::try_from(row)?),
            None => Ok(LinkState::uninitialized()),
        }
    }

    async fn compare_and_set(
        &self,
        key: &SequenceKey,
        expected: &LinkState,
        new: &LinkState,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let _row_lock = self.lock_row(key).await?;

        let current = self
            .read_row(key)
            .await?
            .map(|row| row.version())
            .unwrap_or((0, false));
        if current != LinkStateRow::from(expected).version() {
            return Err(StoreError::Conflict { key: key.clone() });
        }

        let bytes = codec::encode_state(new)?;
        self.atomic_write(&self.row_path(key), &bytes).await?;
        tracing::trace!(%key, state = %new, "persisted link state");
        Ok(())
    }
}

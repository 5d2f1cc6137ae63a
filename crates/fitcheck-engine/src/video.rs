use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use uuid::Uuid;

/// Owned reference to a playable video file in the vault.
///
/// Not `Clone`: the only way to get rid of one is `VideoVault::release`,
/// which consumes it, so a handle cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct VideoHandle {
    id: String,
    path: PathBuf,
}

impl VideoHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Default)]
struct VaultLedger {
    outstanding: BTreeSet<String>,
    released: Vec<String>,
}

/// Holds downloaded video blobs under `<session>/videos/`.
#[derive(Debug)]
pub struct VideoVault {
    dir: PathBuf,
    ledger: Mutex<VaultLedger>,
}

impl VideoVault {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self {
            dir,
            ledger: Mutex::new(VaultLedger::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self, bytes: &[u8]) -> Result<VideoHandle> {
        let handle = self.new_handle();
        fs::write(&handle.path, bytes)
            .with_context(|| format!("failed to write {}", handle.path.display()))?;
        self.track(&handle);
        Ok(handle)
    }

    /// A second, independently released handle to a copy of the same video.
    pub fn duplicate(&self, handle: &VideoHandle) -> Result<VideoHandle> {
        let copy = self.new_handle();
        fs::copy(&handle.path, &copy.path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                handle.path.display(),
                copy.path.display()
            )
        })?;
        self.track(&copy);
        Ok(copy)
    }

    pub fn release(&self, handle: VideoHandle) {
        let _ = fs::remove_file(&handle.path);
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        ledger.outstanding.remove(&handle.id);
        ledger.released.push(handle.id);
    }

    pub fn outstanding(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outstanding
            .len()
    }

    pub fn released_ids(&self) -> Vec<String> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .released
            .clone()
    }

    fn new_handle(&self) -> VideoHandle {
        let id = Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{id}.mp4"));
        VideoHandle { id, path }
    }

    fn track(&self, handle: &VideoHandle) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outstanding
            .insert(handle.id.clone());
    }
}

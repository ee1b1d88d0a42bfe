use std::path::Path;

use tempfile::{Builder, TempDir};

use crate::consts::SCRATCH_PREFIX;
use crate::error::Result;

/// Uniquely named scratch directory for one batch, removed on drop.
///
/// Every collaborator temporary lives below it, in a per-image child
/// directory, so concurrent batches in one work directory never collide.
#[derive(Debug)]
pub struct ScratchArena {
    root: TempDir,
}

impl ScratchArena {
    /// Create the arena inside `parent` (the work directory, so that results
    /// can be renamed out of it without crossing filesystems).
    pub fn new_in(parent: &Path) -> Result<Self> {
        let root = Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(parent)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Fresh scratch directory for one image or the template.
    pub fn child(&self, label: &str) -> Result<TempDir> {
        Ok(Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(self.root.path())?)
    }
}

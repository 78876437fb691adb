//! Read-only memory mapping of the archive file.
//!
//! The mapping owns the bytes' lifetime: member payload views resolved
//! through it are valid until the mapping is dropped. Edits never touch
//! the map; writing produces a wholly new file image.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{Error, Result};

pub(crate) struct Mapping {
    mmap: Mmap,
}

impl Mapping {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        // Safety: the mapping is private and read-only; concurrent
        // truncation of the underlying file is outside this engine's
        // single-owner contract.
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| Error::Resource(format!("mmap of {} failed: {e}", path.display())))?;

        debug!(path = %path.display(), size, "mapped archive");
        Ok(Mapping { mmap })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

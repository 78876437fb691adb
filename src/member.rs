// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! One logical entry in an archive.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::compress::COMPRESSED_MAGIC;
use crate::error::Result;
use crate::header::MAX_INLINE_NAME;

/// The first bytes of an LLVM bitcode unit.
pub(crate) const BITCODE_MAGIC: &[u8; 4] = b"BC\xc0\xde";

/// Flag bits describing a member's role. Set only by the engine, never by
/// external callers.
pub(crate) mod flags {
    /// Member is the SVR4 symbol table (`/`).
    pub const SVR4_SYMBOL_TABLE: u32 = 1;
    /// Member is the BSD 4.4 symbol table (`__.SYMDEF`).
    pub const BSD4_SYMBOL_TABLE: u32 = 2;
    /// Member carries a bitcode unit.
    pub const BITCODE: u32 = 4;
    /// Member's name does not fit the inline header field.
    pub const LONG_FILENAME: u32 = 8;
    /// Member is the long filename string table (`//`).
    pub const STRING_TABLE: u32 = 16;
    /// Member payload is stored deflated.
    pub const COMPRESSED: u32 = 32;
}

/// Where a member's payload bytes come from.
#[derive(Debug, Clone)]
pub(crate) enum PayloadSource {
    /// A view into the owning archive's memory map. Valid only while that
    /// map is alive.
    Mapped { offset: usize, len: usize },
    /// A replacement buffer, owned by the member.
    Owned(Vec<u8>),
    /// An external file, read lazily at write time.
    File(PathBuf),
}

/// One member of an [`crate::Archive`]: a named payload with the Unix-style
/// metadata the ar format mandates even on platforms without such
/// semantics. Members are constructed by the engine only; obtain them from
/// `Archive` methods.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub(crate) path: String,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) mode: u32,
    pub(crate) mtime: u64,
    pub(crate) size: u64,
    pub(crate) flags: u32,
    pub(crate) source: PayloadSource,
}

impl ArchiveMember {
    /// Builds a member from an external file: stats it and sniffs flags
    /// from the leading payload bytes. The file contents are read later,
    /// when the archive is written.
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;

        let mut head = [0u8; 8];
        let mut file = File::open(path)?;
        let head_len = file.read(&mut head)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        #[cfg(unix)]
        let (uid, gid, mode) = {
            use std::os::unix::fs::MetadataExt;
            (meta.uid(), meta.gid(), meta.mode() & 0o7777)
        };
        #[cfg(not(unix))]
        let (uid, gid, mode) = (0, 0, 0o644);

        Ok(ArchiveMember {
            flags: sniff_flags(&head[..head_len], &name),
            path: name,
            uid,
            gid,
            mode,
            mtime,
            size: meta.len(),
            source: PayloadSource::File(path.to_path_buf()),
        })
    }

    /// The member's logical filename.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Owning user per Unix security.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Owning group per Unix security.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Unix permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Seconds since the epoch at which the member was last modified
    /// outside the archive.
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Logical payload length in bytes, exclusive of header and padding.
    /// For a compressed member this is the inflated size, not the stored
    /// one.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_svr4_symbol_table(&self) -> bool {
        self.flags & flags::SVR4_SYMBOL_TABLE != 0
    }

    pub fn is_bsd4_symbol_table(&self) -> bool {
        self.flags & flags::BSD4_SYMBOL_TABLE != 0
    }

    pub fn is_bitcode(&self) -> bool {
        self.flags & flags::BITCODE != 0
    }

    pub fn has_long_filename(&self) -> bool {
        self.flags & flags::LONG_FILENAME != 0
    }

    pub fn is_string_table(&self) -> bool {
        self.flags & flags::STRING_TABLE != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & flags::COMPRESSED != 0
    }
}

/// Computes content-derived flags for a member from its leading payload
/// bytes and its name.
pub(crate) fn sniff_flags(head: &[u8], name: &str) -> u32 {
    let mut flags = 0;
    if head.starts_with(BITCODE_MAGIC) {
        flags |= flags::BITCODE;
    }
    if head.starts_with(COMPRESSED_MAGIC) {
        flags |= flags::COMPRESSED;
    }
    if name.len() > MAX_INLINE_NAME {
        flags |= flags::LONG_FILENAME;
    }
    flags
}

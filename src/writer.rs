// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! Serializes an archive back to disk.
//!
//! Layout happens in two passes: a trial pass fixes every member's header
//! offset (the symbol table blob's size is known before any offset is),
//! then the real pass emits signature, symbol table, string table and the
//! members in list order, re-padding every payload to an even boundary.
//!
//! The target file is replaced atomically: everything is written to a
//! temporary file in the same directory which is renamed over the target
//! only once complete. Errors abort the whole write and leave the
//! original file untouched; partial writes are never visible to a
//! concurrent reader of the old file.

use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::archive::Archive;
use crate::compress;
use crate::error::{Error, Result};
use crate::header::{self, MAX_INLINE_NAME, SIGNATURE};
use crate::string_table::StringTable;
use crate::symbol_reader::SymbolReader;
use crate::symbol_table::{SymbolMap, SymbolTableBuilder};

/// Policies for one `write_to_disk` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Scan linkable members and emit the `/` symbol table.
    pub symbol_table: bool,
    /// Strip path components and truncate names to the classic 15-char
    /// inline limit instead of using the long-name convention.
    pub truncate_names: bool,
    /// Deflate member payloads (members already stored compressed are
    /// copied as-is).
    pub compress: bool,
}

/// Where one member landed in the new file image.
pub(crate) struct MemberLayout {
    pub header_offset: u64,
    pub data_offset: u64,
    pub stored_len: u64,
    pub compressed: bool,
}

pub(crate) struct WriteOutcome {
    pub first_file_offset: u64,
    pub layouts: Vec<MemberLayout>,
    pub symbols: SymbolMap,
    pub string_table: StringTable,
}

/// The size field is 10 decimal digits long.
const MAX_MEMBER_SIZE: u64 = 9999999999;

struct PreparedMember<'a> {
    name_field: String,
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
    stored: Cow<'a, [u8]>,
    compressed: bool,
}

fn inline_name_field(name: &str) -> String {
    format!("{name}/")
}

/// Strips the path component and cuts the file name at the inline limit.
fn truncated_name(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    let mut end = base.len().min(MAX_INLINE_NAME);
    while !base.is_char_boundary(end) {
        end -= 1;
    }
    &base[..end]
}

fn needs_string_table(name: &str) -> bool {
    name.len() > MAX_INLINE_NAME || name.contains('/')
}

/// Lays out and writes the whole archive image. Does not mutate the
/// `Archive`; the caller applies the returned layout on success.
pub(crate) fn write(
    archive: &Archive,
    options: &WriteOptions,
    reader: &SymbolReader,
) -> Result<WriteOutcome> {
    let mut string_table = StringTable::default();
    let mut symbols = SymbolTableBuilder::default();
    let mut prepared = Vec::with_capacity(archive.members().len());

    for (index, (_, member)) in archive.members().iter().enumerate() {
        let raw = archive.stored_bytes(member)?;
        let already_framed = compress::is_frame(&raw);

        if options.symbol_table {
            let logical = if already_framed {
                Cow::Owned(compress::inflate_frame(&raw)?)
            } else {
                Cow::Borrowed(raw.as_ref())
            };
            symbols.scan_member(index, &logical, reader)?;
        }

        let (stored, compressed) = if options.compress && !already_framed {
            (Cow::Owned(compress::deflate_frame(&raw)?), true)
        } else {
            (raw, already_framed)
        };

        if stored.len() as u64 > MAX_MEMBER_SIZE {
            return Err(Error::format(format!(
                "archive member {} is too big",
                member.path()
            )));
        }

        let name_field = if options.truncate_names {
            inline_name_field(truncated_name(member.path()))
        } else if needs_string_table(member.path()) {
            format!("/{}", string_table.add_name(member.path()))
        } else {
            inline_name_field(member.path())
        };

        prepared.push(PreparedMember {
            name_field,
            mtime: member.mtime(),
            uid: member.uid(),
            gid: member.gid(),
            mode: member.mode(),
            stored,
            compressed,
        });
    }

    // Trial layout: fix every offset before anything is written.
    let mut pos = SIGNATURE.len() as u64;

    let symbol_blob_size = symbols.blob_size();
    if options.symbol_table {
        pos += header::HEADER_SIZE as u64 + symbol_blob_size;
        pos += header::pad_len(symbol_blob_size) as u64;
    }

    // The string table's size field conventionally includes its own pad
    // byte.
    let string_table_size = {
        let len = string_table.len() as u64;
        len + header::pad_len(len) as u64
    };
    if !string_table.is_empty() {
        pos += header::HEADER_SIZE as u64 + string_table_size;
    }

    let first_file_offset = pos;
    let mut layouts = Vec::with_capacity(prepared.len());
    for m in &prepared {
        let header_offset = pos;
        let data_offset = header_offset + header::HEADER_SIZE as u64;
        let stored_len = m.stored.len() as u64;
        layouts.push(MemberLayout {
            header_offset,
            data_offset,
            stored_len,
            compressed: m.compressed,
        });
        pos = data_offset + stored_len + header::pad_len(stored_len) as u64;
    }

    let (symbol_map, symbol_blob) = if options.symbol_table {
        let offsets: Vec<u64> = layouts.iter().map(|l| l.header_offset).collect();
        symbols.finish(&offsets)?
    } else {
        (SymbolMap::new(), Vec::new())
    };

    // Real pass: serialize to a temporary, then move into place.
    let dir = archive.path().parent().filter(|p| !p.as_os_str().is_empty());
    let temp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    {
        let mut w = BufWriter::new(temp.as_file());

        w.write_all(SIGNATURE)?;

        if options.symbol_table {
            header::encode(&mut w, "/", 0, 0, 0, 0, symbol_blob.len() as u64)?;
            w.write_all(&symbol_blob)?;
            write_pad(&mut w, header::pad_len(symbol_blob.len() as u64))?;
        }

        if !string_table.is_empty() {
            write!(w, "{:<48}", "//")?;
            write!(w, "{:<10}", string_table_size)?;
            write!(w, "`\n")?;
            w.write_all(string_table.as_bytes())?;
            write_pad(&mut w, header::pad_len(string_table.len() as u64))?;
        }

        for m in &prepared {
            header::encode(
                &mut w,
                &m.name_field,
                m.mtime,
                m.uid,
                m.gid,
                m.mode,
                m.stored.len() as u64,
            )?;
            w.write_all(&m.stored)?;
            write_pad(&mut w, header::pad_len(m.stored.len() as u64))?;
        }

        w.flush()?;
    }
    temp.persist(archive.path()).map_err(|e| Error::Io(e.error))?;

    debug!(
        path = %archive.path().display(),
        members = prepared.len(),
        symbols = symbol_map.len(),
        first_file_offset,
        "archive written"
    );

    Ok(WriteOutcome {
        first_file_offset,
        layouts,
        symbols: symbol_map,
        string_table,
    })
}

fn write_pad<W: Write>(w: &mut W, pad: usize) -> Result<()> {
    if pad != 0 {
        w.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn truncation_strips_path_and_cuts_at_fifteen() {
        assert_eq!(truncated_name("dir/sub/short.o"), "short.o");
        assert_eq!(
            truncated_name("a_rather_long_member_name.o"),
            "a_rather_long_m"
        );
        assert_eq!(truncated_name("short.o"), "short.o");
    }

    #[test]
    fn string_table_promotion() {
        assert!(!needs_string_table("fits_inline.o"));
        assert!(needs_string_table("a_name_longer_than_fifteen.o"));
        assert!(needs_string_table("dir/with_path.o"));
    }
}

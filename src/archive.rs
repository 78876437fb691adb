// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The aggregate root: one in-memory representation of one archive file.
//!
//! An `Archive` owns the member list, the memory map backing loaded
//! member payloads, the long-name string table and an offset-keyed cache
//! of materialized payloads. It is a single-writer, single-owner value:
//! nothing touches the disk file until [`Archive::write_to_disk`], and
//! unwritten mutations are lost when the value is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::compress;
use crate::error::{Error, Result};
use crate::header::{self, HeaderName, SIGNATURE};
use crate::member::{flags, sniff_flags, ArchiveMember, PayloadSource};
use crate::member_list::{MemberId, MemberList};
use crate::mmap::Mapping;
use crate::string_table::StringTable;
use crate::symbol_reader::{SymbolReader, DEFAULT_SYMBOL_READER};
use crate::symbol_table::{self, SymbolMap};
use crate::writer::{self, WriteOptions};

pub struct Archive {
    path: PathBuf,
    members: MemberList,
    mapping: Option<Mapping>,
    first_file_offset: u64,
    string_table: StringTable,
    symbols: SymbolMap,
    /// Offset-keyed memoization of materialized payloads. Never evicted;
    /// cleared wholesale on rewrite and dropped with the archive.
    module_cache: RefCell<HashMap<u64, Rc<Vec<u8>>>>,
}

impl Archive {
    /// Creates an empty archive bound to `path`. No disk I/O happens
    /// until the first [`Archive::write_to_disk`].
    pub fn create_empty(path: impl Into<PathBuf>) -> Self {
        Archive {
            path: path.into(),
            members: MemberList::new(),
            mapping: None,
            first_file_offset: SIGNATURE.len() as u64,
            string_table: StringTable::default(),
            symbols: SymbolMap::new(),
            module_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Maps `path`, validates the signature and parses every member in
    /// preparation for editing or traversal.
    pub fn open_and_load(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load(path.into(), true)
    }

    /// The light load path for link-time symbol resolution: parses only
    /// the archive prologue (symbol table and string table) and leaves
    /// the member list empty. Use [`Archive::symbol_offset`] and
    /// [`Archive::payload_at`] against the result.
    pub fn open_and_load_symbols(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load(path.into(), false)
    }

    fn load(path: PathBuf, full: bool) -> Result<Self> {
        let mapping = Mapping::open(&path)?;
        let bytes = mapping.bytes();
        if bytes.len() < SIGNATURE.len() || &bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err(Error::format(format!(
                "{} is not an archive: bad signature",
                path.display()
            )));
        }

        let mut members = MemberList::new();
        let mut string_table = StringTable::default();
        let mut symbols = SymbolMap::new();
        let mut first_file_offset = None;

        let mut at = SIGNATURE.len();
        while at < bytes.len() {
            let decoded = header::decode_at(bytes, at, &string_table)?;
            let payload = &bytes[decoded.data_offset..decoded.data_offset + decoded.size as usize];

            match decoded.name {
                HeaderName::SymbolTable => {
                    symbols = symbol_table::parse(payload)?;
                }
                HeaderName::Bsd4SymbolTable => {
                    // Recognized so the walk keeps going; the BSD index is
                    // rebuilt on the next write rather than carried over.
                }
                HeaderName::StringTable => {
                    string_table = StringTable::from_bytes(payload);
                }
                HeaderName::Normal { ref name, long } => {
                    if first_file_offset.is_none() {
                        first_file_offset = Some(at as u64);
                    }
                    if !full {
                        break;
                    }
                    members.push_back(parse_member(name.clone(), long, &decoded, payload)?);
                }
            }
            at = decoded.next_offset;
        }

        debug!(
            path = %path.display(),
            members = members.len(),
            symbols = symbols.len(),
            full,
            "archive loaded"
        );

        Ok(Archive {
            first_file_offset: first_file_offset.unwrap_or(at as u64),
            path,
            members,
            mapping: Some(mapping),
            string_table,
            symbols,
            module_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Path of the disk file this archive loads from and stores to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first member past the signature/symbol-table/
    /// string-table prologue. Refreshed by [`Archive::write_to_disk`].
    pub fn first_file_offset(&self) -> u64 {
        self.first_file_offset
    }

    pub fn members(&self) -> &MemberList {
        &self.members
    }

    /// Direct access to the member list for reordering edits. Member
    /// order is the on-disk order of the next write.
    pub fn members_mut(&mut self) -> &mut MemberList {
        &mut self.members
    }

    /// The loaded or last-written symbol index.
    pub fn symbol_table(&self) -> &SymbolMap {
        &self.symbols
    }

    /// Header offset of the member defining `name`, per the symbol index.
    pub fn symbol_offset(&self, name: &[u8]) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    /// Stats `file`, sniffs content flags from its leading bytes and
    /// inserts a new member before `before` (`None` appends). The file's
    /// contents are read when the archive is written.
    pub fn add_file_before(&mut self, file: &Path, before: Option<MemberId>) -> Result<MemberId> {
        let member = ArchiveMember::from_file(file)?;
        self.members.insert_before(before, member)
    }

    /// Replaces the payload of `id` with the contents of `file`,
    /// refreshing metadata and content flags. The bytes are read eagerly
    /// so the member no longer depends on the external file.
    pub fn replace_with(&mut self, id: MemberId, file: &Path) -> Result<()> {
        let fresh = ArchiveMember::from_file(file)?;
        let data = std::fs::read(file)?;
        let member = self.members.get_mut(id)?;
        member.uid = fresh.uid;
        member.gid = fresh.gid;
        member.mode = fresh.mode;
        member.mtime = fresh.mtime;
        member.size = data.len() as u64;
        member.flags = sniff_flags(&data[..data.len().min(8)], &member.path);
        member.source = PayloadSource::Owned(data);
        Ok(())
    }

    /// Removes a member. Handles to other members stay valid.
    pub fn erase(&mut self, id: MemberId) -> Result<ArchiveMember> {
        self.members.erase(id)
    }

    /// Moves a member of another archive into this one, just before
    /// `before`. The payload is detached from the source archive's map
    /// first, so it stays valid however long either archive lives.
    pub fn splice_from_archive(
        &mut self,
        before: Option<MemberId>,
        other: &mut Archive,
        src: MemberId,
    ) -> Result<MemberId> {
        let mut member = other.members.erase(src)?;
        if matches!(member.source, PayloadSource::Mapped { .. }) {
            let stored = other.stored_bytes(&member)?.into_owned();
            member.source = PayloadSource::Owned(stored);
        }
        self.members.insert_before(before, member)
    }

    /// Materialized logical payload of a member: file-backed payloads are
    /// read, compressed payloads inflated transparently. Mapped payloads
    /// are memoized in the module cache by file offset.
    pub fn payload(&self, id: MemberId) -> Result<Rc<Vec<u8>>> {
        let member = self.members.get(id)?;
        match &member.source {
            PayloadSource::Mapped { offset, .. } => {
                let key = *offset as u64;
                if let Some(hit) = self.module_cache.borrow().get(&key) {
                    return Ok(Rc::clone(hit));
                }
                let stored = self.stored_bytes(member)?;
                let logical = Rc::new(materialize(&stored)?);
                self.module_cache
                    .borrow_mut()
                    .insert(key, Rc::clone(&logical));
                Ok(logical)
            }
            _ => {
                let stored = self.stored_bytes(member)?;
                Ok(Rc::new(materialize(&stored)?))
            }
        }
    }

    /// Materialized payload of the member whose *header* starts at
    /// `header_offset` — the offsets the symbol table hands out. Cached
    /// like [`Archive::payload`].
    pub fn payload_at(&self, header_offset: u64) -> Result<Rc<Vec<u8>>> {
        let bytes = self.map_bytes()?;
        let decoded = header::decode_at(bytes, header_offset as usize, &self.string_table)?;
        let key = decoded.data_offset as u64;
        if let Some(hit) = self.module_cache.borrow().get(&key) {
            return Ok(Rc::clone(hit));
        }
        let stored = &bytes[decoded.data_offset..decoded.data_offset + decoded.size as usize];
        let logical = Rc::new(materialize(stored)?);
        self.module_cache
            .borrow_mut()
            .insert(key, Rc::clone(&logical));
        Ok(logical)
    }

    /// Serializes the archive with the default symbol reader. On success
    /// the in-memory state is rebased onto the new file image: offsets
    /// are refreshed and further edits see a consistent state.
    pub fn write_to_disk(&mut self, options: WriteOptions) -> Result<()> {
        self.write_to_disk_with(options, &DEFAULT_SYMBOL_READER)
    }

    /// Like [`Archive::write_to_disk`] but with a caller-supplied unit
    /// symbol extractor.
    pub fn write_to_disk_with(
        &mut self,
        options: WriteOptions,
        reader: &SymbolReader,
    ) -> Result<()> {
        let outcome = writer::write(self, &options, reader)?;

        // Rebase every member onto the freshly written image.
        let mapping = Mapping::open(&self.path)?;
        let ids: Vec<MemberId> = self.members.iter().map(|(id, _)| id).collect();
        debug_assert_eq!(ids.len(), outcome.layouts.len());
        for (id, layout) in ids.into_iter().zip(&outcome.layouts) {
            let member = self.members.get_mut(id)?;
            member.source = PayloadSource::Mapped {
                offset: layout.data_offset as usize,
                len: layout.stored_len as usize,
            };
            if layout.compressed {
                member.flags |= flags::COMPRESSED;
            } else {
                member.flags &= !flags::COMPRESSED;
            }
        }
        self.mapping = Some(mapping);
        self.first_file_offset = outcome.first_file_offset;
        self.string_table = outcome.string_table;
        self.symbols = outcome.symbols;
        self.module_cache.borrow_mut().clear();
        Ok(())
    }

    fn map_bytes(&self) -> Result<&[u8]> {
        self.mapping
            .as_ref()
            .map(Mapping::bytes)
            .ok_or_else(|| Error::Resource("archive has no mapped file".into()))
    }

    /// The bytes of a member as they would appear on disk (compressed
    /// members stay framed).
    pub(crate) fn stored_bytes<'a>(
        &'a self,
        member: &'a ArchiveMember,
    ) -> Result<std::borrow::Cow<'a, [u8]>> {
        use std::borrow::Cow;
        match &member.source {
            PayloadSource::Mapped { offset, len } => {
                let bytes = self.map_bytes()?;
                bytes
                    .get(*offset..*offset + *len)
                    .map(Cow::Borrowed)
                    .ok_or_else(|| {
                        Error::format("member data runs past the mapped archive")
                    })
            }
            PayloadSource::Owned(data) => Ok(Cow::Borrowed(data)),
            PayloadSource::File(path) => Ok(Cow::Owned(std::fs::read(path)?)),
        }
    }
}

fn materialize(stored: &[u8]) -> Result<Vec<u8>> {
    if compress::is_frame(stored) {
        compress::inflate_frame(stored)
    } else {
        Ok(stored.to_vec())
    }
}

/// Builds the in-memory member for one parsed normal header.
fn parse_member(
    name: String,
    long: bool,
    decoded: &header::DecodedHeader,
    payload: &[u8],
) -> Result<ArchiveMember> {
    let mut size = decoded.size;
    let mut member_flags = if long { flags::LONG_FILENAME } else { 0 };

    if compress::is_frame(payload) {
        member_flags |= flags::COMPRESSED;
        size = compress::frame_inflated_len(payload)?;
        let head = compress::inflate_frame_head(payload, 8)?;
        member_flags |= sniff_flags(&head, &name) & !flags::LONG_FILENAME;
    } else {
        let head = &payload[..payload.len().min(8)];
        member_flags |= sniff_flags(head, &name) & !flags::LONG_FILENAME;
    }

    Ok(ArchiveMember {
        path: name,
        uid: decoded.uid,
        gid: decoded.gid,
        mode: decoded.mode,
        mtime: decoded.mtime,
        size,
        flags: member_flags,
        source: PayloadSource::Mapped {
            offset: decoded.data_offset,
            len: decoded.size as usize,
        },
    })
}

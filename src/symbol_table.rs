// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The SVR4 symbol table: a derived index mapping externally visible
//! symbol names to the file offset of the defining member's header.
//!
//! On disk (the `/` member): a big-endian u32 entry count, one big-endian
//! u32 header offset per entry, then the null-terminated names in the same
//! order. This matches the historical SVR4 convention, so produced
//! archives stay readable by standard ar tools.
//!
//! Final member offsets are only known once the writer has laid out the
//! whole file, and the layout in turn depends on this table's size. The
//! builder therefore works in two passes: [`SymbolTableBuilder::scan_member`]
//! collects names (fixing the blob size), then [`SymbolTableBuilder::finish`]
//! fills in the offsets from the completed trial layout.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{Error, Result};
use crate::symbol_reader::SymbolReader;

pub type SymbolMap = BTreeMap<Vec<u8>, u64>;

#[derive(Default)]
pub(crate) struct SymbolTableBuilder {
    /// Names in encounter order with the index of the defining member.
    names: Vec<(Vec<u8>, usize)>,
    seen: BTreeMap<Vec<u8>, usize>,
}

impl SymbolTableBuilder {
    /// Extracts the symbols of the member with list index `index` from its
    /// logical payload bytes. Payloads the reader does not recognize
    /// contribute nothing. Duplicate names across members keep the first
    /// definition and are reported at warn level; this mirrors historical
    /// ar behavior and is never fatal.
    pub(crate) fn scan_member(
        &mut self,
        index: usize,
        payload: &[u8],
        reader: &SymbolReader,
    ) -> Result<()> {
        let names = &mut self.names;
        let seen = &mut self.seen;
        (reader.get_symbols)(payload, &mut |name| {
            if let Some(&first) = seen.get(name) {
                warn!(
                    symbol = %String::from_utf8_lossy(name),
                    first_member = first,
                    second_member = index,
                    "duplicate symbol across members; keeping first definition"
                );
                return Ok(());
            }
            seen.insert(name.to_vec(), index);
            names.push((name.to_vec(), index));
            Ok(())
        })?;
        Ok(())
    }

    /// Size of the serialized blob, known before any offset is.
    pub(crate) fn blob_size(&self) -> u64 {
        let names: usize = self.names.iter().map(|(n, _)| n.len() + 1).sum();
        (4 + 4 * self.names.len() + names) as u64
    }

    /// Serializes the table, resolving each member index through
    /// `header_offsets` (absolute header offset per member, in list
    /// order).
    pub(crate) fn finish(self, header_offsets: &[u64]) -> Result<(SymbolMap, Vec<u8>)> {
        let mut map = SymbolMap::new();
        let mut blob = Vec::with_capacity(self.blob_size() as usize);

        blob.extend_from_slice(&(self.names.len() as u32).to_be_bytes());
        for (name, index) in &self.names {
            let offset = header_offsets[*index];
            let offset = u32::try_from(offset).map_err(|_| {
                Error::format("member offset does not fit the 4-byte symbol table entry")
            })?;
            blob.extend_from_slice(&offset.to_be_bytes());
            map.insert(name.clone(), u64::from(offset));
        }
        for (name, _) in &self.names {
            blob.extend_from_slice(name);
            blob.push(0);
        }

        Ok((map, blob))
    }
}

/// Parses a `/` member payload back into the symbol map. This is the
/// light load path: it needs only the archive prologue, not the members.
pub(crate) fn parse(blob: &[u8]) -> Result<SymbolMap> {
    if blob.len() < 4 {
        return Err(Error::format("symbol table member shorter than its count"));
    }
    let count = u32::from_be_bytes(blob[..4].try_into().expect("sliced 4 bytes")) as usize;
    let names_start = 4 + count * 4;
    if blob.len() < names_start {
        return Err(Error::format(format!(
            "symbol table claims {count} entries but is truncated"
        )));
    }

    let mut map = SymbolMap::new();
    let mut name_pos = names_start;
    for i in 0..count {
        let off = 4 + i * 4;
        let member_offset = u32::from_be_bytes(blob[off..off + 4].try_into().expect("in bounds"));
        let tail = &blob[name_pos..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::format("unterminated name in symbol table"))?;
        map.insert(tail[..end].to_vec(), u64::from(member_offset));
        name_pos += end + 1;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fake_reader() -> SymbolReader {
        // Payloads are newline-separated symbol names; empty payloads are
        // not recognized.
        fn get_symbols(
            buf: &[u8],
            f: &mut dyn FnMut(&[u8]) -> std::io::Result<()>,
        ) -> std::io::Result<bool> {
            if buf.is_empty() {
                return Ok(false);
            }
            for name in buf.split(|&b| b == b'\n').filter(|n| !n.is_empty()) {
                f(name)?;
            }
            Ok(true)
        }
        SymbolReader { get_symbols }
    }

    #[test]
    fn build_then_parse_round_trips() {
        let reader = fake_reader();
        let mut builder = SymbolTableBuilder::default();
        builder.scan_member(0, b"alpha\nbeta", &reader).unwrap();
        builder.scan_member(1, b"gamma", &reader).unwrap();

        // 4-byte count, three 4-byte offsets, three terminated names.
        assert_eq!(builder.blob_size(), 4 + 12 + 6 + 5 + 6);

        let (map, blob) = builder.finish(&[100, 300]).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[b"alpha".as_slice()], 100);
        assert_eq!(map[b"beta".as_slice()], 100);
        assert_eq!(map[b"gamma".as_slice()], 300);
        assert_eq!(blob.len() as u64, 4 + 12 + 6 + 5 + 6);

        assert_eq!(parse(&blob).unwrap(), map);
    }

    #[test]
    fn unrecognized_payloads_contribute_nothing() {
        let reader = fake_reader();
        let mut builder = SymbolTableBuilder::default();
        builder.scan_member(0, b"", &reader).unwrap();
        builder.scan_member(1, b"sym", &reader).unwrap();
        let (map, _) = builder.finish(&[100, 200]).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[b"sym".as_slice()], 200);
    }

    #[test]
    fn duplicate_symbol_keeps_first_definition() {
        let reader = fake_reader();
        let mut builder = SymbolTableBuilder::default();
        builder.scan_member(0, b"dup", &reader).unwrap();
        builder.scan_member(1, b"dup", &reader).unwrap();
        let (map, _) = builder.finish(&[100, 200]).unwrap();
        assert_eq!(map[b"dup".as_slice()], 100);
    }

    #[test]
    fn truncated_blob_is_a_format_error() {
        assert!(parse(&[0, 0]).is_err());
        // Claims one entry, provides no offsets.
        assert!(parse(&[0, 0, 0, 1]).is_err());
    }
}

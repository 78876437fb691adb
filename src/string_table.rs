// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The `//` long filename string table.
//!
//! Names too long for the header's inline field are concatenated here,
//! each terminated with `/\n`, and referenced from headers as
//! `/<byte offset>`. The whole table is written as one archive member
//! between the symbol table and the first normal member.

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone)]
pub(crate) struct StringTable {
    blob: Vec<u8>,
}

impl StringTable {
    /// Wraps an existing table parsed out of an archive.
    pub(crate) fn from_bytes(blob: &[u8]) -> Self {
        StringTable {
            blob: blob.to_vec(),
        }
    }

    /// Appends `name` and returns its offset. Names are not de-duplicated;
    /// callers that want sharing must remember offsets themselves.
    pub(crate) fn add_name(&mut self, name: &str) -> u32 {
        let offset = self.blob.len() as u32;
        self.blob.extend_from_slice(name.as_bytes());
        self.blob.extend_from_slice(b"/\n");
        offset
    }

    /// Resolves a `/<offset>` header reference back to the name.
    pub(crate) fn lookup(&self, offset: u32) -> Result<&str> {
        let start = offset as usize;
        let tail = self.blob.get(start..).ok_or_else(|| {
            Error::format(format!(
                "string table reference {offset} is past the table end ({})",
                self.blob.len()
            ))
        })?;
        let end = tail
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::format(format!("unterminated string table entry at {offset}")))?;
        let entry = &tail[..end];
        let entry = entry.strip_suffix(b"/").unwrap_or(entry);
        std::str::from_utf8(entry)
            .map_err(|_| Error::format(format!("non-ASCII string table entry at {offset}")))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.blob.len()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn add_then_lookup() {
        let mut tab = StringTable::default();
        let a = tab.add_name("first_very_long_member_name.o");
        let b = tab.add_name("second_very_long_member_name.o");
        assert_eq!(a, 0);
        assert_eq!(b, 31);
        assert_eq!(tab.lookup(a).unwrap(), "first_very_long_member_name.o");
        assert_eq!(tab.lookup(b).unwrap(), "second_very_long_member_name.o");
    }

    #[test]
    fn no_dedup() {
        let mut tab = StringTable::default();
        let a = tab.add_name("same.o");
        let b = tab.add_name("same.o");
        assert_ne!(a, b);
    }

    #[test]
    fn out_of_range_offset() {
        let tab = StringTable::default();
        assert!(tab.lookup(4).is_err());
    }
}

// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The fixed 60-byte ar member header.
//!
//! All fields are left-justified, space-padded decimal ASCII (mode is
//! octal); this is a textual record, not a packed struct. Two long
//! filename conventions are understood: a `/<offset>` reference into the
//! archive string table and the BSD `#1/<len>` inline form where the name
//! bytes immediately follow the header.

use std::io::{self, Write};

use crate::error::{Error, Result};
use crate::string_table::StringTable;

/// The 8 literal bytes marking the start of every ar file.
pub const SIGNATURE: &[u8; 8] = b"!<arch>\n";

pub const HEADER_SIZE: usize = 60;

/// Inline names longer than this must go through a long-name convention.
/// One of the 16 name bytes is reserved for the `/` terminator.
pub const MAX_INLINE_NAME: usize = 15;

const END_MARKER: &[u8; 2] = b"`\n";

const NAME_LEN: usize = 16;
const MTIME_LEN: usize = 12;
const UID_LEN: usize = 6;
const GID_LEN: usize = 6;
const MODE_LEN: usize = 8;
const SIZE_LEN: usize = 10;

/// What the name field of a decoded header identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HeaderName {
    /// A regular member name, long-name conventions already resolved.
    /// The flag records whether a long-name encoding was used.
    Normal { name: String, long: bool },
    /// `/` — the SVR4 symbol table.
    SymbolTable,
    /// `__.SYMDEF` — the BSD 4.4 symbol table.
    Bsd4SymbolTable,
    /// `//` — the long filename string table.
    StringTable,
}

/// One decoded member header plus the derived payload geometry.
#[derive(Debug)]
pub(crate) struct DecodedHeader {
    pub name: HeaderName,
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    /// Payload length, exclusive of header, inline name and padding.
    pub size: u64,
    /// Absolute offset of the first payload byte.
    pub data_offset: usize,
    /// Absolute offset of the next member header (payload padded to even).
    pub next_offset: usize,
}

fn field_str<'a>(buf: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(buf)
        .map_err(|_| Error::format(format!("non-ASCII bytes in {what} field")))
        .map(|s| s.trim_end_matches(' '))
}

fn parse_dec(buf: &[u8], what: &str) -> Result<u64> {
    let s = field_str(buf, what)?;
    if s.is_empty() {
        return Ok(0);
    }
    s.parse()
        .map_err(|_| Error::format(format!("malformed decimal {what} field `{s}`")))
}

fn parse_oct(buf: &[u8], what: &str) -> Result<u32> {
    let s = field_str(buf, what)?;
    if s.is_empty() {
        return Ok(0);
    }
    u32::from_str_radix(s, 8)
        .map_err(|_| Error::format(format!("malformed octal {what} field `{s}`")))
}

/// Decodes the member header starting at `at`. Long string-table
/// references are resolved through `strtab`; a `#1/<len>` inline name is
/// consumed from the bytes following the header and excluded from the
/// reported payload.
pub(crate) fn decode_at(buf: &[u8], at: usize, strtab: &StringTable) -> Result<DecodedHeader> {
    let Some(header) = buf.get(at..at + HEADER_SIZE) else {
        return Err(Error::format(format!(
            "truncated archive: member header at offset {at} runs past end of file"
        )));
    };
    if &header[HEADER_SIZE - 2..] != END_MARKER {
        return Err(Error::format(format!(
            "bad end-of-header marker at offset {at}"
        )));
    }

    let mut pos = NAME_LEN;
    let mut take = |len: usize| {
        let f = &header[pos..pos + len];
        pos += len;
        f
    };
    let mtime = parse_dec(take(MTIME_LEN), "mtime")?;
    let uid = parse_dec(take(UID_LEN), "uid")? as u32;
    let gid = parse_dec(take(GID_LEN), "gid")? as u32;
    let mode = parse_oct(take(MODE_LEN), "mode")?;
    let mut size = parse_dec(take(SIZE_LEN), "size")?;

    let name_field = field_str(&header[..NAME_LEN], "name")?;
    let mut data_offset = at + HEADER_SIZE;

    let name = if name_field == "/" {
        HeaderName::SymbolTable
    } else if name_field == "//" {
        HeaderName::StringTable
    } else if name_field == "__.SYMDEF" || name_field == "__.SYMDEF SORTED" {
        HeaderName::Bsd4SymbolTable
    } else if let Some(offset) = name_field.strip_prefix('/') {
        let offset: u32 = offset.parse().map_err(|_| {
            Error::format(format!("malformed string table reference `{name_field}`"))
        })?;
        HeaderName::Normal {
            name: strtab.lookup(offset)?.to_string(),
            long: true,
        }
    } else if let Some(len) = name_field.strip_prefix("#1/") {
        // BSD: the name follows the header and is counted in `size`.
        let name_len: usize = len.parse().map_err(|_| {
            Error::format(format!("malformed inline long name length `{name_field}`"))
        })?;
        if (name_len as u64) > size {
            return Err(Error::format(format!(
                "inline long name of {name_len} bytes exceeds member size {size}"
            )));
        }
        let Some(raw) = buf.get(data_offset..data_offset + name_len) else {
            return Err(Error::format(
                "truncated archive: inline long name runs past end of file".to_string(),
            ));
        };
        let name = std::str::from_utf8(raw)
            .map_err(|_| Error::format("non-ASCII bytes in inline long name"))?
            .trim_end_matches('\0')
            .to_string();
        data_offset += name_len;
        size -= name_len as u64;
        HeaderName::Normal { name, long: true }
    } else {
        // GNU terminates inline names with `/`; plain trailing-space names
        // are accepted too.
        let name = name_field.strip_suffix('/').unwrap_or(name_field);
        HeaderName::Normal {
            name: name.to_string(),
            long: false,
        }
    };

    let data_end = data_offset + size as usize;
    if data_end > buf.len() {
        return Err(Error::format(format!(
            "truncated archive: member payload at offset {data_offset} runs past end of file"
        )));
    }

    Ok(DecodedHeader {
        name,
        mtime,
        uid,
        gid,
        mode,
        size,
        data_offset,
        next_offset: data_end + pad_len(data_end as u64),
    })
}

/// Number of pad bytes needed to bring `size` to an even boundary.
pub(crate) fn pad_len(size: u64) -> usize {
    (size & 1) as usize
}

/// Encodes one 60-byte header. `name_field` is the raw 16-byte name text
/// (`name/`, `/`, `//` or `/<offset>`), already within the inline limit.
pub(crate) fn encode<W: Write>(
    w: &mut W,
    name_field: &str,
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
    size: u64,
) -> io::Result<()> {
    debug_assert!(name_field.len() <= NAME_LEN);
    write!(w, "{:<16}", name_field)?;
    // The format has only 6 chars for uid and gid. Truncate if the provided
    // values don't fit.
    write!(
        w,
        "{:<12}{:<6}{:<6}{:<8o}{:<10}`\n",
        mtime,
        uid % 1000000,
        gid % 1000000,
        mode,
        size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode_to_vec(name_field: &str, size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode(&mut out, name_field, 1234567890, 501, 20, 0o644, size).unwrap();
        out
    }

    #[test]
    fn encoded_header_is_60_bytes() {
        let out = encode_to_vec("hello.o/", 42);
        assert_eq!(out.len(), HEADER_SIZE);
        assert_eq!(&out[58..60], b"`\n");
    }

    #[test]
    fn decode_round_trips_encode() {
        let mut buf = encode_to_vec("hello.o/", 5);
        buf.extend_from_slice(b"12345\n");

        let strtab = StringTable::default();
        let h = decode_at(&buf, 0, &strtab).unwrap();
        assert_eq!(
            h.name,
            HeaderName::Normal {
                name: "hello.o".to_string(),
                long: false
            }
        );
        assert_eq!(h.mtime, 1234567890);
        assert_eq!(h.uid, 501);
        assert_eq!(h.gid, 20);
        assert_eq!(h.mode, 0o644);
        assert_eq!(h.size, 5);
        assert_eq!(h.data_offset, HEADER_SIZE);
        // Odd payload gets one pad byte.
        assert_eq!(h.next_offset, HEADER_SIZE + 6);
    }

    #[test]
    fn bad_end_marker_is_fatal() {
        let mut buf = encode_to_vec("hello.o/", 0);
        buf[58] = b'X';
        let strtab = StringTable::default();
        assert!(matches!(
            decode_at(&buf, 0, &strtab),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn truncated_header_is_fatal() {
        let buf = encode_to_vec("hello.o/", 0);
        let strtab = StringTable::default();
        assert!(decode_at(&buf, 30, &strtab).is_err());
    }

    #[test]
    fn string_table_reference_resolves() {
        let mut strtab = StringTable::default();
        let offset = strtab.add_name("a_name_longer_than_fifteen_chars.o");
        let mut buf = encode_to_vec(&format!("/{offset}"), 2);
        buf.extend_from_slice(b"ok");

        let h = decode_at(&buf, 0, &strtab).unwrap();
        assert_eq!(
            h.name,
            HeaderName::Normal {
                name: "a_name_longer_than_fifteen_chars.o".to_string(),
                long: true
            }
        );
    }

    #[test]
    fn bsd_inline_long_name() {
        // "#1/20" followed by a 17-byte name padded to 20, then 4 data bytes.
        let name = b"seventeen_chars.o\0\0\0";
        let mut buf = encode_to_vec("#1/20", 24);
        buf.extend_from_slice(name);
        buf.extend_from_slice(b"data");

        let strtab = StringTable::default();
        let h = decode_at(&buf, 0, &strtab).unwrap();
        assert_eq!(
            h.name,
            HeaderName::Normal {
                name: "seventeen_chars.o".to_string(),
                long: true
            }
        );
        assert_eq!(h.size, 4);
        assert_eq!(h.data_offset, HEADER_SIZE + 20);
        assert_eq!(&buf[h.data_offset..h.data_offset + 4], b"data");
    }

    #[test]
    fn symbol_and_string_table_names() {
        let strtab = StringTable::default();
        let buf = encode_to_vec("/", 0);
        assert_eq!(
            decode_at(&buf, 0, &strtab).unwrap().name,
            HeaderName::SymbolTable
        );
        let buf = encode_to_vec("//", 0);
        assert_eq!(
            decode_at(&buf, 0, &strtab).unwrap().name,
            HeaderName::StringTable
        );
    }
}

// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The unit symbol extractor seam.
//!
//! The engine does not understand the payload format carried by a member;
//! a [`SymbolReader`] is handed the raw payload bytes and reports the
//! externally visible symbol names. The default implementation parses
//! native object files with the `object` crate; callers linking other
//! unit formats (e.g. bitcode) substitute their own.

use std::io;

use object::{Object, ObjectSymbol};

pub type GetSymbolsFn =
    fn(buf: &[u8], f: &mut dyn FnMut(&[u8]) -> io::Result<()>) -> io::Result<bool>;

/// Helper struct to query symbol information from member payloads.
pub struct SymbolReader {
    /// Iterates over the externally visible symbols of one payload,
    /// returning `Ok(false)` when the payload format is not recognized.
    pub get_symbols: GetSymbolsFn,
}

/// Default implementation of [`SymbolReader`] that uses the `object` crate.
pub const DEFAULT_SYMBOL_READER: SymbolReader = SymbolReader {
    get_symbols: get_native_object_symbols,
};

fn is_archive_symbol(sym: &object::read::Symbol<'_, '_>) -> bool {
    if sym.kind() == object::SymbolKind::File || sym.kind() == object::SymbolKind::Section {
        return false;
    }
    if !sym.is_global() {
        return false;
    }
    if sym.is_undefined() {
        return false;
    }
    true
}

pub fn get_native_object_symbols(
    buf: &[u8],
    f: &mut dyn FnMut(&[u8]) -> io::Result<()>,
) -> io::Result<bool> {
    match object::File::parse(buf) {
        Ok(file) => {
            for sym in file.symbols() {
                if !is_archive_symbol(&sym) {
                    continue;
                }
                let name = sym
                    .name_bytes()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                f(name)?;
            }
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

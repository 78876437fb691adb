#![allow(clippy::too_many_arguments)]
// We are writing a very specific, well defined format, so it makes it easier to
// see exactly what is being written if we explicitly write out `\n` instead of
// hoping somebody notices the `writeln!` instead of `write!`.
#![allow(clippy::write_with_newline)]

//! Reading, editing and rewriting of Unix `ar` archives.
//!
//! An [`Archive`] is loaded from (or created empty for) one disk file,
//! edited through its ordered [`MemberList`], and persisted with
//! [`Archive::write_to_disk`], which rewrites the whole file image
//! atomically. Symbol extraction from member payloads is delegated to a
//! [`SymbolReader`]; the default understands native object files.

mod archive;
mod compress;
mod error;
mod header;
mod member;
mod member_list;
mod mmap;
mod string_table;
mod symbol_reader;
mod symbol_table;
mod writer;

pub use archive::Archive;
pub use error::{Error, Result};
pub use header::SIGNATURE;
pub use member::ArchiveMember;
pub use member_list::{MemberId, MemberList};
pub use symbol_reader::{
    get_native_object_symbols, GetSymbolsFn, SymbolReader, DEFAULT_SYMBOL_READER,
};
pub use symbol_table::SymbolMap;
pub use writer::WriteOptions;

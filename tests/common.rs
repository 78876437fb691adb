#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use object::write::{self, Object};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

/// Creates the temporary directory for a test.
pub fn create_tmp_dir(test_name: &str) -> PathBuf {
    let tmpdir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(test_name);
    match fs::remove_dir_all(&tmpdir) {
        Ok(_) => {}
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                panic!("Failed to delete directory: {:?}", tmpdir);
            }
        }
    }
    fs::create_dir_all(&tmpdir).unwrap();
    tmpdir
}

/// Builds an ELF x86-64 relocatable object exporting the given functions.
pub fn build_object_with_functions(file_name: &[u8], func_names: &[&[u8]]) -> Vec<u8> {
    let mut object = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

    object.add_file_symbol(file_name.to_vec());

    let text = object.section_id(write::StandardSection::Text);
    object.append_section_data(text, &[1; 30], 4);

    for func_name in func_names {
        let offset = object.append_section_data(text, &[1; 30], 4);

        object.add_symbol(write::Symbol {
            name: func_name.to_vec(),
            value: offset,
            size: 32,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: write::SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }

    object.write().unwrap()
}

/// Writes `bytes` as an input file for `add_file_before`.
pub fn write_input_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// The first bytes of an LLVM bitcode unit; members starting with them
/// are flagged as bitcode.
pub const BITCODE_MAGIC: &[u8; 4] = b"BC\xc0\xde";

//! Writers for small, valid PE images used by tests across the workspace.
//!
//! The generated files contain one `.idata` section holding the import
//! directory, thunk arrays, hint/name entries and library names. There is
//! no code; the images only need to satisfy [`crate::Image`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::pe::{Machine, PeFormat};

const PE_OFFSET: usize = 0x40;
const FILE_ALIGNMENT: usize = 0x200;
const SECTION_RVA: u32 = 0x1000;
const DIRECTORY_COUNT: usize = 16;

#[derive(Debug, Clone)]
enum FixtureSymbol {
    Name(String),
    Ordinal(u16),
    Raw(u64),
}

#[derive(Debug, Clone)]
struct FixtureImport {
    library: String,
    symbols: Vec<FixtureSymbol>,
}

#[derive(Debug, Clone)]
pub struct FixtureImage {
    machine: Machine,
    format: PeFormat,
    imports: Vec<FixtureImport>,
}

impl FixtureImage {
    /// Starts an image for `machine`; 32-bit machines get a PE32 header, the rest PE32+.
    pub fn new(machine: Machine) -> Self {
        let format = match machine {
            Machine::I386 | Machine::Arm => PeFormat::Pe32,
            _ => PeFormat::Pe32Plus,
        };
        FixtureImage {
            machine,
            format,
            imports: Vec::new(),
        }
    }

    pub fn format(mut self, format: PeFormat) -> Self {
        self.format = format;
        self
    }

    pub fn import(self, library: &str) -> Self {
        self.import_symbols(library, &[])
    }

    pub fn import_symbols(mut self, library: &str, symbols: &[&str]) -> Self {
        self.imports.push(FixtureImport {
            library: library.to_string(),
            symbols: symbols
                .iter()
                .map(|name| FixtureSymbol::Name(name.to_string()))
                .collect(),
        });
        self
    }

    pub fn import_ordinal(mut self, library: &str, ordinal: u16) -> Self {
        self.imports.push(FixtureImport {
            library: library.to_string(),
            symbols: vec![FixtureSymbol::Ordinal(ordinal)],
        });
        self
    }

    /// Imports `library` through a single thunk holding `value` verbatim,
    /// e.g. a hint/name RVA that points nowhere.
    pub fn import_raw_thunk(mut self, library: &str, value: u64) -> Self {
        self.imports.push(FixtureImport {
            library: library.to_string(),
            symbols: vec![FixtureSymbol::Raw(value)],
        });
        self
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, self.to_bytes()).with_context(|| format!("writing {}", path.display()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (optional_size, rva_count_offset, directories_offset, magic) = match self.format {
            PeFormat::Pe32 => (96 + DIRECTORY_COUNT * 8, 92, 96, 0x10bu16),
            PeFormat::Pe32Plus => (112 + DIRECTORY_COUNT * 8, 108, 112, 0x20bu16),
        };

        let section = self.build_import_section();
        let raw_size = section.len().div_ceil(FILE_ALIGNMENT) * FILE_ALIGNMENT;

        let mut out = vec![0u8; FILE_ALIGNMENT + raw_size];
        out[0..2].copy_from_slice(b"MZ");
        LittleEndian::write_u32(&mut out[0x3C..0x40], PE_OFFSET as u32);
        out[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_OFFSET + 4;
        LittleEndian::write_u16(&mut out[coff..], self.machine.raw());
        LittleEndian::write_u16(&mut out[coff + 2..], 1);
        LittleEndian::write_u16(&mut out[coff + 16..], optional_size as u16);
        LittleEndian::write_u16(&mut out[coff + 18..], 0x0002);

        let optional = coff + 20;
        LittleEndian::write_u16(&mut out[optional..], magic);
        LittleEndian::write_u32(
            &mut out[optional + rva_count_offset..],
            DIRECTORY_COUNT as u32,
        );
        if !self.imports.is_empty() {
            let import_entry = optional + directories_offset + 8;
            LittleEndian::write_u32(&mut out[import_entry..], SECTION_RVA);
            LittleEndian::write_u32(
                &mut out[import_entry + 4..],
                ((self.imports.len() + 1) * 20) as u32,
            );
        }

        let header = optional + optional_size;
        out[header..header + 6].copy_from_slice(b".idata");
        LittleEndian::write_u32(&mut out[header + 8..], section.len() as u32);
        LittleEndian::write_u32(&mut out[header + 12..], SECTION_RVA);
        LittleEndian::write_u32(&mut out[header + 16..], raw_size as u32);
        LittleEndian::write_u32(&mut out[header + 20..], FILE_ALIGNMENT as u32);

        out[FILE_ALIGNMENT..FILE_ALIGNMENT + section.len()].copy_from_slice(&section);
        out
    }

    fn build_import_section(&self) -> Vec<u8> {
        let width = self.format.thunk_width();
        let descriptors_len = (self.imports.len() + 1) * 20;
        let mut section = vec![0u8; descriptors_len];
        let rva_of = |section: &Vec<u8>| SECTION_RVA + section.len() as u32;

        for (index, import) in self.imports.iter().enumerate() {
            let mut thunk_values = Vec::with_capacity(import.symbols.len());
            for (hint, symbol) in import.symbols.iter().enumerate() {
                match symbol {
                    FixtureSymbol::Name(name) => {
                        align_even(&mut section);
                        thunk_values.push(u64::from(rva_of(&section)));
                        section.extend_from_slice(&(hint as u16).to_le_bytes());
                        section.extend_from_slice(name.as_bytes());
                        section.push(0);
                    }
                    FixtureSymbol::Ordinal(ordinal) => {
                        let flag = match self.format {
                            PeFormat::Pe32 => 1u64 << 31,
                            PeFormat::Pe32Plus => 1u64 << 63,
                        };
                        thunk_values.push(flag | u64::from(*ordinal));
                    }
                    FixtureSymbol::Raw(value) => thunk_values.push(*value),
                }
            }

            while section.len() % width != 0 {
                section.push(0);
            }
            let thunk_rva = if thunk_values.is_empty() {
                0
            } else {
                rva_of(&section)
            };
            for value in thunk_values.iter().chain(std::iter::once(&0)) {
                match self.format {
                    PeFormat::Pe32 => section.extend_from_slice(&(*value as u32).to_le_bytes()),
                    PeFormat::Pe32Plus => section.extend_from_slice(&value.to_le_bytes()),
                }
            }

            let name_rva = rva_of(&section);
            section.extend_from_slice(import.library.as_bytes());
            section.push(0);

            let descriptor = index * 20;
            LittleEndian::write_u32(&mut section[descriptor..], thunk_rva);
            LittleEndian::write_u32(&mut section[descriptor + 12..], name_rva);
            LittleEndian::write_u32(&mut section[descriptor + 16..], thunk_rva);
        }

        section
    }
}

fn align_even(section: &mut Vec<u8>) {
    if section.len() % 2 != 0 {
        section.push(0);
    }
}

/// Shorthand for the common case: an image importing `libraries` by name only.
pub fn write_image<P: AsRef<Path>>(path: P, machine: Machine, libraries: &[&str]) -> Result<()> {
    libraries
        .iter()
        .fold(FixtureImage::new(machine), |image, library| image.import(library))
        .write_to(path)
}

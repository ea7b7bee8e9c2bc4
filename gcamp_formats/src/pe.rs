use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use memmap2::MmapOptions;
use serde::Serialize;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const DOS_HEADER_SIZE: usize = 0x40;
const LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const DATA_DIRECTORY_SIZE: usize = 8;
const IMPORT_DESCRIPTOR_SIZE: usize = 20;
const IMPORT_DIRECTORY_INDEX: usize = 1;

const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;

// Upper bounds so a corrupt table cannot send the walkers off into the weeds.
const MAX_IMPORT_DESCRIPTORS: usize = 4096;
const MAX_THUNKS: usize = 1 << 16;
const MAX_NAME_LEN: usize = 4096;

/// Target architecture from the COFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Machine {
    I386,
    Amd64,
    Arm,
    Arm64,
    Other(u16),
}

impl Machine {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            0x014c => Machine::I386,
            0x8664 => Machine::Amd64,
            0x01c4 => Machine::Arm,
            0xaa64 => Machine::Arm64,
            other => Machine::Other(other),
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            Machine::I386 => 0x014c,
            Machine::Amd64 => 0x8664,
            Machine::Arm => 0x01c4,
            Machine::Arm64 => 0xaa64,
            Machine::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Machine::I386 => f.write_str("x86"),
            Machine::Amd64 => f.write_str("x64"),
            Machine::Arm => f.write_str("arm"),
            Machine::Arm64 => f.write_str("arm64"),
            Machine::Other(raw) => write!(f, "machine {raw:#06x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeFormat {
    Pe32,
    Pe32Plus,
}

impl PeFormat {
    pub const fn thunk_width(self) -> usize {
        match self {
            PeFormat::Pe32 => 4,
            PeFormat::Pe32Plus => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportSymbol {
    ByName { hint: u16, name: String },
    ByOrdinal { ordinal: u16 },
}

impl fmt::Display for ImportSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSymbol::ByName { name, .. } => f.write_str(name),
            ImportSymbol::ByOrdinal { ordinal } => write!(f, "#{ordinal}"),
        }
    }
}

/// One import descriptor: a library name plus the symbols pulled from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedLibrary {
    pub name: String,
    pub symbols: Vec<ImportSymbol>,
}

/// A parsed executable or DLL. Only the parts needed to follow load-time
/// dependencies are kept.
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    path: Option<PathBuf>,
    machine: Machine,
    format: PeFormat,
    imports: Vec<ImportedLibrary>,
}

impl Image {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening PE image at {}", path_buf.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("reading metadata for {}", path_buf.display()))?
            .len();
        ensure!(
            len >= DOS_HEADER_SIZE as u64,
            "{} is too small to be a PE image ({len} bytes)",
            path_buf.display()
        );

        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping PE image {}", path_buf.display()))?;

        let mut image = parse_image(&mmap)
            .with_context(|| format!("parsing PE image {}", path_buf.display()))?;
        image.path = Some(path_buf);
        Ok(image)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        parse_image(bytes)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn machine(&self) -> Machine {
        self.machine
    }

    pub fn format(&self) -> PeFormat {
        self.format
    }

    pub fn imports(&self) -> &[ImportedLibrary] {
        &self.imports
    }

    pub fn imported_names(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|library| library.name.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

impl Section {
    fn contains(&self, rva: u32) -> bool {
        let span = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && rva - self.virtual_address < span
    }
}

struct Layout<'a> {
    data: &'a [u8],
    sections: Vec<Section>,
    format: PeFormat,
}

impl Layout<'_> {
    fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        if let Some(section) = self.sections.iter().find(|section| section.contains(rva)) {
            let offset = (rva - section.virtual_address) as usize + section.raw_offset as usize;
            ensure!(
                offset < self.data.len(),
                "RVA {rva:#x} maps past the end of the file"
            );
            return Ok(offset);
        }

        // Anything below the first section lives in the headers, which are mapped 1:1.
        if self
            .sections
            .iter()
            .all(|section| rva < section.virtual_address)
            && (rva as usize) < self.data.len()
        {
            return Ok(rva as usize);
        }

        bail!("RVA {rva:#x} is not inside any section")
    }
}

fn parse_image(data: &[u8]) -> Result<Image> {
    ensure!(
        data.len() >= DOS_HEADER_SIZE,
        "image is too small to contain a DOS header"
    );
    ensure!(&data[0..2] == DOS_MAGIC, "image missing MZ signature");

    let pe_offset = read_u32(data, LFANEW_OFFSET)? as usize;
    let signature = slice_at(data, pe_offset, PE_SIGNATURE.len()).context("reading PE signature")?;
    ensure!(
        signature == PE_SIGNATURE,
        "image missing PE signature at {pe_offset:#x}"
    );

    let coff = pe_offset + PE_SIGNATURE.len();
    let machine = Machine::from_raw(read_u16(data, coff)?);
    let section_count = read_u16(data, coff + 2)? as usize;
    let optional_size = read_u16(data, coff + 16)? as usize;

    let optional = coff + COFF_HEADER_SIZE;
    let (format, rva_count_offset, directories_offset) = match read_u16(data, optional)
        .context("reading optional header magic")?
    {
        PE32_MAGIC => (PeFormat::Pe32, 92, 96),
        PE32_PLUS_MAGIC => (PeFormat::Pe32Plus, 108, 112),
        other => bail!("unsupported optional header magic {other:#06x}"),
    };
    ensure!(
        optional_size >= directories_offset,
        "optional header too small ({optional_size} bytes)"
    );

    let sections = parse_sections(data, optional + optional_size, section_count)?;
    let layout = Layout {
        data,
        sections,
        format,
    };

    let directory_count = read_u32(data, optional + rva_count_offset)? as usize;
    let directory_slots = (optional_size - directories_offset) / DATA_DIRECTORY_SIZE;
    let import_rva = if directory_count.min(directory_slots) > IMPORT_DIRECTORY_INDEX {
        let entry = optional + directories_offset + IMPORT_DIRECTORY_INDEX * DATA_DIRECTORY_SIZE;
        read_u32(data, entry)?
    } else {
        0
    };

    let imports = if import_rva == 0 {
        Vec::new()
    } else {
        parse_imports(&layout, import_rva)?
    };

    Ok(Image {
        path: None,
        machine,
        format,
        imports,
    })
}

fn parse_sections(data: &[u8], table_offset: usize, count: usize) -> Result<Vec<Section>> {
    let table_len = count
        .checked_mul(SECTION_HEADER_SIZE)
        .ok_or_else(|| anyhow!("section count overflow"))?;
    let table = slice_at(data, table_offset, table_len).context("reading section table")?;

    Ok(table
        .chunks_exact(SECTION_HEADER_SIZE)
        .map(|header| Section {
            virtual_size: LittleEndian::read_u32(&header[8..12]),
            virtual_address: LittleEndian::read_u32(&header[12..16]),
            raw_size: LittleEndian::read_u32(&header[16..20]),
            raw_offset: LittleEndian::read_u32(&header[20..24]),
        })
        .collect())
}

fn parse_imports(layout: &Layout<'_>, directory_rva: u32) -> Result<Vec<ImportedLibrary>> {
    let mut offset = layout
        .rva_to_offset(directory_rva)
        .context("locating import directory")?;
    let mut libraries = Vec::new();

    for index in 0..MAX_IMPORT_DESCRIPTORS {
        let descriptor = slice_at(layout.data, offset, IMPORT_DESCRIPTOR_SIZE)
            .with_context(|| format!("reading import descriptor {index}"))?;
        let original_first_thunk = LittleEndian::read_u32(&descriptor[0..4]);
        let name_rva = LittleEndian::read_u32(&descriptor[12..16]);
        let first_thunk = LittleEndian::read_u32(&descriptor[16..20]);

        // The terminating descriptor is all zeros; a zero name is just as final.
        if name_rva == 0 {
            return Ok(libraries);
        }

        let name_offset = layout
            .rva_to_offset(name_rva)
            .with_context(|| format!("locating name of import descriptor {index}"))?;
        let name = read_c_string(layout.data, name_offset)
            .with_context(|| format!("reading name of import descriptor {index}"))?;

        let thunk_rva = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let symbols = if thunk_rva == 0 {
            Vec::new()
        } else {
            // Only the library name matters for load-time dependencies.
            parse_thunks(layout, thunk_rva).unwrap_or_else(|err| {
                warn!("ignoring symbols imported from {name}: {err:#}");
                Vec::new()
            })
        };

        libraries.push(ImportedLibrary { name, symbols });
        offset += IMPORT_DESCRIPTOR_SIZE;
    }

    bail!("import directory has more than {MAX_IMPORT_DESCRIPTORS} descriptors")
}

fn parse_thunks(layout: &Layout<'_>, thunk_rva: u32) -> Result<Vec<ImportSymbol>> {
    let width = layout.format.thunk_width();
    let mut offset = layout.rva_to_offset(thunk_rva)?;
    let mut symbols = Vec::new();

    for _ in 0..MAX_THUNKS {
        let bytes = slice_at(layout.data, offset, width)?;
        let (value, ordinal_flag) = match layout.format {
            PeFormat::Pe32 => (u64::from(LittleEndian::read_u32(bytes)), 1u64 << 31),
            PeFormat::Pe32Plus => (LittleEndian::read_u64(bytes), 1u64 << 63),
        };
        if value == 0 {
            return Ok(symbols);
        }

        if value & ordinal_flag != 0 {
            symbols.push(ImportSymbol::ByOrdinal {
                ordinal: (value & 0xffff) as u16,
            });
        } else {
            let hint_rva = (value & 0x7fff_ffff) as u32;
            let hint_offset = layout.rva_to_offset(hint_rva)?;
            let hint = read_u16(layout.data, hint_offset)?;
            let name = read_c_string(layout.data, hint_offset + 2)?;
            symbols.push(ImportSymbol::ByName { hint, name });
        }

        offset += width;
    }

    bail!("thunk array longer than {MAX_THUNKS} entries")
}

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| anyhow!("offset {offset:#x} overflows"))?;
    data.get(offset..end)
        .ok_or_else(|| anyhow!("{len} bytes at {offset:#x} extend beyond the image"))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(slice_at(data, offset, 2)?))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(slice_at(data, offset, 4)?))
}

fn read_c_string(data: &[u8], offset: usize) -> Result<String> {
    ensure!(offset < data.len(), "string offset {offset:#x} beyond image");

    let window = &data[offset..data.len().min(offset + MAX_NAME_LEN)];
    let len = window
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| anyhow!("unterminated string at {offset:#x}"))?;
    ensure!(len > 0, "empty string at {offset:#x}");

    Ok(String::from_utf8_lossy(&window[..len]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FixtureImage;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_pe32_imports_in_order() {
        let bytes = FixtureImage::new(Machine::I386)
            .import_symbols("KERNEL32.dll", &["ExitProcess", "GetLastError"])
            .import("libtcod.dll")
            .to_bytes();

        let image = Image::parse(&bytes).unwrap();
        assert_eq!(image.machine(), Machine::I386);
        assert_eq!(image.format(), PeFormat::Pe32);
        assert_eq!(
            image.imported_names().collect::<Vec<_>>(),
            vec!["KERNEL32.dll", "libtcod.dll"]
        );

        let kernel = &image.imports()[0];
        assert_eq!(kernel.symbols.len(), 2);
        assert_eq!(
            kernel.symbols[1],
            ImportSymbol::ByName {
                hint: 1,
                name: "GetLastError".to_string()
            }
        );
    }

    #[test]
    fn parses_pe32_plus_machine_and_ordinals() {
        let bytes = FixtureImage::new(Machine::Amd64)
            .import_ordinal("ws2_32.dll", 23)
            .to_bytes();

        let image = Image::parse(&bytes).unwrap();
        assert_eq!(image.machine(), Machine::Amd64);
        assert_eq!(image.format(), PeFormat::Pe32Plus);
        assert_eq!(
            image.imports()[0].symbols,
            vec![ImportSymbol::ByOrdinal { ordinal: 23 }]
        );
    }

    #[test]
    fn image_without_imports_has_empty_table() {
        let bytes = FixtureImage::new(Machine::Amd64).to_bytes();
        let image = Image::parse(&bytes).unwrap();
        assert!(image.imports().is_empty());
    }

    #[test]
    fn bad_thunk_keeps_the_library_name() {
        let bytes = FixtureImage::new(Machine::I386)
            .import_raw_thunk("zlib1.dll", 0x7fff_0000)
            .import_symbols("KERNEL32.dll", &["ExitProcess"])
            .to_bytes();

        let image = Image::parse(&bytes).unwrap();
        assert_eq!(
            image.imported_names().collect::<Vec<_>>(),
            vec!["zlib1.dll", "KERNEL32.dll"]
        );
        assert!(image.imports()[0].symbols.is_empty());
        assert_eq!(image.imports()[1].symbols.len(), 1);
    }

    #[test]
    fn format_follows_the_optional_header_magic() {
        let bytes = FixtureImage::new(Machine::Amd64)
            .format(PeFormat::Pe32)
            .import_symbols("SDL.dll", &["SDL_Init"])
            .to_bytes();

        let image = Image::parse(&bytes).unwrap();
        assert_eq!(image.machine(), Machine::Amd64);
        assert_eq!(image.format(), PeFormat::Pe32);
        assert_eq!(image.imports()[0].symbols.len(), 1);
    }

    #[test]
    fn rejects_missing_signatures() {
        let mut bytes = FixtureImage::new(Machine::I386).import("a.dll").to_bytes();
        bytes[0] = b'X';
        assert!(Image::parse(&bytes).is_err());

        let mut bytes = FixtureImage::new(Machine::I386).import("a.dll").to_bytes();
        let pe_offset = LittleEndian::read_u32(&bytes[LFANEW_OFFSET..]) as usize;
        bytes[pe_offset] = b'X';
        let err = Image::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("PE signature"), "{err}");
    }

    #[test]
    fn rejects_truncated_import_table() {
        let bytes = FixtureImage::new(Machine::I386).import("a.dll").to_bytes();
        // Cut into the import section, past the headers.
        let truncated = &bytes[..0x200 + 8];
        assert!(Image::parse(truncated).is_err());
    }

    #[test]
    fn open_records_path_and_rejects_tiny_files() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&FixtureImage::new(Machine::I386).import("zlib1.dll").to_bytes())
            .unwrap();
        let image = Image::open(file.path()).unwrap();
        assert_eq!(image.path(), Some(file.path()));

        let mut tiny = NamedTempFile::new().unwrap();
        tiny.write_all(b"MZ").unwrap();
        let err = Image::open(tiny.path()).unwrap_err();
        assert!(err.to_string().contains("too small"), "{err}");
    }

    #[test]
    fn machine_round_trips_raw_values() {
        assert_eq!(Machine::from_raw(0x014c), Machine::I386);
        assert_eq!(Machine::from_raw(0x1234), Machine::Other(0x1234));
        assert_eq!(Machine::Other(0x1234).raw(), 0x1234);
        assert_eq!(Machine::Amd64.to_string(), "x64");
    }
}

//! Loads a statically-linked RV64 Linux ELF and exposes its executable
//! segments, entry point and (optional) symbol table to the rest of the
//! pipeline (§4.1).
//!
//! Parsing is delegated to the `object` crate's generic reader rather than
//! hand-rolling ELF header parsing; `rv2wasm-elf` only adds the RV64-specific
//! validation and the narrower view (code segments, symbols) the CFG builder
//! needs.

use object::{Object, ObjectSegment, ObjectSymbol, SegmentFlags};

/// One loadable ELF segment, with an owned copy of its file contents.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Virtual base address the segment is loaded at.
    pub vaddr: u64,
    /// Offset of the segment within the original file.
    pub file_offset: u64,
    /// Segment contents, copied out of the input buffer.
    pub data: Vec<u8>,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.vaddr + self.data.len() as u64
    }
}

/// A symbol-table entry naming a code or data address.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

/// The parsed view of an RV64 ELF: entry point, segments and symbols.
#[derive(Debug, Clone)]
pub struct ElfImage {
    pub entry: u64,
    segments: Vec<Segment>,
    pub symbols: Vec<Symbol>,
}

impl ElfImage {
    /// Executable segments, ascending by virtual base address.
    pub fn segments_for_code(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.executable)
    }

    /// All loadable segments regardless of permission, ascending by vaddr.
    /// Used by the translator to validate load/store targets at debug level.
    pub fn all_segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Looks up the symbol, if any, whose address exactly matches `addr`.
    /// Used by the CFG builder to seed leader addresses from declared
    /// function entry points (§4.3).
    pub fn symbol_at(&self, addr: u64) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.address == addr)
    }
}

/// Failure modes for [`parse`], each reported once with the offending field
/// (§4.1, §7).
#[derive(thiserror::Error, Debug)]
pub enum ElfError {
    #[error("input is not a valid ELF object: {0}")]
    NotElf(#[source] object::read::Error),
    #[error("unsupported ELF class/endianness: rv2wasm requires 64-bit little-endian")]
    WrongClass,
    #[error("unsupported machine: expected RISC-V (EM_RISCV), found {0:?}")]
    WrongMachine(object::Architecture),
    #[error("ELF contains no executable (PF_X) segment")]
    NoExecutableSegment,
    #[error(
        "segment at vaddr {vaddr:#x} has file range [{offset:#x}, {end:#x}) outside the {buffer_len}-byte input buffer"
    )]
    SegmentOutOfRange {
        vaddr: u64,
        offset: u64,
        end: u64,
        buffer_len: usize,
    },
}

/// Parses `bytes` as an RV64 ELF, returning its entry point, executable
/// segments (ascending virtual-base order) and symbol table when present.
pub fn parse(bytes: &[u8]) -> Result<ElfImage, ElfError> {
    let file = object::File::parse(bytes).map_err(ElfError::NotElf)?;

    if file.architecture() != object::Architecture::Riscv64 {
        return Err(ElfError::WrongMachine(file.architecture()));
    }
    if file.endianness() != object::Endianness::Little || !file.is_64() {
        return Err(ElfError::WrongClass);
    }

    let mut segments = Vec::new();
    for seg in file.segments() {
        let (offset, len) = seg.file_range();
        let data = seg.data().map_err(|_| ElfError::SegmentOutOfRange {
            vaddr: seg.address(),
            offset,
            end: offset + len,
            buffer_len: bytes.len(),
        })?;
        let (readable, writable, executable) = match seg.flags() {
            SegmentFlags::Elf { p_flags } => (
                p_flags & object::elf::PF_R != 0,
                p_flags & object::elf::PF_W != 0,
                p_flags & object::elf::PF_X != 0,
            ),
            _ => (true, false, false),
        };
        segments.push(Segment {
            vaddr: seg.address(),
            file_offset: offset,
            data: data.to_vec(),
            readable,
            writable,
            executable,
        });
    }
    segments.sort_by_key(|s| s.vaddr);

    if !segments.iter().any(|s| s.executable) {
        return Err(ElfError::NoExecutableSegment);
    }

    let mut symbols = Vec::new();
    for sym in file.symbols() {
        if sym.address() == 0 {
            continue;
        }
        if let Ok(name) = sym.name() {
            if !name.is_empty() {
                symbols.push(Symbol {
                    name: name.to_string(),
                    address: sym.address(),
                    size: sym.size(),
                });
            }
        }
    }

    log::debug!(
        "parsed ELF: entry={:#x} segments={} executable_segments={} symbols={}",
        file.entry(),
        segments.len(),
        segments.iter().filter(|s| s.executable).count(),
        symbols.len()
    );

    Ok(ElfImage {
        entry: file.entry(),
        segments,
        symbols,
    })
}

/// Constructs `ElfImage` values without a real ELF file, for other crates'
/// tests that only need a decodable executable segment.
#[cfg(feature = "test-support")]
pub mod test_support {
    use super::{ElfImage, Segment};

    /// A single all-executable segment holding `data` at `vaddr`, with no
    /// symbols and entry point equal to `vaddr`.
    pub fn image_with_code(data: Vec<u8>, vaddr: u64) -> ElfImage {
        ElfImage {
            entry: vaddr,
            segments: vec![Segment {
                vaddr,
                file_offset: 0,
                data,
                readable: true,
                writable: false,
                executable: true,
            }],
            symbols: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf_bytes() {
        let err = parse(b"not an elf").unwrap_err();
        assert!(matches!(err, ElfError::NotElf(_)));
    }

    #[test]
    fn rejects_truncated_input() {
        let err = parse(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, ElfError::NotElf(_)));
    }
}

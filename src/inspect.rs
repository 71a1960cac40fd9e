//! # Object Inspection
//!
//! Describes an object's identification, header, sections and symbols
//! without loading any code. Rendered as a text table or as JSON.

use serde::Serialize;
use std::fmt;

use crate::elf::{self, names};
use crate::image::ObjectImage;
use crate::structure::{ElfHeader, Structure};
use crate::symbols::SymbolTable;
use crate::{Error, Result};

/// Decoded ELF header fields with symbolic names
#[derive(Debug, Clone, Serialize)]
pub struct HeaderReport {
    pub class: &'static str,
    pub data: &'static str,
    pub version: u8,
    pub osabi: &'static str,
    pub file_type: &'static str,
    pub machine: &'static str,
    pub machine_code: u16,
    pub entry: u64,
    pub flags: u32,
    pub program_header_offset: u64,
    pub program_header_count: u16,
    pub section_header_offset: u64,
    pub section_count: u16,
    pub section_name_index: u16,
}

/// One row of the program header table
#[derive(Debug, Clone, Serialize)]
pub struct ProgramReport {
    pub index: usize,
    pub kind: &'static str,
    pub flags: String,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

/// One row of the section table
#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub index: usize,
    pub name: String,
    pub kind: &'static str,
    pub flags: String,
    pub offset: u64,
    pub size: u64,
    pub entsize: u64,
}

/// One row of the symbol table
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub binding: String,
    pub section: u16,
    pub value: u64,
    pub size: u64,
}

/// Full description of one object
#[derive(Debug, Clone, Serialize)]
pub struct ObjectReport {
    pub header: HeaderReport,
    /// Usually empty for relocatable objects
    pub programs: Vec<ProgramReport>,
    pub sections: Vec<SectionReport>,
    /// Absent when the object has no `.symtab`
    pub symbols: Option<Vec<SymbolReport>>,
}

impl ObjectReport {
    /// Build a report; fails only on structural errors
    pub fn build(image: &ObjectImage, structure: &Structure) -> Result<Self> {
        let h = structure.header();
        let header = HeaderReport {
            class: names::class(h.ident[elf::EI_CLASS]),
            data: names::data(h.ident[elf::EI_DATA]),
            version: h.ident[elf::EI_VERSION],
            osabi: names::osabi(h.osabi()),
            file_type: names::file_type(h.e_type),
            machine: names::machine(h.e_machine),
            machine_code: h.e_machine,
            entry: h.e_entry,
            flags: h.e_flags,
            program_header_offset: h.e_phoff,
            program_header_count: h.e_phnum,
            section_header_offset: h.e_shoff,
            section_count: h.e_shnum,
            section_name_index: h.e_shstrndx,
        };

        let programs = program_rows(image, h)?;

        let sections = structure
            .sections()
            .iter()
            .enumerate()
            .map(|(index, s)| SectionReport {
                index,
                name: structure
                    .section_name(index)
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .unwrap_or_else(|_| format!("<bad name {:#x}>", s.sh_name)),
                kind: names::section_type(s.sh_type),
                flags: names::section_flags(s.sh_flags),
                offset: s.sh_offset,
                size: s.sh_size,
                entsize: s.sh_entsize,
            })
            .collect();

        let symbols = match SymbolTable::parse(image, structure) {
            Ok(table) => Some(
                table
                    .symbols()
                    .iter()
                    .map(|s| SymbolReport {
                        index: s.index,
                        name: s.name_lossy(),
                        kind: s.kind().to_string(),
                        binding: s.binding().to_string(),
                        section: s.shndx,
                        value: s.value,
                        size: s.size,
                    })
                    .collect(),
            ),
            Err(Error::MissingSection { .. }) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            header,
            programs,
            sections,
            symbols,
        })
    }

    /// Parse and describe the object at `path`
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let image = ObjectImage::load(path)?;
        let structure = Structure::parse(&image)?;
        Self::build(&image, &structure)
    }
}

fn program_rows(image: &ObjectImage, h: &ElfHeader) -> Result<Vec<ProgramReport>> {
    if h.e_phnum == 0 {
        return Ok(Vec::new());
    }
    if h.e_phentsize as usize != elf::PHDR_SIZE {
        return Err(Error::malformed(format!(
            "program header entry size {} (expected {})",
            h.e_phentsize,
            elf::PHDR_SIZE
        )));
    }
    let table = image.range(
        h.e_phoff,
        h.e_phnum as u64 * elf::PHDR_SIZE as u64,
        "program header table",
    )?;

    Ok(table
        .chunks_exact(elf::PHDR_SIZE)
        .enumerate()
        .map(|(index, rec)| ProgramReport {
            index,
            kind: names::program_type(elf::u32_at(rec, 0)),
            flags: names::program_flags(elf::u32_at(rec, 4)),
            offset: elf::u64_at(rec, 8),
            vaddr: elf::u64_at(rec, 16),
            filesz: elf::u64_at(rec, 32),
            memsz: elf::u64_at(rec, 40),
            align: elf::u64_at(rec, 48),
        })
        .collect())
}

impl fmt::Display for ObjectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(f, "ELF Header:")?;
        writeln!(f, "  Class:        {}", h.class)?;
        writeln!(f, "  Data:         {}", h.data)?;
        writeln!(f, "  Version:      {}", h.version)?;
        writeln!(f, "  OS/ABI:       {}", h.osabi)?;
        writeln!(f, "  Type:         {}", h.file_type)?;
        writeln!(f, "  Machine:      {} ({})", h.machine, h.machine_code)?;
        writeln!(f, "  Entry:        {:#x}", h.entry)?;
        writeln!(f, "  Flags:        {:#x}", h.flags)?;
        writeln!(
            f,
            "  Programs:     {} at {:#x}",
            h.program_header_count, h.program_header_offset
        )?;
        writeln!(f, "  Sections:     {} at {:#x}", h.section_count, h.section_header_offset)?;
        writeln!(f, "  Names index:  {}", h.section_name_index)?;

        if !self.programs.is_empty() {
            writeln!(f)?;
            writeln!(f, "Program Headers:")?;
            writeln!(
                f,
                "  {:>3} {:<12} {:<5} {:>10} {:>18} {:>10} {:>10} {:>8}",
                "Nr", "Type", "Flags", "Offset", "VirtAddr", "FileSiz", "MemSiz", "Align"
            )?;
            for p in &self.programs {
                writeln!(
                    f,
                    "  {:>3} {:<12} {:<5} {:>#10x} {:>#18x} {:>#10x} {:>#10x} {:>#8x}",
                    p.index, p.kind, p.flags, p.offset, p.vaddr, p.filesz, p.memsz, p.align
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Section Headers:")?;
        writeln!(
            f,
            "  {:>3} {:<20} {:<12} {:<5} {:>10} {:>10} {:>6}",
            "Nr", "Name", "Type", "Flags", "Offset", "Size", "EntSz"
        )?;
        for s in &self.sections {
            writeln!(
                f,
                "  {:>3} {:<20} {:<12} {:<5} {:>#10x} {:>#10x} {:>6}",
                s.index, s.name, s.kind, s.flags, s.offset, s.size, s.entsize
            )?;
        }

        if let Some(symbols) = &self.symbols {
            writeln!(f)?;
            writeln!(f, "Symbol table '.symtab' ({} entries):", symbols.len())?;
            writeln!(
                f,
                "  {:>3} {:>10} {:>6} {:<8} {:<7} {:>5} Name",
                "Num", "Value", "Size", "Type", "Bind", "Ndx"
            )?;
            for s in symbols {
                writeln!(
                    f,
                    "  {:>3} {:>#10x} {:>6} {:<8} {:<7} {:>5} {}",
                    s.index, s.value, s.size, s.kind, s.binding, s.section, s.name
                )?;
            }
        }
        Ok(())
    }
}

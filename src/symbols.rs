//! # Symbol Resolver
//!
//! Reads `.symtab` records and their names from `.strtab`, and resolves
//! function names to section-relative offsets.

use std::fmt;

use crate::elf;
use crate::image::ObjectImage;
use crate::structure::Structure;
use crate::{Error, Result};

/// Symbol type (low nibble of `st_info`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    NoType,
    Object,
    Function,
    Section,
    File,
    Other(u8),
}

impl From<u8> for SymbolType {
    fn from(info: u8) -> Self {
        match info & 0x0f {
            elf::STT_NOTYPE => SymbolType::NoType,
            elf::STT_OBJECT => SymbolType::Object,
            elf::STT_FUNC => SymbolType::Function,
            elf::STT_SECTION => SymbolType::Section,
            elf::STT_FILE => SymbolType::File,
            other => SymbolType::Other(other),
        }
    }
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolType::NoType => write!(f, "NOTYPE"),
            SymbolType::Object => write!(f, "OBJECT"),
            SymbolType::Function => write!(f, "FUNC"),
            SymbolType::Section => write!(f, "SECTION"),
            SymbolType::File => write!(f, "FILE"),
            SymbolType::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Symbol binding (high nibble of `st_info`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
    Other(u8),
}

impl From<u8> for SymbolBinding {
    fn from(info: u8) -> Self {
        match info >> 4 {
            elf::STB_LOCAL => SymbolBinding::Local,
            elf::STB_GLOBAL => SymbolBinding::Global,
            elf::STB_WEAK => SymbolBinding::Weak,
            other => SymbolBinding::Other(other),
        }
    }
}

impl fmt::Display for SymbolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBinding::Local => write!(f, "LOCAL"),
            SymbolBinding::Global => write!(f, "GLOBAL"),
            SymbolBinding::Weak => write!(f, "WEAK"),
            SymbolBinding::Other(v) => write!(f, "{}", v),
        }
    }
}

/// One symbol record with its name resolved against `.strtab`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'a> {
    /// Position in the symbol table
    pub index: usize,
    /// Name bytes (without the NUL terminator)
    pub name: &'a [u8],
    pub info: u8,
    pub other: u8,
    /// Index of the section the symbol is defined in
    pub shndx: u16,
    /// Offset from the start of the owning section
    pub value: u64,
    pub size: u64,
}

impl Symbol<'_> {
    pub fn kind(&self) -> SymbolType {
        SymbolType::from(self.info)
    }

    pub fn binding(&self) -> SymbolBinding {
        SymbolBinding::from(self.info)
    }

    /// Name as text, with invalid UTF-8 replaced
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name).into_owned()
    }
}

/// A function symbol found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: String,
    /// Position in the symbol table
    pub index: usize,
    /// Offset of the function from the start of its section
    pub value: u64,
    pub size: u64,
    pub shndx: u16,
    pub binding: SymbolBinding,
}

impl From<&Symbol<'_>> for ResolvedSymbol {
    fn from(sym: &Symbol<'_>) -> Self {
        Self {
            name: sym.name_lossy(),
            index: sym.index,
            value: sym.value,
            size: sym.size,
            shndx: sym.shndx,
            binding: sym.binding(),
        }
    }
}

/// Symbol records of one image, borrowing names from its `.strtab`
#[derive(Debug, Clone)]
pub struct SymbolTable<'a> {
    symbols: Vec<Symbol<'a>>,
}

impl<'a> SymbolTable<'a> {
    /// Parse `.symtab` using names from `.strtab`.
    ///
    /// Both sections must exist (`MissingSection`). A section without file
    /// contents (`NOBITS`/`NULL`), a zero or undersized entry size, or a name
    /// offset outside `.strtab`, is `MalformedObject`.
    pub fn parse(image: &'a ObjectImage, structure: &Structure) -> Result<Self> {
        let symtab = structure.require_section(".symtab")?;
        let strtab = structure.require_section(".strtab")?;

        let entsize = symtab.header.sh_entsize;
        if entsize == 0 {
            return Err(Error::malformed(".symtab has zero entry size"));
        }
        if entsize < elf::SYM_SIZE as u64 {
            return Err(Error::malformed(format!(
                ".symtab entry size {} is smaller than a symbol record",
                entsize
            )));
        }

        for (name, section) in [(".symtab", &symtab), (".strtab", &strtab)] {
            if !section.header.has_file_data() {
                return Err(Error::malformed(format!(
                    "{} has no contents in the file (type {})",
                    name,
                    elf::names::section_type(section.header.sh_type)
                )));
            }
        }

        let data = structure.section_data(image, symtab.header)?;
        let names = structure.section_data(image, strtab.header)?;
        let entsize = usize::try_from(entsize)
            .map_err(|_| Error::malformed(format!(".symtab entry size {} is too large", entsize)))?;
        let count = data.len() / entsize;

        let mut symbols = Vec::with_capacity(count);
        for (index, chunk) in data.chunks_exact(entsize).enumerate() {
            let rec = &chunk[..elf::SYM_SIZE];
            let st_name = elf::u32_at(rec, 0);
            let name = if st_name == 0 {
                &names[..0]
            } else {
                elf::c_str_at(names, st_name, "symbol")?
            };
            let sym = Symbol {
                index,
                name,
                info: rec[4],
                other: rec[5],
                shndx: elf::u16_at(rec, 6),
                value: elf::u64_at(rec, 8),
                size: elf::u64_at(rec, 16),
            };
            tracing::trace!(
                index,
                name = %String::from_utf8_lossy(name),
                kind = %sym.kind(),
                value = sym.value,
                "symbol"
            );
            symbols.push(sym);
        }

        tracing::debug!(count, "parsed symbol table");
        Ok(Self { symbols })
    }

    /// Every record, including the null symbol at index 0
    pub fn symbols(&self) -> &[Symbol<'a>] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Function symbols in table order
    pub fn functions(&self) -> impl Iterator<Item = &Symbol<'a>> {
        self.symbols
            .iter()
            .filter(|s| s.kind() == SymbolType::Function)
    }

    /// First function symbol whose name equals `name` exactly
    pub fn resolve_function(&self, name: &str) -> Option<ResolvedSymbol> {
        let wanted = name.as_bytes();
        self.functions()
            .find(|s| s.name == wanted)
            .map(ResolvedSymbol::from)
    }
}

/// Free-function form of [`SymbolTable::parse`]
pub fn parse_symbols<'a>(image: &'a ObjectImage, structure: &Structure) -> Result<SymbolTable<'a>> {
    SymbolTable::parse(image, structure)
}

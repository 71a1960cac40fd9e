//! # Structure Parser
//!
//! Interprets the ELF header and section header table of an [`ObjectImage`].
//! The parsed [`Structure`] owns copies of the fixed-size records, so it does
//! not borrow the image; section contents are re-sliced from the image on
//! demand with bounds checks.

use crate::elf::{self, names};
use crate::image::ObjectImage;
use crate::{Error, Result};

/// Decoded ELF64 file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeader {
    /// `e_ident` bytes
    pub ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Decode and validate the identification and table geometry.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < elf::EHDR_SIZE {
            return Err(Error::malformed(format!(
                "file too small for an ELF header ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[0..4] != elf::ELF_MAGIC {
            return Err(Error::malformed("invalid ELF magic"));
        }
        if bytes[elf::EI_CLASS] != elf::ELFCLASS64 {
            return Err(Error::malformed(format!(
                "not a 64-bit ELF (class {})",
                names::class(bytes[elf::EI_CLASS])
            )));
        }
        if bytes[elf::EI_DATA] != elf::ELFDATA2LSB {
            return Err(Error::malformed(format!(
                "not little-endian (data {})",
                names::data(bytes[elf::EI_DATA])
            )));
        }

        let mut ident = [0u8; 16];
        ident.copy_from_slice(&bytes[0..16]);

        let header = Self {
            ident,
            e_type: elf::u16_at(bytes, 16),
            e_machine: elf::u16_at(bytes, 18),
            e_version: elf::u32_at(bytes, 20),
            e_entry: elf::u64_at(bytes, 24),
            e_phoff: elf::u64_at(bytes, 32),
            e_shoff: elf::u64_at(bytes, 40),
            e_flags: elf::u32_at(bytes, 48),
            e_ehsize: elf::u16_at(bytes, 52),
            e_phentsize: elf::u16_at(bytes, 54),
            e_phnum: elf::u16_at(bytes, 56),
            e_shentsize: elf::u16_at(bytes, 58),
            e_shnum: elf::u16_at(bytes, 60),
            e_shstrndx: elf::u16_at(bytes, 62),
        };

        if header.e_shnum > 0 && header.e_shentsize as usize != elf::SHDR_SIZE {
            return Err(Error::malformed(format!(
                "unexpected section header size {}",
                header.e_shentsize
            )));
        }
        if header.e_shstrndx >= header.e_shnum {
            return Err(Error::malformed(format!(
                "section name table index {} out of range ({} sections)",
                header.e_shstrndx, header.e_shnum
            )));
        }

        Ok(header)
    }

    /// OS/ABI identification byte
    pub fn osabi(&self) -> u8 {
        self.ident[elf::EI_OSABI]
    }
}

/// One section header record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    fn parse(rec: &[u8]) -> Self {
        Self {
            sh_name: elf::u32_at(rec, 0),
            sh_type: elf::u32_at(rec, 4),
            sh_flags: elf::u64_at(rec, 8),
            sh_addr: elf::u64_at(rec, 16),
            sh_offset: elf::u64_at(rec, 24),
            sh_size: elf::u64_at(rec, 32),
            sh_link: elf::u32_at(rec, 40),
            sh_info: elf::u32_at(rec, 44),
            sh_addralign: elf::u64_at(rec, 48),
            sh_entsize: elf::u64_at(rec, 56),
        }
    }

    /// Whether the section occupies bytes in the file
    pub fn has_file_data(&self) -> bool {
        self.sh_type != elf::SHT_NOBITS && self.sh_type != elf::SHT_NULL
    }
}

/// A section found by name, with its index in the header table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef<'a> {
    /// Index into the section header table (always ≥ 1)
    pub index: usize,
    /// Header record
    pub header: &'a SectionHeader,
}

/// Parsed header plus section table of one image
#[derive(Debug, Clone)]
pub struct Structure {
    header: ElfHeader,
    sections: Vec<SectionHeader>,
    /// Copy of the section-name string table
    shstrtab: Vec<u8>,
}

impl Structure {
    /// Parse the ELF header and every section header.
    ///
    /// Fails with `MalformedObject` if the header table or the section-name
    /// string table falls outside the image.
    pub fn parse(image: &ObjectImage) -> Result<Self> {
        let bytes = image.bytes();
        let header = ElfHeader::parse(bytes)?;

        if header.e_type != elf::ET_REL {
            tracing::warn!(
                e_type = names::file_type(header.e_type),
                "object is not relocatable; loading .text anyway"
            );
        }
        if Some(header.e_machine) != elf::host_machine() {
            tracing::warn!(
                machine = names::machine(header.e_machine),
                "object machine differs from host"
            );
        }

        let table_len = (header.e_shnum as u64)
            .checked_mul(header.e_shentsize as u64)
            .ok_or_else(|| Error::malformed("section header table size overflows"))?;
        let table = image.range(header.e_shoff, table_len, "section header table")?;

        let sections: Vec<SectionHeader> = table
            .chunks_exact(elf::SHDR_SIZE)
            .map(SectionHeader::parse)
            .collect();

        let names_hdr = &sections[header.e_shstrndx as usize];
        let shstrtab = image
            .range(names_hdr.sh_offset, names_hdr.sh_size, "section name string table")?
            .to_vec();

        tracing::debug!(
            sections = sections.len(),
            shstrndx = header.e_shstrndx,
            "parsed section headers"
        );

        Ok(Self {
            header,
            sections,
            shstrtab,
        })
    }

    /// File header
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// All section headers, including the null entry at index 0
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Section header by index
    pub fn section(&self, index: usize) -> Option<&SectionHeader> {
        self.sections.get(index)
    }

    /// Name bytes of the section at `index`
    pub fn section_name(&self, index: usize) -> Result<&[u8]> {
        let section = self
            .sections
            .get(index)
            .ok_or_else(|| Error::malformed(format!("section index {} out of range", index)))?;
        elf::c_str_at(&self.shstrtab, section.sh_name, "section")
    }

    /// First section at index ≥ 1 whose name equals `name` exactly.
    ///
    /// Sections whose name offset is unreadable never match.
    pub fn lookup_section(&self, name: &str) -> Option<SectionRef<'_>> {
        let wanted = name.as_bytes();
        (1..self.sections.len()).find_map(|index| {
            let found = self.section_name(index).ok()?;
            if found == wanted {
                tracing::trace!(index, name, "section found");
                Some(SectionRef {
                    index,
                    header: &self.sections[index],
                })
            } else {
                None
            }
        })
    }

    /// Like [`Structure::lookup_section`], but absence is a `MissingSection` error
    pub fn require_section(&self, name: &'static str) -> Result<SectionRef<'_>> {
        self.lookup_section(name)
            .ok_or(Error::MissingSection { name })
    }

    /// Contents of a section, bounds-checked against the image
    pub fn section_data<'i>(
        &self,
        image: &'i ObjectImage,
        section: &SectionHeader,
    ) -> Result<&'i [u8]> {
        if !section.has_file_data() {
            return Ok(&[]);
        }
        image.range(section.sh_offset, section.sh_size, "section data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ObjectWriter;

    fn sample() -> ObjectImage {
        let mut writer = ObjectWriter::new();
        writer.function("add5", &[0xc3]);
        writer.function("add50", &[0xc3]);
        ObjectImage::from_bytes(writer.finish().unwrap())
    }

    #[test]
    fn test_parse_sample() {
        let image = sample();
        let structure = Structure::parse(&image).unwrap();
        assert_eq!(structure.header().e_type, elf::ET_REL);
        assert_eq!(structure.sections().len(), 5);
        assert_eq!(structure.section_name(0).unwrap(), b"");
    }

    #[test]
    fn test_lookup_every_section_by_its_own_name() {
        let image = sample();
        let structure = Structure::parse(&image).unwrap();
        for index in 1..structure.sections().len() {
            let name = std::str::from_utf8(structure.section_name(index).unwrap()).unwrap();
            let found = structure.lookup_section(name).unwrap();
            assert_eq!(found.index, index);
        }
    }

    #[test]
    fn test_lookup_rejects_prefix_and_suffix() {
        let image = sample();
        let structure = Structure::parse(&image).unwrap();
        assert!(structure.lookup_section(".text").is_some());
        assert!(structure.lookup_section(".tex").is_none());
        assert!(structure.lookup_section(".textx").is_none());
        assert!(structure.lookup_section("text").is_none());
        assert!(structure.lookup_section("").is_none());
    }

    #[test]
    fn test_require_section_missing() {
        let image = sample();
        let structure = Structure::parse(&image).unwrap();
        let err = structure.require_section(".data").unwrap_err();
        assert!(matches!(err, Error::MissingSection { name: ".data" }));
    }

    #[test]
    fn test_bad_identification_rejected() {
        let mut bytes = ObjectWriter::new().finish().unwrap();
        bytes[elf::EI_CLASS] = 1;
        let err = Structure::parse(&ObjectImage::from_bytes(bytes.clone())).unwrap_err();
        assert!(matches!(err, Error::MalformedObject(_)));

        bytes[elf::EI_CLASS] = elf::ELFCLASS64;
        bytes[elf::EI_DATA] = 2;
        let err = Structure::parse(&ObjectImage::from_bytes(bytes.clone())).unwrap_err();
        assert!(matches!(err, Error::MalformedObject(_)));

        bytes[0] = 0;
        let err = Structure::parse(&ObjectImage::from_bytes(bytes)).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_truncated_section_table_rejected() {
        let bytes = ObjectWriter::new().finish().unwrap();
        let truncated = bytes[..bytes.len() - 1].to_vec();
        let err = Structure::parse(&ObjectImage::from_bytes(truncated)).unwrap_err();
        assert!(matches!(err, Error::MalformedObject(_)));
    }

    #[test]
    fn test_shstrndx_out_of_range_rejected() {
        let mut bytes = ObjectWriter::new().finish().unwrap();
        bytes[62..64].copy_from_slice(&99u16.to_le_bytes());
        let err = Structure::parse(&ObjectImage::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, Error::MalformedObject(_)));
    }
}

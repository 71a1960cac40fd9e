//! # ELF64 layout constants and field readers
//!
//! Shared by the parser stages and the object writer. Only the little-endian
//! 64-bit encoding is understood.

use crate::{Error, Result};

/// ELF magic number
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 64-bit
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little-endian
pub const ELFDATA2LSB: u8 = 1;

/// ELF version
pub const EV_CURRENT: u8 = 1;

/// ELF OS/ABI: System V
pub const ELFOSABI_NONE: u8 = 0;

// Identification field indices
pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;
pub const EI_VERSION: usize = 6;
pub const EI_OSABI: usize = 7;

/// ELF type: relocatable object
pub const ET_REL: u16 = 1;

// ELF machines the loader can run natively
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

// Record sizes
pub const EHDR_SIZE: usize = 64;
pub const SHDR_SIZE: usize = 64;
pub const SYM_SIZE: usize = 24;
pub const PHDR_SIZE: usize = 56;

// Program header types and flags
pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

// Section header types
pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;

// Section flags
pub const SHF_WRITE: u64 = 0x1;
pub const SHF_ALLOC: u64 = 0x2;
pub const SHF_EXECINSTR: u64 = 0x4;

// Reserved section indices
pub const SHN_UNDEF: u16 = 0;
pub const SHN_ABS: u16 = 0xfff1;

// Symbol binding
pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

// Symbol type
pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STT_SECTION: u8 = 3;
pub const STT_FILE: u8 = 4;

/// Machine code of the running process, if the loader can execute it
pub fn host_machine() -> Option<u16> {
    if cfg!(target_arch = "x86_64") {
        Some(EM_X86_64)
    } else if cfg!(target_arch = "aarch64") {
        Some(EM_AARCH64)
    } else {
        None
    }
}

/// Checked `offset + len`, reported as a malformed object on overflow
pub fn checked_end(offset: u64, len: u64, what: &str) -> Result<u64> {
    offset
        .checked_add(len)
        .ok_or_else(|| Error::malformed(format!("{} range overflows: {:#x} + {:#x}", what, offset, len)))
}

/// Bounds-checked slice of `bytes`
pub fn slice<'a>(bytes: &'a [u8], offset: u64, len: u64, what: &str) -> Result<&'a [u8]> {
    let end = checked_end(offset, len, what)?;
    if end > bytes.len() as u64 {
        return Err(Error::malformed(format!(
            "{} [{:#x}..{:#x}) exceeds image length {:#x}",
            what,
            offset,
            end,
            bytes.len()
        )));
    }
    Ok(&bytes[offset as usize..end as usize])
}

// Little-endian readers over a record already bounds-checked by the caller
pub(crate) fn u16_at(rec: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([rec[at], rec[at + 1]])
}

pub(crate) fn u32_at(rec: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([rec[at], rec[at + 1], rec[at + 2], rec[at + 3]])
}

pub(crate) fn u64_at(rec: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&rec[at..at + 8]);
    u64::from_le_bytes(b)
}

/// NUL-terminated string starting at `offset` inside a string table
pub fn c_str_at<'a>(table: &'a [u8], offset: u32, what: &str) -> Result<&'a [u8]> {
    let start = offset as usize;
    if start >= table.len() {
        return Err(Error::malformed(format!(
            "{} name offset {:#x} outside string table (size {:#x})",
            what,
            offset,
            table.len()
        )));
    }
    let rest = &table[start..];
    match rest.iter().position(|&b| b == 0) {
        Some(nul) => Ok(&rest[..nul]),
        None => Err(Error::malformed(format!(
            "{} name at {:#x} is not NUL-terminated",
            what, offset
        ))),
    }
}

/// Human-readable names for identification and header fields
pub mod names {
    use super::*;

    pub fn class(v: u8) -> &'static str {
        match v {
            0 => "NONE",
            1 => "ELF32",
            ELFCLASS64 => "ELF64",
            _ => "unknown",
        }
    }

    pub fn data(v: u8) -> &'static str {
        match v {
            0 => "NONE",
            ELFDATA2LSB => "2's complement, little endian",
            2 => "2's complement, big endian",
            _ => "unknown",
        }
    }

    pub fn osabi(v: u8) -> &'static str {
        match v {
            ELFOSABI_NONE => "SYSV",
            1 => "HPUX",
            2 => "NETBSD",
            3 => "LINUX",
            4 => "HURD",
            6 => "SOLARIS",
            7 => "AIX",
            8 => "IRIX",
            9 => "FREEBSD",
            10 => "TRU64",
            11 => "MODESTO",
            12 => "OPENBSD",
            13 => "OPENVMS",
            14 => "NSK",
            15 => "AROS",
            16 => "FENIXOS",
            17 => "CLOUDABI",
            64 => "ARM_AEABI",
            97 => "ARM",
            255 => "STANDALONE",
            _ => "unknown",
        }
    }

    pub fn file_type(v: u16) -> &'static str {
        match v {
            0 => "ET_NONE",
            ET_REL => "ET_REL",
            2 => "ET_EXEC",
            3 => "ET_DYN",
            4 => "ET_CORE",
            0xfe00..=0xfeff => "ET_OS",
            0xff00..=0xffff => "ET_PROC",
            _ => "unknown",
        }
    }

    pub fn machine(v: u16) -> &'static str {
        match v {
            0 => "EM_NONE",
            2 => "EM_SPARC",
            3 => "EM_386",
            8 => "EM_MIPS",
            20 => "EM_PPC",
            21 => "EM_PPC64",
            22 => "EM_S390",
            40 => "EM_ARM",
            43 => "EM_SPARCV9",
            50 => "EM_IA_64",
            EM_X86_64 => "EM_X86_64",
            EM_AARCH64 => "EM_AARCH64",
            243 => "EM_RISCV",
            247 => "EM_BPF",
            258 => "EM_LOONGARCH",
            263 => "EM_SBF",
            _ => "unknown",
        }
    }

    pub fn section_type(v: u32) -> &'static str {
        match v {
            SHT_NULL => "NULL",
            SHT_PROGBITS => "PROGBITS",
            SHT_SYMTAB => "SYMTAB",
            SHT_STRTAB => "STRTAB",
            4 => "RELA",
            5 => "HASH",
            6 => "DYNAMIC",
            7 => "NOTE",
            SHT_NOBITS => "NOBITS",
            9 => "REL",
            10 => "SHLIB",
            11 => "DYNSYM",
            14 => "INIT_ARRAY",
            15 => "FINI_ARRAY",
            16 => "PREINIT_ARRAY",
            17 => "GROUP",
            18 => "SYMTAB_SHNDX",
            0x6fff_fff6 => "GNU_HASH",
            0x6fff_fffd => "GNU_verdef",
            0x6fff_fffe => "GNU_verneed",
            0x6fff_ffff => "GNU_versym",
            0x7000_0000..=0x7fff_ffff => "LOPROC+",
            0x8000_0000..=0xffff_ffff => "LOUSER+",
            _ => "unknown",
        }
    }

    pub fn program_type(v: u32) -> &'static str {
        match v {
            PT_NULL => "NULL",
            PT_LOAD => "LOAD",
            2 => "DYNAMIC",
            3 => "INTERP",
            4 => "NOTE",
            5 => "SHLIB",
            6 => "PHDR",
            7 => "TLS",
            0x6474_e550 => "GNU_EH_FRAME",
            0x6474_e551 => "GNU_STACK",
            0x6474_e552 => "GNU_RELRO",
            0x6474_e553 => "GNU_PROPERTY",
            0x7000_0000..=0x7fff_ffff => "LOPROC+",
            _ => "unknown",
        }
    }

    /// `RWE` flag string for a segment
    pub fn program_flags(flags: u32) -> String {
        let mut s = String::new();
        s.push(if flags & PF_R != 0 { 'R' } else { ' ' });
        s.push(if flags & PF_W != 0 { 'W' } else { ' ' });
        s.push(if flags & PF_X != 0 { 'E' } else { ' ' });
        s
    }

    /// `WAX`-style flag string as printed by readelf
    pub fn section_flags(flags: u64) -> String {
        let mut s = String::new();
        if flags & SHF_WRITE != 0 {
            s.push('W');
        }
        if flags & SHF_ALLOC != 0 {
            s.push('A');
        }
        if flags & SHF_EXECINSTR != 0 {
            s.push('X');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_rejects_overflow() {
        let bytes = [0u8; 16];
        assert!(slice(&bytes, 8, 8, "tail").is_ok());
        assert!(matches!(
            slice(&bytes, 8, 9, "tail"),
            Err(Error::MalformedObject(_))
        ));
        assert!(matches!(
            slice(&bytes, u64::MAX, 2, "wrap"),
            Err(Error::MalformedObject(_))
        ));
    }

    #[test]
    fn test_c_str_at() {
        let table = b"\0.text\0.symtab\0";
        assert_eq!(c_str_at(table, 1, "section").unwrap(), b".text");
        assert_eq!(c_str_at(table, 0, "section").unwrap(), b"");
        assert!(c_str_at(table, 15, "section").is_err());
        assert!(c_str_at(b"abc", 0, "section").is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(names::machine(EM_X86_64), "EM_X86_64");
        assert_eq!(names::section_type(SHT_SYMTAB), "SYMTAB");
        assert_eq!(names::section_flags(SHF_ALLOC | SHF_EXECINSTR), "AX");
        assert_eq!(names::file_type(ET_REL), "ET_REL");
    }
}

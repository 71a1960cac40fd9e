//! # Relocatable Object Writer
//!
//! Packages raw machine code into a minimal ELF64 relocatable object
//! (`ET_REL`) that [`crate::LoadedObject`] can load. Useful for staging
//! hand-assembled code without a toolchain.
//!
//! Layout:
//!
//! ```text
//! [ELF Header: 64 bytes]
//! [.text]      (16-byte aligned)
//! [.strtab]
//! [.symtab]    (8-byte aligned, optional)
//! [.shstrtab]
//! [Section Headers]  (8-byte aligned)
//! ```

use crate::elf::*;
use crate::{Error, Result};

/// Alignment of each function inside `.text`
const FUNC_ALIGN: usize = 16;

#[derive(Clone, Debug)]
struct PendingSymbol {
    name: String,
    info: u8,
    /// `None` means "the .text section"
    shndx: Option<u16>,
    value: u64,
    size: u64,
}

/// Builder for relocatable objects holding one `.text` section
#[derive(Clone, Debug)]
pub struct ObjectWriter {
    machine: u16,
    text: Vec<u8>,
    symbols: Vec<PendingSymbol>,
    emit_symtab: bool,
    emit_strtab: bool,
    emit_text: bool,
}

impl ObjectWriter {
    /// Writer targeting the host machine (x86-64 if the host is unsupported)
    pub fn new() -> Self {
        Self {
            machine: host_machine().unwrap_or(EM_X86_64),
            text: Vec::new(),
            symbols: Vec::new(),
            emit_symtab: true,
            emit_strtab: true,
            emit_text: true,
        }
    }

    /// Override `e_machine`
    pub fn machine(&mut self, machine: u16) -> &mut Self {
        self.machine = machine;
        self
    }

    /// Append a global function to `.text`, returning its offset
    pub fn function(&mut self, name: &str, code: &[u8]) -> u64 {
        while self.text.len() % FUNC_ALIGN != 0 {
            self.text.push(0);
        }
        let offset = self.text.len() as u64;
        self.text.extend_from_slice(code);
        self.symbols.push(PendingSymbol {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | STT_FUNC,
            shndx: None,
            value: offset,
            size: code.len() as u64,
        });
        offset
    }

    /// Add an arbitrary symbol record.
    ///
    /// `shndx` of `None` binds the symbol to `.text`.
    pub fn symbol(
        &mut self,
        name: &str,
        info: u8,
        shndx: Option<u16>,
        value: u64,
        size: u64,
    ) -> &mut Self {
        self.symbols.push(PendingSymbol {
            name: name.to_string(),
            info,
            shndx,
            value,
            size,
        });
        self
    }

    /// Leave out `.symtab`
    pub fn without_symtab(&mut self) -> &mut Self {
        self.emit_symtab = false;
        self
    }

    /// Leave out `.strtab`
    pub fn without_strtab(&mut self) -> &mut Self {
        self.emit_strtab = false;
        self
    }

    /// Leave out `.text`
    pub fn without_text(&mut self) -> &mut Self {
        self.emit_text = false;
        self
    }

    /// Serialize the object
    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut shstrtab = vec![0u8];
        let mut strtab = vec![0u8];

        // Section indices are assigned in emission order after the null entry.
        let mut next_index = 1u16;
        let mut take_index = |emit: bool| {
            if emit {
                let idx = next_index;
                next_index += 1;
                Some(idx)
            } else {
                None
            }
        };
        let text_index = take_index(self.emit_text);
        let strtab_index = take_index(self.emit_strtab);
        take_index(self.emit_symtab);
        let shstrtab_index = take_index(true).unwrap_or(1);
        let num_sections = shstrtab_index as usize + 1;

        let text_name = add_str(&mut shstrtab, ".text");
        let strtab_name = add_str(&mut shstrtab, ".strtab");
        let symtab_name = add_str(&mut shstrtab, ".symtab");
        let shstrtab_name = add_str(&mut shstrtab, ".shstrtab");

        // Symbol records: NULL, the .text section symbol, then user symbols
        // with locals ahead of globals.
        let mut symtab = vec![0u8; SYM_SIZE];
        if let Some(idx) = text_index {
            push_sym(&mut symtab, 0, (STB_LOCAL << 4) | STT_SECTION, idx, 0, 0);
        }
        let mut ordered: Vec<&PendingSymbol> = self
            .symbols
            .iter()
            .filter(|s| s.info >> 4 == STB_LOCAL)
            .collect();
        let first_global = 1 + text_index.map_or(0, |_| 1) + ordered.len();
        ordered.extend(self.symbols.iter().filter(|s| s.info >> 4 != STB_LOCAL));
        for sym in ordered {
            let name = add_str(&mut strtab, &sym.name);
            let shndx = match sym.shndx {
                Some(idx) => idx,
                None => text_index.ok_or_else(|| {
                    Error::malformed(format!("symbol {} needs .text, which is omitted", sym.name))
                })?,
            };
            push_sym(&mut symtab, name as u32, sym.info, shndx, sym.value, sym.size);
        }

        let text_offset = EHDR_SIZE;
        let text_size = if self.emit_text { self.text.len() } else { 0 };
        let strtab_offset = text_offset + text_size;
        let strtab_size = if self.emit_strtab { strtab.len() } else { 0 };
        let symtab_offset = align(strtab_offset + strtab_size, 8);
        let symtab_size = if self.emit_symtab { symtab.len() } else { 0 };
        let shstrtab_offset = symtab_offset + symtab_size;
        let shdr_offset = align(shstrtab_offset + shstrtab.len(), 8);

        let mut out = Vec::with_capacity(shdr_offset + num_sections * SHDR_SIZE);

        // ==================== ELF Header ====================
        out.extend_from_slice(&ELF_MAGIC);
        out.push(ELFCLASS64);
        out.push(ELFDATA2LSB);
        out.push(EV_CURRENT);
        out.push(ELFOSABI_NONE);
        out.extend_from_slice(&[0u8; 8]);

        out.extend_from_slice(&ET_REL.to_le_bytes());
        out.extend_from_slice(&self.machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        out.extend_from_slice(&(shdr_offset as u64).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(num_sections as u16).to_le_bytes());
        out.extend_from_slice(&shstrtab_index.to_le_bytes());
        debug_assert_eq!(out.len(), EHDR_SIZE);

        // ==================== Section contents ====================
        if self.emit_text {
            out.extend_from_slice(&self.text);
        }
        if self.emit_strtab {
            out.extend_from_slice(&strtab);
        }
        out.resize(symtab_offset, 0);
        if self.emit_symtab {
            out.extend_from_slice(&symtab);
        }
        out.extend_from_slice(&shstrtab);
        out.resize(shdr_offset, 0);

        // ==================== Section Headers ====================
        out.extend_from_slice(&[0u8; SHDR_SIZE]);
        if self.emit_text {
            write_shdr(
                &mut out,
                text_name,
                SHT_PROGBITS,
                SHF_ALLOC | SHF_EXECINSTR,
                text_offset,
                text_size,
                0,
                0,
                FUNC_ALIGN as u64,
                0,
            );
        }
        if self.emit_strtab {
            write_shdr(
                &mut out,
                strtab_name,
                SHT_STRTAB,
                0,
                strtab_offset,
                strtab_size,
                0,
                0,
                1,
                0,
            );
        }
        if self.emit_symtab {
            write_shdr(
                &mut out,
                symtab_name,
                SHT_SYMTAB,
                0,
                symtab_offset,
                symtab_size,
                strtab_index.map_or(0, u32::from),
                first_global as u32,
                8,
                SYM_SIZE,
            );
        }
        write_shdr(
            &mut out,
            shstrtab_name,
            SHT_STRTAB,
            0,
            shstrtab_offset,
            shstrtab.len(),
            0,
            0,
            1,
            0,
        );

        tracing::trace!(
            len = out.len(),
            sections = num_sections,
            symbols = symtab.len() / SYM_SIZE,
            "wrote relocatable object"
        );
        Ok(out)
    }
}

impl Default for ObjectWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn align(n: usize, to: usize) -> usize {
    (n + to - 1) & !(to - 1)
}

fn add_str(table: &mut Vec<u8>, s: &str) -> usize {
    let idx = table.len();
    table.extend_from_slice(s.as_bytes());
    table.push(0);
    idx
}

fn push_sym(symtab: &mut Vec<u8>, name: u32, info: u8, shndx: u16, value: u64, size: u64) {
    symtab.extend_from_slice(&name.to_le_bytes()); // st_name
    symtab.push(info); // st_info
    symtab.push(0); // st_other
    symtab.extend_from_slice(&shndx.to_le_bytes()); // st_shndx
    symtab.extend_from_slice(&value.to_le_bytes()); // st_value
    symtab.extend_from_slice(&size.to_le_bytes()); // st_size
}

#[allow(clippy::too_many_arguments)]
fn write_shdr(
    out: &mut Vec<u8>,
    sh_name: usize,
    sh_type: u32,
    sh_flags: u64,
    sh_offset: usize,
    sh_size: usize,
    sh_link: u32,
    sh_info: u32,
    sh_addralign: u64,
    sh_entsize: usize,
) {
    out.extend_from_slice(&(sh_name as u32).to_le_bytes());
    out.extend_from_slice(&sh_type.to_le_bytes());
    out.extend_from_slice(&sh_flags.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    out.extend_from_slice(&(sh_offset as u64).to_le_bytes());
    out.extend_from_slice(&(sh_size as u64).to_le_bytes());
    out.extend_from_slice(&sh_link.to_le_bytes());
    out.extend_from_slice(&sh_info.to_le_bytes());
    out.extend_from_slice(&sh_addralign.to_le_bytes());
    out.extend_from_slice(&(sh_entsize as u64).to_le_bytes());
}

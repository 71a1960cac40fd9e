//! Hand-assembled function bodies and object fixtures shared by the
//! integration tests.
#![allow(dead_code)]

use objexec::{elf, ObjectWriter};
use std::io::Write;

/// `int addN(int x) { return x + n; }` for the host, `n` < 128
#[cfg(target_arch = "x86_64")]
pub fn add_imm(n: u8) -> Vec<u8> {
    assert!(n < 0x80);
    // lea eax, [rdi + n] ; ret
    vec![0x8d, 0x47, n, 0xc3]
}

#[cfg(target_arch = "aarch64")]
pub fn add_imm(n: u8) -> Vec<u8> {
    // add w0, w0, #n ; ret
    let add = 0x1100_0000u32 | ((n as u32) << 10);
    let mut code = add.to_le_bytes().to_vec();
    code.extend_from_slice(&0xd65f_03c0u32.to_le_bytes());
    code
}

/// `long sum(long a, long b) { return a + b; }` for the host
#[cfg(target_arch = "x86_64")]
pub fn add_pair() -> Vec<u8> {
    // lea rax, [rdi + rsi] ; ret
    vec![0x48, 0x8d, 0x04, 0x37, 0xc3]
}

#[cfg(target_arch = "aarch64")]
pub fn add_pair() -> Vec<u8> {
    // add x0, x0, x1 ; ret
    let mut code = 0x8b01_0000u32.to_le_bytes().to_vec();
    code.extend_from_slice(&0xd65f_03c0u32.to_le_bytes());
    code
}

/// Object exporting `add50`, `add5`, `add10` and `sum`, plus a data symbol
pub fn simple_object() -> Vec<u8> {
    let mut writer = ObjectWriter::new();
    writer.function("add50", &add_imm(50));
    writer.function("add5", &add_imm(5));
    writer.function("add10", &add_imm(10));
    writer.function("sum", &add_pair());
    writer.symbol(
        "counter",
        (elf::STB_GLOBAL << 4) | elf::STT_OBJECT,
        None,
        0,
        4,
    );
    writer.finish().unwrap()
}

/// Write `bytes` to a temporary `.o` file
pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".o").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

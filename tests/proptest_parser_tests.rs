//! Property-based tests for the structure parser and symbol resolver
//!
//! These tests use proptest to generate inputs and verify that:
//! 1. Parsing and loading never panic on arbitrary or corrupted bytes,
//!    including corrupted section header fields
//! 2. Section lookup is reflexive and exact
//! 3. Function resolution never matches a longer or shorter name

use objexec::{
    elf, LoadedObject, ObjectImage, ObjectReport, ObjectWriter, Structure, SymbolTable,
};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Symbol-like identifiers
fn identifier() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,12}"
}

/// Distinct function names
fn name_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(identifier(), 1..12).prop_map(|s| s.into_iter().collect())
}

fn object_with(names: &[String]) -> Vec<u8> {
    let mut writer = ObjectWriter::new();
    for name in names {
        writer.function(name, &[0xc3]);
    }
    writer.finish().unwrap()
}

/// Offset and width of a section header field
#[derive(Debug, Clone, Copy)]
struct HeaderField {
    offset: usize,
    width: usize,
}

/// sh_type, sh_flags, sh_offset, sh_size, sh_link, sh_info, sh_entsize
fn header_field() -> impl Strategy<Value = HeaderField> {
    prop_oneof![
        Just(HeaderField { offset: 4, width: 4 }),
        Just(HeaderField { offset: 8, width: 8 }),
        Just(HeaderField { offset: 24, width: 8 }),
        Just(HeaderField { offset: 32, width: 8 }),
        Just(HeaderField { offset: 40, width: 4 }),
        Just(HeaderField { offset: 44, width: 4 }),
        Just(HeaderField { offset: 56, width: 8 }),
    ]
}

/// Values that sit on the interesting edges as well as arbitrary ones
fn field_value() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(0u64),
        Just(elf::SHT_NULL as u64),
        Just(elf::SHT_NOBITS as u64),
        Just(elf::SHT_STRTAB as u64),
        Just(u64::MAX),
        0u64..256,
        any::<u64>(),
    ]
}

/// Overwrite one field of one section header in place
fn set_header_field(bytes: &mut [u8], section: usize, field: HeaderField, value: u64) {
    let shoff = u64::from_le_bytes(bytes[40..48].try_into().unwrap()) as usize;
    let at = shoff + section * elf::SHDR_SIZE + field.offset;
    bytes[at..at + field.width].copy_from_slice(&value.to_le_bytes()[..field.width]);
}

/// Run every parsing stage, ignoring the result
fn parse_everything(bytes: Vec<u8>) {
    let image = ObjectImage::from_bytes(bytes);
    if let Ok(structure) = Structure::parse(&image) {
        let _ = structure.lookup_section(".text");
        if let Ok(table) = SymbolTable::parse(&image, &structure) {
            let _ = table.resolve_function("add5");
        }
        let _ = ObjectReport::build(&image, &structure);
    }
    if let Ok(object) = LoadedObject::from_image(image) {
        let _ = object.lookup_function("add5");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        parse_everything(bytes);
    }

    #[test]
    fn prop_arbitrary_bytes_with_elf_ident_never_panic(tail in prop::collection::vec(any::<u8>(), 48..512)) {
        let mut bytes = elf::ELF_MAGIC.to_vec();
        bytes.extend_from_slice(&[elf::ELFCLASS64, elf::ELFDATA2LSB, elf::EV_CURRENT, 0]);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&tail);
        parse_everything(bytes);
    }

    #[test]
    fn prop_corrupted_object_never_panics(
        names in name_set(),
        flips in prop::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..16),
    ) {
        let mut bytes = object_with(&names);
        for (index, value) in flips {
            let at = index.index(bytes.len());
            bytes[at] = value;
        }
        parse_everything(bytes);
    }

    #[test]
    fn prop_section_header_field_corruption_never_panics(
        names in name_set(),
        edits in prop::collection::vec(
            (any::<prop::sample::Index>(), header_field(), field_value()),
            1..4,
        ),
    ) {
        let mut bytes = object_with(&names);
        let sections = u16::from_le_bytes([bytes[60], bytes[61]]) as usize;
        for (section, field, value) in edits {
            set_header_field(&mut bytes, section.index(sections), field, value);
        }
        parse_everything(bytes);
    }

    #[test]
    fn prop_truncated_object_is_rejected_not_panicking(names in name_set(), cut in any::<prop::sample::Index>()) {
        let bytes = object_with(&names);
        let len = cut.index(bytes.len());
        let image = ObjectImage::from_bytes(bytes[..len].to_vec());
        // The section header table is last, so any truncation breaks it.
        prop_assert!(Structure::parse(&image).is_err());
    }

    #[test]
    fn prop_section_lookup_is_reflexive(names in name_set()) {
        let image = ObjectImage::from_bytes(object_with(&names));
        let structure = Structure::parse(&image).unwrap();
        for index in 1..structure.sections().len() {
            let name = String::from_utf8(structure.section_name(index).unwrap().to_vec()).unwrap();
            let found = structure.lookup_section(&name).unwrap();
            prop_assert_eq!(found.index, index);
        }
    }

    #[test]
    fn prop_section_lookup_rejects_strict_prefix_and_suffix(cut in 1usize..5) {
        let image = ObjectImage::from_bytes(object_with(&["f".to_string()]));
        let structure = Structure::parse(&image).unwrap();
        for name in [".text", ".symtab", ".strtab", ".shstrtab"] {
            prop_assert!(structure.lookup_section(&name[..name.len() - cut]).is_none());
            prop_assert!(structure.lookup_section(&name[cut..]).is_none());
            let longer = format!("{}x", name);
            prop_assert!(structure.lookup_section(&longer).is_none());
        }
    }

    #[test]
    fn prop_resolution_is_exact(names in name_set(), probe in identifier()) {
        let image = ObjectImage::from_bytes(object_with(&names));
        let structure = Structure::parse(&image).unwrap();
        let table = SymbolTable::parse(&image, &structure).unwrap();

        for (i, name) in names.iter().enumerate() {
            let resolved = table.resolve_function(name).unwrap();
            prop_assert_eq!(&resolved.name, name);
            prop_assert_eq!(resolved.value, (i * 16) as u64);
        }
        let expected = names.iter().any(|n| *n == probe);
        prop_assert_eq!(table.resolve_function(&probe).is_some(), expected);
    }
}

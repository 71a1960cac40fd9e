//! End-to-end tests: write an object to disk, load it, call its functions
#![cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]

mod common;

use objexec::{
    Error, LoadPlan, LoadedObject, ObjectImage, ObjectWriter, Signature, StagedSegment, Structure,
};

#[test]
fn test_e2e_add5_twice() {
    let file = common::write_temp(&common::simple_object());
    let object = LoadedObject::load(file.path()).unwrap();

    let add5 = object.lookup_function("add5").unwrap();
    let f = unsafe { add5.callable::<extern "C" fn(i32) -> i32>() }.unwrap();
    assert_eq!((f.get())(5), 10);
    assert_eq!((f.get())((f.get())(5)), 15);
}

#[test]
fn test_e2e_add10() {
    let file = common::write_temp(&common::simple_object());
    let object = LoadedObject::load(file.path()).unwrap();

    let add10 = object.require_function("add10").unwrap();
    let f = unsafe { add10.callable::<extern "C" fn(i32) -> i32>() }.unwrap();
    assert_eq!((f.get())(5), 15);
}

#[test]
fn test_e2e_prefix_name_resolves_to_exact_symbol() {
    let object =
        LoadedObject::from_image(ObjectImage::from_bytes(common::simple_object())).unwrap();

    let add5 = object.lookup_function("add5").unwrap();
    let add50 = object.lookup_function("add50").unwrap();
    assert_eq!(add5.symbol().name, "add5");
    assert_ne!(add5.as_ptr(), add50.as_ptr());

    let f = unsafe { add5.callable::<extern "C" fn(i32) -> i32>() }.unwrap();
    let g = unsafe { add50.callable::<extern "C" fn(i32) -> i32>() }.unwrap();
    assert_eq!((f.get())(0), 5);
    assert_eq!((g.get())(0), 50);
}

#[test]
fn test_e2e_two_argument_function() {
    let object =
        LoadedObject::from_image(ObjectImage::from_bytes(common::simple_object())).unwrap();
    let sum = object.require_function("sum").unwrap();
    let f = unsafe { sum.callable::<extern "C" fn(i64, i64) -> i64>() }.unwrap();
    assert_eq!((f.get())(40, 2), 42);
    assert_eq!((f.get())(-7, 7), 0);
}

#[test]
fn test_e2e_dynamic_invoke() {
    let object =
        LoadedObject::from_image(ObjectImage::from_bytes(common::simple_object())).unwrap();
    let add5 = object.require_function("add5").unwrap();
    let sig: Signature = "i32(i32)".parse().unwrap();

    assert_eq!(unsafe { add5.invoke(&sig, &[5]) }.unwrap(), 10);
    assert_eq!(unsafe { add5.invoke(&sig, &[-5]) }.unwrap(), 0);
    let err = unsafe { add5.invoke(&sig, &[1, 2]) }.unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch { expected: 1, got: 2 }));
}

#[test]
fn test_e2e_nonexistent_is_not_found() {
    let object =
        LoadedObject::from_image(ObjectImage::from_bytes(common::simple_object())).unwrap();
    assert!(object.lookup_function("nonexistent").is_none());
    assert!(object.lookup_function("counter").is_none());
    assert!(matches!(
        object.require_function("nonexistent"),
        Err(Error::SymbolNotFound { .. })
    ));
}

#[test]
fn test_e2e_missing_symtab() {
    let mut writer = ObjectWriter::new();
    writer.function("add5", &common::add_imm(5));
    let file = common::write_temp(&writer.without_symtab().finish().unwrap());
    let err = LoadedObject::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::MissingSection { name: ".symtab" }));
}

#[test]
fn test_e2e_staged_copy_fidelity() {
    let image = ObjectImage::from_bytes(common::simple_object());
    let structure = Structure::parse(&image).unwrap();
    let text = structure.lookup_section(".text").unwrap();
    let start = text.header.sh_offset as usize;
    let end = start + text.header.sh_size as usize;

    let staged = StagedSegment::stage(&image, &structure).unwrap();
    assert_eq!(staged.bytes(), &image.bytes()[start..end]);

    let segment = staged.seal().unwrap();
    assert_eq!(segment.code(), &image.bytes()[start..end]);
}

#[test]
fn test_e2e_release_image_then_call() {
    let file = common::write_temp(&common::simple_object());
    let mut object = LoadedObject::load(file.path()).unwrap();
    object.release_image();
    drop(file);

    let add10 = object.require_function("add10").unwrap();
    let f = unsafe { add10.callable::<extern "C" fn(i32) -> i32>() }.unwrap();
    assert_eq!((f.get())(1), 11);
}

#[test]
fn test_e2e_plan_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("simple.o"), common::simple_object()).unwrap();
    let plan_path = dir.path().join("plan.json");
    std::fs::write(
        &plan_path,
        r#"{
            "object": "simple.o",
            "calls": [
                { "symbol": "add5", "signature": "i32(i32)", "args": [5], "repeat": 2, "expect": 15 },
                { "symbol": "add10", "signature": "i32(i32)", "args": [5], "expect": 16 },
                { "symbol": "sum", "signature": "i64(i64, i64)", "args": [20, 22] }
            ]
        }"#,
    )
    .unwrap();

    let plan = LoadPlan::from_file(&plan_path).unwrap();
    let outcomes = unsafe { objexec::plan::run_plan(&plan) }.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].value, 15);
    assert_eq!(outcomes[0].matched, Some(true));
    assert_eq!(outcomes[1].value, 15);
    assert_eq!(outcomes[1].matched, Some(false));
    assert_eq!(outcomes[2].display, "42");
    assert_eq!(outcomes[2].matched, None);
}

#[test]
fn test_e2e_plan_unknown_symbol_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("simple.o"), common::simple_object()).unwrap();
    let plan = LoadPlan::from_json(&format!(
        r#"{{ "object": {:?}, "calls": [{{ "symbol": "nonexistent", "signature": "i32(i32)", "args": [1] }}] }}"#,
        dir.path().join("simple.o")
    ))
    .unwrap();
    let err = unsafe { objexec::plan::run_plan(&plan) }.unwrap_err();
    assert!(matches!(err, Error::SymbolNotFound { .. }));
}

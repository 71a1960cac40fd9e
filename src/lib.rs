//! # objexec - Run Functions Straight From Relocatable ELF Objects
//!
//! Maps a relocatable ELF64 object (`.o`), copies its `.text` section into
//! freshly allocated executable memory, resolves function symbols to
//! addresses inside that memory, and calls them as native code.
//!
//! No relocations are applied, so the loaded functions must be
//! self-contained (no calls to other symbols, no data references).
//!
//! ## Quick Start
//!
//! ```no_run
//! use objexec::LoadedObject;
//!
//! # fn main() -> objexec::Result<()> {
//! let object = LoadedObject::load("simple.o")?;
//! let add5 = object.require_function("add5")?;
//!
//! // SAFETY: add5 is compiled as `int add5(int)`.
//! let f = unsafe { add5.callable::<extern "C" fn(i32) -> i32>()? };
//! assert_eq!((f.get())((f.get())(5)), 15);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! path → ObjectImage → Structure → SymbolTable → StagedSegment (RW)
//!                                                     ↓ seal
//!                                       ExecutableSegment (RX) → Callable
//! ```
//!
//! ### Main Components
//!
//! - [`ObjectImage`] - read-only mapping of the object file
//! - [`Structure`] - ELF header and section table, section lookup by name
//! - [`SymbolTable`] - `.symtab`/`.strtab`, function resolution by exact name
//! - [`StagedSegment`] / [`ExecutableSegment`] - W^X copy of `.text`
//! - [`invoke`] - the only place addresses become function pointers
//! - [`LoadedObject`] - the whole pipeline behind one value
//!
//! Supporting pieces: [`inspect`] describes an object without loading code,
//! [`plan`] drives calls from a JSON file, and [`ObjectWriter`] builds
//! objects from raw machine code.

/// Version of the objexec loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Module declarations
pub mod elf;
pub mod error;
pub mod image;
pub mod inspect;
pub mod invoke;
pub mod loader;
pub mod plan;
pub mod segment;
pub mod structure;
pub mod symbols;
pub mod writer;

// Re-export main types
pub use error::{Error, ErrorSeverity, Result};
pub use image::ObjectImage;
pub use inspect::ObjectReport;
pub use invoke::{get_callable, Callable, NativeFn, ScalarType, Signature};
pub use loader::{load_object, lookup_function, Address, LoadedObject};
pub use plan::{CallOutcome, LoadPlan, PlannedCall};
pub use segment::{materialize, page_align, page_size, ExecutableSegment, StagedSegment};
pub use structure::{ElfHeader, SectionHeader, SectionRef, Structure};
pub use symbols::{parse_symbols, ResolvedSymbol, Symbol, SymbolBinding, SymbolTable, SymbolType};
pub use writer::ObjectWriter;

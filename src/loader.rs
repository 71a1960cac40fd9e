//! # Loaded Object
//!
//! Runs the whole pipeline (image → structure → symbols → executable
//! segment) and keeps what callers need afterwards: the segment and the
//! owned list of function symbols.
//!
//! ```text
//! path → ObjectImage → Structure → SymbolTable → ExecutableSegment
//!                                       ↓
//!                              lookup_function(name) → Address
//! ```

use std::path::Path;

use crate::image::ObjectImage;
use crate::invoke::{self, Callable, NativeFn, Signature};
use crate::segment::{ExecutableSegment, StagedSegment};
use crate::structure::Structure;
use crate::symbols::{ResolvedSymbol, SymbolTable};
use crate::{Error, Result};

/// A function resolved to an absolute address inside a loaded segment
#[derive(Debug, Clone, Copy)]
pub struct Address<'a> {
    ptr: *const u8,
    symbol: &'a ResolvedSymbol,
    segment: &'a ExecutableSegment,
}

impl<'a> Address<'a> {
    /// Absolute address of the function
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// The symbol this address was resolved from
    pub fn symbol(&self) -> &'a ResolvedSymbol {
        self.symbol
    }

    /// Materialize this address as a typed function.
    ///
    /// # Safety
    ///
    /// The function must implement `F` under the C calling convention.
    pub unsafe fn callable<F: NativeFn>(&self) -> Result<Callable<'a, F>> {
        invoke::get_callable(self.segment, self.symbol)
    }

    /// Call with a signature chosen at runtime.
    ///
    /// # Safety
    ///
    /// The function must implement `sig` under the C calling convention.
    pub unsafe fn invoke(&self, sig: &Signature, args: &[i64]) -> Result<i64> {
        invoke::invoke(self.segment, self.symbol, sig, args)
    }
}

/// One relocatable object with its `.text` live in executable memory
pub struct LoadedObject {
    image: Option<ObjectImage>,
    structure: Structure,
    functions: Vec<ResolvedSymbol>,
    segment: ExecutableSegment,
}

impl LoadedObject {
    /// Map `path` and load it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_image(ObjectImage::load(path)?)
    }

    /// Load an image already in memory.
    ///
    /// Symbols are parsed before any executable memory is allocated, so a
    /// missing `.symtab` or `.strtab` fails first.
    pub fn from_image(image: ObjectImage) -> Result<Self> {
        let structure = Structure::parse(&image)?;
        let symbols = SymbolTable::parse(&image, &structure)?;
        let functions: Vec<ResolvedSymbol> =
            symbols.functions().map(ResolvedSymbol::from).collect();
        let segment = StagedSegment::stage(&image, &structure)?.seal()?;

        tracing::info!(
            path = ?image.path(),
            functions = functions.len(),
            code_len = segment.code_len(),
            "object loaded"
        );

        Ok(Self {
            image: Some(image),
            structure,
            functions,
            segment,
        })
    }

    /// Resolve a function to its runtime address.
    ///
    /// Only functions defined in `.text` at an offset inside the loaded code
    /// resolve; anything else is reported as not found. Same-named functions
    /// defined in other sections are skipped, so the first one in `.text` wins.
    pub fn lookup_function(&self, name: &str) -> Option<Address<'_>> {
        let wanted = name.as_bytes();
        let text_index = self.segment.text_index();
        let mut named = self.functions.iter().filter(|s| s.name.as_bytes() == wanted);
        let Some(symbol) = named.clone().find(|s| s.shndx as usize == text_index) else {
            if let Some(other) = named.next() {
                tracing::warn!(
                    symbol = name,
                    shndx = other.shndx,
                    "function is not defined in .text"
                );
            }
            return None;
        };
        match invoke::address_of(&self.segment, symbol) {
            Ok(ptr) => Some(Address {
                ptr,
                symbol,
                segment: &self.segment,
            }),
            Err(e) => {
                tracing::warn!(symbol = name, error = %e, "function outside loaded code");
                None
            }
        }
    }

    /// Like [`LoadedObject::lookup_function`], but absence is `SymbolNotFound`
    pub fn require_function(&self, name: &str) -> Result<Address<'_>> {
        self.lookup_function(name)
            .ok_or_else(|| Error::SymbolNotFound {
                name: name.to_string(),
            })
    }

    /// Every function symbol in table order
    pub fn functions(&self) -> &[ResolvedSymbol] {
        &self.functions
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn segment(&self) -> &ExecutableSegment {
        &self.segment
    }

    /// Source image, unless it has been released
    pub fn image(&self) -> Option<&ObjectImage> {
        self.image.as_ref()
    }

    /// Unmap the source image now. Resolution keeps working.
    pub fn release_image(&mut self) {
        if let Some(image) = self.image.take() {
            tracing::debug!(len = image.len(), "released object image");
        }
    }
}

impl std::fmt::Debug for LoadedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedObject")
            .field("image", &self.image)
            .field("functions", &self.functions.len())
            .field("segment", &self.segment)
            .finish()
    }
}

/// Load the object at `path`
pub fn load_object(path: impl AsRef<Path>) -> Result<LoadedObject> {
    LoadedObject::load(path)
}

/// Resolve `name` in a loaded object
pub fn lookup_function<'a>(loaded: &'a LoadedObject, name: &str) -> Option<Address<'a>> {
    loaded.lookup_function(name)
}

//! # Invocation Front End
//!
//! Turns a resolved symbol into a callable inside an [`ExecutableSegment`].
//!
//! This is the only place where an address is reinterpreted as a function.
//! Nothing here can check that the bytes at that address implement the
//! declared signature: a mismatch is undefined behavior, which is why
//! [`get_callable`] and [`invoke`] are `unsafe`.
//!
//! ```ignore
//! let object = LoadedObject::load("simple.o")?;
//! let add5 = object.require_function("add5")?;
//! let f = unsafe { get_callable::<extern "C" fn(i32) -> i32>(object.segment(), add5.symbol())? };
//! assert_eq!((f.get())(5), 10);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::segment::ExecutableSegment;
use crate::symbols::ResolvedSymbol;
use crate::{Error, Result};

mod sealed {
    pub trait Sealed {}
}

/// Integer types that may appear in a native signature
pub trait Scalar: Copy + sealed::Sealed {
    const TYPE: ScalarType;
    /// Truncate an `i64` argument to this width
    fn from_i64(v: i64) -> Self;
    /// Widen back to `i64` (sign- or zero-extended)
    fn to_i64(self) -> i64;
}

macro_rules! scalar {
    ($t:ty, $kind:ident) => {
        impl sealed::Sealed for $t {}
        impl Scalar for $t {
            const TYPE: ScalarType = ScalarType::$kind;
            fn from_i64(v: i64) -> Self {
                v as $t
            }
            fn to_i64(self) -> i64 {
                self as i64
            }
        }
    };
}

scalar!(i32, I32);
scalar!(i64, I64);
scalar!(u32, U32);
scalar!(u64, U64);

/// `extern "C"` function pointer types a symbol can be materialized as
pub trait NativeFn: Copy + sealed::Sealed {
    /// Number of parameters
    const ARITY: usize;

    /// Reinterpret `ptr` as this function type.
    ///
    /// # Safety
    ///
    /// `ptr` must point at executable code implementing exactly this
    /// signature under the C calling convention.
    unsafe fn from_ptr(ptr: *const u8) -> Self;
}

macro_rules! native_fn {
    ($arity:expr; $($arg:ident),*) => {
        impl<R: Scalar, $($arg: Scalar),*> sealed::Sealed for extern "C" fn($($arg),*) -> R {}
        impl<R: Scalar, $($arg: Scalar),*> NativeFn for extern "C" fn($($arg),*) -> R {
            const ARITY: usize = $arity;

            unsafe fn from_ptr(ptr: *const u8) -> Self {
                debug_assert_eq!(std::mem::size_of::<Self>(), std::mem::size_of::<*const u8>());
                std::mem::transmute_copy::<*const u8, Self>(&ptr)
            }
        }
    };
}

native_fn!(0;);
native_fn!(1; A);
native_fn!(2; A, B);
native_fn!(3; A, B, C);

/// A typed function pointer that cannot outlive its segment
#[derive(Clone, Copy)]
pub struct Callable<'a, F: NativeFn> {
    f: F,
    address: *const u8,
    _segment: PhantomData<&'a ExecutableSegment>,
}

impl<'a, F: NativeFn> Callable<'a, F> {
    /// The function pointer.
    ///
    /// Calling it after the segment is dropped is undefined behavior; keep
    /// the `Callable` (which borrows the segment) alive instead of the
    /// bare pointer.
    pub fn get(&self) -> F {
        self.f
    }

    /// Absolute address of the function
    pub fn address(&self) -> *const u8 {
        self.address
    }
}

impl<F: NativeFn> fmt::Debug for Callable<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("address", &self.address)
            .field("arity", &F::ARITY)
            .finish()
    }
}

/// Absolute address of `symbol` inside `segment`.
///
/// Fails with `SymbolOutOfRange` if the symbol's offset lies past the
/// loaded code.
pub fn address_of(segment: &ExecutableSegment, symbol: &ResolvedSymbol) -> Result<*const u8> {
    if !segment.contains(symbol.value) {
        return Err(Error::SymbolOutOfRange {
            name: symbol.name.clone(),
            value: symbol.value,
            text_size: segment.code_len() as u64,
        });
    }
    // SAFETY: value < code_len <= mapping length, checked above.
    Ok(unsafe { segment.base().add(symbol.value as usize) })
}

/// Materialize `symbol` as a typed function.
///
/// # Safety
///
/// The code at `segment.base() + symbol.value` must implement `F` under the
/// C calling convention.
pub unsafe fn get_callable<'a, F: NativeFn>(
    segment: &'a ExecutableSegment,
    symbol: &ResolvedSymbol,
) -> Result<Callable<'a, F>> {
    let address = address_of(segment, symbol)?;
    tracing::debug!(symbol = %symbol.name, ?address, arity = F::ARITY, "materialized callable");
    Ok(Callable {
        f: F::from_ptr(address),
        address,
        _segment: PhantomData,
    })
}

/// Scalar types accepted in textual signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I32,
    I64,
    U32,
    U64,
}

impl ScalarType {
    /// Render a returned value according to this type
    pub fn format(self, v: i64) -> String {
        match self {
            ScalarType::I32 => (v as i32).to_string(),
            ScalarType::I64 => v.to_string(),
            ScalarType::U32 => (v as u32).to_string(),
            ScalarType::U64 => (v as u64).to_string(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
        };
        f.write_str(s)
    }
}

impl FromStr for ScalarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "i32" => Ok(ScalarType::I32),
            "i64" => Ok(ScalarType::I64),
            "u32" => Ok(ScalarType::U32),
            "u64" => Ok(ScalarType::U64),
            other => Err(Error::InvalidSignature(format!("unknown type '{}'", other))),
        }
    }
}

/// Maximum number of parameters a dynamic signature may declare
pub const MAX_ARITY: usize = 3;

/// Runtime description of a native signature, written `ret(arg, ...)`
///
/// All parameters and the return value share one scalar type, e.g.
/// `i32(i32)`, `i64(i64, i64)` or `u64()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub ret: ScalarType,
    pub params: Vec<ScalarType>,
}

impl Signature {
    pub fn new(ret: ScalarType, arity: usize) -> Result<Self> {
        if arity > MAX_ARITY {
            return Err(Error::InvalidSignature(format!(
                "{} parameters (at most {} supported)",
                arity, MAX_ARITY
            )));
        }
        Ok(Self {
            ret,
            params: vec![ret; arity],
        })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let open = s
            .find('(')
            .ok_or_else(|| Error::InvalidSignature(format!("'{}' has no parameter list", s)))?;
        if !s.ends_with(')') {
            return Err(Error::InvalidSignature(format!("'{}' is missing ')'", s)));
        }
        let ret: ScalarType = s[..open].parse()?;
        let inner = s[open + 1..s.len() - 1].trim();
        let params = if inner.is_empty() {
            Vec::new()
        } else {
            inner
                .split(',')
                .map(str::parse)
                .collect::<Result<Vec<ScalarType>>>()?
        };
        if let Some(p) = params.iter().find(|p| **p != ret) {
            return Err(Error::InvalidSignature(format!(
                "mixed types {} and {} (parameters must match the return type)",
                ret, p
            )));
        }
        Signature::new(ret, params.len())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

unsafe fn call_as<T: Scalar>(address: *const u8, args: &[i64]) -> Result<i64> {
    let ret = match *args {
        [] => {
            let f = <extern "C" fn() -> T as NativeFn>::from_ptr(address);
            f()
        }
        [a] => {
            let f = <extern "C" fn(T) -> T as NativeFn>::from_ptr(address);
            f(T::from_i64(a))
        }
        [a, b] => {
            let f = <extern "C" fn(T, T) -> T as NativeFn>::from_ptr(address);
            f(T::from_i64(a), T::from_i64(b))
        }
        [a, b, c] => {
            let f = <extern "C" fn(T, T, T) -> T as NativeFn>::from_ptr(address);
            f(T::from_i64(a), T::from_i64(b), T::from_i64(c))
        }
        _ => {
            return Err(Error::SignatureMismatch {
                expected: MAX_ARITY,
                got: args.len(),
            })
        }
    };
    Ok(ret.to_i64())
}

/// Call `symbol` with a signature chosen at runtime.
///
/// Arguments are truncated to the declared width; the result is widened
/// back to `i64`.
///
/// # Safety
///
/// Same contract as [`get_callable`]: the code must implement `sig`.
pub unsafe fn invoke(
    segment: &ExecutableSegment,
    symbol: &ResolvedSymbol,
    sig: &Signature,
    args: &[i64],
) -> Result<i64> {
    if args.len() != sig.arity() {
        return Err(Error::SignatureMismatch {
            expected: sig.arity(),
            got: args.len(),
        });
    }
    let address = address_of(segment, symbol)?;
    tracing::debug!(symbol = %symbol.name, signature = %sig, ?args, "invoking");
    match sig.ret {
        ScalarType::I32 => call_as::<i32>(address, args),
        ScalarType::I64 => call_as::<i64>(address, args),
        ScalarType::U32 => call_as::<u32>(address, args),
        ScalarType::U64 => call_as::<u64>(address, args),
    }
}

//! Error types for the objexec loader

use std::path::PathBuf;
use thiserror::Error;

/// Loader errors
#[derive(Error, Debug)]
pub enum Error {
    // System errors
    /// The object file could not be opened or stat-ed
    ///
    /// **Triggered by:** a missing file, missing permissions, or a directory path
    #[error("Cannot read object file {}: {source}", path.display())]
    Io {
        /// Path that was being opened
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Mapping the source file or allocating the executable region failed
    #[error("Failed to map {what}: {source}")]
    Map {
        /// What was being mapped
        what: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Transitioning the executable region to read+execute failed
    ///
    /// The writable region has already been released when this is returned.
    #[error("Failed to make code region executable: {source}")]
    Protect {
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    // Structural errors
    /// Offsets or sizes inside the object are inconsistent with its length
    ///
    /// **Triggered by:** truncated files, bad magic, 32-bit or big-endian objects,
    /// a zero symbol entry size, string offsets past the end of a string table
    #[error("Malformed object: {0}")]
    MalformedObject(String),

    /// A section the loader depends on is absent
    #[error("Missing required section: {name}")]
    MissingSection {
        /// Section name, e.g. `.symtab`
        name: &'static str,
    },

    // Resolution errors
    /// No function symbol with the requested name
    #[error("Function symbol not found: {name}")]
    SymbolNotFound {
        /// Requested symbol name
        name: String,
    },

    /// A function symbol points outside the loaded code
    #[error("Symbol {name} at offset {value:#x} lies outside .text (size {text_size:#x})")]
    SymbolOutOfRange {
        /// Symbol name
        name: String,
        /// Symbol value (offset into .text)
        value: u64,
        /// Size of the loaded code
        text_size: u64,
    },

    // Invocation errors
    /// Argument count does not match the declared signature
    #[error("Signature mismatch: expected {expected} arguments, got {got}")]
    SignatureMismatch {
        /// Arity of the declared signature
        expected: usize,
        /// Number of arguments supplied
        got: usize,
    },

    /// A textual signature could not be parsed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    // Driver errors
    /// A load plan could not be read or is inconsistent
    #[error("Plan error: {0}")]
    Plan(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The load pipeline cannot continue
    Fatal,
    /// The caller may carry on (e.g. try another symbol)
    Recoverable,
}

impl Error {
    /// Create a malformed-object error with a message
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedObject(msg.into())
    }

    /// Create a plan error with a message
    pub fn plan(msg: impl Into<String>) -> Self {
        Error::Plan(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::Io { .. } => ErrorSeverity::Fatal,
            Error::Map { .. } => ErrorSeverity::Fatal,
            Error::Protect { .. } => ErrorSeverity::Fatal,
            Error::MalformedObject(_) => ErrorSeverity::Fatal,
            Error::MissingSection { .. } => ErrorSeverity::Fatal,

            Error::SymbolNotFound { .. } => ErrorSeverity::Recoverable,
            Error::SymbolOutOfRange { .. } => ErrorSeverity::Recoverable,
            Error::SignatureMismatch { .. } => ErrorSeverity::Recoverable,
            Error::InvalidSignature(_) => ErrorSeverity::Recoverable,
            Error::Plan(_) => ErrorSeverity::Recoverable,
        }
    }

    /// Process exit status for this error
    ///
    /// System failures report the OS errno when one is available.
    pub fn exit_code(&self) -> i32 {
        let os = match self {
            Error::Io { source, .. } => source.raw_os_error(),
            Error::Map { source, .. } => source.raw_os_error(),
            Error::Protect { source } => source.raw_os_error(),
            _ => None,
        };
        match os {
            Some(code) if code > 0 => code,
            _ => 1,
        }
    }
}

/// Result type for objexec operations
pub type Result<T> = std::result::Result<T, Error>;

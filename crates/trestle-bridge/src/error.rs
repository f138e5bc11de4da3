//! Bridge errors and their projection across the boundary.

extern crate alloc;

use alloc::{
    boxed::Box,
    string::{String, ToString},
};
use core::{fmt, ops::Deref};

use buggy::Bug;
use trestle_crypto::{
    ImportError, MacError, RandomError, SignError, UnknownKeyFamily, UnsupportedAlgorithm,
};

use crate::{
    buffer::PinError,
    host::{AcquireError, AttachError},
};

/// An error returned by a bridge operation.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    err: Box<dyn core::error::Error + Send + Sync + 'static>,
}

impl Error {
    pub(crate) fn new<E>(kind: ErrorKind, err: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            err: Box::new(err),
        }
    }

    /// Attempts to downcast the error into `T`.
    #[inline]
    pub fn downcast_ref<T: core::error::Error + 'static>(&self) -> Option<&T> {
        self.err.downcast_ref::<T>()
    }

    /// Describes the kind of error.
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(self.err.deref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl From<Bug> for Error {
    fn from(err: Bug) -> Self {
        Self::new(ErrorKind::Bug, err)
    }
}

impl From<UnsupportedAlgorithm> for Error {
    fn from(err: UnsupportedAlgorithm) -> Self {
        Self::new(ErrorKind::UnsupportedAlgorithm, err)
    }
}

impl From<UnknownKeyFamily> for Error {
    fn from(err: UnknownKeyFamily) -> Self {
        Self::new(ErrorKind::UnsupportedAlgorithm, err)
    }
}

impl From<ImportError> for Error {
    fn from(err: ImportError) -> Self {
        let kind = match &err {
            ImportError::Encoding(_) => ErrorKind::KeyFormat,
            ImportError::WrongFamily { .. } => ErrorKind::KeyTypeMismatch,
            ImportError::Invalid(_) => ErrorKind::InvalidKey,
        };
        Self::new(kind, err)
    }
}

impl From<MacError> for Error {
    fn from(err: MacError) -> Self {
        Self::new(ErrorKind::CryptoOperation, err)
    }
}

impl From<SignError> for Error {
    fn from(err: SignError) -> Self {
        Self::new(ErrorKind::CryptoOperation, err)
    }
}

impl From<RandomError> for Error {
    fn from(err: RandomError) -> Self {
        Self::new(ErrorKind::CryptoOperation, err)
    }
}

impl From<PinError> for Error {
    fn from(err: PinError) -> Self {
        let kind = match &err {
            PinError::Acquire(AcquireError::Detached) => ErrorKind::BufferState,
            PinError::Acquire(AcquireError::Unknown) => ErrorKind::Argument,
            PinError::WrongElemKind(_) => ErrorKind::BufferType,
        };
        Self::new(kind, err)
    }
}

impl From<AttachError> for Error {
    fn from(err: AttachError) -> Self {
        let kind = match &err {
            AttachError::Rejected => ErrorKind::Argument,
            AttachError::Unavailable => ErrorKind::Internal,
        };
        Self::new(kind, err)
    }
}

impl From<InvalidArg> for Error {
    fn from(err: InvalidArg) -> Self {
        Self::new(ErrorKind::Argument, err)
    }
}

/// Describes [`Error`].
///
/// The managed runtime maps each kind onto one of its own
/// exception types, so the set and its meaning are part of the
/// wire contract.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ErrorKind {
    /// A caller-supplied argument is missing, out of range, or the
    /// wrong shape.
    ///
    /// [`Error`] can be downcast to [`InvalidArg`].
    Argument,
    /// A managed buffer changed state while the bridge needed it,
    /// for example because its backing store was detached.
    BufferState,
    /// A managed buffer has the wrong element type; only byte
    /// buffers cross the bridge.
    BufferType,
    /// The algorithm or key family identifier is not one the
    /// bridge supports.
    ///
    /// [`Error`] can be downcast to [`UnsupportedAlgorithm`] or
    /// [`UnknownKeyFamily`].
    UnsupportedAlgorithm,
    /// Key data does not parse as the expected format.
    KeyFormat,
    /// Key data parsed, but belongs to a different key family
    /// than the caller asked for.
    KeyTypeMismatch,
    /// Key data parsed as the right family, but the key material
    /// itself is unusable.
    InvalidKey,
    /// The native library reported an operational failure.
    CryptoOperation,
    /// A failure in the bridge itself, not attributable to the
    /// caller.
    Internal,
    /// The bridge reached a state it promised was impossible.
    ///
    /// [`Error`] can be downcast to [`buggy::Bug`].
    Bug,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument => write!(f, "invalid argument"),
            Self::BufferState => write!(f, "buffer state changed"),
            Self::BufferType => write!(f, "unsupported buffer type"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported algorithm"),
            Self::KeyFormat => write!(f, "malformed key data"),
            Self::KeyTypeMismatch => write!(f, "key family mismatch"),
            Self::InvalidKey => write!(f, "invalid key material"),
            Self::CryptoOperation => write!(f, "crypto operation failed"),
            Self::Internal => write!(f, "internal error"),
            Self::Bug => write!(f, "bug"),
        }
    }
}

/// A call argument the bridge rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidArg {
    arg: &'static str,
    reason: String,
}

impl InvalidArg {
    /// Creates an `InvalidArg` for the argument `arg`.
    pub fn new(arg: &'static str, reason: impl Into<String>) -> Self {
        Self {
            arg,
            reason: reason.into(),
        }
    }

    /// The name of the rejected argument.
    pub const fn arg(&self) -> &'static str {
        self.arg
    }
}

impl core::error::Error for InvalidArg {}

impl fmt::Display for InvalidArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid argument `{}`: {}", self.arg, self.reason)
    }
}

/// The boundary-facing projection of an [`Error`].
///
/// This is what the managed runtime re-raises from: the kind picks
/// the exception type, the message becomes its text.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Failure {
    kind: ErrorKind,
    message: String,
}

impl Failure {
    /// Creates a failure directly, for layers that sit outside
    /// [`Error`], such as argument checks at an ABI boundary.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Projects `err` into the form the managed runtime re-raises.
    ///
    /// An error that renders to an empty message gets a fixed
    /// fallback, so the managed side never raises with no reason
    /// attached.
    pub fn project(err: &Error) -> Self {
        let message = err.to_string();
        if message.trim().is_empty() {
            Self {
                kind: err.kind(),
                message: "unknown internal error".into(),
            }
        } else {
            Self {
                kind: err.kind(),
                message,
            }
        }
    }

    /// The kind of failure.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description, never empty.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

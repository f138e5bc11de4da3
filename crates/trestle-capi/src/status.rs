//! Status codes the C ABI returns.

use core::ffi::{CStr, c_char};

use trestle_bridge::ErrorKind;

/// The result of a C ABI call.
///
/// Values are part of the wire contract and are only ever
/// appended. Every code except [`Status::Ok`] leaves the full
/// failure message behind for
/// [`trestle_last_error_message`][crate::trestle_last_error_message].
#[repr(i32)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Status {
    /// The call succeeded.
    Ok = 0,
    /// A caller-supplied argument was rejected.
    Argument = 1,
    /// A managed buffer changed state while the bridge needed it.
    BufferState = 2,
    /// A managed buffer has the wrong element type.
    BufferType = 3,
    /// The algorithm or key family identifier is not supported.
    UnsupportedAlgorithm = 4,
    /// Key data does not parse as the expected format.
    KeyFormat = 5,
    /// Key data belongs to a different key family than requested.
    KeyTypeMismatch = 6,
    /// Key data parsed but fails its family's validity checks.
    InvalidKey = 7,
    /// The underlying cryptographic operation failed.
    CryptoOperation = 8,
    /// The bridge itself failed; nothing the caller did.
    Internal = 9,
    /// An internal invariant did not hold.
    Bug = 10,
    /// A panic was caught at the boundary. The library stays
    /// loaded, but callers should treat this as fatal.
    Panic = 11,
}

impl Status {
    /// A short stable name for the code.
    pub const fn name(self) -> &'static CStr {
        match self {
            Self::Ok => c"ok",
            Self::Argument => c"argument",
            Self::BufferState => c"buffer-state",
            Self::BufferType => c"buffer-type",
            Self::UnsupportedAlgorithm => c"unsupported-algorithm",
            Self::KeyFormat => c"key-format",
            Self::KeyTypeMismatch => c"key-type-mismatch",
            Self::InvalidKey => c"invalid-key",
            Self::CryptoOperation => c"crypto-operation",
            Self::Internal => c"internal",
            Self::Bug => c"bug",
            Self::Panic => c"panic",
        }
    }

    /// Converts a raw wire value back into a [`Status`].
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::Argument),
            2 => Some(Self::BufferState),
            3 => Some(Self::BufferType),
            4 => Some(Self::UnsupportedAlgorithm),
            5 => Some(Self::KeyFormat),
            6 => Some(Self::KeyTypeMismatch),
            7 => Some(Self::InvalidKey),
            8 => Some(Self::CryptoOperation),
            9 => Some(Self::Internal),
            10 => Some(Self::Bug),
            11 => Some(Self::Panic),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Argument => Self::Argument,
            ErrorKind::BufferState => Self::BufferState,
            ErrorKind::BufferType => Self::BufferType,
            ErrorKind::UnsupportedAlgorithm => Self::UnsupportedAlgorithm,
            ErrorKind::KeyFormat => Self::KeyFormat,
            ErrorKind::KeyTypeMismatch => Self::KeyTypeMismatch,
            ErrorKind::InvalidKey => Self::InvalidKey,
            ErrorKind::CryptoOperation => Self::CryptoOperation,
            ErrorKind::Internal => Self::Internal,
            ErrorKind::Bug => Self::Bug,
        }
    }
}

/// Returns the stable name of a status code, or `"unknown"` for a
/// value outside the table.
///
/// The pointer refers to static storage and never becomes invalid.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_status_name(status: i32) -> *const c_char {
    let name = match Status::from_raw(status) {
        Some(status) => status.name(),
        None => c"unknown",
    };
    name.as_ptr()
}

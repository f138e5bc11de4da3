//! Errors reported by the primitives.

use alloc::string::String;

use crate::keys::KeyFamily;

/// The wire identifier does not name a supported hash algorithm.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unsupported hash algorithm identifier {0}")]
pub struct UnsupportedAlgorithm(pub i64);

/// The wire identifier does not name a supported key family.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown key family identifier {0}")]
pub struct UnknownKeyFamily(pub i64);

/// The reason a key could not be imported.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ImportError {
    /// The key bytes do not parse as the expected DER envelope.
    #[error("malformed key data: {0}")]
    Encoding(String),
    /// The envelope parsed, but names a different key family than
    /// the caller asked for.
    #[error("key family mismatch: expected {expected}, found OID {found}")]
    WrongFamily {
        /// The family the caller asked for.
        expected: KeyFamily,
        /// The OID the envelope actually carries.
        found: String,
    },
    /// The envelope and algorithm are right, but the key material
    /// itself is unusable.
    #[error("invalid key material: {0}")]
    Invalid(String),
}

/// Keying an HMAC context failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("HMAC keying failed: {0}")]
pub struct MacError(pub String);

/// Producing a signature failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("signing failed: {0}")]
pub struct SignError(pub String);

/// The platform entropy source failed.
#[cfg(feature = "getrandom")]
#[cfg_attr(docsrs, doc(cfg(feature = "getrandom")))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("entropy source failure: {0}")]
pub struct RandomError(pub getrandom::Error);

//! Incremental hashing over the bridge's fixed algorithm set.

use alloc::vec::Vec;
use core::fmt;

use digest::Digest as _;

use crate::error::UnsupportedAlgorithm;

/// A hash algorithm the bridge understands.
///
/// The discriminants are the identifiers the managed runtime sends
/// over the wire and must never be renumbered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashAlg {
    /// SHA-1. Kept for parity with the managed API surface.
    Sha1 = 0,
    /// SHA-256.
    Sha256 = 1,
    /// SHA-384.
    Sha384 = 2,
    /// SHA-512.
    Sha512 = 3,
}

impl HashAlg {
    /// Maps a wire identifier to an algorithm.
    pub const fn from_id(id: i64) -> Result<Self, UnsupportedAlgorithm> {
        match id {
            0 => Ok(Self::Sha1),
            1 => Ok(Self::Sha256),
            2 => Ok(Self::Sha384),
            3 => Ok(Self::Sha512),
            _ => Err(UnsupportedAlgorithm(id)),
        }
    }

    /// The algorithm's wire identifier.
    pub const fn id(self) -> i64 {
        self as i64
    }

    /// The size in octets of the algorithm's digest.
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        };
        write!(f, "{name}")
    }
}

/// An incremental digest context.
pub struct Digest {
    alg: HashAlg,
    inner: Inner,
}

enum Inner {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Digest {
    /// Creates a digest context for `alg`.
    pub fn new(alg: HashAlg) -> Self {
        let inner = match alg {
            HashAlg::Sha1 => Inner::Sha1(sha1::Sha1::new()),
            HashAlg::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            HashAlg::Sha384 => Inner::Sha384(sha2::Sha384::new()),
            HashAlg::Sha512 => Inner::Sha512(sha2::Sha512::new()),
        };
        Self { alg, inner }
    }

    /// The algorithm this context hashes with.
    pub const fn alg(&self) -> HashAlg {
        self.alg
    }

    /// The size in octets of the digest [`finalize_reset`][Self::finalize_reset]
    /// will produce.
    pub const fn output_size(&self) -> usize {
        self.alg.digest_size()
    }

    /// Adds `data` to the running hash.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(d) => d.update(data),
            Inner::Sha256(d) => d.update(data),
            Inner::Sha384(d) => d.update(data),
            Inner::Sha512(d) => d.update(data),
        }
    }

    /// Completes the hash and returns the digest.
    ///
    /// The context is reset to the empty message, not consumed, so
    /// a misbehaving caller that keeps writing afterward corrupts
    /// nothing.
    pub fn finalize_reset(&mut self) -> Vec<u8> {
        match &mut self.inner {
            Inner::Sha1(d) => d.finalize_reset().to_vec(),
            Inner::Sha256(d) => d.finalize_reset().to_vec(),
            Inner::Sha384(d) => d.finalize_reset().to_vec(),
            Inner::Sha512(d) => d.finalize_reset().to_vec(),
        }
    }
}

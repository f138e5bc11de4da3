//! Cryptographic primitives for the Trestle bridge.
//!
//! # Overview
//!
//! The bridge exposes a small, fixed menu of operations to the
//! managed runtime: incremental digests, incremental HMAC,
//! RSASSA-PKCS1-v1_5 and ECDSA P-256 signatures, key import,
//! random fill, and constant time comparison. This crate is the
//! native half of that menu.
//!
//! Everything here is synchronous and allocation-light. Contexts
//! are plain owned values; the bridge layer decides how they are
//! shared, registered, and reclaimed. Nothing in this crate knows
//! about handles, finalizers, or the managed heap.
//!
//! Algorithms are named by small integer identifiers because that
//! is what crosses the language boundary. The identifiers are part
//! of the wire contract and must never be renumbered.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "getrandom")]
mod csprng;
mod ct;
mod error;
mod hash;
mod keys;
mod mac;
mod sig;

#[cfg(feature = "getrandom")]
#[cfg_attr(docsrs, doc(cfg(feature = "getrandom")))]
pub use csprng::*;
pub use ct::*;
pub use error::*;
pub use hash::*;
pub use keys::*;
pub use mac::*;
pub use sig::*;

//! The Trestle bridge core.
//!
//! # Overview
//!
//! Trestle lets a garbage-collected runtime drive native
//! cryptography without ever holding a native pointer. This crate
//! is the part that makes that safe:
//!
//! - contexts live in a [`Registry`] and cross the boundary as
//!   integer [`Handle`]s, so a stale or forged handle can be
//!   rejected instead of dereferenced;
//! - managed buffers are only touched through a [`PinnedBuf`],
//!   which releases its pin exactly once, no matter how the
//!   operation ends;
//! - every context is freed exactly once, whether the program
//!   destroys it explicitly or a [`Finalizer`] reclaims it after
//!   collection, and the race between the two is resolved
//!   atomically;
//! - failures cross the boundary as a [`Failure`]: an error kind
//!   the managed side maps onto its own exception types plus a
//!   human-readable message.
//!
//! The embedder supplies the runtime-specific glue through the
//! [`BufferHost`] and [`GcHost`] traits; the [`dispatch`] table is
//! the call surface built on top of them.
//!
//! Misuse that can only come from a broken binding, such as a
//! handle that was already destroyed or a digest operation applied
//! to an HMAC context, is a [`buggy::Bug`]: fatal in debug builds,
//! a `Bug`-kind error in release builds. Destroy entry points are
//! the one exception: they free whatever the handle names and stay
//! quiet in release builds, because a leak is worse than a
//! tolerated mismatch.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod bridge;
mod buffer;
pub mod dispatch;
mod error;
mod finalizer;
mod host;
mod registry;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use bridge::{Bridge, CtxKind};
pub use buffer::{PinError, PinnedBuf};
pub use error::{Error, ErrorKind, Failure, InvalidArg};
pub use finalizer::Finalizer;
pub use host::{
    AcquireError, AttachError, BufToken, BufferHost, ElemKind, GcHost, ObjToken, RawView,
};
pub use registry::{Handle, Registry, StaleHandle};

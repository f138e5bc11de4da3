//! What the bridge needs from its embedder.
//!
//! The embedder owns the managed runtime: only it can pin managed
//! buffers in place or ask the collector to run a finalizer. The
//! bridge reaches those powers exclusively through the traits
//! here, which keeps the lifecycle logic testable without a
//! runtime attached.

use core::fmt;

use crate::finalizer::Finalizer;

/// Names a managed buffer in embedder space.
pub type BufToken = u64;

/// Names a managed object in embedder space.
pub type ObjToken = u64;

/// The element type of a managed buffer.
///
/// Managed runtimes hand out typed views over the same backing
/// stores; the bridge only ever accepts [`ElemKind::U8`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElemKind {
    /// One octet per element.
    U8,
    /// Signed octets.
    I8,
    /// 16-bit elements.
    U16,
    /// 32-bit elements.
    U32,
    /// 64-bit floating point elements.
    F64,
}

/// A pinned buffer's memory.
///
/// Valid from the `acquire` that produced it until the matching
/// `release`.
#[derive(Copy, Clone, Debug)]
pub struct RawView {
    /// Base address of the pinned memory. May be null only when
    /// `len` is zero.
    pub data: *mut u8,
    /// Length in elements.
    pub len: usize,
    /// Element type of the underlying buffer.
    pub kind: ElemKind,
}

/// Why the embedder refused to pin a buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AcquireError {
    /// The buffer's backing store is detached; its memory is gone
    /// even though the object still exists.
    Detached,
    /// The token does not name a buffer.
    Unknown,
}

impl core::error::Error for AcquireError {}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "buffer is detached from its backing store"),
            Self::Unknown => write!(f, "token does not name a buffer"),
        }
    }
}

/// Pins and releases managed buffers.
///
/// # Contract
///
/// A successful `acquire` keeps the buffer's memory valid and in
/// place until the matching `release`. The bridge calls `release`
/// exactly once per successful `acquire` and never touches the
/// view afterward.
pub trait BufferHost {
    /// Pins the buffer `token` names and returns its memory.
    fn acquire(&self, token: BufToken) -> Result<RawView, AcquireError>;

    /// Unpins a previously acquired buffer.
    fn release(&self, token: BufToken);
}

/// Why a finalizer could not be attached.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachError {
    /// The runtime refused the object; not every managed value can
    /// carry a finalizer.
    Rejected,
    /// No managed runtime is wired up.
    Unavailable,
}

impl core::error::Error for AttachError {}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "object cannot carry a finalizer"),
            Self::Unavailable => write!(f, "no managed runtime is attached"),
        }
    }
}

/// Attaches native finalizers to managed objects.
pub trait GcHost {
    /// Asks the collector to run `finalizer` when the object
    /// `token` names becomes unreachable.
    ///
    /// `size_hint` is the native memory the object keeps alive,
    /// so the collector can weigh it.
    ///
    /// # Contract
    ///
    /// On success the host runs the finalizer at most once. On
    /// failure the host must drop it without running it.
    fn attach_finalizer(
        &self,
        token: ObjToken,
        finalizer: Box<Finalizer>,
        size_hint: usize,
    ) -> Result<(), AttachError>;
}

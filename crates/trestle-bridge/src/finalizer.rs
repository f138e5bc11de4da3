//! The native half of managed-object finalization.

use std::sync::atomic::{AtomicBool, Ordering};

use buggy::Bug;
use tracing::error;

use crate::{bridge::Bridge, registry::Handle};

/// A one-shot reclaimer for the context behind a handle.
///
/// The managed runtime promises to run each finalizer at most
/// once, but a broken embedding can break that promise. `run`
/// keeps its own latch so a second run is caught and reported
/// instead of reaching the registry.
pub struct Finalizer {
    bridge: Bridge,
    handle: Handle,
    size_hint: usize,
    ran: AtomicBool,
}

impl Finalizer {
    pub(crate) fn new(bridge: Bridge, handle: Handle, size_hint: usize) -> Self {
        Self {
            bridge,
            handle,
            size_hint,
            ran: AtomicBool::new(false),
        }
    }

    /// The handle this finalizer reclaims.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The native memory the finalized object keeps alive, as
    /// reported by the caller that attached the finalizer.
    pub fn size_hint(&self) -> usize {
        self.size_hint
    }

    /// Reclaims the context, unless the program already destroyed
    /// it explicitly; that case is an expected race and does
    /// nothing.
    ///
    /// Running the same finalizer twice is a runtime bug: fatal in
    /// debug builds, reported and ignored in release builds.
    pub fn run(&self) {
        if self.ran.swap(true, Ordering::AcqRel) {
            let bug = Bug::new("finalizer ran twice");
            error!(handle = %self.handle, %bug, "finalizer ran twice");
            return;
        }
        self.bridge.reclaim(self.handle);
    }
}

//! Test doubles for the host traits.
//!
//! [`MockHost`] stands in for a managed runtime: it hands out
//! tokens over heap-backed buffers, keeps the pin balance, and
//! queues attached finalizers until a test triggers collection.

#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::panic)]

use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use crate::{
    finalizer::Finalizer,
    host::{AcquireError, AttachError, BufToken, BufferHost, ElemKind, GcHost, ObjToken, RawView},
};

struct MockBuf {
    data: Box<[u8]>,
    kind: ElemKind,
    pins: usize,
    detached: bool,
}

/// An in-process stand-in for a managed runtime.
pub struct MockHost {
    buffers: Mutex<HashMap<BufToken, MockBuf>>,
    finalizers: Mutex<Vec<(ObjToken, Box<Finalizer>)>>,
    reject_attach: AtomicBool,
    next_token: AtomicU64,
}

impl MockHost {
    /// Creates a host with no buffers and no queued finalizers.
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            finalizers: Mutex::new(Vec::new()),
            reject_attach: AtomicBool::new(false),
            next_token: AtomicU64::new(1),
        }
    }

    /// Registers a byte buffer and returns its token.
    pub fn add_buffer(&self, data: &[u8]) -> BufToken {
        self.add_typed(data, ElemKind::U8)
    }

    /// Registers a buffer with an arbitrary element kind.
    pub fn add_typed(&self, data: &[u8], kind: ElemKind) -> BufToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.lock_buffers().insert(
            token,
            MockBuf {
                data: data.into(),
                kind,
                pins: 0,
                detached: false,
            },
        );
        token
    }

    /// Detaches a buffer from its backing store. Pins taken later
    /// fail with [`AcquireError::Detached`].
    pub fn detach(&self, token: BufToken) {
        let mut buffers = self.lock_buffers();
        let Some(buf) = buffers.get_mut(&token) else {
            panic!("no buffer for token {token}");
        };
        buf.detached = true;
    }

    /// The buffer's current contents.
    pub fn read_buffer(&self, token: BufToken) -> Vec<u8> {
        let buffers = self.lock_buffers();
        let Some(buf) = buffers.get(&token) else {
            panic!("no buffer for token {token}");
        };
        buf.data.to_vec()
    }

    /// How many pins are currently held across all buffers.
    pub fn pinned(&self) -> usize {
        self.lock_buffers().values().map(|buf| buf.pins).sum()
    }

    /// Whether every acquire has been balanced by a release.
    pub fn all_released(&self) -> bool {
        self.pinned() == 0
    }

    /// Makes every future finalizer attachment fail with
    /// [`AttachError::Rejected`].
    pub fn reject_attachments(&self) {
        self.reject_attach.store(true, Ordering::Relaxed);
    }

    /// How many finalizers are attached but not yet collected.
    pub fn pending_finalizers(&self) -> usize {
        self.lock_finalizers().len()
    }

    /// Collects one object: runs every finalizer attached to it.
    pub fn collect(&self, obj: ObjToken) {
        let mut run = Vec::new();
        {
            let mut finalizers = self.lock_finalizers();
            let mut kept = Vec::new();
            for entry in finalizers.drain(..) {
                if entry.0 == obj {
                    run.push(entry.1);
                } else {
                    kept.push(entry);
                }
            }
            *finalizers = kept;
        }
        // Run outside the lock; a finalizer is allowed to touch
        // the host again.
        for finalizer in run {
            finalizer.run();
        }
    }

    /// Collects everything: runs every queued finalizer.
    pub fn collect_all(&self) {
        let run: Vec<_> = self.lock_finalizers().drain(..).collect();
        for (_, finalizer) in run {
            finalizer.run();
        }
    }

    fn lock_buffers(&self) -> std::sync::MutexGuard<'_, HashMap<BufToken, MockBuf>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_finalizers(&self) -> std::sync::MutexGuard<'_, Vec<(ObjToken, Box<Finalizer>)>> {
        self.finalizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferHost for MockHost {
    fn acquire(&self, token: BufToken) -> Result<RawView, AcquireError> {
        let mut buffers = self.lock_buffers();
        let buf = buffers.get_mut(&token).ok_or(AcquireError::Unknown)?;
        if buf.detached {
            return Err(AcquireError::Detached);
        }
        buf.pins += 1;
        Ok(RawView {
            data: buf.data.as_mut_ptr(),
            len: buf.data.len() / elem_width(buf.kind),
            kind: buf.kind,
        })
    }

    fn release(&self, token: BufToken) {
        let mut buffers = self.lock_buffers();
        let Some(buf) = buffers.get_mut(&token) else {
            panic!("release of unknown token {token}");
        };
        assert!(buf.pins > 0, "release without a matching acquire");
        buf.pins -= 1;
    }
}

impl GcHost for MockHost {
    fn attach_finalizer(
        &self,
        token: ObjToken,
        finalizer: Box<Finalizer>,
        _size_hint: usize,
    ) -> Result<(), AttachError> {
        if self.reject_attach.load(Ordering::Relaxed) {
            return Err(AttachError::Rejected);
        }
        self.lock_finalizers().push((token, finalizer));
        Ok(())
    }
}

const fn elem_width(kind: ElemKind) -> usize {
    match kind {
        ElemKind::U8 | ElemKind::I8 => 1,
        ElemKind::U16 => 2,
        ElemKind::U32 => 4,
        ElemKind::F64 => 8,
    }
}

//! Pinned views over managed buffers.

use core::fmt;

use crate::host::{AcquireError, BufToken, BufferHost, ElemKind};

/// A managed buffer pinned for the duration of a native call.
///
/// While the pin is held the collector will not move or reclaim
/// the underlying memory. Dropping the `PinnedBuf` releases the
/// pin exactly once, however the operation ends.
pub struct PinnedBuf<'h, H: BufferHost + ?Sized> {
    host: &'h H,
    token: BufToken,
    data: *mut u8,
    len: usize,
}

impl<'h, H: BufferHost + ?Sized> PinnedBuf<'h, H> {
    /// Pins the buffer `token` names.
    ///
    /// A buffer whose elements are not single octets is released
    /// again immediately and rejected; partial pins never escape.
    pub fn acquire(host: &'h H, token: BufToken) -> Result<Self, PinError> {
        let view = host.acquire(token)?;
        if view.kind != ElemKind::U8 {
            // The pin is already taken; give it back before
            // reporting.
            host.release(token);
            return Err(PinError::WrongElemKind(view.kind));
        }
        Ok(Self {
            host,
            token,
            data: view.data,
            len: view.len,
        })
    }

    /// The pinned bytes.
    pub fn bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: the host contract keeps the memory valid until
        // release, and `acquire` checked that elements are octets.
        // Non-empty views have non-null data.
        unsafe { core::slice::from_raw_parts(self.data, self.len) }
    }

    /// The pinned bytes, writable.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: as for `bytes`, and `&mut self` keeps this view
        // unique.
        unsafe { core::slice::from_raw_parts_mut(self.data, self.len) }
    }

    /// Length in octets.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<H: BufferHost + ?Sized> fmt::Debug for PinnedBuf<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedBuf")
            .field("token", &self.token)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl<H: BufferHost + ?Sized> Drop for PinnedBuf<'_, H> {
    fn drop(&mut self) {
        self.host.release(self.token);
    }
}

/// Why a buffer could not be pinned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinError {
    /// The embedder refused the pin.
    Acquire(AcquireError),
    /// The buffer's elements are not single octets.
    WrongElemKind(ElemKind),
}

impl core::error::Error for PinError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Acquire(err) => Some(err),
            Self::WrongElemKind(_) => None,
        }
    }
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire(err) => err.fmt(f),
            Self::WrongElemKind(kind) => {
                write!(f, "unsupported {kind:?} buffer; only byte buffers cross the bridge")
            }
        }
    }
}

impl From<AcquireError> for PinError {
    fn from(err: AcquireError) -> Self {
        Self::Acquire(err)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use crate::testing::MockHost;

    use super::*;

    #[test]
    fn test_pin_releases_on_drop() {
        let host = MockHost::new();
        let token = host.add_buffer(b"payload");

        {
            let pin = PinnedBuf::acquire(&host, token).expect("pin");
            assert_eq!(pin.bytes(), b"payload");
            assert_eq!(pin.len(), 7);
            assert_eq!(host.pinned(), 1);
        }
        assert!(host.all_released());
    }

    #[test]
    fn test_pin_is_writable() {
        let host = MockHost::new();
        let token = host.add_buffer(&[0; 4]);

        {
            let mut pin = PinnedBuf::acquire(&host, token).expect("pin");
            pin.bytes_mut().copy_from_slice(b"abcd");
        }
        assert_eq!(host.read_buffer(token), b"abcd");
        assert!(host.all_released());
    }

    #[test]
    fn test_wrong_element_kind_is_rejected_and_released() {
        let host = MockHost::new();
        let token = host.add_typed(&[0; 8], ElemKind::U16);

        let err = PinnedBuf::acquire(&host, token).expect_err("not a byte buffer");
        assert_eq!(err, PinError::WrongElemKind(ElemKind::U16));
        // The rejected pin must not be left held.
        assert!(host.all_released());
    }

    #[test]
    fn test_detached_buffer_is_rejected() {
        let host = MockHost::new();
        let token = host.add_buffer(b"gone");
        host.detach(token);

        let err = PinnedBuf::acquire(&host, token).expect_err("detached");
        assert_eq!(err, PinError::Acquire(AcquireError::Detached));
        assert!(host.all_released());
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let host = MockHost::new();
        let err = PinnedBuf::acquire(&host, 999).expect_err("unknown");
        assert_eq!(err, PinError::Acquire(AcquireError::Unknown));
    }

    #[test]
    fn test_empty_buffer() {
        let host = MockHost::new();
        let token = host.add_buffer(&[]);

        let mut pin = PinnedBuf::acquire(&host, token).expect("pin");
        assert!(pin.is_empty());
        assert_eq!(pin.bytes(), &[]);
        assert_eq!(pin.bytes_mut(), &mut []);
    }

    #[test]
    fn test_overlapping_pins() {
        let host = MockHost::new();
        let a = host.add_buffer(b"left");
        let b = host.add_buffer(b"right");

        let pin_a = PinnedBuf::acquire(&host, a).expect("pin");
        let pin_b = PinnedBuf::acquire(&host, b).expect("pin");
        assert_eq!(host.pinned(), 2);
        assert_eq!(pin_a.bytes(), b"left");
        assert_eq!(pin_b.bytes(), b"right");
        drop(pin_a);
        assert_eq!(host.pinned(), 1);
        drop(pin_b);
        assert!(host.all_released());
    }
}

//! Per-thread storage for the most recent failure.
//!
//! Status codes alone cannot carry the failure text, so every
//! fallible entry point deposits its [`Failure`] here and the
//! caller reads it back through
//! [`trestle_last_error_message`][crate::trestle_last_error_message]
//! before making another call on the same thread.

use core::cell::RefCell;

use trestle_bridge::Failure;

thread_local! {
    static LAST_ERROR: RefCell<Option<Failure>> = const { RefCell::new(None) };
}

pub(crate) fn clear() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn set(failure: Failure) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(failure));
}

pub(crate) fn with<R>(f: impl FnOnce(Option<&Failure>) -> R) -> R {
    LAST_ERROR.with(|slot| f(slot.borrow().as_ref()))
}

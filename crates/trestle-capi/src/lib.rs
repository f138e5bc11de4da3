//! C ABI over the Trestle bridge.
//!
//! Every entry point is exported under a stable name and listed in
//! [`SYMBOLS`] in wire order, so embedders that load the library
//! dynamically can resolve them through [`trestle_lookup_symbol`]
//! instead of the platform linker. Fallible entry points return a
//! [`Status`]; the full message behind the calling thread's most
//! recent failure is available from [`trestle_last_error_message`].
//!
//! Panics never unwind across the boundary. They are caught,
//! logged, recorded as the thread's last error, and surfaced as
//! [`Status::Panic`].

#![warn(missing_docs)]

mod api;
mod host;
mod last_error;
mod status;
mod symbols;

pub use api::*;
pub use host::{AttachFn, TRESTLE_HOST_API_VERSION, TrestleHostApi};
pub use status::{Status, trestle_status_name};
pub use symbols::{SYMBOLS, Sym, trestle_lookup_symbol, trestle_symbol_count};

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::OnceLock,
};

use tracing::{debug, error};
use trestle_bridge::{Bridge, Error, ErrorKind, Failure};

/// The process-wide bridge all entry points go through.
pub(crate) fn bridge() -> &'static Bridge {
    static BRIDGE: OnceLock<Bridge> = OnceLock::new();
    BRIDGE.get_or_init(Bridge::new)
}

/// Runs one call behind the C boundary.
///
/// Resets the thread's last error, catches panics, and projects
/// any failure into a [`Status`] plus a stored [`Failure`].
pub(crate) fn boundary<F>(op: &'static str, f: F) -> Status
where
    F: FnOnce() -> Result<(), Error>,
{
    let span = tracing::debug_span!("capi", op);
    let _entered = span.enter();

    last_error::clear();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Status::Ok,
        Ok(Err(err)) => {
            debug!(%err, "call failed");
            let failure = Failure::project(&err);
            let status = Status::from(failure.kind());
            last_error::set(failure);
            status
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(message, "panic caught at the C boundary");
            last_error::set(Failure::new(ErrorKind::Bug, message));
            Status::Panic
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "panic of unknown type"
    }
}

//! The host vtable and the finalizer hand-off to C.
//!
//! The embedder cannot be linked against directly, so it hands the
//! bridge a `#[repr(C)]` table of entry points at startup. The
//! only service the bridge needs back from the host is finalizer
//! attachment; everything else flows the other way.

use core::{ffi::c_void, ptr};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::OnceLock,
};

use tracing::{debug, error, warn};
use trestle_bridge::{AttachError, Error, Finalizer, GcHost, InvalidArg, ObjToken};

/// The layout version of [`TrestleHostApi`] this library expects.
pub const TRESTLE_HOST_API_VERSION: u32 = 1;

/// Registers `callback(peer)` to run when the collector frees
/// `obj`. Returns zero on success; on any other value the caller
/// keeps ownership of `peer`.
pub type AttachFn = unsafe extern "C" fn(
    obj: *mut c_void,
    peer: *mut c_void,
    size_hint: usize,
    callback: unsafe extern "C" fn(*mut c_void),
) -> i32;

/// Entry points the host provides to the bridge.
///
/// Passed to [`trestle_init`][crate::trestle_init] once per
/// process. `version` must equal [`TRESTLE_HOST_API_VERSION`] and
/// every entry point must be populated.
#[repr(C)]
pub struct TrestleHostApi {
    /// The layout version of this struct.
    pub version: u32,
    /// Finalizer registration. `size_hint` is the native footprint
    /// in octets, for collector pacing.
    pub attach_finalizer: Option<AttachFn>,
}

struct Vtable {
    attach_finalizer: AttachFn,
}

static VTABLE: OnceLock<Vtable> = OnceLock::new();

/// Validates and stores the host vtable.
///
/// The first successful registration wins; later calls are
/// accepted and ignored so embedders can initialize from several
/// isolates without coordinating.
pub(crate) fn register(api: &TrestleHostApi) -> Result<(), Error> {
    if api.version != TRESTLE_HOST_API_VERSION {
        return Err(InvalidArg::new(
            "api",
            format!(
                "host API version {} is not supported, need {TRESTLE_HOST_API_VERSION}",
                api.version
            ),
        )
        .into());
    }
    let Some(attach_finalizer) = api.attach_finalizer else {
        return Err(InvalidArg::new("api", "attach_finalizer entry is null").into());
    };
    if VTABLE.set(Vtable { attach_finalizer }).is_err() {
        debug!("host API already registered, keeping the first one");
    }
    Ok(())
}

/// The host behind the registered vtable.
///
/// Object tokens are the managed object's address as handed across
/// the ABI; the bridge treats them opaquely.
pub(crate) struct RegisteredHost;

impl GcHost for RegisteredHost {
    fn attach_finalizer(
        &self,
        token: ObjToken,
        finalizer: Box<Finalizer>,
        size_hint: usize,
    ) -> Result<(), AttachError> {
        let Some(vtable) = VTABLE.get() else {
            warn!("finalizer attachment before host registration");
            return Err(AttachError::Unavailable);
        };
        let obj = ptr::with_exposed_provenance_mut::<c_void>(token as usize);
        let peer = Box::into_raw(finalizer);
        // SAFETY: the registered entry point stays valid for the
        // life of the process, and `peer` stays alive until the
        // host runs the callback or refuses here.
        let rc = unsafe { (vtable.attach_finalizer)(obj, peer.cast(), size_hint, run_finalizer) };
        if rc != 0 {
            // The host kept nothing; take the peer back.
            // SAFETY: `peer` came from `Box::into_raw` above and
            // was not accepted.
            drop(unsafe { Box::from_raw(peer) });
            warn!(rc, "host refused the finalizer attachment");
            return Err(AttachError::Rejected);
        }
        Ok(())
    }
}

/// The callback handed to the host for every attachment. `peer` is
/// the boxed [`Finalizer`] from [`RegisteredHost`].
///
/// The collector may invoke it from any thread. A panic must not
/// unwind into the collector.
unsafe extern "C" fn run_finalizer(peer: *mut c_void) {
    if peer.is_null() {
        error!("finalizer callback with a null peer");
        return;
    }
    // SAFETY: `peer` came from `Box::into_raw` during attachment
    // and the host runs each callback at most once.
    let finalizer = unsafe { Box::from_raw(peer.cast::<Finalizer>()) };
    if catch_unwind(AssertUnwindSafe(|| finalizer.run())).is_err() {
        error!("finalizer panicked");
    }
}

//! The exported symbol table.
//!
//! Embedders that cannot resolve names through the platform linker
//! look entry points up by index instead. The index is part of the
//! wire contract: entries are only ever appended, never reordered
//! or removed.

use core::ffi::{CStr, c_void};

use buggy::Bug;
use tracing::error;

use crate::{api, status};

/// One entry in the exported symbol table.
pub struct Sym {
    /// The symbol's exported name.
    pub name: &'static CStr,
    /// The entry point itself.
    pub ptr: *const c_void,
}

// SAFETY: both fields point at immutable static data.
unsafe impl Sync for Sym {}

/// Every exported entry point, in wire order.
pub static SYMBOLS: &[Sym] = &[
    Sym {
        name: c"trestle_init",
        ptr: api::trestle_init as *const c_void,
    },
    Sym {
        name: c"trestle_symbol_count",
        ptr: trestle_symbol_count as *const c_void,
    },
    Sym {
        name: c"trestle_status_name",
        ptr: status::trestle_status_name as *const c_void,
    },
    Sym {
        name: c"trestle_last_error_message",
        ptr: api::trestle_last_error_message as *const c_void,
    },
    Sym {
        name: c"trestle_digest_create",
        ptr: api::trestle_digest_create as *const c_void,
    },
    Sym {
        name: c"trestle_digest_update",
        ptr: api::trestle_digest_update as *const c_void,
    },
    Sym {
        name: c"trestle_digest_output_size",
        ptr: api::trestle_digest_output_size as *const c_void,
    },
    Sym {
        name: c"trestle_digest_finalize",
        ptr: api::trestle_digest_finalize as *const c_void,
    },
    Sym {
        name: c"trestle_digest_destroy",
        ptr: api::trestle_digest_destroy as *const c_void,
    },
    Sym {
        name: c"trestle_hmac_create",
        ptr: api::trestle_hmac_create as *const c_void,
    },
    Sym {
        name: c"trestle_hmac_update",
        ptr: api::trestle_hmac_update as *const c_void,
    },
    Sym {
        name: c"trestle_hmac_output_size",
        ptr: api::trestle_hmac_output_size as *const c_void,
    },
    Sym {
        name: c"trestle_hmac_finalize",
        ptr: api::trestle_hmac_finalize as *const c_void,
    },
    Sym {
        name: c"trestle_hmac_destroy",
        ptr: api::trestle_hmac_destroy as *const c_void,
    },
    Sym {
        name: c"trestle_sign_create",
        ptr: api::trestle_sign_create as *const c_void,
    },
    Sym {
        name: c"trestle_sign_update",
        ptr: api::trestle_sign_update as *const c_void,
    },
    Sym {
        name: c"trestle_sign_size",
        ptr: api::trestle_sign_size as *const c_void,
    },
    Sym {
        name: c"trestle_sign_finalize",
        ptr: api::trestle_sign_finalize as *const c_void,
    },
    Sym {
        name: c"trestle_sign_destroy",
        ptr: api::trestle_sign_destroy as *const c_void,
    },
    Sym {
        name: c"trestle_verify_create",
        ptr: api::trestle_verify_create as *const c_void,
    },
    Sym {
        name: c"trestle_verify_update",
        ptr: api::trestle_verify_update as *const c_void,
    },
    Sym {
        name: c"trestle_verify_finalize",
        ptr: api::trestle_verify_finalize as *const c_void,
    },
    Sym {
        name: c"trestle_verify_destroy",
        ptr: api::trestle_verify_destroy as *const c_void,
    },
    Sym {
        name: c"trestle_import_public_key",
        ptr: api::trestle_import_public_key as *const c_void,
    },
    Sym {
        name: c"trestle_import_private_key",
        ptr: api::trestle_import_private_key as *const c_void,
    },
    Sym {
        name: c"trestle_key_destroy",
        ptr: api::trestle_key_destroy as *const c_void,
    },
    Sym {
        name: c"trestle_fill_random",
        ptr: api::trestle_fill_random as *const c_void,
    },
    Sym {
        name: c"trestle_constant_time_eq",
        ptr: api::trestle_constant_time_eq as *const c_void,
    },
    Sym {
        name: c"trestle_attach_finalizer",
        ptr: api::trestle_attach_finalizer as *const c_void,
    },
];

fn lookup(index: i32) -> *const c_void {
    let sym = usize::try_from(index).ok().and_then(|i| SYMBOLS.get(i));
    match sym {
        Some(sym) => sym.ptr,
        None => {
            // An index outside the table is a binding bug, not a
            // recoverable failure.
            let bug = Bug::new("symbol index out of table range");
            error!(index, %bug, "symbol lookup failed");
            core::ptr::null()
        }
    }
}

/// Resolves the entry point at `index` in [`SYMBOLS`].
///
/// An out-of-range index is fatal in debug builds and a logged
/// null pointer in release builds.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_lookup_symbol(index: i32) -> *const c_void {
    lookup(index)
}

/// Returns the number of entries in [`SYMBOLS`].
#[unsafe(no_mangle)]
pub extern "C" fn trestle_symbol_count() -> i32 {
    i32::try_from(SYMBOLS.len()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_table_order_is_the_wire_contract() {
        let names: Vec<&CStr> = SYMBOLS.iter().map(|sym| sym.name).collect();
        assert_eq!(
            names,
            [
                c"trestle_init",
                c"trestle_symbol_count",
                c"trestle_status_name",
                c"trestle_last_error_message",
                c"trestle_digest_create",
                c"trestle_digest_update",
                c"trestle_digest_output_size",
                c"trestle_digest_finalize",
                c"trestle_digest_destroy",
                c"trestle_hmac_create",
                c"trestle_hmac_update",
                c"trestle_hmac_output_size",
                c"trestle_hmac_finalize",
                c"trestle_hmac_destroy",
                c"trestle_sign_create",
                c"trestle_sign_update",
                c"trestle_sign_size",
                c"trestle_sign_finalize",
                c"trestle_sign_destroy",
                c"trestle_verify_create",
                c"trestle_verify_update",
                c"trestle_verify_finalize",
                c"trestle_verify_destroy",
                c"trestle_import_public_key",
                c"trestle_import_private_key",
                c"trestle_key_destroy",
                c"trestle_fill_random",
                c"trestle_constant_time_eq",
                c"trestle_attach_finalizer",
            ]
        );
    }

    #[test]
    fn test_every_entry_resolves() {
        for (i, sym) in SYMBOLS.iter().enumerate() {
            let index = i32::try_from(i).expect("table is small");
            assert!(!sym.ptr.is_null(), "{:?}", sym.name);
            assert_eq!(trestle_lookup_symbol(index), sym.ptr, "{:?}", sym.name);
        }
        assert_eq!(trestle_symbol_count(), 29);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "symbol index out of table range")]
    fn test_out_of_range_lookup_is_fatal_in_debug() {
        let _ = lookup(9999);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_out_of_range_lookup_is_null_in_release() {
        assert!(lookup(9999).is_null());
        assert!(lookup(-1).is_null());
    }
}

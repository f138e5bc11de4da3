//! The exported entry points.
//!
//! Each function validates its raw arguments, then runs the
//! matching bridge operation behind [`boundary`]. Byte outputs go
//! into caller-allocated buffers whose size must match the
//! corresponding size query exactly; the size is checked before
//! the operation runs, so a wrong-size buffer never consumes a
//! context.

use core::{
    ffi::{c_char, c_void},
    slice,
};

use trestle_bridge::{Error, Handle, InvalidArg};

use crate::{
    boundary, bridge,
    host::{self, RegisteredHost, TrestleHostApi},
    last_error,
    status::Status,
};

/// Registers the host vtable and readies the library.
///
/// Must be called before any entry point that can allocate a
/// context. The first successful registration wins; later calls
/// are accepted and ignored.
///
/// # Safety
///
/// A non-null `api` must point to an initialized
/// [`TrestleHostApi`] that stays valid for the duration of the
/// call; the entry points it names must stay valid for the life of
/// the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_init(api: *const TrestleHostApi) -> Status {
    boundary("trestle_init", || {
        if api.is_null() || !api.is_aligned() {
            return Err(InvalidArg::new("api", "null or misaligned pointer").into());
        }
        // SAFETY: non-null and aligned per the check above, valid
        // per this function's contract.
        let api = unsafe { &*api };
        host::register(api)
    })
}

/// Copies the calling thread's most recent failure message.
///
/// Pass a null `buf` to query the required size, terminating NUL
/// included; it is written to `*len`. With a non-null `buf` the
/// message is copied and NUL-terminated if `*len` is big enough,
/// and `*len` is set to the exact size either way. A successful
/// copy drains the register.
///
/// Every fallible entry point also resets the register on entry,
/// so read the message before the next call on this thread.
///
/// # Safety
///
/// `len` must be valid for reads and writes. A non-null `buf` must
/// be valid for writes of `*len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_last_error_message(buf: *mut c_char, len: *mut usize) -> Status {
    // Not routed through `boundary`, which would clear the very
    // message being read.
    if len.is_null() || !len.is_aligned() {
        return Status::Argument;
    }
    // SAFETY: non-null and aligned per the check above, valid per
    // this function's contract.
    let len = unsafe { &mut *len };
    let status = last_error::with(|failure| {
        let message = failure.map_or("", |failure| failure.message());
        let need = message.len().saturating_add(1);
        if buf.is_null() {
            *len = need;
            return Status::Ok;
        }
        if *len < need {
            *len = need;
            return Status::Argument;
        }
        // SAFETY: `buf` holds at least `need` writable octets.
        unsafe {
            core::ptr::copy_nonoverlapping(message.as_ptr(), buf.cast::<u8>(), message.len());
            buf.cast::<u8>().add(message.len()).write(0);
        }
        *len = need;
        Status::Ok
    });
    if status == Status::Ok && !buf.is_null() {
        last_error::clear();
    }
    status
}

/// Creates a digest context for hash algorithm `alg` and writes
/// its handle to `*handle_out`.
///
/// # Safety
///
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_digest_create(alg: i64, handle_out: *mut i64) -> Status {
    boundary("trestle_digest_create", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        *out = bridge().digest_create(alg)?.to_wire();
        Ok(())
    })
}

/// Adds `data_len` octets to the digest behind `handle`.
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `data_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_digest_update(
    handle: i64,
    data: *const u8,
    data_len: usize,
) -> Status {
    boundary("trestle_digest_update", || {
        // SAFETY: per this function's contract.
        let data = unsafe { bytes_in(data, data_len, "data")? };
        bridge().digest_update(Handle::from_wire(handle), data)
    })
}

/// Writes the digest's output size in octets to `*size_out`.
///
/// # Safety
///
/// `size_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_digest_output_size(handle: i64, size_out: *mut usize) -> Status {
    boundary("trestle_digest_output_size", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(size_out, "size_out")? };
        *out = bridge().digest_output_size(Handle::from_wire(handle))?;
        Ok(())
    })
}

/// Completes the digest behind `handle` into `out`.
///
/// `out_len` must equal the value reported by
/// [`trestle_digest_output_size`]; on a size mismatch the context
/// is left untouched.
///
/// # Safety
///
/// `out` must be valid for writes of `out_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_digest_finalize(
    handle: i64,
    out: *mut u8,
    out_len: usize,
) -> Status {
    boundary("trestle_digest_finalize", || {
        let handle = Handle::from_wire(handle);
        let need = bridge().digest_output_size(handle)?;
        // SAFETY: per this function's contract.
        let out = unsafe { bytes_out(out, out_len, "out")? };
        if out.len() != need {
            return Err(size_mismatch(need, out.len()));
        }
        out.copy_from_slice(&bridge().digest_finalize(handle)?);
        Ok(())
    })
}

/// Destroys the digest context behind `handle`.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_digest_destroy(handle: i64) -> Status {
    boundary("trestle_digest_destroy", || {
        bridge().digest_destroy(Handle::from_wire(handle))
    })
}

/// Creates an HMAC context for hash algorithm `alg` keyed with
/// `key_len` octets of `key`, and writes its handle to
/// `*handle_out`.
///
/// # Safety
///
/// A non-null `key` must be valid for reads of `key_len` octets;
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_hmac_create(
    alg: i64,
    key: *const u8,
    key_len: usize,
    handle_out: *mut i64,
) -> Status {
    boundary("trestle_hmac_create", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        // SAFETY: per this function's contract.
        let key = unsafe { bytes_in(key, key_len, "key")? };
        *out = bridge().hmac_create(alg, key)?.to_wire();
        Ok(())
    })
}

/// Adds `data_len` octets to the MAC behind `handle`.
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `data_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_hmac_update(
    handle: i64,
    data: *const u8,
    data_len: usize,
) -> Status {
    boundary("trestle_hmac_update", || {
        // SAFETY: per this function's contract.
        let data = unsafe { bytes_in(data, data_len, "data")? };
        bridge().hmac_update(Handle::from_wire(handle), data)
    })
}

/// Writes the MAC's output size in octets to `*size_out`.
///
/// # Safety
///
/// `size_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_hmac_output_size(handle: i64, size_out: *mut usize) -> Status {
    boundary("trestle_hmac_output_size", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(size_out, "size_out")? };
        *out = bridge().hmac_output_size(Handle::from_wire(handle))?;
        Ok(())
    })
}

/// Completes the MAC behind `handle` into `out`.
///
/// `out_len` must equal the value reported by
/// [`trestle_hmac_output_size`]; on a size mismatch the context is
/// left untouched.
///
/// # Safety
///
/// `out` must be valid for writes of `out_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_hmac_finalize(
    handle: i64,
    out: *mut u8,
    out_len: usize,
) -> Status {
    boundary("trestle_hmac_finalize", || {
        let handle = Handle::from_wire(handle);
        let need = bridge().hmac_output_size(handle)?;
        // SAFETY: per this function's contract.
        let out = unsafe { bytes_out(out, out_len, "out")? };
        if out.len() != need {
            return Err(size_mismatch(need, out.len()));
        }
        out.copy_from_slice(&bridge().hmac_finalize(handle)?);
        Ok(())
    })
}

/// Destroys the HMAC context behind `handle`.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_hmac_destroy(handle: i64) -> Status {
    boundary("trestle_hmac_destroy", || {
        bridge().hmac_destroy(Handle::from_wire(handle))
    })
}

/// Creates a signing context over hash algorithm `alg` with the
/// private key behind `key`, and writes its handle to
/// `*handle_out`.
///
/// The key context may be destroyed while the signer lives; the
/// signer keeps its own copy.
///
/// # Safety
///
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_sign_create(alg: i64, key: i64, handle_out: *mut i64) -> Status {
    boundary("trestle_sign_create", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        *out = bridge()
            .sign_create(alg, Handle::from_wire(key))?
            .to_wire();
        Ok(())
    })
}

/// Adds `data_len` octets to the message being signed.
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `data_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_sign_update(
    handle: i64,
    data: *const u8,
    data_len: usize,
) -> Status {
    boundary("trestle_sign_update", || {
        // SAFETY: per this function's contract.
        let data = unsafe { bytes_in(data, data_len, "data")? };
        bridge().sign_update(Handle::from_wire(handle), data)
    })
}

/// Writes the signature size in octets to `*size_out`.
///
/// # Safety
///
/// `size_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_sign_size(handle: i64, size_out: *mut usize) -> Status {
    boundary("trestle_sign_size", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(size_out, "size_out")? };
        *out = bridge().sign_size(Handle::from_wire(handle))?;
        Ok(())
    })
}

/// Signs the accumulated message into `out`.
///
/// `out_len` must equal the value reported by
/// [`trestle_sign_size`]; on a size mismatch the context is left
/// untouched.
///
/// # Safety
///
/// `out` must be valid for writes of `out_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_sign_finalize(
    handle: i64,
    out: *mut u8,
    out_len: usize,
) -> Status {
    boundary("trestle_sign_finalize", || {
        let handle = Handle::from_wire(handle);
        let need = bridge().sign_size(handle)?;
        // SAFETY: per this function's contract.
        let out = unsafe { bytes_out(out, out_len, "out")? };
        if out.len() != need {
            return Err(size_mismatch(need, out.len()));
        }
        out.copy_from_slice(&bridge().sign_finalize(handle)?);
        Ok(())
    })
}

/// Destroys the signing context behind `handle`.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_sign_destroy(handle: i64) -> Status {
    boundary("trestle_sign_destroy", || {
        bridge().sign_destroy(Handle::from_wire(handle))
    })
}

/// Creates a verification context over hash algorithm `alg` with
/// the public key behind `key`, and writes its handle to
/// `*handle_out`.
///
/// # Safety
///
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_verify_create(alg: i64, key: i64, handle_out: *mut i64) -> Status {
    boundary("trestle_verify_create", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        *out = bridge()
            .verify_create(alg, Handle::from_wire(key))?
            .to_wire();
        Ok(())
    })
}

/// Adds `data_len` octets to the message being verified.
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `data_len` octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_verify_update(
    handle: i64,
    data: *const u8,
    data_len: usize,
) -> Status {
    boundary("trestle_verify_update", || {
        // SAFETY: per this function's contract.
        let data = unsafe { bytes_in(data, data_len, "data")? };
        bridge().verify_update(Handle::from_wire(handle), data)
    })
}

/// Checks `signature` against the accumulated message and writes
/// the outcome to `*ok_out`.
///
/// A signature that simply does not match is not an error: the
/// call returns [`Status::Ok`] with `*ok_out` false.
///
/// # Safety
///
/// A non-null `signature` must be valid for reads of
/// `signature_len` octets; `ok_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_verify_finalize(
    handle: i64,
    signature: *const u8,
    signature_len: usize,
    ok_out: *mut bool,
) -> Status {
    boundary("trestle_verify_finalize", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(ok_out, "ok_out")? };
        // SAFETY: per this function's contract.
        let signature = unsafe { bytes_in(signature, signature_len, "signature")? };
        *out = bridge().verify_finalize(Handle::from_wire(handle), signature)?;
        Ok(())
    })
}

/// Destroys the verification context behind `handle`.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_verify_destroy(handle: i64) -> Status {
    boundary("trestle_verify_destroy", || {
        bridge().verify_destroy(Handle::from_wire(handle))
    })
}

/// Imports a DER-encoded SubjectPublicKeyInfo public key of the
/// given key `family` and writes its handle to `*handle_out`.
///
/// # Safety
///
/// A non-null `der` must be valid for reads of `der_len` octets;
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_import_public_key(
    der: *const u8,
    der_len: usize,
    family: i64,
    handle_out: *mut i64,
) -> Status {
    boundary("trestle_import_public_key", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        // SAFETY: per this function's contract.
        let der = unsafe { bytes_in(der, der_len, "der")? };
        *out = bridge().import_public_key(der, family)?.to_wire();
        Ok(())
    })
}

/// Imports a DER-encoded PKCS#8 private key of the given key
/// `family` and writes its handle to `*handle_out`.
///
/// # Safety
///
/// A non-null `der` must be valid for reads of `der_len` octets;
/// `handle_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_import_private_key(
    der: *const u8,
    der_len: usize,
    family: i64,
    handle_out: *mut i64,
) -> Status {
    boundary("trestle_import_private_key", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(handle_out, "handle_out")? };
        // SAFETY: per this function's contract.
        let der = unsafe { bytes_in(der, der_len, "der")? };
        *out = bridge().import_private_key(der, family)?.to_wire();
        Ok(())
    })
}

/// Destroys the key context behind `handle`.
///
/// Contexts created from the key keep their own copy and stay
/// usable.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_key_destroy(handle: i64) -> Status {
    boundary("trestle_key_destroy", || {
        bridge().key_destroy(Handle::from_wire(handle))
    })
}

/// Fills `dest` with cryptographically secure random octets.
///
/// # Safety
///
/// A non-null `dest` must be valid for writes of `dest_len`
/// octets.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_fill_random(dest: *mut u8, dest_len: usize) -> Status {
    boundary("trestle_fill_random", || {
        // SAFETY: per this function's contract.
        let dest = unsafe { bytes_out(dest, dest_len, "dest")? };
        bridge().fill_random(dest)
    })
}

/// Compares two byte strings in constant time and writes the
/// outcome to `*eq_out`.
///
/// Different lengths compare unequal without inspecting contents.
///
/// # Safety
///
/// Non-null `a` and `b` must be valid for reads of `a_len` and
/// `b_len` octets; `eq_out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trestle_constant_time_eq(
    a: *const u8,
    a_len: usize,
    b: *const u8,
    b_len: usize,
    eq_out: *mut bool,
) -> Status {
    boundary("trestle_constant_time_eq", || {
        // SAFETY: per this function's contract.
        let out = unsafe { out_param(eq_out, "eq_out")? };
        // SAFETY: per this function's contract.
        let a = unsafe { bytes_in(a, a_len, "a")? };
        // SAFETY: per this function's contract.
        let b = unsafe { bytes_in(b, b_len, "b")? };
        *out = bridge().constant_time_eq(a, b);
        Ok(())
    })
}

/// Asks the host's collector to destroy the context behind
/// `handle` when the managed object `obj` becomes unreachable.
///
/// `obj` is treated as an opaque token and never dereferenced
/// here; the host gets it back verbatim. `size_hint` is the native
/// footprint in octets, for collector pacing. An explicit destroy
/// always wins the race against the finalizer.
#[unsafe(no_mangle)]
pub extern "C" fn trestle_attach_finalizer(
    obj: *mut c_void,
    handle: i64,
    size_hint: usize,
) -> Status {
    boundary("trestle_attach_finalizer", || {
        if obj.is_null() {
            return Err(InvalidArg::new("obj", "null pointer").into());
        }
        let token = obj.expose_provenance() as u64;
        bridge().attach_finalizer(&RegisteredHost, token, Handle::from_wire(handle), size_hint)
    })
}

/// Borrows an out parameter.
///
/// # Safety
///
/// A non-null, aligned `ptr` must be valid for writes of `T`.
unsafe fn out_param<'a, T>(ptr: *mut T, arg: &'static str) -> Result<&'a mut T, Error> {
    if ptr.is_null() {
        return Err(InvalidArg::new(arg, "null pointer").into());
    }
    if !ptr.is_aligned() {
        return Err(InvalidArg::new(arg, "misaligned pointer").into());
    }
    // SAFETY: non-null and aligned per the checks above, valid for
    // writes per this function's contract.
    Ok(unsafe { &mut *ptr })
}

/// Borrows a caller (pointer, length) pair as a byte slice.
///
/// Null with a zero length is the empty slice.
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `len` octets for
/// the duration of the call.
unsafe fn bytes_in<'a>(data: *const u8, len: usize, arg: &'static str) -> Result<&'a [u8], Error> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(InvalidArg::new(arg, "null pointer with a nonzero length").into());
    }
    // SAFETY: non-null with `len` readable octets per this
    // function's contract.
    Ok(unsafe { slice::from_raw_parts(data, len) })
}

/// Borrows a caller (pointer, length) pair as a mutable byte
/// slice.
///
/// # Safety
///
/// A non-null `data` must be valid for writes of `len` octets for
/// the duration of the call.
unsafe fn bytes_out<'a>(
    data: *mut u8,
    len: usize,
    arg: &'static str,
) -> Result<&'a mut [u8], Error> {
    if len == 0 {
        return Ok(&mut []);
    }
    if data.is_null() {
        return Err(InvalidArg::new(arg, "null pointer with a nonzero length").into());
    }
    // SAFETY: non-null with `len` writable octets per this
    // function's contract.
    Ok(unsafe { slice::from_raw_parts_mut(data, len) })
}

fn size_mismatch(need: usize, got: usize) -> Error {
    InvalidArg::new("out_len", format!("need exactly {need} octets, got {got}")).into()
}

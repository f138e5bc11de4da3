//! Context lifecycle and the operations over it.

use std::sync::Arc;

use buggy::bug;
use tracing::{debug, trace, warn};
use trestle_crypto::{
    Digest, HashAlg, Hmac, KeyFamily, PrivateKey, PublicKey, Signer, Verifier,
};

use crate::{
    error::{Error, InvalidArg},
    finalizer::Finalizer,
    host::{GcHost, ObjToken},
    registry::{Handle, Registry, StaleHandle},
};

/// A native context a handle can name.
pub(crate) enum Ctx {
    Digest(Digest),
    Hmac(Hmac),
    Signer(Signer),
    Verifier(Verifier),
    PublicKey(PublicKey),
    PrivateKey(PrivateKey),
}

impl Ctx {
    pub(crate) const fn kind(&self) -> CtxKind {
        match self {
            Self::Digest(_) => CtxKind::Digest,
            Self::Hmac(_) => CtxKind::Hmac,
            Self::Signer(_) => CtxKind::Signer,
            Self::Verifier(_) => CtxKind::Verifier,
            Self::PublicKey(_) => CtxKind::PublicKey,
            Self::PrivateKey(_) => CtxKind::PrivateKey,
        }
    }
}

/// The family of a context, for diagnostics and destroy-time
/// checks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CtxKind {
    /// An incremental digest.
    Digest,
    /// An incremental HMAC.
    Hmac,
    /// An in-progress signature creation.
    Signer,
    /// An in-progress signature verification.
    Verifier,
    /// An imported verification key.
    PublicKey,
    /// An imported signing key.
    PrivateKey,
}

impl CtxKind {
    /// Stable lowercase name, for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Digest => "digest",
            Self::Hmac => "hmac",
            Self::Signer => "signer",
            Self::Verifier => "verifier",
            Self::PublicKey => "public-key",
            Self::PrivateKey => "private-key",
        }
    }
}

fn wrong_kind<R>(handle: Handle, want: CtxKind, got: CtxKind) -> Result<R, Error> {
    warn!(
        %handle,
        want = want.name(),
        got = got.name(),
        "operation on wrong context family"
    );
    bug!("operation on wrong context family")
}

/// The bridge core: every context the managed runtime currently
/// holds a handle to.
///
/// `Bridge` is cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Bridge {
    contexts: Arc<Registry<Ctx>>,
}

impl Bridge {
    /// Creates an empty bridge.
    pub fn new() -> Self {
        Self {
            contexts: Arc::new(Registry::new()),
        }
    }

    /// The number of live contexts.
    ///
    /// Every handle the managed runtime has not yet destroyed or
    /// finalized counts; a nonzero value after all handles are
    /// gone is a leak.
    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn with_ctx<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut Ctx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match self.contexts.with_mut(handle, f) {
            Ok(result) => result,
            Err(StaleHandle(_)) => {
                warn!(%handle, "operation on unknown or destroyed handle");
                bug!("operation on unknown or destroyed handle")
            }
        }
    }

    /// Frees whatever `handle` names, checking that it came in
    /// through an entry point for its family.
    ///
    /// Destroying twice or through the wrong entry point is a
    /// wrapper bug, but the context is still freed where there is
    /// one: a leak is worse than tolerating the mismatch. Both
    /// mistakes are fatal in debug builds and quiet in release
    /// builds.
    fn destroy(&self, handle: Handle, wants: &'static [CtxKind]) -> Result<(), Error> {
        match self.contexts.claim(handle) {
            Ok(ctx) => {
                let got = ctx.kind();
                debug!(%handle, kind = got.name(), "context destroyed");
                drop(ctx);
                if !wants.contains(&got) {
                    warn!(
                        %handle,
                        got = got.name(),
                        "destroy through wrong-family entry point"
                    );
                    if cfg!(debug_assertions) {
                        bug!("destroy through wrong-family entry point");
                    }
                }
                Ok(())
            }
            Err(StaleHandle(_)) => {
                warn!(%handle, "destroy of an already destroyed handle");
                if cfg!(debug_assertions) {
                    bug!("destroy of an already destroyed handle");
                }
                Ok(())
            }
        }
    }

    /// Destructor path for collected objects.
    ///
    /// Losing the race to an explicit destroy is expected here and
    /// quiet; the finalizer always runs eventually, even for
    /// contexts the program already cleaned up.
    pub(crate) fn reclaim(&self, handle: Handle) {
        match self.contexts.claim(handle) {
            Ok(ctx) => {
                debug!(%handle, kind = ctx.kind().name(), "context reclaimed by finalizer");
                drop(ctx);
            }
            Err(StaleHandle(_)) => {
                trace!(%handle, "finalizer found nothing to reclaim");
            }
        }
    }

    /// Builds the finalizer that will reclaim `handle` once its
    /// owning object is collected.
    ///
    /// The handle must name a live context. `size_hint` is the
    /// caller's estimate of the context's native footprint, in
    /// octets; the collector uses it as external memory pressure.
    pub fn finalizer_for(&self, handle: Handle, size_hint: usize) -> Result<Finalizer, Error> {
        self.with_ctx(handle, |_| Ok(()))?;
        Ok(Finalizer::new(self.clone(), handle, size_hint))
    }

    /// Attaches a finalizer for `handle` to the managed object
    /// `obj`.
    ///
    /// On failure the context stays live and owned by the caller.
    pub fn attach_finalizer(
        &self,
        host: &dyn GcHost,
        obj: ObjToken,
        handle: Handle,
        size_hint: usize,
    ) -> Result<(), Error> {
        let finalizer = self.finalizer_for(handle, size_hint)?;
        host.attach_finalizer(obj, Box::new(finalizer), size_hint)?;
        debug!(%handle, obj, size_hint, "finalizer attached");
        Ok(())
    }

    /// Creates a digest context for the algorithm `alg_id` names.
    pub fn digest_create(&self, alg_id: i64) -> Result<Handle, Error> {
        let alg = HashAlg::from_id(alg_id)?;
        let handle = self.contexts.insert(Ctx::Digest(Digest::new(alg)))?;
        debug!(%handle, %alg, "digest context created");
        Ok(handle)
    }

    /// Adds `data` to the digest behind `handle`.
    pub fn digest_update(&self, handle: Handle, data: &[u8]) -> Result<(), Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Digest(d) => {
                d.update(data);
                Ok(())
            }
            other => wrong_kind(handle, CtxKind::Digest, other.kind()),
        })
    }

    /// The size in octets of the digest `handle` will produce.
    pub fn digest_output_size(&self, handle: Handle) -> Result<usize, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Digest(d) => Ok(d.output_size()),
            other => wrong_kind(handle, CtxKind::Digest, other.kind()),
        })
    }

    /// Completes the digest behind `handle` and returns it.
    pub fn digest_finalize(&self, handle: Handle) -> Result<Vec<u8>, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Digest(d) => Ok(d.finalize_reset()),
            other => wrong_kind(handle, CtxKind::Digest, other.kind()),
        })
    }

    /// Destroys the digest behind `handle`.
    pub fn digest_destroy(&self, handle: Handle) -> Result<(), Error> {
        self.destroy(handle, &[CtxKind::Digest])
    }

    /// Creates an HMAC context keyed with `key`.
    pub fn hmac_create(&self, alg_id: i64, key: &[u8]) -> Result<Handle, Error> {
        let alg = HashAlg::from_id(alg_id)?;
        let mac = Hmac::new(alg, key)?;
        let handle = self.contexts.insert(Ctx::Hmac(mac))?;
        debug!(%handle, %alg, "hmac context created");
        Ok(handle)
    }

    /// Adds `data` to the HMAC behind `handle`.
    pub fn hmac_update(&self, handle: Handle, data: &[u8]) -> Result<(), Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Hmac(m) => {
                m.update(data);
                Ok(())
            }
            other => wrong_kind(handle, CtxKind::Hmac, other.kind()),
        })
    }

    /// The size in octets of the tag `handle` will produce.
    pub fn hmac_output_size(&self, handle: Handle) -> Result<usize, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Hmac(m) => Ok(m.tag_size()),
            other => wrong_kind(handle, CtxKind::Hmac, other.kind()),
        })
    }

    /// Completes the HMAC behind `handle` and returns the tag.
    pub fn hmac_finalize(&self, handle: Handle) -> Result<Vec<u8>, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Hmac(m) => Ok(m.finalize_reset()),
            other => wrong_kind(handle, CtxKind::Hmac, other.kind()),
        })
    }

    /// Destroys the HMAC behind `handle`.
    pub fn hmac_destroy(&self, handle: Handle) -> Result<(), Error> {
        self.destroy(handle, &[CtxKind::Hmac])
    }

    /// Starts a signature over the private key behind
    /// `key_handle`.
    ///
    /// The signer owns a copy of the key, so destroying the key
    /// handle mid-message does not disturb it.
    pub fn sign_create(&self, alg_id: i64, key_handle: Handle) -> Result<Handle, Error> {
        let alg = HashAlg::from_id(alg_id)?;
        let key = self.with_ctx(key_handle, |ctx| match ctx {
            Ctx::PrivateKey(key) => Ok(key.clone()),
            Ctx::PublicKey(_) => {
                Err(InvalidArg::new("key", "signing requires a private key").into())
            }
            other => wrong_kind(key_handle, CtxKind::PrivateKey, other.kind()),
        })?;
        let handle = self.contexts.insert(Ctx::Signer(Signer::new(key, alg)))?;
        debug!(%handle, %alg, key = %key_handle, "signer created");
        Ok(handle)
    }

    /// Adds `data` to the message being signed behind `handle`.
    pub fn sign_update(&self, handle: Handle, data: &[u8]) -> Result<(), Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Signer(s) => {
                s.update(data);
                Ok(())
            }
            other => wrong_kind(handle, CtxKind::Signer, other.kind()),
        })
    }

    /// The exact size in octets of the signature `handle` will
    /// produce.
    pub fn sign_size(&self, handle: Handle) -> Result<usize, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Signer(s) => Ok(s.signature_size()),
            other => wrong_kind(handle, CtxKind::Signer, other.kind()),
        })
    }

    /// Completes the message and produces the signature.
    pub fn sign_finalize(&self, handle: Handle) -> Result<Vec<u8>, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Signer(s) => Ok(s.finish()?),
            other => wrong_kind(handle, CtxKind::Signer, other.kind()),
        })
    }

    /// Destroys the signer behind `handle`.
    pub fn sign_destroy(&self, handle: Handle) -> Result<(), Error> {
        self.destroy(handle, &[CtxKind::Signer])
    }

    /// Starts a verification against the public key behind
    /// `key_handle`.
    pub fn verify_create(&self, alg_id: i64, key_handle: Handle) -> Result<Handle, Error> {
        let alg = HashAlg::from_id(alg_id)?;
        let key = self.with_ctx(key_handle, |ctx| match ctx {
            Ctx::PublicKey(key) => Ok(key.clone()),
            Ctx::PrivateKey(_) => {
                Err(InvalidArg::new("key", "verification requires a public key").into())
            }
            other => wrong_kind(key_handle, CtxKind::PublicKey, other.kind()),
        })?;
        let handle = self
            .contexts
            .insert(Ctx::Verifier(Verifier::new(key, alg)))?;
        debug!(%handle, %alg, key = %key_handle, "verifier created");
        Ok(handle)
    }

    /// Adds `data` to the message being verified behind `handle`.
    pub fn verify_update(&self, handle: Handle, data: &[u8]) -> Result<(), Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Verifier(v) => {
                v.update(data);
                Ok(())
            }
            other => wrong_kind(handle, CtxKind::Verifier, other.kind()),
        })
    }

    /// Completes the message and checks `signature` against it.
    ///
    /// A bad signature is an ordinary `false`, not an error.
    pub fn verify_finalize(&self, handle: Handle, signature: &[u8]) -> Result<bool, Error> {
        self.with_ctx(handle, |ctx| match ctx {
            Ctx::Verifier(v) => Ok(v.finish(signature)),
            other => wrong_kind(handle, CtxKind::Verifier, other.kind()),
        })
    }

    /// Destroys the verifier behind `handle`.
    pub fn verify_destroy(&self, handle: Handle) -> Result<(), Error> {
        self.destroy(handle, &[CtxKind::Verifier])
    }

    /// Imports a DER-encoded `SubjectPublicKeyInfo` for the family
    /// `family_id` names.
    pub fn import_public_key(&self, der: &[u8], family_id: i64) -> Result<Handle, Error> {
        let family = KeyFamily::from_id(family_id)?;
        let key = PublicKey::from_spki_der(der, family)?;
        let handle = self.contexts.insert(Ctx::PublicKey(key))?;
        debug!(%handle, %family, "public key imported");
        Ok(handle)
    }

    /// Imports a DER-encoded PKCS#8 private key for the family
    /// `family_id` names.
    pub fn import_private_key(&self, der: &[u8], family_id: i64) -> Result<Handle, Error> {
        let family = KeyFamily::from_id(family_id)?;
        let key = PrivateKey::from_pkcs8_der(der, family)?;
        let handle = self.contexts.insert(Ctx::PrivateKey(key))?;
        debug!(%handle, %family, "private key imported");
        Ok(handle)
    }

    /// Destroys the key behind `handle`, public or private.
    pub fn key_destroy(&self, handle: Handle) -> Result<(), Error> {
        self.destroy(handle, &[CtxKind::PublicKey, CtxKind::PrivateKey])
    }

    /// Fills `dst` with cryptographically secure random octets.
    pub fn fill_random(&self, dst: &mut [u8]) -> Result<(), Error> {
        trestle_crypto::fill_random(dst)?;
        Ok(())
    }

    /// Compares `a` and `b` without leaking where they differ.
    pub fn constant_time_eq(&self, a: &[u8], b: &[u8]) -> bool {
        trestle_crypto::constant_time_eq(a, b)
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn test_digest_lifecycle() {
        let bridge = Bridge::new();
        let handle = bridge.digest_create(1).expect("create");
        bridge.digest_update(handle, b"ab").expect("update");
        bridge.digest_update(handle, b"c").expect("update");
        assert_eq!(bridge.digest_output_size(handle).expect("size"), 32);

        let digest = bridge.digest_finalize(handle).expect("finalize");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        );

        bridge.digest_destroy(handle).expect("destroy");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    fn test_hmac_lifecycle() {
        let bridge = Bridge::new();
        let handle = bridge.hmac_create(0, &[0x0b; 20]).expect("create");
        bridge.hmac_update(handle, b"Hi There").expect("update");
        assert_eq!(bridge.hmac_output_size(handle).expect("size"), 20);

        let tag = bridge.hmac_finalize(handle).expect("finalize");
        assert_eq!(hex::encode(tag), "b617318655057264e28bc0b6fb378c8ef146be00");

        bridge.hmac_destroy(handle).expect("destroy");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let bridge = Bridge::new();
        let (private_der, public_der) = test_keys();

        let private = bridge
            .import_private_key(&private_der, 1)
            .expect("import private");
        let public = bridge
            .import_public_key(&public_der, 1)
            .expect("import public");

        let signer = bridge.sign_create(1, private).expect("sign create");
        bridge.sign_update(signer, b"the message").expect("update");
        assert_eq!(bridge.sign_size(signer).expect("size"), 64);
        let sig = bridge.sign_finalize(signer).expect("sign");
        bridge.sign_destroy(signer).expect("destroy");

        let verifier = bridge.verify_create(1, public).expect("verify create");
        bridge.verify_update(verifier, b"the message").expect("update");
        assert!(bridge.verify_finalize(verifier, &sig).expect("finalize"));
        bridge.verify_destroy(verifier).expect("destroy");

        bridge.key_destroy(private).expect("destroy");
        bridge.key_destroy(public).expect("destroy");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    fn test_signer_outlives_destroyed_key() {
        let bridge = Bridge::new();
        let (private_der, public_der) = test_keys();
        let private = bridge
            .import_private_key(&private_der, 1)
            .expect("import private");
        let public = bridge
            .import_public_key(&public_der, 1)
            .expect("import public");

        let signer = bridge.sign_create(1, private).expect("sign create");
        bridge.key_destroy(private).expect("destroy key early");

        bridge.sign_update(signer, b"still signs").expect("update");
        let sig = bridge.sign_finalize(signer).expect("sign");
        bridge.sign_destroy(signer).expect("destroy");

        let verifier = bridge.verify_create(1, public).expect("verify create");
        bridge.verify_update(verifier, b"still signs").expect("update");
        assert!(bridge.verify_finalize(verifier, &sig).expect("finalize"));
        bridge.verify_destroy(verifier).expect("destroy");
        bridge.key_destroy(public).expect("destroy");
    }

    #[test]
    fn test_unsupported_algorithm() {
        let bridge = Bridge::new();
        let err = bridge.digest_create(17).expect_err("no such algorithm");
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    fn test_unknown_key_family() {
        let bridge = Bridge::new();
        let err = bridge
            .import_public_key(b"irrelevant", 9)
            .expect_err("no such family");
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn test_malformed_key_kinds() {
        let bridge = Bridge::new();

        let err = bridge
            .import_public_key(b"not der", 0)
            .expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::KeyFormat);

        // A valid P-256 key imported as RSA.
        let (_, public_der) = test_keys();
        let err = bridge
            .import_public_key(&public_der, 0)
            .expect_err("wrong family");
        assert_eq!(err.kind(), ErrorKind::KeyTypeMismatch);
    }

    #[test]
    fn test_key_role_mismatch_is_an_argument_error() {
        let bridge = Bridge::new();
        let (private_der, public_der) = test_keys();
        let private = bridge
            .import_private_key(&private_der, 1)
            .expect("import private");
        let public = bridge
            .import_public_key(&public_der, 1)
            .expect("import public");

        let err = bridge.sign_create(1, public).expect_err("not a private key");
        assert_eq!(err.kind(), ErrorKind::Argument);
        let err = bridge.verify_create(1, private).expect_err("not a public key");
        assert_eq!(err.kind(), ErrorKind::Argument);

        bridge.key_destroy(private).expect("destroy");
        bridge.key_destroy(public).expect("destroy");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "operation on wrong context family")]
    fn test_cross_family_use_is_fatal_in_debug() {
        let bridge = Bridge::new();
        let digest = bridge.digest_create(1).expect("create");
        let _ = bridge.hmac_update(digest, b"oops");
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_cross_family_use_is_a_bug_error_in_release() {
        let bridge = Bridge::new();
        let digest = bridge.digest_create(1).expect("create");
        bridge.digest_update(digest, b"abc").expect("update");

        let err = bridge.hmac_update(digest, b"oops").expect_err("wrong family");
        assert_eq!(err.kind(), ErrorKind::Bug);

        // The context is untouched and still usable.
        let out = bridge.digest_finalize(digest).expect("finalize");
        assert_eq!(
            hex::encode(out),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        );
        bridge.digest_destroy(digest).expect("destroy");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "operation on unknown or destroyed handle")]
    fn test_use_after_destroy_is_fatal_in_debug() {
        let bridge = Bridge::new();
        let handle = bridge.digest_create(1).expect("create");
        bridge.digest_destroy(handle).expect("destroy");
        let _ = bridge.digest_update(handle, b"oops");
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_use_after_destroy_is_a_bug_error_in_release() {
        let bridge = Bridge::new();
        let handle = bridge.digest_create(1).expect("create");
        bridge.digest_destroy(handle).expect("destroy");

        let err = bridge.digest_update(handle, b"oops").expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::Bug);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "destroy of an already destroyed handle")]
    fn test_double_destroy_is_fatal_in_debug() {
        let bridge = Bridge::new();
        let handle = bridge.digest_create(1).expect("create");
        bridge.digest_destroy(handle).expect("destroy");
        let _ = bridge.digest_destroy(handle);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_double_destroy_is_quiet_in_release() {
        let bridge = Bridge::new();
        let handle = bridge.digest_create(1).expect("create");
        bridge.digest_destroy(handle).expect("destroy");
        bridge.digest_destroy(handle).expect("second destroy is a no-op");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "destroy through wrong-family entry point")]
    fn test_wrong_family_destroy_is_fatal_in_debug() {
        let bridge = Bridge::new();
        let digest = bridge.digest_create(1).expect("create");
        let _ = bridge.hmac_destroy(digest);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_wrong_family_destroy_still_frees_in_release() {
        let bridge = Bridge::new();
        let digest = bridge.digest_create(1).expect("create");
        bridge.hmac_destroy(digest).expect("frees despite the mismatch");
        assert_eq!(bridge.live_contexts(), 0);
    }

    #[test]
    fn test_fill_random_and_compare() {
        let bridge = Bridge::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        bridge.fill_random(&mut a).expect("entropy");
        bridge.fill_random(&mut b).expect("entropy");

        assert!(bridge.constant_time_eq(&a, &a));
        assert!(!bridge.constant_time_eq(&a, &b));
        assert!(!bridge.constant_time_eq(&a, &a[..16]));
    }

    /// A fixed P-256 key pair in DER form.
    fn test_keys() -> (Vec<u8>, Vec<u8>) {
        use p256::pkcs8::{EncodePrivateKey, EncodePublicKey};

        let key = p256::ecdsa::SigningKey::from_slice(&[0x5a; 32]).expect("scalar in range");
        let private = key.to_pkcs8_der().expect("encode").as_bytes().to_vec();
        let public = key
            .verifying_key()
            .to_public_key_der()
            .expect("encode")
            .as_bytes()
            .to_vec();
        (private, public)
    }
}

//! Streaming signature creation and verification.
//!
//! Both contexts hash the message incrementally and run the key
//! operation once at the end, so arbitrarily large messages never
//! need to be resident at once. The key operation itself matches
//! WebCrypto: RSASSA-PKCS1-v1_5 for RSA keys, ECDSA with the raw
//! `r || s` signature form for P-256 keys.

use alloc::{string::ToString, vec::Vec};

use p256::ecdsa::{
    Signature,
    signature::hazmat::{PrehashSigner, PrehashVerifier},
};
use rsa::{Pkcs1v15Sign, traits::PublicKeyParts};

use crate::{
    error::SignError,
    hash::{Digest, HashAlg},
    keys::{PrivateKey, PublicKey},
};

/// ECDSA P-256 signatures are a fixed `r || s` pair.
const P256_SIGNATURE_SIZE: usize = 64;

fn pkcs1v15_scheme(alg: HashAlg) -> Pkcs1v15Sign {
    match alg {
        HashAlg::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlg::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlg::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlg::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

/// An incremental signature-creation context.
pub struct Signer {
    digest: Digest,
    key: PrivateKey,
}

impl Signer {
    /// Creates a signer that hashes with `alg` and signs with
    /// `key`.
    ///
    /// The context owns its key. Destroying the caller's copy of
    /// the key midway through a message does not disturb the
    /// signature.
    pub fn new(key: PrivateKey, alg: HashAlg) -> Self {
        Self {
            digest: Digest::new(alg),
            key,
        }
    }

    /// Adds `data` to the message being signed.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// The exact size in octets of the signature
    /// [`finish`][Self::finish] will produce.
    ///
    /// RSA signatures are the modulus size; P-256 signatures are a
    /// fixed 64 octets.
    pub fn signature_size(&self) -> usize {
        match &self.key {
            PrivateKey::Rsa(key) => key.size(),
            PrivateKey::EcdsaP256(_) => P256_SIGNATURE_SIZE,
        }
    }

    /// Completes the message hash and produces the signature.
    ///
    /// The context resets to the start of a fresh message under the
    /// same key and algorithm.
    pub fn finish(&mut self) -> Result<Vec<u8>, SignError> {
        let hashed = self.digest.finalize_reset();
        match &self.key {
            PrivateKey::Rsa(key) => key
                .sign(pkcs1v15_scheme(self.digest.alg()), &hashed)
                .map_err(|err| SignError(err.to_string())),
            PrivateKey::EcdsaP256(key) => {
                let sig: Signature = key
                    .sign_prehash(&hashed)
                    .map_err(|err| SignError(err.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

/// An incremental signature-verification context.
pub struct Verifier {
    digest: Digest,
    key: PublicKey,
}

impl Verifier {
    /// Creates a verifier that hashes with `alg` and checks against
    /// `key`.
    pub fn new(key: PublicKey, alg: HashAlg) -> Self {
        Self {
            digest: Digest::new(alg),
            key,
        }
    }

    /// Adds `data` to the message being verified.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Completes the message hash and checks `signature` against
    /// it.
    ///
    /// A malformed or non-matching signature is an ordinary
    /// `false`, never an error. The context resets to the start of
    /// a fresh message under the same key and algorithm.
    pub fn finish(&mut self, signature: &[u8]) -> bool {
        let hashed = self.digest.finalize_reset();
        match &self.key {
            PublicKey::Rsa(key) => key
                .verify(pkcs1v15_scheme(self.digest.alg()), &hashed, signature)
                .is_ok(),
            PublicKey::EcdsaP256(key) => {
                let Ok(sig) = Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_prehash(&hashed, &sig).is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey};
    use rand_core::OsRng;

    use crate::keys::KeyFamily;

    use super::*;

    fn rsa_pair() -> (PrivateKey, PublicKey) {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).expect("keygen");
        let private_der = key.to_pkcs8_der().expect("encode");
        let public_der = rsa::RsaPublicKey::from(&key)
            .to_public_key_der()
            .expect("encode");
        (
            PrivateKey::from_pkcs8_der(private_der.as_bytes(), KeyFamily::Rsa)
                .expect("import"),
            PublicKey::from_spki_der(public_der.as_bytes(), KeyFamily::Rsa).expect("import"),
        )
    }

    fn p256_pair() -> (PrivateKey, PublicKey) {
        let key = p256::ecdsa::SigningKey::from_slice(&[0x23; 32]).expect("scalar in range");
        let private_der = key.to_pkcs8_der().expect("encode");
        let public_der = key.verifying_key().to_public_key_der().expect("encode");
        (
            PrivateKey::from_pkcs8_der(private_der.as_bytes(), KeyFamily::EcdsaP256)
                .expect("import"),
            PublicKey::from_spki_der(public_der.as_bytes(), KeyFamily::EcdsaP256)
                .expect("import"),
        )
    }

    #[test]
    fn test_rsa_sign_verify() {
        let (private, public) = rsa_pair();
        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"attack at dawn");
        let sig = signer.finish().expect("sign");
        assert_eq!(sig.len(), 128);
        assert_eq!(signer.signature_size(), 128);

        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        assert!(verifier.finish(&sig));
    }

    #[test]
    fn test_p256_sign_verify() {
        let (private, public) = p256_pair();
        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"attack at dawn");
        let sig = signer.finish().expect("sign");
        assert_eq!(sig.len(), P256_SIGNATURE_SIZE);

        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        assert!(verifier.finish(&sig));
    }

    #[test]
    fn test_tampered_message_rejected() {
        let (private, public) = rsa_pair();
        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"attack at dawn");
        let sig = signer.finish().expect("sign");

        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dusk");
        assert!(!verifier.finish(&sig));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let (private, public) = p256_pair();
        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"attack at dawn");
        let mut sig = signer.finish().expect("sign");
        sig[10] ^= 0x01;

        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        assert!(!verifier.finish(&sig));
    }

    #[test]
    fn test_malformed_signature_is_false_not_error() {
        let (_, public) = p256_pair();
        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        // Too short for an r || s pair.
        assert!(!verifier.finish(&[0xde, 0xad]));

        let (_, public) = rsa_pair();
        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        assert!(!verifier.finish(&[]));
    }

    #[test]
    fn test_chunked_message_matches_one_shot() {
        let (private, public) = p256_pair();
        let mut signer = Signer::new(private, HashAlg::Sha384);
        signer.update(b"attack");
        signer.update(b" at ");
        signer.update(b"dawn");
        let sig = signer.finish().expect("sign");

        let mut verifier = Verifier::new(public, HashAlg::Sha384);
        verifier.update(b"attack at dawn");
        assert!(verifier.finish(&sig));
    }

    #[test]
    fn test_finish_resets_for_next_message() {
        let (private, public) = p256_pair();
        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"first");
        let first = signer.finish().expect("sign");

        signer.update(b"second");
        let second = signer.finish().expect("sign");

        let mut verifier = Verifier::new(public, HashAlg::Sha256);
        verifier.update(b"first");
        assert!(verifier.finish(&first));
        verifier.update(b"second");
        assert!(verifier.finish(&second));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (private, _) = p256_pair();
        let other = p256::ecdsa::SigningKey::from_slice(&[0x42; 32]).expect("scalar in range");
        let other_der = other.verifying_key().to_public_key_der().expect("encode");
        let other_public = PublicKey::from_spki_der(other_der.as_bytes(), KeyFamily::EcdsaP256)
            .expect("import");

        let mut signer = Signer::new(private, HashAlg::Sha256);
        signer.update(b"attack at dawn");
        let sig = signer.finish().expect("sign");

        let mut verifier = Verifier::new(other_public, HashAlg::Sha256);
        verifier.update(b"attack at dawn");
        assert!(!verifier.finish(&sig));
    }
}

//! Incremental HMAC.

use alloc::{string::ToString, vec::Vec};

use hmac::Mac as _;

use crate::{error::MacError, hash::HashAlg};

/// An incremental HMAC context.
///
/// Keys of any length are accepted; RFC 2104 hashing and padding
/// of the key happens inside the underlying implementation.
pub struct Hmac {
    alg: HashAlg,
    inner: Inner,
}

enum Inner {
    Sha1(hmac::Hmac<sha1::Sha1>),
    Sha256(hmac::Hmac<sha2::Sha256>),
    Sha384(hmac::Hmac<sha2::Sha384>),
    Sha512(hmac::Hmac<sha2::Sha512>),
}

impl Hmac {
    /// Creates an HMAC context keyed with `key`.
    pub fn new(alg: HashAlg, key: &[u8]) -> Result<Self, MacError> {
        let inner = match alg {
            HashAlg::Sha1 => Inner::Sha1(
                hmac::Hmac::new_from_slice(key).map_err(|err| MacError(err.to_string()))?,
            ),
            HashAlg::Sha256 => Inner::Sha256(
                hmac::Hmac::new_from_slice(key).map_err(|err| MacError(err.to_string()))?,
            ),
            HashAlg::Sha384 => Inner::Sha384(
                hmac::Hmac::new_from_slice(key).map_err(|err| MacError(err.to_string()))?,
            ),
            HashAlg::Sha512 => Inner::Sha512(
                hmac::Hmac::new_from_slice(key).map_err(|err| MacError(err.to_string()))?,
            ),
        };
        Ok(Self { alg, inner })
    }

    /// The hash algorithm this context authenticates with.
    pub const fn alg(&self) -> HashAlg {
        self.alg
    }

    /// The size in octets of the tag [`finalize_reset`][Self::finalize_reset]
    /// will produce.
    pub const fn tag_size(&self) -> usize {
        self.alg.digest_size()
    }

    /// Adds `data` to the message being authenticated.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(m) => m.update(data),
            Inner::Sha256(m) => m.update(data),
            Inner::Sha384(m) => m.update(data),
            Inner::Sha512(m) => m.update(data),
        }
    }

    /// Completes the MAC and returns the tag.
    ///
    /// The context is reset to the empty message under the same
    /// key, not consumed.
    pub fn finalize_reset(&mut self) -> Vec<u8> {
        match &mut self.inner {
            Inner::Sha1(m) => m.finalize_reset().into_bytes().to_vec(),
            Inner::Sha256(m) => m.finalize_reset().into_bytes().to_vec(),
            Inner::Sha384(m) => m.finalize_reset().into_bytes().to_vec(),
            Inner::Sha512(m) => m.finalize_reset().into_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 2202 and RFC 4231, test case 1.
    const KEY: [u8; 20] = [0x0b; 20];
    const DATA: &[u8] = b"Hi There";

    #[test]
    fn test_rfc_vectors() {
        let cases: &[(HashAlg, &str)] = &[
            (HashAlg::Sha1, "b617318655057264e28bc0b6fb378c8ef146be00"),
            (
                HashAlg::Sha256,
                "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
            ),
            (
                HashAlg::Sha384,
                "afd03944d84895626b0825f4ab46907f15f9dadbe4101ec682aa034c7cebc59cfaea9ea9076ede7f4af152e8b2fa9cb6",
            ),
            (
                HashAlg::Sha512,
                "87aa7cdea5ef619d4ff0b4241a1d6cb02379f4e2ce4ec2787ad0b30545e17cdedaa833b7d6b8a702038b274eaea3f4e4be9d914eeb61f1702e696c203a126854",
            ),
        ];
        for (alg, want) in cases {
            let mut mac = Hmac::new(*alg, &KEY).expect("keying cannot fail");
            mac.update(DATA);
            assert_eq!(hex::encode(mac.finalize_reset()), *want, "{alg}");
        }
    }

    #[test]
    fn test_oversized_key() {
        // RFC 4231, test case 6: keys longer than the block size
        // are hashed down first.
        let key = [0xaa_u8; 131];
        let mut mac = Hmac::new(HashAlg::Sha256, &key).expect("keying cannot fail");
        mac.update(b"Test Using Larger Than Block-Size Key - Hash Key First");
        assert_eq!(
            hex::encode(mac.finalize_reset()),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54",
        );
    }

    #[test]
    fn test_empty_key_accepted() {
        let mut mac = Hmac::new(HashAlg::Sha256, &[]).expect("empty keys are legal");
        mac.update(DATA);
        assert_eq!(mac.finalize_reset().len(), 32);
    }

    #[test]
    fn test_finalize_resets_under_same_key() {
        let mut mac = Hmac::new(HashAlg::Sha256, &KEY).expect("keying cannot fail");
        mac.update(DATA);
        let first = mac.finalize_reset();

        mac.update(DATA);
        assert_eq!(mac.finalize_reset(), first);
    }

    #[test]
    fn test_tag_size() {
        for alg in [
            HashAlg::Sha1,
            HashAlg::Sha256,
            HashAlg::Sha384,
            HashAlg::Sha512,
        ] {
            let mut mac = Hmac::new(alg, &KEY).expect("keying cannot fail");
            assert_eq!(mac.tag_size(), alg.digest_size());
            assert_eq!(mac.finalize_reset().len(), alg.digest_size());
        }
    }
}

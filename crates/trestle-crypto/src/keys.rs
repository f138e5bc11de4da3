//! Signing key import.
//!
//! Keys arrive from the managed runtime as DER blobs. Import
//! validates in a fixed order: the envelope must parse, the
//! envelope's algorithm must match the family the caller asked
//! for, and only then is the key material itself inspected. The
//! order is observable through which error the caller gets back.

use alloc::string::ToString;
use core::fmt;

use spki::ObjectIdentifier;

use crate::error::{ImportError, UnknownKeyFamily};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP_256_R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// A key family the bridge can import.
///
/// The discriminants are the identifiers the managed runtime sends
/// over the wire and must never be renumbered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyFamily {
    /// RSA, used with RSASSA-PKCS1-v1_5.
    Rsa = 0,
    /// ECDSA over NIST P-256.
    EcdsaP256 = 1,
}

impl KeyFamily {
    /// Maps a wire identifier to a key family.
    pub const fn from_id(id: i64) -> Result<Self, UnknownKeyFamily> {
        match id {
            0 => Ok(Self::Rsa),
            1 => Ok(Self::EcdsaP256),
            _ => Err(UnknownKeyFamily(id)),
        }
    }

    /// The family's wire identifier.
    pub const fn id(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "RSA",
            Self::EcdsaP256 => "ECDSA P-256",
        };
        write!(f, "{name}")
    }
}

/// An imported verification key.
#[derive(Clone, Debug)]
pub enum PublicKey {
    /// RSA, for RSASSA-PKCS1-v1_5.
    Rsa(rsa::RsaPublicKey),
    /// NIST P-256, for ECDSA.
    EcdsaP256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Imports a DER-encoded `SubjectPublicKeyInfo`.
    ///
    /// The envelope's algorithm must match `family`. A well-formed
    /// key of the wrong family is rejected with
    /// [`ImportError::WrongFamily`] before any key material is
    /// touched.
    pub fn from_spki_der(der: &[u8], family: KeyFamily) -> Result<Self, ImportError> {
        let info = spki::SubjectPublicKeyInfoRef::try_from(der)
            .map_err(|err| ImportError::Encoding(err.to_string()))?;
        let found = info.algorithm.oid;
        match family {
            KeyFamily::Rsa => {
                if found != RSA_ENCRYPTION {
                    return Err(ImportError::WrongFamily {
                        expected: family,
                        found: found.to_string(),
                    });
                }
                let key = rsa::RsaPublicKey::try_from(info)
                    .map_err(|err| ImportError::Invalid(err.to_string()))?;
                Ok(Self::Rsa(key))
            }
            KeyFamily::EcdsaP256 => {
                check_ec_envelope(family, found, &info.algorithm)?;
                let key = p256::PublicKey::try_from(info)
                    .map_err(|err| ImportError::Invalid(err.to_string()))?;
                Ok(Self::EcdsaP256(key.into()))
            }
        }
    }

    /// The family this key belongs to.
    pub const fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::EcdsaP256(_) => KeyFamily::EcdsaP256,
        }
    }
}

/// An imported signing key.
#[derive(Clone, Debug)]
pub enum PrivateKey {
    /// RSA, for RSASSA-PKCS1-v1_5.
    Rsa(rsa::RsaPrivateKey),
    /// NIST P-256, for ECDSA.
    EcdsaP256(p256::ecdsa::SigningKey),
}

impl PrivateKey {
    /// Imports a DER-encoded PKCS#8 `PrivateKeyInfo`.
    ///
    /// Validation order matches [`PublicKey::from_spki_der`]. RSA
    /// keys additionally get a full consistency check of their
    /// components.
    pub fn from_pkcs8_der(der: &[u8], family: KeyFamily) -> Result<Self, ImportError> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)
            .map_err(|err| ImportError::Encoding(err.to_string()))?;
        let found = info.algorithm.oid;
        match family {
            KeyFamily::Rsa => {
                if found != RSA_ENCRYPTION {
                    return Err(ImportError::WrongFamily {
                        expected: family,
                        found: found.to_string(),
                    });
                }
                let key = rsa::RsaPrivateKey::try_from(info)
                    .map_err(|err| ImportError::Invalid(err.to_string()))?;
                key.validate()
                    .map_err(|err| ImportError::Invalid(err.to_string()))?;
                Ok(Self::Rsa(key))
            }
            KeyFamily::EcdsaP256 => {
                check_ec_envelope(family, found, &info.algorithm)?;
                let key = p256::SecretKey::try_from(info)
                    .map_err(|err| ImportError::Invalid(err.to_string()))?;
                Ok(Self::EcdsaP256(key.into()))
            }
        }
    }

    /// The family this key belongs to.
    pub const fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::EcdsaP256(_) => KeyFamily::EcdsaP256,
        }
    }
}

/// Checks the `id-ecPublicKey` envelope, including the named curve
/// in the algorithm parameters.
fn check_ec_envelope(
    expected: KeyFamily,
    found: ObjectIdentifier,
    algorithm: &spki::AlgorithmIdentifierRef<'_>,
) -> Result<(), ImportError> {
    if found != EC_PUBLIC_KEY {
        return Err(ImportError::WrongFamily {
            expected,
            found: found.to_string(),
        });
    }
    let curve = algorithm
        .parameters_oid()
        .map_err(|err| ImportError::Encoding(err.to_string()))?;
    if curve != SECP_256_R1 {
        return Err(ImportError::WrongFamily {
            expected,
            found: curve.to_string(),
        });
    }
    Ok(())
}

//! ECDSA keys over the five supported named curves.
//!
//! KEY_SIZE selects the curve: 192 → prime192v1, 224 → secp224r1, 256 →
//! prime256v1, 384 → secp384r1, 521 → secp521r1. On import the curve comes
//! from the PKCS#8 parameters and KEY_SIZE is derived from it.

use std::any::Any;

use pkcs8::der::Decode as _;
use pkcs8::AssociatedOid;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, ObjectIdentifier, PrivateKeyInfo};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::authorization::{AuthorizationSet, KeyParam};
use crate::error::ErrorCode;
use crate::keyblob::UnsealedKeyBlob;
use crate::keys::{reconcile_algorithm_tag, Key, KeyFactory};
use crate::tag::Tag;
use crate::{Algorithm, KeyFormat};

pub(crate) const DEFAULT_KEY_SIZE: u32 = 224;

static IMPORT_FORMATS: &[KeyFormat] = &[KeyFormat::Pkcs8];
static EXPORT_FORMATS: &[KeyFormat] = &[KeyFormat::X509];

/// Backend handle for one of the supported curves
pub(crate) enum EcPrivateKey {
    P192(p192::ecdsa::SigningKey),
    P224(p224::ecdsa::SigningKey),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl EcPrivateKey {
    fn generate(key_size: u32) -> Result<Self, ErrorCode> {
        Ok(match key_size {
            192 => EcPrivateKey::P192(p192::ecdsa::SigningKey::random(&mut OsRng)),
            224 => EcPrivateKey::P224(p224::ecdsa::SigningKey::random(&mut OsRng)),
            256 => EcPrivateKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            384 => EcPrivateKey::P384(p384::ecdsa::SigningKey::random(&mut OsRng)),
            521 => EcPrivateKey::P521(p521::ecdsa::SigningKey::random(&mut OsRng)),
            _ => return Err(ErrorCode::UnsupportedKeySize),
        })
    }

    fn from_pkcs8(data: &[u8]) -> Result<Self, ErrorCode> {
        let info = PrivateKeyInfo::from_der(data).map_err(|_| ErrorCode::InvalidKeyBlob)?;
        let curve: ObjectIdentifier = info
            .algorithm
            .parameters_oid()
            .map_err(|_| ErrorCode::UnsupportedEcField)?;

        let parse = ErrorCode::InvalidKeyBlob;
        Ok(if curve == p192::NistP192::OID {
            EcPrivateKey::P192(p192::ecdsa::SigningKey::from_pkcs8_der(data).map_err(|_| parse)?)
        } else if curve == p224::NistP224::OID {
            EcPrivateKey::P224(p224::ecdsa::SigningKey::from_pkcs8_der(data).map_err(|_| parse)?)
        } else if curve == p256::NistP256::OID {
            EcPrivateKey::P256(p256::ecdsa::SigningKey::from_pkcs8_der(data).map_err(|_| parse)?)
        } else if curve == p384::NistP384::OID {
            EcPrivateKey::P384(p384::ecdsa::SigningKey::from_pkcs8_der(data).map_err(|_| parse)?)
        } else if curve == p521::NistP521::OID {
            EcPrivateKey::P521(p521::ecdsa::SigningKey::from_pkcs8_der(data).map_err(|_| parse)?)
        } else {
            return Err(ErrorCode::UnsupportedEcField);
        })
    }

    /// The curve's key size in bits
    pub(crate) fn key_size(&self) -> u32 {
        match self {
            EcPrivateKey::P192(_) => 192,
            EcPrivateKey::P224(_) => 224,
            EcPrivateKey::P256(_) => 256,
            EcPrivateKey::P384(_) => 384,
            EcPrivateKey::P521(_) => 521,
        }
    }

    fn to_pkcs8(&self) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        let doc = match self {
            EcPrivateKey::P192(k) => k.to_pkcs8_der(),
            EcPrivateKey::P224(k) => k.to_pkcs8_der(),
            EcPrivateKey::P256(k) => k.to_pkcs8_der(),
            EcPrivateKey::P384(k) => k.to_pkcs8_der(),
            EcPrivateKey::P521(k) => k.to_pkcs8_der(),
        };
        doc.map(|d| d.to_bytes()).map_err(|_| ErrorCode::UnknownError)
    }

    fn to_spki(&self) -> Result<Vec<u8>, ErrorCode> {
        let doc = match self {
            EcPrivateKey::P192(k) => k.verifying_key().to_public_key_der(),
            EcPrivateKey::P224(k) => k.verifying_key().to_public_key_der(),
            EcPrivateKey::P256(k) => k.verifying_key().to_public_key_der(),
            EcPrivateKey::P384(k) => k.verifying_key().to_public_key_der(),
            EcPrivateKey::P521(k) => k.verifying_key().to_public_key_der(),
        };
        doc.map(|d| d.into_vec()).map_err(|_| ErrorCode::UnknownError)
    }
}

pub struct EcdsaKeyFactory;

impl KeyFactory for EcdsaKeyFactory {
    fn registry_key(&self) -> Algorithm {
        Algorithm::Ec
    }

    fn generate_key(&self, description: &AuthorizationSet) -> Result<Box<dyn Key>, ErrorCode> {
        let mut authorizations = description.clone();

        let key_size = match authorizations.int_value(Tag::KEY_SIZE) {
            Some(bits) => bits,
            None => {
                authorizations.push(KeyParam::integer(Tag::KEY_SIZE, DEFAULT_KEY_SIZE))?;
                DEFAULT_KEY_SIZE
            }
        };

        reconcile_algorithm_tag(&mut authorizations, Algorithm::Ec)
            .map_err(|_| ErrorCode::UnknownError)?;

        let key = EcPrivateKey::generate(key_size)?;
        Ok(Box::new(EcdsaKey {
            key,
            authorizations,
        }))
    }

    fn import_key(
        &self,
        description: &AuthorizationSet,
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<Box<dyn Key>, ErrorCode> {
        if format != KeyFormat::Pkcs8 {
            return Err(ErrorCode::UnsupportedKeyFormat);
        }
        let key = EcPrivateKey::from_pkcs8(key_data)?;

        let mut authorizations = description.clone();
        match authorizations.int_value(Tag::KEY_SIZE) {
            Some(bits) if bits == key.key_size() => {}
            Some(_) => return Err(ErrorCode::ImportParameterMismatch),
            None => authorizations.push(KeyParam::integer(Tag::KEY_SIZE, key.key_size()))?,
        }
        reconcile_algorithm_tag(&mut authorizations, Algorithm::Ec)?;

        Ok(Box::new(EcdsaKey {
            key,
            authorizations,
        }))
    }

    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode> {
        let key = EcPrivateKey::from_pkcs8(&blob.key_material)?;
        Ok(Box::new(EcdsaKey {
            key,
            authorizations: blob.authorizations(),
        }))
    }

    fn supported_import_formats(&self) -> &'static [KeyFormat] {
        IMPORT_FORMATS
    }

    fn supported_export_formats(&self) -> &'static [KeyFormat] {
        EXPORT_FORMATS
    }
}

pub struct EcdsaKey {
    pub(crate) key: EcPrivateKey,
    authorizations: AuthorizationSet,
}

impl Key for EcdsaKey {
    fn authorizations(&self) -> &AuthorizationSet {
        &self.authorizations
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Ec
    }

    fn key_material(&self) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        self.key.to_pkcs8()
    }

    fn formatted_key_material(&self, format: KeyFormat) -> Result<Vec<u8>, ErrorCode> {
        if format != KeyFormat::X509 {
            return Err(ErrorCode::UnsupportedKeyFormat);
        }
        self.key.to_spki()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(params: &[KeyParam]) -> AuthorizationSet {
        params.iter().cloned().collect()
    }

    #[test]
    fn all_named_curves_generate() {
        for bits in [192u32, 224, 256, 384, 521] {
            let key = EcdsaKeyFactory
                .generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, bits)]))
                .unwrap();
            assert_eq!(key.authorizations().int_value(Tag::KEY_SIZE), Some(bits));
        }
    }

    #[test]
    fn unsupported_key_size() {
        let result =
            EcdsaKeyFactory.generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 190)]));
        assert_eq!(result.err(), Some(ErrorCode::UnsupportedKeySize));
    }

    #[test]
    fn default_key_size_is_224() {
        let key = EcdsaKeyFactory.generate_key(&description(&[])).unwrap();
        assert_eq!(key.authorizations().int_value(Tag::KEY_SIZE), Some(224));
    }

    #[test]
    fn import_derives_size_from_curve() {
        let generated = EcdsaKeyFactory
            .generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 256)]))
            .unwrap();
        let pkcs8 = generated.key_material().unwrap();

        let imported = EcdsaKeyFactory
            .import_key(&description(&[]), KeyFormat::Pkcs8, &pkcs8)
            .unwrap();
        assert_eq!(imported.authorizations().int_value(Tag::KEY_SIZE), Some(256));
    }

    #[test]
    fn import_with_wrong_size_is_rejected() {
        let generated = EcdsaKeyFactory
            .generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 256)]))
            .unwrap();
        let pkcs8 = generated.key_material().unwrap();

        let result = EcdsaKeyFactory.import_key(
            &description(&[KeyParam::integer(Tag::KEY_SIZE, 384)]),
            KeyFormat::Pkcs8,
            &pkcs8,
        );
        assert_eq!(result.err(), Some(ErrorCode::ImportParameterMismatch));
    }
}

//! RSA keys.

use std::any::Any;

use num_traits::ToPrimitive;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::authorization::{AuthorizationSet, KeyParam};
use crate::error::ErrorCode;
use crate::keyblob::UnsealedKeyBlob;
use crate::keys::{reconcile_algorithm_tag, Key, KeyFactory};
use crate::tag::Tag;
use crate::{Algorithm, KeyFormat};

pub(crate) const DEFAULT_KEY_SIZE: u32 = 2048;
pub(crate) const DEFAULT_PUBLIC_EXPONENT: u64 = 65537;

static IMPORT_FORMATS: &[KeyFormat] = &[KeyFormat::Pkcs8];
static EXPORT_FORMATS: &[KeyFormat] = &[KeyFormat::X509];

pub struct RsaKeyFactory;

impl KeyFactory for RsaKeyFactory {
    fn registry_key(&self) -> Algorithm {
        Algorithm::Rsa
    }

    fn generate_key(&self, description: &AuthorizationSet) -> Result<Box<dyn Key>, ErrorCode> {
        let mut authorizations = description.clone();

        let public_exponent = match authorizations.long_value(Tag::RSA_PUBLIC_EXPONENT) {
            Some(e) => e,
            None => {
                authorizations.push(KeyParam::long_integer(
                    Tag::RSA_PUBLIC_EXPONENT,
                    DEFAULT_PUBLIC_EXPONENT,
                ))?;
                DEFAULT_PUBLIC_EXPONENT
            }
        };

        let key_size = match authorizations.int_value(Tag::KEY_SIZE) {
            Some(bits) => bits,
            None => {
                authorizations.push(KeyParam::integer(Tag::KEY_SIZE, DEFAULT_KEY_SIZE))?;
                DEFAULT_KEY_SIZE
            }
        };

        reconcile_algorithm_tag(&mut authorizations, Algorithm::Rsa)
            .map_err(|_| ErrorCode::UnknownError)?;

        debug!(key_size, public_exponent, "generating RSA key");
        let key = RsaPrivateKey::new_with_exp(
            &mut OsRng,
            key_size as usize,
            &BigUint::from(public_exponent),
        )
        .map_err(|_| ErrorCode::UnknownError)?;

        Ok(Box::new(RsaKey {
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
        let key =
            RsaPrivateKey::from_pkcs8_der(key_data).map_err(|_| ErrorCode::InvalidKeyBlob)?;

        let mut authorizations = description.clone();

        match authorizations.long_value(Tag::RSA_PUBLIC_EXPONENT) {
            Some(e) => {
                if key.e() != &BigUint::from(e) {
                    return Err(ErrorCode::ImportParameterMismatch);
                }
            }
            None => {
                let e = key
                    .e()
                    .to_u64()
                    .ok_or(ErrorCode::ImportParameterMismatch)?;
                authorizations.push(KeyParam::long_integer(Tag::RSA_PUBLIC_EXPONENT, e))?;
            }
        }

        let modulus_bits = (key.size() * 8) as u32;
        match authorizations.int_value(Tag::KEY_SIZE) {
            Some(bits) if bits == modulus_bits => {}
            Some(_) => return Err(ErrorCode::ImportParameterMismatch),
            None => authorizations.push(KeyParam::integer(Tag::KEY_SIZE, modulus_bits))?,
        }

        reconcile_algorithm_tag(&mut authorizations, Algorithm::Rsa)?;

        Ok(Box::new(RsaKey {
            key,
            authorizations,
        }))
    }

    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode> {
        let key = RsaPrivateKey::from_pkcs8_der(&blob.key_material)
            .map_err(|_| ErrorCode::InvalidKeyBlob)?;
        Ok(Box::new(RsaKey {
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

pub struct RsaKey {
    pub(crate) key: RsaPrivateKey,
    authorizations: AuthorizationSet,
}

impl Key for RsaKey {
    fn authorizations(&self) -> &AuthorizationSet {
        &self.authorizations
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Rsa
    }

    fn key_material(&self) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        self.key
            .to_pkcs8_der()
            .map(|doc| doc.to_bytes())
            .map_err(|_| ErrorCode::UnknownError)
    }

    fn formatted_key_material(&self, format: KeyFormat) -> Result<Vec<u8>, ErrorCode> {
        if format != KeyFormat::X509 {
            return Err(ErrorCode::UnsupportedKeyFormat);
        }
        RsaPublicKey::from(&self.key)
            .to_public_key_der()
            .map(|doc| doc.into_vec())
            .map_err(|_| ErrorCode::UnknownError)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

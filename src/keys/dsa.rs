//! DSA keys.
//!
//! DSA key descriptions may carry explicit domain parameters (DSA_GENERATOR,
//! DSA_P, DSA_Q as big-endian bignums). All three or none: when absent the
//! parameters are generated for the requested key size and persisted into the
//! key's authorizations; a partial specification is an error.

use std::any::Any;

use dsa::{Components, KeySize, SigningKey};
use num_bigint_dig::BigUint;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroizing;

use crate::authorization::{AuthorizationSet, KeyParam};
use crate::error::ErrorCode;
use crate::keyblob::UnsealedKeyBlob;
use crate::keys::{reconcile_algorithm_tag, reconcile_key_size_tag, Key, KeyFactory};
use crate::tag::Tag;
use crate::{Algorithm, KeyFormat};

pub(crate) const DEFAULT_KEY_SIZE: u32 = 2048;

static IMPORT_FORMATS: &[KeyFormat] = &[KeyFormat::Pkcs8];
static EXPORT_FORMATS: &[KeyFormat] = &[KeyFormat::X509];

fn key_size_params(bits: u32) -> Result<KeySize, ErrorCode> {
    match bits {
        1024 => Ok(KeySize::DSA_1024_160),
        2048 => Ok(KeySize::DSA_2048_256),
        3072 => Ok(KeySize::DSA_3072_256),
        _ => Err(ErrorCode::UnsupportedKeySize),
    }
}

pub struct DsaKeyFactory;

impl KeyFactory for DsaKeyFactory {
    fn registry_key(&self) -> Algorithm {
        Algorithm::Dsa
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

        let g = authorizations.blob_value(Tag::DSA_GENERATOR).map(<[u8]>::to_vec);
        let p = authorizations.blob_value(Tag::DSA_P).map(<[u8]>::to_vec);
        let q = authorizations.blob_value(Tag::DSA_Q).map(<[u8]>::to_vec);

        let components = match (g, p, q) {
            (None, None, None) => {
                debug!(key_size, "generating DSA domain parameters");
                let components = Components::generate(&mut OsRng, key_size_params(key_size)?);
                authorizations.push(KeyParam::blob(
                    Tag::DSA_GENERATOR,
                    components.g().to_bytes_be(),
                ))?;
                authorizations.push(KeyParam::blob(Tag::DSA_P, components.p().to_bytes_be()))?;
                authorizations.push(KeyParam::blob(Tag::DSA_Q, components.q().to_bytes_be()))?;
                components
            }
            (Some(g), Some(p), Some(q)) => Components::from_components(
                BigUint::from_bytes_be(&p),
                BigUint::from_bytes_be(&q),
                BigUint::from_bytes_be(&g),
            )
            .map_err(|_| ErrorCode::InvalidDsaParams)?,
            _ => return Err(ErrorCode::InvalidDsaParams),
        };

        reconcile_algorithm_tag(&mut authorizations, Algorithm::Dsa)
            .map_err(|_| ErrorCode::UnknownError)?;

        let key = SigningKey::generate(&mut OsRng, components);
        Ok(Box::new(DsaKey {
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
        let key = SigningKey::from_pkcs8_der(key_data).map_err(|_| ErrorCode::InvalidKeyBlob)?;

        let mut authorizations = description.clone();
        let modulus_bits = key.verifying_key().components().p().bits() as u32;
        reconcile_key_size_tag(&mut authorizations, modulus_bits)?;
        reconcile_algorithm_tag(&mut authorizations, Algorithm::Dsa)?;

        Ok(Box::new(DsaKey {
            key,
            authorizations,
        }))
    }

    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode> {
        let key = SigningKey::from_pkcs8_der(&blob.key_material)
            .map_err(|_| ErrorCode::InvalidKeyBlob)?;
        Ok(Box::new(DsaKey {
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

pub struct DsaKey {
    pub(crate) key: SigningKey,
    authorizations: AuthorizationSet,
}

impl Key for DsaKey {
    fn authorizations(&self) -> &AuthorizationSet {
        &self.authorizations
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Dsa
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
        self.key
            .verifying_key()
            .to_public_key_der()
            .map(|doc| doc.into_vec())
            .map_err(|_| ErrorCode::UnknownError)
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
    fn generate_persists_domain_parameters() {
        let key = DsaKeyFactory
            .generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 1024)]))
            .unwrap();
        let auths = key.authorizations();
        assert!(auths.blob_value(Tag::DSA_GENERATOR).is_some());
        assert!(auths.blob_value(Tag::DSA_P).is_some());
        assert!(auths.blob_value(Tag::DSA_Q).is_some());
        assert_eq!(auths.int_value(Tag::KEY_SIZE), Some(1024));
    }

    #[test]
    fn partial_parameters_are_rejected() {
        let result = DsaKeyFactory.generate_key(&description(&[
            KeyParam::integer(Tag::KEY_SIZE, 1024),
            KeyParam::blob(Tag::DSA_P, vec![1, 2, 3]),
            KeyParam::blob(Tag::DSA_Q, vec![4, 5, 6]),
        ]));
        assert_eq!(result.err(), Some(ErrorCode::InvalidDsaParams));
    }

    #[test]
    fn generate_with_explicit_parameters() {
        let first = DsaKeyFactory
            .generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 1024)]))
            .unwrap();
        let auths = first.authorizations();
        let g = auths.blob_value(Tag::DSA_GENERATOR).unwrap().to_vec();
        let p = auths.blob_value(Tag::DSA_P).unwrap().to_vec();
        let q = auths.blob_value(Tag::DSA_Q).unwrap().to_vec();

        let second = DsaKeyFactory
            .generate_key(&description(&[
                KeyParam::integer(Tag::KEY_SIZE, 1024),
                KeyParam::blob(Tag::DSA_GENERATOR, g.clone()),
                KeyParam::blob(Tag::DSA_P, p.clone()),
                KeyParam::blob(Tag::DSA_Q, q.clone()),
            ]))
            .unwrap();
        assert_eq!(second.authorizations().blob_value(Tag::DSA_P), Some(&p[..]));
    }

    #[test]
    fn unsupported_key_size() {
        let result =
            DsaKeyFactory.generate_key(&description(&[KeyParam::integer(Tag::KEY_SIZE, 1536)]));
        assert_eq!(result.err(), Some(ErrorCode::UnsupportedKeySize));
    }
}

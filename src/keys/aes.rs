//! AES keys.

use std::any::Any;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::authorization::AuthorizationSet;
use crate::error::ErrorCode;
use crate::keyblob::UnsealedKeyBlob;
use crate::keys::{Key, KeyFactory, MAX_SYMMETRIC_KEY_BYTES};
use crate::tag::Tag;
use crate::{Algorithm, KeyFormat};

static IMPORT_FORMATS: &[KeyFormat] = &[KeyFormat::Raw];
static EXPORT_FORMATS: &[KeyFormat] = &[];

fn validated_key_bytes(description: &AuthorizationSet) -> Result<usize, ErrorCode> {
    match description.int_value(Tag::KEY_SIZE) {
        Some(128) => Ok(16),
        Some(192) => Ok(24),
        Some(256) => Ok(32),
        _ => Err(ErrorCode::UnsupportedKeySize),
    }
}

pub struct AesKeyFactory;

impl KeyFactory for AesKeyFactory {
    fn registry_key(&self) -> Algorithm {
        Algorithm::Aes
    }

    fn generate_key(&self, description: &AuthorizationSet) -> Result<Box<dyn Key>, ErrorCode> {
        let key_bytes = validated_key_bytes(description)?;
        let mut key_data = Zeroizing::new(vec![0; key_bytes]);
        OsRng.fill_bytes(&mut key_data);
        Ok(Box::new(AesKey {
            key_data,
            authorizations: description.clone(),
        }))
    }

    fn import_key(
        &self,
        description: &AuthorizationSet,
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<Box<dyn Key>, ErrorCode> {
        let key_bytes = validated_key_bytes(description)?;
        if format != KeyFormat::Raw {
            return Err(ErrorCode::UnsupportedKeyFormat);
        }
        if key_data.len() != key_bytes {
            return Err(ErrorCode::InvalidKeyBlob);
        }
        Ok(Box::new(AesKey {
            key_data: Zeroizing::new(key_data.to_vec()),
            authorizations: description.clone(),
        }))
    }

    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode> {
        if blob.key_material.len() > MAX_SYMMETRIC_KEY_BYTES {
            return Err(ErrorCode::InvalidKeyBlob);
        }
        Ok(Box::new(AesKey {
            key_data: blob.key_material.clone(),
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

pub struct AesKey {
    pub(crate) key_data: Zeroizing<Vec<u8>>,
    authorizations: AuthorizationSet,
}

impl Key for AesKey {
    fn authorizations(&self) -> &AuthorizationSet {
        &self.authorizations
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Aes
    }

    fn key_material(&self) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        Ok(self.key_data.clone())
    }

    fn formatted_key_material(&self, _format: KeyFormat) -> Result<Vec<u8>, ErrorCode> {
        Err(ErrorCode::UnsupportedKeyFormat)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::KeyParam;

    fn description(key_size: u32) -> AuthorizationSet {
        [
            KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Aes as u32),
            KeyParam::integer(Tag::KEY_SIZE, key_size),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn generates_all_supported_sizes() {
        for (bits, bytes) in [(128u32, 16usize), (192, 24), (256, 32)] {
            let key = AesKeyFactory.generate_key(&description(bits)).unwrap();
            assert_eq!(key.key_material().unwrap().len(), bytes);
        }
    }

    #[test]
    fn rejects_other_sizes() {
        for bits in [0u32, 64, 129, 512] {
            assert_eq!(
                AesKeyFactory.generate_key(&description(bits)).err(),
                Some(ErrorCode::UnsupportedKeySize)
            );
        }
    }

    #[test]
    fn missing_key_size_is_rejected() {
        assert_eq!(
            AesKeyFactory
                .generate_key(&AuthorizationSet::new())
                .err(),
            Some(ErrorCode::UnsupportedKeySize)
        );
    }

    #[test]
    fn import_requires_matching_length() {
        assert_eq!(
            AesKeyFactory
                .import_key(&description(128), KeyFormat::Raw, &[0; 24])
                .err(),
            Some(ErrorCode::InvalidKeyBlob)
        );
        assert!(AesKeyFactory
            .import_key(&description(128), KeyFormat::Raw, &[0; 16])
            .is_ok());
    }

    #[test]
    fn import_requires_raw_format() {
        assert_eq!(
            AesKeyFactory
                .import_key(&description(128), KeyFormat::Pkcs8, &[0; 16])
                .err(),
            Some(ErrorCode::UnsupportedKeyFormat)
        );
    }

    #[test]
    fn export_always_unsupported() {
        let key = AesKeyFactory.generate_key(&description(128)).unwrap();
        assert_eq!(
            key.formatted_key_material(KeyFormat::X509).err(),
            Some(ErrorCode::UnsupportedKeyFormat)
        );
    }
}

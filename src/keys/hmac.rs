//! HMAC keys.

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
    let bits = description
        .int_value(Tag::KEY_SIZE)
        .ok_or(ErrorCode::UnsupportedKeySize)?;
    if bits == 0 || bits % 8 != 0 || bits as usize / 8 > MAX_SYMMETRIC_KEY_BYTES {
        return Err(ErrorCode::UnsupportedKeySize);
    }
    Ok(bits as usize / 8)
}

pub struct HmacKeyFactory;

impl KeyFactory for HmacKeyFactory {
    fn registry_key(&self) -> Algorithm {
        Algorithm::Hmac
    }

    fn generate_key(&self, description: &AuthorizationSet) -> Result<Box<dyn Key>, ErrorCode> {
        let key_bytes = validated_key_bytes(description)?;
        let mut key_data = Zeroizing::new(vec![0; key_bytes]);
        OsRng.fill_bytes(&mut key_data);
        Ok(Box::new(HmacKey {
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
        Ok(Box::new(HmacKey {
            key_data: Zeroizing::new(key_data.to_vec()),
            authorizations: description.clone(),
        }))
    }

    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode> {
        if blob.key_material.len() > MAX_SYMMETRIC_KEY_BYTES {
            return Err(ErrorCode::InvalidKeyBlob);
        }
        Ok(Box::new(HmacKey {
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

pub struct HmacKey {
    pub(crate) key_data: Zeroizing<Vec<u8>>,
    authorizations: AuthorizationSet,
}

impl Key for HmacKey {
    fn authorizations(&self) -> &AuthorizationSet {
        &self.authorizations
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Hmac
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

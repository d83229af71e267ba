//! HMAC sign and verify operations.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::hmac::HmacKey;
use crate::keys::Key;
use crate::ops::{
    get_and_validate_digest, resolve_mac_length, Operation, OperationFactory, OperationType,
};
use crate::tag::Tag;
use crate::{Algorithm, Digest, Purpose};

static DIGESTS: &[Digest] = &[
    Digest::Sha1,
    Digest::Sha224,
    Digest::Sha256,
    Digest::Sha384,
    Digest::Sha512,
];

pub struct HmacOperationFactory {
    purpose: Purpose,
}

impl HmacOperationFactory {
    pub fn sign() -> Self {
        HmacOperationFactory {
            purpose: Purpose::Sign,
        }
    }

    pub fn verify() -> Self {
        HmacOperationFactory {
            purpose: Purpose::Verify,
        }
    }
}

impl OperationFactory for HmacOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Hmac, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        let digest = get_and_validate_digest(self, begin_params, key.authorizations())?;

        let mac_length_bits = resolve_mac_length(begin_params, key.authorizations())
            .ok_or(ErrorCode::UnsupportedMacLength)?;
        if mac_length_bits == 0 || mac_length_bits % 8 != 0 {
            return Err(ErrorCode::UnsupportedMacLength);
        }
        let mac_length = mac_length_bits as usize / 8;
        if mac_length > digest.output_len() {
            return Err(ErrorCode::UnsupportedMacLength);
        }
        if key.authorizations().get(Tag::MAC_LENGTH).is_some()
            && !key.authorizations().contains_int(Tag::MAC_LENGTH, mac_length_bits)
        {
            return Err(ErrorCode::UnsupportedMacLength);
        }

        let key = key
            .into_any()
            .downcast::<HmacKey>()
            .map_err(|_| ErrorCode::IncompatibleAlgorithm)?;
        let mac = MacState::new(digest, &key.key_data)?;

        Ok(Box::new(HmacOperation {
            purpose: self.purpose,
            mac: Some(mac),
            mac_length,
        }))
    }

    fn supported_digests(&self) -> &'static [Digest] {
        DIGESTS
    }
}

enum MacState {
    Sha1(Hmac<Sha1>),
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

impl MacState {
    fn new(digest: Digest, key: &[u8]) -> Result<Self, ErrorCode> {
        let bad_key = ErrorCode::UnknownError;
        Ok(match digest {
            Digest::Sha1 => MacState::Sha1(Mac::new_from_slice(key).map_err(|_| bad_key)?),
            Digest::Sha224 => MacState::Sha224(Mac::new_from_slice(key).map_err(|_| bad_key)?),
            Digest::Sha256 => MacState::Sha256(Mac::new_from_slice(key).map_err(|_| bad_key)?),
            Digest::Sha384 => MacState::Sha384(Mac::new_from_slice(key).map_err(|_| bad_key)?),
            Digest::Sha512 => MacState::Sha512(Mac::new_from_slice(key).map_err(|_| bad_key)?),
            Digest::None => return Err(ErrorCode::UnsupportedDigest),
        })
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            MacState::Sha1(mac) => mac.update(data),
            MacState::Sha224(mac) => mac.update(data),
            MacState::Sha256(mac) => mac.update(data),
            MacState::Sha384(mac) => mac.update(data),
            MacState::Sha512(mac) => mac.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            MacState::Sha1(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::Sha224(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::Sha384(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::Sha512(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }
}

struct HmacOperation {
    purpose: Purpose,
    mac: Option<MacState>,
    mac_length: usize,
}

impl Operation for HmacOperation {
    fn purpose(&self) -> Purpose {
        self.purpose
    }

    fn begin(
        &mut self,
        _input_params: &AuthorizationSet,
        _output_params: &mut AuthorizationSet,
    ) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn update(
        &mut self,
        _additional_params: &AuthorizationSet,
        input: &Buffer,
        _output: &mut Buffer,
    ) -> Result<usize, ErrorCode> {
        let mac = self.mac.as_mut().ok_or(ErrorCode::UnknownError)?;
        mac.update(input.peek_read());
        Ok(input.available_read())
    }

    fn finish(
        &mut self,
        _additional_params: &AuthorizationSet,
        signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        let digest = self.mac.take().ok_or(ErrorCode::UnknownError)?.finalize();
        match self.purpose {
            Purpose::Sign => {
                output.reserve(self.mac_length);
                output.write(&digest[..self.mac_length]);
                Ok(())
            }
            Purpose::Verify => {
                let expected = signature.peek_read();
                if expected.len() > digest.len() {
                    return Err(ErrorCode::InvalidInputLength);
                }
                if !bool::from(expected.ct_eq(&digest[..expected.len()])) {
                    return Err(ErrorCode::VerificationFailed);
                }
                Ok(())
            }
            _ => Err(ErrorCode::UnsupportedPurpose),
        }
    }
}

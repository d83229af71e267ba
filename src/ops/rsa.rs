//! RSA operations.

use num_bigint_dig::BigUint;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::rsa::RsaKey;
use crate::keys::Key;
use crate::ops::{
    get_and_validate_digest, get_and_validate_padding, Operation, OperationFactory, OperationType,
};
use crate::{Algorithm, Digest, PaddingMode, Purpose};

static SIGN_DIGESTS: &[Digest] = &[Digest::None, Digest::Sha256];
static SIGN_PADDINGS: &[PaddingMode] = &[
    PaddingMode::None,
    PaddingMode::RsaPss,
    PaddingMode::RsaPkcs1_1_5_Sign,
];
static CRYPT_PADDINGS: &[PaddingMode] = &[PaddingMode::RsaOaep, PaddingMode::RsaPkcs1_1_5_Encrypt];

/// PSS needs room for the digest, two framing bytes, and at least eight
/// bytes of salt.
fn check_pss_key_size(key: &RsaPrivateKey, digest: Digest) -> Result<(), ErrorCode> {
    if digest.output_len() + 2 + 8 > key.size() {
        return Err(ErrorCode::IncompatibleDigest);
    }
    Ok(())
}

fn downcast_rsa(key: Box<dyn Key>) -> Result<RsaPrivateKey, ErrorCode> {
    key.into_any()
        .downcast::<RsaKey>()
        .map(|k| k.key)
        .map_err(|_| ErrorCode::IncompatibleAlgorithm)
}

/// Incremental message state: raw signing buffers the whole message,
/// digested signing folds it into the hash as it arrives.
enum MessageState {
    Raw(Vec<u8>),
    Sha256(Sha256),
}

impl MessageState {
    fn new(digest: Digest) -> Self {
        match digest {
            Digest::None => MessageState::Raw(Vec::new()),
            _ => MessageState::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            MessageState::Raw(buf) => buf.extend_from_slice(data),
            MessageState::Sha256(ctx) => ctx.update(data),
        }
    }

    fn finish(self) -> Vec<u8> {
        match self {
            MessageState::Raw(buf) => buf,
            MessageState::Sha256(ctx) => ctx.finalize().to_vec(),
        }
    }
}

/// Raw RSA signature: `m^d mod n` over the message as a big-endian integer.
/// The backend declines anything but an exact key-sized message below the
/// modulus.
fn raw_sign(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    if message.len() != key.size() {
        return Err(ErrorCode::UnknownError);
    }
    let m = BigUint::from_bytes_be(message);
    if &m >= key.n() {
        return Err(ErrorCode::UnknownError);
    }
    let s = rsa::hazmat::rsa_decrypt_and_check(key, Some(&mut OsRng), &m)
        .map_err(|_| ErrorCode::UnknownError)?;
    Ok(left_pad(&s.to_bytes_be(), key.size()))
}

fn raw_verify(key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<(), ErrorCode> {
    if message.len() != key.size() {
        return Err(ErrorCode::InvalidInputLength);
    }
    if signature.len() != message.len() {
        return Err(ErrorCode::VerificationFailed);
    }
    let s = BigUint::from_bytes_be(signature);
    if &s >= key.n() {
        return Err(ErrorCode::VerificationFailed);
    }
    let recovered =
        rsa::hazmat::rsa_encrypt(key, &s).map_err(|_| ErrorCode::VerificationFailed)?;
    if left_pad(&recovered.to_bytes_be(), key.size()) != message {
        return Err(ErrorCode::VerificationFailed);
    }
    Ok(())
}

fn left_pad(bytes: &[u8], size: usize) -> Vec<u8> {
    let mut out = vec![0; size.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

/// Factory for RSA sign and verify operations
pub struct RsaSignVerifyOperationFactory {
    purpose: Purpose,
}

impl RsaSignVerifyOperationFactory {
    pub fn sign() -> Self {
        RsaSignVerifyOperationFactory {
            purpose: Purpose::Sign,
        }
    }

    pub fn verify() -> Self {
        RsaSignVerifyOperationFactory {
            purpose: Purpose::Verify,
        }
    }
}

impl OperationFactory for RsaSignVerifyOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Rsa, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        let digest = get_and_validate_digest(self, begin_params, key.authorizations())?;
        let padding = get_and_validate_padding(self, begin_params, key.authorizations())?;
        if padding == PaddingMode::RsaPss && digest == Digest::None {
            return Err(ErrorCode::IncompatibleDigest);
        }
        let key = downcast_rsa(key)?;
        Ok(Box::new(RsaSignVerifyOperation {
            purpose: self.purpose,
            key,
            digest,
            padding,
            message: MessageState::new(digest),
        }))
    }

    fn supported_digests(&self) -> &'static [Digest] {
        SIGN_DIGESTS
    }

    fn supported_padding_modes(&self) -> &'static [PaddingMode] {
        SIGN_PADDINGS
    }
}

struct RsaSignVerifyOperation {
    purpose: Purpose,
    key: RsaPrivateKey,
    digest: Digest,
    padding: PaddingMode,
    message: MessageState,
}

impl Operation for RsaSignVerifyOperation {
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
        self.message.update(input.peek_read());
        Ok(input.available_read())
    }

    fn finish(
        &mut self,
        _additional_params: &AuthorizationSet,
        signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        let message = std::mem::replace(&mut self.message, MessageState::Raw(Vec::new())).finish();
        match self.purpose {
            Purpose::Sign => {
                let sig = self.sign(&message)?;
                output.reserve(sig.len());
                output.write(&sig);
                Ok(())
            }
            Purpose::Verify => self.verify(&message, signature.peek_read()),
            _ => Err(ErrorCode::UnsupportedPurpose),
        }
    }
}

impl RsaSignVerifyOperation {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        match self.padding {
            PaddingMode::None => raw_sign(&self.key, message),
            PaddingMode::RsaPkcs1_1_5_Sign => {
                let scheme = match self.digest {
                    Digest::None => Pkcs1v15Sign::new_unprefixed(),
                    _ => Pkcs1v15Sign::new::<Sha256>(),
                };
                self.key
                    .sign(scheme, message)
                    .map_err(|_| ErrorCode::UnknownError)
            }
            PaddingMode::RsaPss => {
                check_pss_key_size(&self.key, self.digest)?;
                self.key
                    .sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), message)
                    .map_err(|_| ErrorCode::UnknownError)
            }
            _ => Err(ErrorCode::UnsupportedPaddingMode),
        }
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), ErrorCode> {
        let public = RsaPublicKey::from(&self.key);
        match self.padding {
            PaddingMode::None => raw_verify(&public, message, signature),
            PaddingMode::RsaPkcs1_1_5_Sign => {
                let scheme = match self.digest {
                    Digest::None => Pkcs1v15Sign::new_unprefixed(),
                    _ => Pkcs1v15Sign::new::<Sha256>(),
                };
                public
                    .verify(scheme, message, signature)
                    .map_err(|_| ErrorCode::VerificationFailed)
            }
            PaddingMode::RsaPss => {
                check_pss_key_size(&self.key, self.digest)?;
                public
                    .verify(Pss::new::<Sha256>(), message, signature)
                    .map_err(|_| ErrorCode::VerificationFailed)
            }
            _ => Err(ErrorCode::UnsupportedPaddingMode),
        }
    }
}

/// Factory for RSA encrypt and decrypt operations
pub struct RsaCryptOperationFactory {
    purpose: Purpose,
}

impl RsaCryptOperationFactory {
    pub fn encrypt() -> Self {
        RsaCryptOperationFactory {
            purpose: Purpose::Encrypt,
        }
    }

    pub fn decrypt() -> Self {
        RsaCryptOperationFactory {
            purpose: Purpose::Decrypt,
        }
    }
}

impl OperationFactory for RsaCryptOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Rsa, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        let padding = get_and_validate_padding(self, begin_params, key.authorizations())?;
        let key = downcast_rsa(key)?;
        Ok(Box::new(RsaCryptOperation {
            purpose: self.purpose,
            key,
            padding,
            data: Vec::new(),
        }))
    }

    fn supported_padding_modes(&self) -> &'static [PaddingMode] {
        CRYPT_PADDINGS
    }
}

struct RsaCryptOperation {
    purpose: Purpose,
    key: RsaPrivateKey,
    padding: PaddingMode,
    data: Vec<u8>,
}

impl Operation for RsaCryptOperation {
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
        self.data.extend_from_slice(input.peek_read());
        Ok(input.available_read())
    }

    fn finish(
        &mut self,
        _additional_params: &AuthorizationSet,
        _signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        let result = match self.purpose {
            Purpose::Encrypt => {
                let public = RsaPublicKey::from(&self.key);
                let encrypted = match self.padding {
                    PaddingMode::RsaOaep => {
                        public.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &self.data)
                    }
                    PaddingMode::RsaPkcs1_1_5_Encrypt => {
                        public.encrypt(&mut OsRng, Pkcs1v15Encrypt, &self.data)
                    }
                    _ => return Err(ErrorCode::UnsupportedPaddingMode),
                };
                encrypted.map_err(|e| match e {
                    rsa::Error::MessageTooLong => ErrorCode::InvalidInputLength,
                    _ => ErrorCode::UnknownError,
                })?
            }
            Purpose::Decrypt => {
                let decrypted = match self.padding {
                    PaddingMode::RsaOaep => self.key.decrypt(Oaep::new::<Sha1>(), &self.data),
                    PaddingMode::RsaPkcs1_1_5_Encrypt => {
                        self.key.decrypt(Pkcs1v15Encrypt, &self.data)
                    }
                    _ => return Err(ErrorCode::UnsupportedPaddingMode),
                };
                decrypted.map_err(|_| ErrorCode::UnknownError)?
            }
            _ => return Err(ErrorCode::UnsupportedPurpose),
        };
        output.reserve(result.len());
        output.write(&result);
        Ok(())
    }
}

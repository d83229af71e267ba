//! ECDSA sign and verify operations.
//!
//! Digest NONE only: the buffered message is the prehash, truncated or
//! padded to the curve's field size by the backend. Signatures are
//! DER-encoded (r, s) sequences.

use signature::hazmat::{PrehashSigner, PrehashVerifier};

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::ecdsa::{EcPrivateKey, EcdsaKey};
use crate::keys::Key;
use crate::ops::{get_and_validate_digest, Operation, OperationFactory, OperationType};
use crate::{Algorithm, Digest, Purpose};

static DIGESTS: &[Digest] = &[Digest::None];

pub struct EcdsaOperationFactory {
    purpose: Purpose,
}

impl EcdsaOperationFactory {
    pub fn sign() -> Self {
        EcdsaOperationFactory {
            purpose: Purpose::Sign,
        }
    }

    pub fn verify() -> Self {
        EcdsaOperationFactory {
            purpose: Purpose::Verify,
        }
    }
}

impl OperationFactory for EcdsaOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Ec, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        get_and_validate_digest(self, begin_params, key.authorizations())?;
        let key = key
            .into_any()
            .downcast::<EcdsaKey>()
            .map(|k| k.key)
            .map_err(|_| ErrorCode::IncompatibleAlgorithm)?;
        Ok(Box::new(EcdsaOperation {
            purpose: self.purpose,
            key,
            data: Vec::new(),
        }))
    }

    fn supported_digests(&self) -> &'static [Digest] {
        DIGESTS
    }
}

struct EcdsaOperation {
    purpose: Purpose,
    key: EcPrivateKey,
    data: Vec<u8>,
}

fn sign(key: &EcPrivateKey, data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    let failed = ErrorCode::UnknownError;
    let der = match key {
        EcPrivateKey::P192(k) => {
            let sig: p192::ecdsa::Signature = k.sign_prehash(data).map_err(|_| failed)?;
            sig.to_der().as_bytes().to_vec()
        }
        EcPrivateKey::P224(k) => {
            let sig: p224::ecdsa::Signature = k.sign_prehash(data).map_err(|_| failed)?;
            sig.to_der().as_bytes().to_vec()
        }
        EcPrivateKey::P256(k) => {
            let sig: p256::ecdsa::Signature = k.sign_prehash(data).map_err(|_| failed)?;
            sig.to_der().as_bytes().to_vec()
        }
        EcPrivateKey::P384(k) => {
            let sig: p384::ecdsa::Signature = k.sign_prehash(data).map_err(|_| failed)?;
            sig.to_der().as_bytes().to_vec()
        }
        EcPrivateKey::P521(k) => {
            let sig: p521::ecdsa::Signature = k.sign_prehash(data).map_err(|_| failed)?;
            sig.to_der().as_bytes().to_vec()
        }
    };
    Ok(der)
}

fn verify(key: &EcPrivateKey, data: &[u8], signature: &[u8]) -> Result<(), ErrorCode> {
    let failed = ErrorCode::VerificationFailed;
    match key {
        EcPrivateKey::P192(k) => {
            let sig = p192::ecdsa::Signature::from_der(signature).map_err(|_| failed)?;
            k.verifying_key().verify_prehash(data, &sig).map_err(|_| failed)
        }
        EcPrivateKey::P224(k) => {
            let sig = p224::ecdsa::Signature::from_der(signature).map_err(|_| failed)?;
            k.verifying_key().verify_prehash(data, &sig).map_err(|_| failed)
        }
        EcPrivateKey::P256(k) => {
            let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| failed)?;
            k.verifying_key().verify_prehash(data, &sig).map_err(|_| failed)
        }
        EcPrivateKey::P384(k) => {
            let sig = p384::ecdsa::Signature::from_der(signature).map_err(|_| failed)?;
            k.verifying_key().verify_prehash(data, &sig).map_err(|_| failed)
        }
        EcPrivateKey::P521(k) => {
            let sig = p521::ecdsa::Signature::from_der(signature).map_err(|_| failed)?;
            k.verifying_key().verify_prehash(data, &sig).map_err(|_| failed)
        }
    }
}

impl Operation for EcdsaOperation {
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
        signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        match self.purpose {
            Purpose::Sign => {
                let der = sign(&self.key, &self.data)?;
                output.reserve(der.len());
                output.write(&der);
                Ok(())
            }
            Purpose::Verify => verify(&self.key, &self.data, signature.peek_read()),
            _ => Err(ErrorCode::UnsupportedPurpose),
        }
    }
}

//! DSA sign and verify operations.
//!
//! Digest NONE only: the buffered message is treated as the prehash and
//! truncated to the subgroup size by the backend. Signatures are DER-encoded
//! (r, s) sequences.

use der::{Decode, Encode};
use signature::hazmat::{PrehashSigner, PrehashVerifier};

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::dsa::DsaKey;
use crate::keys::Key;
use crate::ops::{get_and_validate_digest, Operation, OperationFactory, OperationType};
use crate::{Algorithm, Digest, Purpose};

static DIGESTS: &[Digest] = &[Digest::None];

pub struct DsaOperationFactory {
    purpose: Purpose,
}

impl DsaOperationFactory {
    pub fn sign() -> Self {
        DsaOperationFactory {
            purpose: Purpose::Sign,
        }
    }

    pub fn verify() -> Self {
        DsaOperationFactory {
            purpose: Purpose::Verify,
        }
    }
}

impl OperationFactory for DsaOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Dsa, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        get_and_validate_digest(self, begin_params, key.authorizations())?;
        let key = key
            .into_any()
            .downcast::<DsaKey>()
            .map(|k| k.key)
            .map_err(|_| ErrorCode::IncompatibleAlgorithm)?;
        Ok(Box::new(DsaOperation {
            purpose: self.purpose,
            key,
            data: Vec::new(),
        }))
    }

    fn supported_digests(&self) -> &'static [Digest] {
        DIGESTS
    }
}

struct DsaOperation {
    purpose: Purpose,
    key: dsa::SigningKey,
    data: Vec<u8>,
}

impl Operation for DsaOperation {
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
                let sig: dsa::Signature = self
                    .key
                    .sign_prehash(&self.data)
                    .map_err(|_| ErrorCode::UnknownError)?;
                let der = sig.to_der().map_err(|_| ErrorCode::UnknownError)?;
                output.reserve(der.len());
                output.write(&der);
                Ok(())
            }
            Purpose::Verify => {
                let sig = dsa::Signature::from_der(signature.peek_read())
                    .map_err(|_| ErrorCode::VerificationFailed)?;
                self.key
                    .verifying_key()
                    .verify_prehash(&self.data, &sig)
                    .map_err(|_| ErrorCode::VerificationFailed)
            }
            _ => Err(ErrorCode::UnsupportedPurpose),
        }
    }
}

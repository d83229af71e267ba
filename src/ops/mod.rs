//! Cryptographic operation sessions and their factories.
//!
//! An [`Operation`] is a stateful begin/update/finish session. The
//! [`OperationFactory`] that builds it is looked up by `(algorithm, purpose)`
//! in an [`OperationFactoryRegistry`] constructed once at service startup.
//! Creating an operation moves the backend key handle out of the [`Key`]
//! into the operation, which owns it until the session ends.
//!
//! Parameter resolution at Begin: digest, padding, block mode, and MAC
//! length are taken from the Begin parameters first, falling back to the
//! key's own authorizations. A value the factory cannot do at all is
//! "unsupported"; a value the factory can do but this key does not authorize
//! is "incompatible".

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::Key;
use crate::tag::Tag;
use crate::{Algorithm, BlockMode, Digest, PaddingMode, Purpose};

pub mod aes;
pub mod dsa;
pub mod ecdsa;
pub mod hmac;
pub mod rsa;

pub use self::aes::AesOperationFactory;
pub use self::dsa::DsaOperationFactory;
pub use self::ecdsa::EcdsaOperationFactory;
pub use self::hmac::HmacOperationFactory;
pub use self::rsa::{RsaCryptOperationFactory, RsaSignVerifyOperationFactory};

/// Registry key for operation factories
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OperationType {
    pub algorithm: Algorithm,
    pub purpose: Purpose,
}

impl OperationType {
    pub fn new(algorithm: Algorithm, purpose: Purpose) -> Self {
        OperationType { algorithm, purpose }
    }
}

/// An in-flight cryptographic session
pub trait Operation {
    /// What this operation does with its key
    fn purpose(&self) -> Purpose;

    /// Start the session. `output_params` receives any parameters the
    /// operation feeds back to the client.
    fn begin(
        &mut self,
        input_params: &AuthorizationSet,
        output_params: &mut AuthorizationSet,
    ) -> Result<(), ErrorCode>;

    /// Feed input, returning how many input bytes were consumed
    fn update(
        &mut self,
        additional_params: &AuthorizationSet,
        input: &Buffer,
        output: &mut Buffer,
    ) -> Result<usize, ErrorCode>;

    /// Complete the session. `signature` carries the value to check for
    /// verification operations.
    fn finish(
        &mut self,
        additional_params: &AuthorizationSet,
        signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode>;

    /// Cancel the session. Cleanup happens on drop, so this is infallible
    /// for every built-in operation.
    fn abort(&mut self) -> Result<(), ErrorCode> {
        Ok(())
    }
}

/// Builder of operations for one (algorithm, purpose) pair
pub trait OperationFactory {
    fn registry_key(&self) -> OperationType;

    /// Build an operation around `key`, consuming it
    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode>;

    fn supported_block_modes(&self) -> &'static [BlockMode] {
        &[]
    }

    fn supported_padding_modes(&self) -> &'static [PaddingMode] {
        &[]
    }

    fn supported_digests(&self) -> &'static [Digest] {
        &[]
    }
}

/// Registry mapping (algorithm, purpose) to operation factories.
///
/// Lookups scan linearly; the table is small and immutable after startup.
pub struct OperationFactoryRegistry {
    factories: Vec<Box<dyn OperationFactory>>,
}

impl OperationFactoryRegistry {
    pub fn new() -> Self {
        OperationFactoryRegistry {
            factories: Vec::new(),
        }
    }

    /// All built-in factories
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RsaSignVerifyOperationFactory::sign()));
        registry.register(Box::new(RsaSignVerifyOperationFactory::verify()));
        registry.register(Box::new(RsaCryptOperationFactory::encrypt()));
        registry.register(Box::new(RsaCryptOperationFactory::decrypt()));
        registry.register(Box::new(DsaOperationFactory::sign()));
        registry.register(Box::new(DsaOperationFactory::verify()));
        registry.register(Box::new(EcdsaOperationFactory::sign()));
        registry.register(Box::new(EcdsaOperationFactory::verify()));
        registry.register(Box::new(AesOperationFactory::encrypt()));
        registry.register(Box::new(AesOperationFactory::decrypt()));
        registry.register(Box::new(HmacOperationFactory::sign()));
        registry.register(Box::new(HmacOperationFactory::verify()));
        registry
    }

    pub fn register(&mut self, factory: Box<dyn OperationFactory>) {
        debug_assert!(self.get(factory.registry_key()).is_none());
        self.factories.push(factory);
    }

    pub fn get(&self, key: OperationType) -> Option<&dyn OperationFactory> {
        self.factories
            .iter()
            .find(|f| f.registry_key() == key)
            .map(|f| f.as_ref())
    }
}

impl Default for OperationFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A Begin-time parameter value: from the Begin parameters if present,
/// otherwise from the key's authorizations
fn resolve_enum(
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
    tag: Tag,
) -> Option<u32> {
    begin_params.enum_value(tag).or_else(|| key_auths.enum_value(tag))
}

fn resolve_int(
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
    tag: Tag,
) -> Option<u32> {
    begin_params.int_value(tag).or_else(|| key_auths.int_value(tag))
}

pub(crate) fn get_and_validate_digest(
    factory: &dyn OperationFactory,
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
) -> Result<Digest, ErrorCode> {
    let raw = resolve_enum(begin_params, key_auths, Tag::DIGEST)
        .ok_or(ErrorCode::UnsupportedDigest)?;
    let digest = Digest::from_u32(raw).ok_or(ErrorCode::UnsupportedDigest)?;
    if !factory.supported_digests().contains(&digest) {
        return Err(ErrorCode::UnsupportedDigest);
    }
    if !key_auths.contains_enum(Tag::DIGEST, raw) {
        return Err(ErrorCode::IncompatibleDigest);
    }
    Ok(digest)
}

pub(crate) fn get_and_validate_padding(
    factory: &dyn OperationFactory,
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
) -> Result<PaddingMode, ErrorCode> {
    let raw = resolve_enum(begin_params, key_auths, Tag::PADDING)
        .ok_or(ErrorCode::UnsupportedPaddingMode)?;
    let padding = PaddingMode::from_u32(raw).ok_or(ErrorCode::UnsupportedPaddingMode)?;
    if !factory.supported_padding_modes().contains(&padding) {
        return Err(ErrorCode::UnsupportedPaddingMode);
    }
    if !key_auths.contains_enum(Tag::PADDING, raw) {
        return Err(ErrorCode::IncompatiblePaddingMode);
    }
    Ok(padding)
}

pub(crate) fn get_and_validate_block_mode(
    factory: &dyn OperationFactory,
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
) -> Result<BlockMode, ErrorCode> {
    let raw = resolve_enum(begin_params, key_auths, Tag::BLOCK_MODE)
        .ok_or(ErrorCode::UnsupportedBlockMode)?;
    let mode = BlockMode::from_u32(raw).ok_or(ErrorCode::UnsupportedBlockMode)?;
    if !factory.supported_block_modes().contains(&mode) {
        return Err(ErrorCode::UnsupportedBlockMode);
    }
    if !key_auths.contains_enum(Tag::BLOCK_MODE, raw) {
        return Err(ErrorCode::IncompatibleBlockMode);
    }
    Ok(mode)
}

pub(crate) fn resolve_mac_length(
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
) -> Option<u32> {
    resolve_int(begin_params, key_auths, Tag::MAC_LENGTH)
}

pub(crate) fn resolve_chunk_length(
    begin_params: &AuthorizationSet,
    key_auths: &AuthorizationSet,
) -> Option<u32> {
    resolve_int(begin_params, key_auths, Tag::CHUNK_LENGTH)
}

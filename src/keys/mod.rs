//! Key objects and the per-algorithm factories that build them.
//!
//! A [`KeyFactory`] knows how to generate, import, and load keys of one
//! algorithm; a [`Key`] is the in-memory result, carrying its authorization
//! set and the backend key handle. Factories live in a
//! [`KeyFactoryRegistry`] built once at service construction; lookups scan
//! linearly and enumeration yields insertion order, which is also the order
//! reported to clients.

use std::any::Any;

use zeroize::Zeroizing;

use crate::authorization::{AuthorizationSet, KeyParam};
use crate::error::ErrorCode;
use crate::keyblob::UnsealedKeyBlob;
use crate::tag::Tag;
use crate::{Algorithm, KeyFormat};

pub mod aes;
pub mod dsa;
pub mod ecdsa;
pub mod hmac;
pub mod rsa;

pub use self::aes::AesKeyFactory;
pub use self::dsa::DsaKeyFactory;
pub use self::ecdsa::EcdsaKeyFactory;
pub use self::hmac::HmacKeyFactory;
pub use self::rsa::RsaKeyFactory;

/// Symmetric key material never exceeds 32 bytes
pub(crate) const MAX_SYMMETRIC_KEY_BYTES: usize = 32;

/// An in-memory key: policy plus a handle to backend key material
pub trait Key {
    /// The key's complete authorization set
    fn authorizations(&self) -> &AuthorizationSet;

    /// The key's algorithm
    fn algorithm(&self) -> Algorithm;

    /// The raw key material in the key's storage format (PKCS#8 for
    /// asymmetric keys, raw bytes for symmetric keys)
    fn key_material(&self) -> Result<Zeroizing<Vec<u8>>, ErrorCode>;

    /// The key material converted to `format` for export
    fn formatted_key_material(&self, format: KeyFormat) -> Result<Vec<u8>, ErrorCode>;

    /// Downcast support: operations take ownership of the backend handle
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Builder of keys for a single algorithm
pub trait KeyFactory {
    /// The algorithm this factory is registered under
    fn registry_key(&self) -> Algorithm;

    /// Generate a fresh key under `description`
    fn generate_key(&self, description: &AuthorizationSet) -> Result<Box<dyn Key>, ErrorCode>;

    /// Import caller-supplied key material under `description`
    fn import_key(
        &self,
        description: &AuthorizationSet,
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<Box<dyn Key>, ErrorCode>;

    /// Rebuild a key from an unsealed blob
    fn load_key(&self, blob: &UnsealedKeyBlob) -> Result<Box<dyn Key>, ErrorCode>;

    fn supported_import_formats(&self) -> &'static [KeyFormat];

    fn supported_export_formats(&self) -> &'static [KeyFormat];
}

/// Registry mapping algorithms to their key factories.
///
/// Immutable after construction; shared by the whole service instance.
pub struct KeyFactoryRegistry {
    factories: Vec<Box<dyn KeyFactory>>,
}

impl KeyFactoryRegistry {
    pub fn new() -> Self {
        KeyFactoryRegistry {
            factories: Vec::new(),
        }
    }

    /// All built-in factories, in the enumeration order reported to clients
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RsaKeyFactory));
        registry.register(Box::new(DsaKeyFactory));
        registry.register(Box::new(EcdsaKeyFactory));
        registry.register(Box::new(AesKeyFactory));
        registry.register(Box::new(HmacKeyFactory));
        registry
    }

    /// Register a factory. A factory for the same algorithm must not already
    /// be present.
    pub fn register(&mut self, factory: Box<dyn KeyFactory>) {
        debug_assert!(self.get(factory.registry_key()).is_none());
        self.factories.push(factory);
    }

    pub fn get(&self, algorithm: Algorithm) -> Option<&dyn KeyFactory> {
        self.factories
            .iter()
            .find(|f| f.registry_key() == algorithm)
            .map(|f| f.as_ref())
    }

    /// Registered algorithms in insertion order
    pub fn algorithms(&self) -> Vec<Algorithm> {
        self.factories.iter().map(|f| f.registry_key()).collect()
    }
}

impl Default for KeyFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Import-time ALGORITHM tag handling: a present tag must match the
/// importing factory; an absent one is stamped in.
pub(crate) fn reconcile_algorithm_tag(
    authorizations: &mut AuthorizationSet,
    algorithm: Algorithm,
) -> Result<(), ErrorCode> {
    match authorizations.enum_value(Tag::ALGORITHM) {
        Some(value) if value == algorithm as u32 => Ok(()),
        Some(_) => Err(ErrorCode::ImportParameterMismatch),
        None => authorizations.push(KeyParam::enumerated(Tag::ALGORITHM, algorithm as u32)),
    }
}

/// Import-time KEY_SIZE tag handling: a present tag must equal the size
/// derived from the key material; an absent one is stamped in.
pub(crate) fn reconcile_key_size_tag(
    authorizations: &mut AuthorizationSet,
    derived_bits: u32,
) -> Result<(), ErrorCode> {
    match authorizations.int_value(Tag::KEY_SIZE) {
        Some(value) if value == derived_bits => Ok(()),
        Some(_) => Err(ErrorCode::ImportParameterMismatch),
        None => authorizations.push(KeyParam::integer(Tag::KEY_SIZE, derived_bits)),
    }
}

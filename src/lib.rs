//! State machine for a software-backed key-management service.
//!
//! This crate implements the core of a keymaster: a request/response service
//! that generates, imports, exports, and uses cryptographic keys on behalf of
//! clients while keeping all private key material sealed inside authenticated
//! blobs that only the service can open. It performs no I/O; callers
//! deserialize a request message, hand it to [`Keymaster`], and serialize the
//! response. Client state between calls lives entirely in the opaque key
//! blobs and operation handles the service returns.
//!
//! The pieces fit together like this: an [`AuthorizationSet`] declares a
//! key's policy; [`keyblob`] seals policy and key material into a tamper-
//! evident blob; [`keys`] and [`ops`] hold per-algorithm factories that the
//! service consults to route a request; and an operation table tracks
//! in-flight begin/update/finish sessions by random 64-bit handle.

mod authorization;
mod buffer;
pub mod coding;
mod error;
pub mod keyblob;
pub mod keys;
pub mod messages;
pub mod ops;
mod table;
mod tag;

mod service;

pub use crate::authorization::{AuthorizationSet, KeyParam, ParamValue};
pub use crate::buffer::Buffer;
pub use crate::error::ErrorCode;
pub use crate::service::{Keymaster, KeymasterConfig};
pub use crate::tag::{Tag, TagType};

/// Key algorithms the service can host
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Algorithm {
    Rsa = 1,
    Dsa = 2,
    Ec = 3,
    Aes = 32,
    Hmac = 128,
}

impl Algorithm {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Algorithm::Rsa,
            2 => Algorithm::Dsa,
            3 => Algorithm::Ec,
            32 => Algorithm::Aes,
            128 => Algorithm::Hmac,
            _ => return None,
        })
    }
}

/// What an operation is allowed to do with a key
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Purpose {
    Encrypt = 0,
    Decrypt = 1,
    Sign = 2,
    Verify = 3,
}

impl Purpose {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Purpose::Encrypt,
            1 => Purpose::Decrypt,
            2 => Purpose::Sign,
            3 => Purpose::Verify,
            _ => return None,
        })
    }
}

/// Block cipher modes
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum BlockMode {
    Ecb = 1,
    Cbc = 2,
    Cfb = 3,
    Ocb = 4,
}

impl BlockMode {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => BlockMode::Ecb,
            2 => BlockMode::Cbc,
            3 => BlockMode::Cfb,
            4 => BlockMode::Ocb,
            _ => return None,
        })
    }
}

/// Padding schemes
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum PaddingMode {
    None = 1,
    Zero = 2,
    Pkcs7 = 3,
    RsaOaep = 4,
    RsaPss = 5,
    RsaPkcs1_1_5_Encrypt = 6,
    RsaPkcs1_1_5_Sign = 7,
}

impl PaddingMode {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => PaddingMode::None,
            2 => PaddingMode::Zero,
            3 => PaddingMode::Pkcs7,
            4 => PaddingMode::RsaOaep,
            5 => PaddingMode::RsaPss,
            6 => PaddingMode::RsaPkcs1_1_5_Encrypt,
            7 => PaddingMode::RsaPkcs1_1_5_Sign,
            _ => return None,
        })
    }
}

/// Digest algorithms
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Digest {
    None = 0,
    Sha1 = 2,
    Sha224 = 3,
    Sha256 = 4,
    Sha384 = 5,
    Sha512 = 6,
}

impl Digest {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Digest::None,
            2 => Digest::Sha1,
            3 => Digest::Sha224,
            4 => Digest::Sha256,
            5 => Digest::Sha384,
            6 => Digest::Sha512,
            _ => return None,
        })
    }

    /// Output length in bytes; zero for [`Digest::None`]
    pub fn output_len(self) -> usize {
        match self {
            Digest::None => 0,
            Digest::Sha1 => 20,
            Digest::Sha224 => 28,
            Digest::Sha256 => 32,
            Digest::Sha384 => 48,
            Digest::Sha512 => 64,
        }
    }
}

/// Formats for key material crossing the API boundary
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum KeyFormat {
    /// X.509 SubjectPublicKeyInfo (public export)
    X509 = 0,
    /// PKCS#8 private key (import)
    Pkcs8 = 1,
    /// Raw bytes (symmetric import)
    Raw = 3,
}

impl KeyFormat {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => KeyFormat::X509,
            1 => KeyFormat::Pkcs8,
            3 => KeyFormat::Raw,
            _ => return None,
        })
    }
}

/// Provenance of a key
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum KeyOrigin {
    Hardware = 0,
    Software = 1,
    Imported = 2,
}

impl KeyOrigin {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => KeyOrigin::Hardware,
            1 => KeyOrigin::Software,
            2 => KeyOrigin::Imported,
            _ => return None,
        })
    }
}

/// Transport-level command opcodes
pub mod opcodes {
    pub const GENERATE_KEY: u32 = 0;
    pub const BEGIN_OPERATION: u32 = 1;
    pub const UPDATE_OPERATION: u32 = 2;
    pub const FINISH_OPERATION: u32 = 3;
    pub const ABORT_OPERATION: u32 = 4;
    pub const IMPORT_KEY: u32 = 5;
    pub const EXPORT_KEY: u32 = 6;
    pub const GET_VERSION: u32 = 7;
}

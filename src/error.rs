//! The single error space shared by every API surface.

use thiserror::Error;

use crate::coding::WireError;

/// Result of every keymaster API call.
///
/// Codes are stable: they appear on the wire as a `u32` in the leading error
/// word of every response message.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    /// The call succeeded
    #[error("ok")]
    Ok = 0,
    /// No factory is registered for the requested algorithm
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm = 1,
    /// No operation factory exists for this (algorithm, purpose) pair, or the
    /// key does not authorize the purpose
    #[error("unsupported purpose")]
    UnsupportedPurpose = 2,
    /// The requested key size is outside what the algorithm supports
    #[error("unsupported key size")]
    UnsupportedKeySize = 3,
    /// The key cannot be imported from or exported to the requested format
    #[error("unsupported key format")]
    UnsupportedKeyFormat = 4,
    /// The cipher does not implement the requested block mode
    #[error("unsupported block mode")]
    UnsupportedBlockMode = 5,
    /// The operation does not implement the requested digest
    #[error("unsupported digest")]
    UnsupportedDigest = 6,
    /// The operation does not implement the requested padding mode
    #[error("unsupported padding mode")]
    UnsupportedPaddingMode = 7,
    /// The MAC length is missing, not a multiple of 8 bits, or longer than
    /// the digest output
    #[error("unsupported MAC length")]
    UnsupportedMacLength = 8,
    /// The tag is recognized but cannot be honored
    #[error("unsupported tag")]
    UnsupportedTag = 9,
    /// The elliptic curve field is not one of the supported named curves
    #[error("unsupported EC field")]
    UnsupportedEcField = 10,
    /// A parameter value is invalid for the operation
    #[error("invalid argument")]
    InvalidArgument = 11,
    /// The key blob is truncated, tampered with, or bound to different hidden
    /// authorizations
    #[error("invalid key blob")]
    InvalidKeyBlob = 12,
    /// The input length violates the cipher's framing rules
    #[error("invalid input length")]
    InvalidInputLength = 13,
    /// The operation handle does not name a live operation
    #[error("invalid operation handle")]
    InvalidOperationHandle = 14,
    /// A tag that only the service may set was supplied by the client
    #[error("invalid tag")]
    InvalidTag = 15,
    /// DSA domain parameters were partially specified or unusable
    #[error("invalid DSA parameters")]
    InvalidDsaParams = 16,
    /// The authorization timeout bound to the key has expired
    #[error("invalid authorization timeout")]
    InvalidAuthorizationTimeout = 17,
    /// A tag in the import description contradicts the imported key material
    #[error("import parameter mismatch")]
    ImportParameterMismatch = 18,
    /// The key's algorithm does not match the requested operation family
    #[error("incompatible algorithm")]
    IncompatibleAlgorithm = 19,
    /// The digest is supported but not authorized for this key, or unusable
    /// with the selected padding and key size
    #[error("incompatible digest")]
    IncompatibleDigest = 20,
    /// The block mode is supported but not authorized for this key
    #[error("incompatible block mode")]
    IncompatibleBlockMode = 21,
    /// The padding mode is supported but not authorized for this key or
    /// unusable with the selected block mode
    #[error("incompatible padding mode")]
    IncompatiblePaddingMode = 22,
    /// A signature or authentication tag failed to verify
    #[error("verification failed")]
    VerificationFailed = 23,
    /// The operation table is full
    #[error("too many operations")]
    TooManyOperations = 24,
    /// A required output parameter was absent
    #[error("output parameter null")]
    OutputParameterNull = 25,
    /// An allocation failed
    #[error("memory allocation failed")]
    MemoryAllocationFailed = 26,
    /// The entry point exists but is not implemented
    #[error("unimplemented")]
    Unimplemented = 27,
    /// The backend declined the operation for an unmapped reason
    #[error("unknown error")]
    UnknownError = 28,
}

impl ErrorCode {
    /// Whether this code represents success
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// Recover an error code from its wire representation
    pub fn from_u32(raw: u32) -> Option<Self> {
        use ErrorCode::*;
        Some(match raw {
            0 => Ok,
            1 => UnsupportedAlgorithm,
            2 => UnsupportedPurpose,
            3 => UnsupportedKeySize,
            4 => UnsupportedKeyFormat,
            5 => UnsupportedBlockMode,
            6 => UnsupportedDigest,
            7 => UnsupportedPaddingMode,
            8 => UnsupportedMacLength,
            9 => UnsupportedTag,
            10 => UnsupportedEcField,
            11 => InvalidArgument,
            12 => InvalidKeyBlob,
            13 => InvalidInputLength,
            14 => InvalidOperationHandle,
            15 => InvalidTag,
            16 => InvalidDsaParams,
            17 => InvalidAuthorizationTimeout,
            18 => ImportParameterMismatch,
            19 => IncompatibleAlgorithm,
            20 => IncompatibleDigest,
            21 => IncompatibleBlockMode,
            22 => IncompatiblePaddingMode,
            23 => VerificationFailed,
            24 => TooManyOperations,
            25 => OutputParameterNull,
            26 => MemoryAllocationFailed,
            27 => Unimplemented,
            28 => UnknownError,
            _ => return None,
        })
    }
}

impl From<WireError> for ErrorCode {
    fn from(_: WireError) -> Self {
        ErrorCode::UnknownError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_roundtrip() {
        for raw in 0..=28 {
            let code = ErrorCode::from_u32(raw).unwrap();
            assert_eq!(code as u32, raw);
        }
        assert_eq!(ErrorCode::from_u32(29), None);
        assert_eq!(ErrorCode::from_u32(u32::MAX), None);
    }

    #[test]
    fn ok_is_zero() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::InvalidKeyBlob.is_ok());
    }
}

//! Request and response wire messages.
//!
//! Every response leads with a `u32` error word; the remaining fields are
//! present only when the error is OK. Requests carry no error word. Message
//! layouts are versioned by [`MessageVersion`], negotiated by the client via
//! GetVersion: the GetVersion pair itself is unversioned, and the only
//! difference between v0 and v1 is that the v0 `UpdateOperationResponse`
//! omits `input_consumed` (readers default it to 0).

use bytes::{Buf, BufMut};

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::coding::{self, byte_string_size, BufExt, BufMutExt, WireError};
use crate::error::ErrorCode;
use crate::{KeyFormat, Purpose};

/// Current implementation version reported by GetVersion
pub const MAJOR_VERSION: u8 = 1;
pub const MINOR_VERSION: u8 = 0;
pub const SUBMINOR_VERSION: u8 = 0;

/// Wire-format revision, selected by the client from the implementation
/// version it queried
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MessageVersion {
    V0,
    V1,
}

/// The newest wire-format revision this implementation speaks
pub const MAX_MESSAGE_VERSION: MessageVersion = MessageVersion::V1;

impl MessageVersion {
    /// Map an implementation version to its wire-format revision. Unknown
    /// composite versions are rejected.
    pub fn new(major: u8, minor: u8, subminor: u8) -> Option<Self> {
        match (major, minor, subminor) {
            (0, 0, 0) => Some(MessageVersion::V0),
            (1, 0, 0) => Some(MessageVersion::V1),
            _ => None,
        }
    }
}

/// A wire message with a fixed field layout under a given version
pub trait Message: Sized {
    /// Exact number of bytes [`encode`](Self::encode) will write
    fn serialized_size(&self) -> usize;
    fn encode<B: BufMut>(&self, buf: &mut B);
    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self>;

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.encode(&mut buf);
        buf
    }
}

fn decode_error<B: Buf>(buf: &mut B) -> coding::Result<ErrorCode> {
    ErrorCode::from_u32(buf.get::<u32>()?).ok_or(WireError::Malformed("error code"))
}

fn decode_purpose<B: Buf>(buf: &mut B) -> coding::Result<Purpose> {
    Purpose::from_u32(buf.get::<u32>()?).ok_or(WireError::Malformed("purpose"))
}

fn decode_key_format<B: Buf>(buf: &mut B) -> coding::Result<KeyFormat> {
    KeyFormat::from_u32(buf.get::<u32>()?).ok_or(WireError::Malformed("key format"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateKeyRequest {
    pub version: MessageVersion,
    pub key_description: AuthorizationSet,
}

impl GenerateKeyRequest {
    pub fn new(version: MessageVersion) -> Self {
        GenerateKeyRequest {
            version,
            key_description: AuthorizationSet::new(),
        }
    }
}

impl Message for GenerateKeyRequest {
    fn serialized_size(&self) -> usize {
        self.key_description.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.key_description.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(GenerateKeyRequest {
            version,
            key_description: AuthorizationSet::decode(buf)?,
        })
    }
}

macro_rules! key_creation_response {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub version: MessageVersion,
            pub error: ErrorCode,
            pub key_blob: Vec<u8>,
            pub enforced: AuthorizationSet,
            pub unenforced: AuthorizationSet,
        }

        impl $name {
            pub fn new(version: MessageVersion) -> Self {
                $name {
                    version,
                    error: ErrorCode::UnknownError,
                    key_blob: Vec::new(),
                    enforced: AuthorizationSet::new(),
                    unenforced: AuthorizationSet::new(),
                }
            }
        }

        impl Message for $name {
            fn serialized_size(&self) -> usize {
                if self.error.is_ok() {
                    4 + byte_string_size(&self.key_blob)
                        + self.enforced.serialized_size()
                        + self.unenforced.serialized_size()
                } else {
                    4
                }
            }

            fn encode<B: BufMut>(&self, buf: &mut B) {
                buf.write::<u32>(self.error as u32);
                if self.error.is_ok() {
                    buf.write_byte_string(&self.key_blob);
                    self.enforced.encode(buf);
                    self.unenforced.encode(buf);
                }
            }

            fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
                let mut response = Self::new(version);
                response.error = decode_error(buf)?;
                if response.error.is_ok() {
                    response.key_blob = buf.get_byte_string()?;
                    response.enforced = AuthorizationSet::decode(buf)?;
                    response.unenforced = AuthorizationSet::decode(buf)?;
                }
                Ok(response)
            }
        }
    };
}

key_creation_response!(GenerateKeyResponse);
key_creation_response!(ImportKeyResponse);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetKeyCharacteristicsRequest {
    pub version: MessageVersion,
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

impl GetKeyCharacteristicsRequest {
    pub fn new(version: MessageVersion) -> Self {
        GetKeyCharacteristicsRequest {
            version,
            key_blob: Vec::new(),
            additional_params: AuthorizationSet::new(),
        }
    }
}

impl Message for GetKeyCharacteristicsRequest {
    fn serialized_size(&self) -> usize {
        byte_string_size(&self.key_blob) + self.additional_params.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_byte_string(&self.key_blob);
        self.additional_params.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(GetKeyCharacteristicsRequest {
            version,
            key_blob: buf.get_byte_string()?,
            additional_params: AuthorizationSet::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetKeyCharacteristicsResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

impl GetKeyCharacteristicsResponse {
    pub fn new(version: MessageVersion) -> Self {
        GetKeyCharacteristicsResponse {
            version,
            error: ErrorCode::UnknownError,
            enforced: AuthorizationSet::new(),
            unenforced: AuthorizationSet::new(),
        }
    }
}

impl Message for GetKeyCharacteristicsResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + self.enforced.serialized_size() + self.unenforced.serialized_size()
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            self.enforced.encode(buf);
            self.unenforced.encode(buf);
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.enforced = AuthorizationSet::decode(buf)?;
            response.unenforced = AuthorizationSet::decode(buf)?;
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginOperationRequest {
    pub version: MessageVersion,
    pub purpose: Purpose,
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

impl BeginOperationRequest {
    pub fn new(version: MessageVersion) -> Self {
        BeginOperationRequest {
            version,
            purpose: Purpose::Sign,
            key_blob: Vec::new(),
            additional_params: AuthorizationSet::new(),
        }
    }
}

impl Message for BeginOperationRequest {
    fn serialized_size(&self) -> usize {
        4 + byte_string_size(&self.key_blob) + self.additional_params.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.purpose as u32);
        buf.write_byte_string(&self.key_blob);
        self.additional_params.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(BeginOperationRequest {
            version,
            purpose: decode_purpose(buf)?,
            key_blob: buf.get_byte_string()?,
            additional_params: AuthorizationSet::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginOperationResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub op_handle: u64,
    pub output_params: AuthorizationSet,
}

impl BeginOperationResponse {
    pub fn new(version: MessageVersion) -> Self {
        BeginOperationResponse {
            version,
            error: ErrorCode::UnknownError,
            op_handle: 0,
            output_params: AuthorizationSet::new(),
        }
    }
}

impl Message for BeginOperationResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + 8 + self.output_params.serialized_size()
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            buf.write::<u64>(self.op_handle);
            self.output_params.encode(buf);
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.op_handle = buf.get::<u64>()?;
            response.output_params = AuthorizationSet::decode(buf)?;
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOperationRequest {
    pub version: MessageVersion,
    pub op_handle: u64,
    pub input: Buffer,
    pub additional_params: AuthorizationSet,
}

impl UpdateOperationRequest {
    pub fn new(version: MessageVersion) -> Self {
        UpdateOperationRequest {
            version,
            op_handle: 0,
            input: Buffer::new(),
            additional_params: AuthorizationSet::new(),
        }
    }
}

impl Message for UpdateOperationRequest {
    fn serialized_size(&self) -> usize {
        8 + self.input.serialized_size() + self.additional_params.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u64>(self.op_handle);
        self.input.encode(buf);
        self.additional_params.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(UpdateOperationRequest {
            version,
            op_handle: buf.get::<u64>()?,
            input: Buffer::decode(buf)?,
            additional_params: AuthorizationSet::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOperationResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub output: Buffer,
    /// Not on the v0 wire; v0 readers see 0
    pub input_consumed: u32,
}

impl UpdateOperationResponse {
    pub fn new(version: MessageVersion) -> Self {
        UpdateOperationResponse {
            version,
            error: ErrorCode::UnknownError,
            output: Buffer::new(),
            input_consumed: 0,
        }
    }
}

impl Message for UpdateOperationResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            let consumed = match self.version {
                MessageVersion::V0 => 0,
                MessageVersion::V1 => 4,
            };
            4 + self.output.serialized_size() + consumed
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            self.output.encode(buf);
            if self.version >= MessageVersion::V1 {
                buf.write::<u32>(self.input_consumed);
            }
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.output = Buffer::decode(buf)?;
            if version >= MessageVersion::V1 {
                response.input_consumed = buf.get::<u32>()?;
            }
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOperationRequest {
    pub version: MessageVersion,
    pub op_handle: u64,
    pub signature: Buffer,
    pub additional_params: AuthorizationSet,
}

impl FinishOperationRequest {
    pub fn new(version: MessageVersion) -> Self {
        FinishOperationRequest {
            version,
            op_handle: 0,
            signature: Buffer::new(),
            additional_params: AuthorizationSet::new(),
        }
    }
}

impl Message for FinishOperationRequest {
    fn serialized_size(&self) -> usize {
        8 + self.signature.serialized_size() + self.additional_params.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u64>(self.op_handle);
        self.signature.encode(buf);
        self.additional_params.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(FinishOperationRequest {
            version,
            op_handle: buf.get::<u64>()?,
            signature: Buffer::decode(buf)?,
            additional_params: AuthorizationSet::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOperationResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub output: Buffer,
}

impl FinishOperationResponse {
    pub fn new(version: MessageVersion) -> Self {
        FinishOperationResponse {
            version,
            error: ErrorCode::UnknownError,
            output: Buffer::new(),
        }
    }
}

impl Message for FinishOperationResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + self.output.serialized_size()
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            self.output.encode(buf);
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.output = Buffer::decode(buf)?;
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddEntropyRequest {
    pub version: MessageVersion,
    pub random_data: Buffer,
}

impl AddEntropyRequest {
    pub fn new(version: MessageVersion) -> Self {
        AddEntropyRequest {
            version,
            random_data: Buffer::new(),
        }
    }
}

impl Message for AddEntropyRequest {
    fn serialized_size(&self) -> usize {
        self.random_data.serialized_size()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.random_data.encode(buf);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(AddEntropyRequest {
            version,
            random_data: Buffer::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportKeyRequest {
    pub version: MessageVersion,
    pub key_description: AuthorizationSet,
    pub key_format: KeyFormat,
    pub key_data: Vec<u8>,
}

impl ImportKeyRequest {
    pub fn new(version: MessageVersion) -> Self {
        ImportKeyRequest {
            version,
            key_description: AuthorizationSet::new(),
            key_format: KeyFormat::Pkcs8,
            key_data: Vec::new(),
        }
    }
}

impl Message for ImportKeyRequest {
    fn serialized_size(&self) -> usize {
        self.key_description.serialized_size() + 4 + byte_string_size(&self.key_data)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.key_description.encode(buf);
        buf.write::<u32>(self.key_format as u32);
        buf.write_byte_string(&self.key_data);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(ImportKeyRequest {
            version,
            key_description: AuthorizationSet::decode(buf)?,
            key_format: decode_key_format(buf)?,
            key_data: buf.get_byte_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportKeyRequest {
    pub version: MessageVersion,
    pub additional_params: AuthorizationSet,
    pub key_format: KeyFormat,
    pub key_blob: Vec<u8>,
}

impl ExportKeyRequest {
    pub fn new(version: MessageVersion) -> Self {
        ExportKeyRequest {
            version,
            additional_params: AuthorizationSet::new(),
            key_format: KeyFormat::X509,
            key_blob: Vec::new(),
        }
    }
}

impl Message for ExportKeyRequest {
    fn serialized_size(&self) -> usize {
        self.additional_params.serialized_size() + 4 + byte_string_size(&self.key_blob)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.additional_params.encode(buf);
        buf.write::<u32>(self.key_format as u32);
        buf.write_byte_string(&self.key_blob);
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        Ok(ExportKeyRequest {
            version,
            additional_params: AuthorizationSet::decode(buf)?,
            key_format: decode_key_format(buf)?,
            key_blob: buf.get_byte_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportKeyResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub key_data: Vec<u8>,
}

impl ExportKeyResponse {
    pub fn new(version: MessageVersion) -> Self {
        ExportKeyResponse {
            version,
            error: ErrorCode::UnknownError,
            key_data: Vec::new(),
        }
    }
}

impl Message for ExportKeyResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + byte_string_size(&self.key_data)
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            buf.write_byte_string(&self.key_data);
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.key_data = buf.get_byte_string()?;
        }
        Ok(response)
    }
}

/// GetVersion must be readable before the client knows any version, so the
/// pair is unversioned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetVersionRequest;

impl Message for GetVersionRequest {
    fn serialized_size(&self) -> usize {
        0
    }

    fn encode<B: BufMut>(&self, _buf: &mut B) {}

    fn decode<B: Buf>(_version: MessageVersion, _buf: &mut B) -> coding::Result<Self> {
        Ok(GetVersionRequest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetVersionResponse {
    pub error: ErrorCode,
    pub major_ver: u8,
    pub minor_ver: u8,
    pub subminor_ver: u8,
}

impl GetVersionResponse {
    pub fn new() -> Self {
        GetVersionResponse {
            error: ErrorCode::UnknownError,
            major_ver: 0,
            minor_ver: 0,
            subminor_ver: 0,
        }
    }
}

impl Default for GetVersionResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl Message for GetVersionResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + 3
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            buf.write::<u8>(self.major_ver);
            buf.write::<u8>(self.minor_ver);
            buf.write::<u8>(self.subminor_ver);
        }
    }

    fn decode<B: Buf>(_version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new();
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.major_ver = buf.get::<u8>()?;
            response.minor_ver = buf.get::<u8>()?;
            response.subminor_ver = buf.get::<u8>()?;
        }
        Ok(response)
    }
}

/// Response to the supported-enumeration queries: a list of `u32` values
/// whose meaning depends on the query (algorithms, block modes, paddings,
/// digests, key formats)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedResponse {
    pub version: MessageVersion,
    pub error: ErrorCode,
    pub results: Vec<u32>,
}

impl SupportedResponse {
    pub fn new(version: MessageVersion) -> Self {
        SupportedResponse {
            version,
            error: ErrorCode::UnknownError,
            results: Vec::new(),
        }
    }
}

impl Message for SupportedResponse {
    fn serialized_size(&self) -> usize {
        if self.error.is_ok() {
            4 + coding::u32_array_size(&self.results)
        } else {
            4
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.error as u32);
        if self.error.is_ok() {
            buf.write_u32_array(&self.results);
        }
    }

    fn decode<B: Buf>(version: MessageVersion, buf: &mut B) -> coding::Result<Self> {
        let mut response = Self::new(version);
        response.error = decode_error(buf)?;
        if response.error.is_ok() {
            response.results = buf.get_u32_array()?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::KeyParam;
    use crate::tag::Tag;
    use crate::Algorithm;
    use std::io::Cursor;

    fn params() -> AuthorizationSet {
        [
            KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
            KeyParam::enumerated(Tag::PURPOSE, Purpose::Sign as u32),
            KeyParam::enumerated(Tag::PURPOSE, Purpose::Verify as u32),
            KeyParam::integer(Tag::KEY_SIZE, 256),
            KeyParam::blob(Tag::APPLICATION_ID, &b"app_id"[..]),
        ]
        .into_iter()
        .collect()
    }

    fn roundtrip<M: Message + PartialEq + std::fmt::Debug>(message: &M, version: MessageVersion) {
        let encoded = message.encode_to_vec();
        assert_eq!(encoded.len(), message.serialized_size());
        let mut r = Cursor::new(&encoded[..]);
        let decoded = M::decode(version, &mut r).unwrap();
        assert_eq!(&decoded, message);
        assert_eq!(r.remaining(), 0, "bytes left over");
    }

    fn truncations_fail<M: Message>(message: &M, version: MessageVersion) {
        let encoded = message.encode_to_vec();
        for cut in 0..encoded.len() {
            let mut r = Cursor::new(&encoded[..cut]);
            assert!(M::decode(version, &mut r).is_err(), "cut at {cut}");
        }
    }

    fn check<M: Message + PartialEq + std::fmt::Debug>(message: &M, version: MessageVersion) {
        roundtrip(message, version);
        truncations_fail(message, version);
    }

    #[test]
    fn generate_key_request() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut msg = GenerateKeyRequest::new(version);
            msg.key_description = params();
            check(&msg, version);
        }
    }

    #[test]
    fn generate_key_response() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut msg = GenerateKeyResponse::new(version);
            msg.error = ErrorCode::Ok;
            msg.key_blob = vec![1, 2, 3, 4];
            msg.unenforced = params();
            check(&msg, version);
        }
    }

    #[test]
    fn error_response_is_just_the_error_word() {
        let mut msg = GenerateKeyResponse::new(MessageVersion::V1);
        msg.error = ErrorCode::UnsupportedAlgorithm;
        msg.key_blob = vec![9; 64];
        let encoded = msg.encode_to_vec();
        assert_eq!(encoded.len(), 4);

        let mut r = Cursor::new(&encoded[..]);
        let decoded = GenerateKeyResponse::decode(MessageVersion::V1, &mut r).unwrap();
        assert_eq!(decoded.error, ErrorCode::UnsupportedAlgorithm);
        assert!(decoded.key_blob.is_empty());
    }

    #[test]
    fn get_key_characteristics_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = GetKeyCharacteristicsRequest::new(version);
            req.key_blob = vec![0xaa; 16];
            req.additional_params = params();
            check(&req, version);

            let mut rsp = GetKeyCharacteristicsResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.unenforced = params();
            check(&rsp, version);
        }
    }

    #[test]
    fn begin_operation_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = BeginOperationRequest::new(version);
            req.purpose = Purpose::Decrypt;
            req.key_blob = vec![0x55; 8];
            req.additional_params = params();
            check(&req, version);

            let mut rsp = BeginOperationResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.op_handle = 0xdead_beef_f00d_cafe;
            check(&rsp, version);
        }
    }

    #[test]
    fn update_operation_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = UpdateOperationRequest::new(version);
            req.op_handle = 42;
            req.input = Buffer::from(&b"input bytes"[..]);
            check(&req, version);

            let mut rsp = UpdateOperationResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.output = Buffer::from(&b"output"[..]);
            rsp.input_consumed = match version {
                MessageVersion::V0 => 0,
                MessageVersion::V1 => 11,
            };
            check(&rsp, version);
        }
    }

    #[test]
    fn v0_update_response_omits_input_consumed() {
        let mut rsp = UpdateOperationResponse::new(MessageVersion::V0);
        rsp.error = ErrorCode::Ok;
        rsp.output = Buffer::from(&b"out"[..]);
        rsp.input_consumed = 77;
        let encoded = rsp.encode_to_vec();

        let mut v1 = UpdateOperationResponse::new(MessageVersion::V1);
        v1.error = ErrorCode::Ok;
        v1.output = Buffer::from(&b"out"[..]);
        v1.input_consumed = 77;
        assert_eq!(encoded.len() + 4, v1.encode_to_vec().len());

        let mut r = Cursor::new(&encoded[..]);
        let decoded = UpdateOperationResponse::decode(MessageVersion::V0, &mut r).unwrap();
        assert_eq!(decoded.input_consumed, 0);
        assert_eq!(decoded.output, rsp.output);
    }

    #[test]
    fn finish_operation_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = FinishOperationRequest::new(version);
            req.op_handle = 7;
            req.signature = Buffer::from(&b"sig"[..]);
            req.additional_params = params();
            check(&req, version);

            let mut rsp = FinishOperationResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.output = Buffer::from(&b"result"[..]);
            check(&rsp, version);
        }
    }

    #[test]
    fn add_entropy_request() {
        let mut msg = AddEntropyRequest::new(MessageVersion::V1);
        msg.random_data = Buffer::from(&b"entropy"[..]);
        check(&msg, MessageVersion::V1);
    }

    #[test]
    fn import_key_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = ImportKeyRequest::new(version);
            req.key_description = params();
            req.key_format = KeyFormat::Pkcs8;
            req.key_data = vec![0x30, 0x82, 1, 2];
            check(&req, version);

            let mut rsp = ImportKeyResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.key_blob = vec![3; 32];
            rsp.unenforced = params();
            check(&rsp, version);
        }
    }

    #[test]
    fn export_key_messages() {
        for version in [MessageVersion::V0, MessageVersion::V1] {
            let mut req = ExportKeyRequest::new(version);
            req.key_format = KeyFormat::X509;
            req.key_blob = vec![1; 16];
            check(&req, version);

            let mut rsp = ExportKeyResponse::new(version);
            rsp.error = ErrorCode::Ok;
            rsp.key_data = vec![0x30, 0x59];
            check(&rsp, version);
        }
    }

    #[test]
    fn get_version_messages() {
        check(&GetVersionRequest, MessageVersion::V1);

        let mut rsp = GetVersionResponse::new();
        rsp.error = ErrorCode::Ok;
        rsp.major_ver = 1;
        check(&rsp, MessageVersion::V1);
    }

    #[test]
    fn supported_response() {
        let mut rsp = SupportedResponse::new(MessageVersion::V1);
        rsp.error = ErrorCode::Ok;
        rsp.results = vec![1, 2, 3, 32, 128];
        check(&rsp, MessageVersion::V1);
    }

    #[test]
    fn version_mapping() {
        assert_eq!(MessageVersion::new(0, 0, 0), Some(MessageVersion::V0));
        assert_eq!(MessageVersion::new(1, 0, 0), Some(MessageVersion::V1));
        assert_eq!(MessageVersion::new(1, 1, 0), None);
        assert_eq!(MessageVersion::new(2, 0, 0), None);
        assert_eq!(MessageVersion::new(0, 0, 1), None);
    }

    #[test]
    fn bad_purpose_is_malformed() {
        let mut buf = Vec::new();
        buf.write::<u32>(99);
        buf.write_byte_string(b"");
        AuthorizationSet::new().encode(&mut buf);
        let mut r = Cursor::new(&buf[..]);
        assert!(BeginOperationRequest::decode(MessageVersion::V1, &mut r).is_err());
    }

    #[test]
    fn bad_error_code_is_malformed() {
        let mut buf = Vec::new();
        buf.write::<u32>(0xffff);
        let mut r = Cursor::new(&buf[..]);
        assert!(FinishOperationResponse::decode(MessageVersion::V1, &mut r).is_err());
    }
}

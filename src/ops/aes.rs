//! AES operations: ECB, CBC, and CFB block modes plus chunked OCB.
//!
//! CBC and CFB prepend the IV to the ciphertext; decryption reads it back
//! from there. OCB splits the plaintext into CHUNK_LENGTH-byte chunks, each
//! sealed independently under a derived per-chunk nonce, so the ciphertext is
//! `nonce ‖ (chunk_ct ‖ chunk_tag)*` and a large message never needs to be
//! resident all at once.

use aead::{Aead, Payload};
use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::{NoPadding, Pkcs7, ZeroPadding};
use cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use ocb3::Ocb3;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::authorization::AuthorizationSet;
use crate::buffer::Buffer;
use crate::error::ErrorCode;
use crate::keys::aes::AesKey;
use crate::keys::Key;
use crate::ops::{
    get_and_validate_block_mode, get_and_validate_padding, resolve_chunk_length,
    resolve_mac_length, Operation, OperationFactory, OperationType,
};
use crate::tag::Tag;
use crate::{Algorithm, BlockMode, PaddingMode, Purpose};

const BLOCK_SIZE: usize = 16;
const IV_LENGTH: usize = 16;
const OCB_NONCE_LENGTH: usize = 12;
const OCB_TAG_LENGTH: usize = 16;

static BLOCK_MODES: &[BlockMode] = &[
    BlockMode::Ecb,
    BlockMode::Cbc,
    BlockMode::Cfb,
    BlockMode::Ocb,
];
static PADDINGS: &[PaddingMode] = &[PaddingMode::None, PaddingMode::Zero, PaddingMode::Pkcs7];

pub struct AesOperationFactory {
    purpose: Purpose,
}

impl AesOperationFactory {
    pub fn encrypt() -> Self {
        AesOperationFactory {
            purpose: Purpose::Encrypt,
        }
    }

    pub fn decrypt() -> Self {
        AesOperationFactory {
            purpose: Purpose::Decrypt,
        }
    }
}

impl OperationFactory for AesOperationFactory {
    fn registry_key(&self) -> OperationType {
        OperationType::new(Algorithm::Aes, self.purpose)
    }

    fn create_operation(
        &self,
        key: Box<dyn Key>,
        begin_params: &AuthorizationSet,
    ) -> Result<Box<dyn Operation>, ErrorCode> {
        let auths = key.authorizations();
        let mode = get_and_validate_block_mode(self, begin_params, auths)?;

        // Padding defaults to NONE when neither the Begin parameters nor the
        // key mention it.
        let padding = if begin_params.get(Tag::PADDING).is_some()
            || auths.get(Tag::PADDING).is_some()
        {
            get_and_validate_padding(self, begin_params, auths)?
        } else {
            PaddingMode::None
        };

        match mode {
            BlockMode::Ocb => {
                if padding != PaddingMode::None {
                    return Err(ErrorCode::IncompatiblePaddingMode);
                }
                let chunk_length = resolve_chunk_length(begin_params, auths)
                    .ok_or(ErrorCode::InvalidArgument)?;
                if chunk_length == 0 {
                    return Err(ErrorCode::InvalidArgument);
                }
                if auths.get(Tag::CHUNK_LENGTH).is_some()
                    && !auths.contains_int(Tag::CHUNK_LENGTH, chunk_length)
                {
                    return Err(ErrorCode::InvalidArgument);
                }
                let mac_length = resolve_mac_length(begin_params, auths)
                    .ok_or(ErrorCode::InvalidArgument)?;
                if mac_length as usize != OCB_TAG_LENGTH {
                    return Err(ErrorCode::InvalidArgument);
                }

                let key = downcast_aes(key)?;
                let cipher = OcbCipher::new(&key)?;
                Ok(Box::new(AesOcbOperation::new(
                    self.purpose,
                    cipher,
                    chunk_length as usize,
                )))
            }
            BlockMode::Ecb | BlockMode::Cbc | BlockMode::Cfb => {
                if mode == BlockMode::Cfb && padding != PaddingMode::None {
                    return Err(ErrorCode::IncompatiblePaddingMode);
                }
                if mode == BlockMode::Ecb && begin_params.get(Tag::NONCE).is_some() {
                    return Err(ErrorCode::InvalidArgument);
                }

                let mut caller_iv = None;
                if let Some(nonce) = begin_params.blob_value(Tag::NONCE) {
                    if !auths.bool_value(Tag::CALLER_NONCE) {
                        return Err(ErrorCode::InvalidArgument);
                    }
                    if self.purpose == Purpose::Encrypt {
                        let iv: [u8; IV_LENGTH] = nonce
                            .try_into()
                            .map_err(|_| ErrorCode::InvalidArgument)?;
                        caller_iv = Some(iv);
                    }
                    // On decrypt the IV comes from the ciphertext itself.
                }

                let key = downcast_aes(key)?;
                Ok(Box::new(AesBlockOperation {
                    purpose: self.purpose,
                    key,
                    mode,
                    padding,
                    caller_iv,
                    data: Vec::new(),
                }))
            }
        }
    }

    fn supported_block_modes(&self) -> &'static [BlockMode] {
        BLOCK_MODES
    }

    fn supported_padding_modes(&self) -> &'static [PaddingMode] {
        PADDINGS
    }
}

fn downcast_aes(key: Box<dyn Key>) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
    key.into_any()
        .downcast::<AesKey>()
        .map(|k| k.key_data)
        .map_err(|_| ErrorCode::IncompatibleAlgorithm)
}

macro_rules! for_each_aes_key_size {
    ($key:expr, $run:ident) => {
        match $key.len() {
            16 => $run!(Aes128),
            24 => $run!(Aes192),
            32 => $run!(Aes256),
            _ => return Err(ErrorCode::UnsupportedKeySize),
        }
    };
}

fn ecb_encrypt(key: &[u8], padding: PaddingMode, data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let enc = ecb::Encryptor::<$cipher>::new_from_slice(key)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            Ok(match padding {
                PaddingMode::Pkcs7 => enc.encrypt_padded_vec_mut::<Pkcs7>(data),
                PaddingMode::Zero => enc.encrypt_padded_vec_mut::<ZeroPadding>(data),
                _ => enc.encrypt_padded_vec_mut::<NoPadding>(data),
            })
        }};
    }
    for_each_aes_key_size!(key, run)
}

fn ecb_decrypt(key: &[u8], padding: PaddingMode, data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let dec = ecb::Decryptor::<$cipher>::new_from_slice(key)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            match padding {
                PaddingMode::Pkcs7 => dec
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| ErrorCode::InvalidArgument),
                PaddingMode::Zero => dec
                    .decrypt_padded_vec_mut::<ZeroPadding>(data)
                    .map_err(|_| ErrorCode::InvalidArgument),
                _ => dec
                    .decrypt_padded_vec_mut::<NoPadding>(data)
                    .map_err(|_| ErrorCode::InvalidInputLength),
            }
        }};
    }
    for_each_aes_key_size!(key, run)
}

fn cbc_encrypt(
    key: &[u8],
    iv: &[u8; IV_LENGTH],
    padding: PaddingMode,
    data: &[u8],
) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let enc = cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            Ok(match padding {
                PaddingMode::Pkcs7 => enc.encrypt_padded_vec_mut::<Pkcs7>(data),
                PaddingMode::Zero => enc.encrypt_padded_vec_mut::<ZeroPadding>(data),
                _ => enc.encrypt_padded_vec_mut::<NoPadding>(data),
            })
        }};
    }
    for_each_aes_key_size!(key, run)
}

fn cbc_decrypt(
    key: &[u8],
    iv: &[u8; IV_LENGTH],
    padding: PaddingMode,
    data: &[u8],
) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let dec = cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            match padding {
                PaddingMode::Pkcs7 => dec
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| ErrorCode::InvalidArgument),
                PaddingMode::Zero => dec
                    .decrypt_padded_vec_mut::<ZeroPadding>(data)
                    .map_err(|_| ErrorCode::InvalidArgument),
                _ => dec
                    .decrypt_padded_vec_mut::<NoPadding>(data)
                    .map_err(|_| ErrorCode::InvalidInputLength),
            }
        }};
    }
    for_each_aes_key_size!(key, run)
}

fn cfb_encrypt(key: &[u8], iv: &[u8; IV_LENGTH], data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let enc = cfb_mode::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            let mut buf = data.to_vec();
            enc.encrypt(&mut buf);
            Ok(buf)
        }};
    }
    for_each_aes_key_size!(key, run)
}

fn cfb_decrypt(key: &[u8], iv: &[u8; IV_LENGTH], data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    macro_rules! run {
        ($cipher:ty) => {{
            let dec = cfb_mode::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| ErrorCode::UnsupportedKeySize)?;
            let mut buf = data.to_vec();
            dec.decrypt(&mut buf);
            Ok(buf)
        }};
    }
    for_each_aes_key_size!(key, run)
}

/// ECB, CBC, and CFB sessions. Input accumulates across updates and the
/// cipher runs at Finish, when padding can be resolved.
struct AesBlockOperation {
    purpose: Purpose,
    key: Zeroizing<Vec<u8>>,
    mode: BlockMode,
    padding: PaddingMode,
    caller_iv: Option<[u8; IV_LENGTH]>,
    data: Vec<u8>,
}

impl AesBlockOperation {
    fn fresh_iv(&self) -> [u8; IV_LENGTH] {
        match self.caller_iv {
            Some(iv) => iv,
            None => {
                let mut iv = [0; IV_LENGTH];
                OsRng.fill_bytes(&mut iv);
                iv
            }
        }
    }

    fn check_block_aligned(&self, len: usize) -> Result<(), ErrorCode> {
        if len % BLOCK_SIZE != 0 {
            return Err(ErrorCode::InvalidInputLength);
        }
        Ok(())
    }

    fn encrypt(&self, output: &mut Buffer) -> Result<(), ErrorCode> {
        match self.mode {
            BlockMode::Ecb => {
                if self.padding == PaddingMode::None {
                    self.check_block_aligned(self.data.len())?;
                }
                let ciphertext = ecb_encrypt(&self.key, self.padding, &self.data)?;
                output.reserve(ciphertext.len());
                output.write(&ciphertext);
            }
            BlockMode::Cbc => {
                if self.padding == PaddingMode::None {
                    self.check_block_aligned(self.data.len())?;
                }
                let iv = self.fresh_iv();
                let ciphertext = cbc_encrypt(&self.key, &iv, self.padding, &self.data)?;
                output.reserve(IV_LENGTH + ciphertext.len());
                output.write(&iv);
                output.write(&ciphertext);
            }
            BlockMode::Cfb => {
                let iv = self.fresh_iv();
                let ciphertext = cfb_encrypt(&self.key, &iv, &self.data)?;
                output.reserve(IV_LENGTH + ciphertext.len());
                output.write(&iv);
                output.write(&ciphertext);
            }
            BlockMode::Ocb => return Err(ErrorCode::UnsupportedBlockMode),
        }
        Ok(())
    }

    fn decrypt(&self, output: &mut Buffer) -> Result<(), ErrorCode> {
        let plaintext = match self.mode {
            BlockMode::Ecb => {
                self.check_block_aligned(self.data.len())?;
                if self.padding == PaddingMode::Pkcs7 && self.data.is_empty() {
                    return Err(ErrorCode::InvalidInputLength);
                }
                ecb_decrypt(&self.key, self.padding, &self.data)?
            }
            BlockMode::Cbc => {
                if self.data.len() < IV_LENGTH {
                    return Err(ErrorCode::InvalidInputLength);
                }
                let mut iv = [0; IV_LENGTH];
                iv.copy_from_slice(&self.data[..IV_LENGTH]);
                let ciphertext = &self.data[IV_LENGTH..];
                self.check_block_aligned(ciphertext.len())?;
                if self.padding == PaddingMode::Pkcs7 && ciphertext.is_empty() {
                    return Err(ErrorCode::InvalidInputLength);
                }
                cbc_decrypt(&self.key, &iv, self.padding, ciphertext)?
            }
            BlockMode::Cfb => {
                if self.data.len() < IV_LENGTH {
                    return Err(ErrorCode::InvalidInputLength);
                }
                let mut iv = [0; IV_LENGTH];
                iv.copy_from_slice(&self.data[..IV_LENGTH]);
                cfb_decrypt(&self.key, &iv, &self.data[IV_LENGTH..])?
            }
            BlockMode::Ocb => return Err(ErrorCode::UnsupportedBlockMode),
        };
        output.reserve(plaintext.len());
        output.write(&plaintext);
        Ok(())
    }
}

impl Operation for AesBlockOperation {
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
        match self.purpose {
            Purpose::Encrypt => self.encrypt(output),
            Purpose::Decrypt => self.decrypt(output),
            _ => Err(ErrorCode::UnsupportedPurpose),
        }
    }
}

/// AES key dispatch for the OCB AEAD
enum OcbCipher {
    Aes128(Ocb3<Aes128>),
    Aes192(Ocb3<Aes192>),
    Aes256(Ocb3<Aes256>),
}

impl OcbCipher {
    fn new(key: &[u8]) -> Result<Self, ErrorCode> {
        Ok(match key.len() {
            16 => OcbCipher::Aes128(
                Ocb3::new_from_slice(key).map_err(|_| ErrorCode::UnsupportedKeySize)?,
            ),
            24 => OcbCipher::Aes192(
                Ocb3::new_from_slice(key).map_err(|_| ErrorCode::UnsupportedKeySize)?,
            ),
            32 => OcbCipher::Aes256(
                Ocb3::new_from_slice(key).map_err(|_| ErrorCode::UnsupportedKeySize)?,
            ),
            _ => return Err(ErrorCode::UnsupportedKeySize),
        })
    }

    fn encrypt(&self, nonce: &[u8; OCB_NONCE_LENGTH], msg: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        let payload = Payload { msg, aad: &[] };
        match self {
            OcbCipher::Aes128(c) => c.encrypt(nonce.into(), payload),
            OcbCipher::Aes192(c) => c.encrypt(nonce.into(), payload),
            OcbCipher::Aes256(c) => c.encrypt(nonce.into(), payload),
        }
        .map_err(|_| ErrorCode::UnknownError)
    }

    fn decrypt(&self, nonce: &[u8; OCB_NONCE_LENGTH], msg: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        let payload = Payload { msg, aad: &[] };
        match self {
            OcbCipher::Aes128(c) => c.decrypt(nonce.into(), payload),
            OcbCipher::Aes192(c) => c.decrypt(nonce.into(), payload),
            OcbCipher::Aes256(c) => c.decrypt(nonce.into(), payload),
        }
        .map_err(|_| ErrorCode::VerificationFailed)
    }
}

/// Chunked OCB session.
///
/// Encryption buffers CHUNK_LENGTH plaintext bytes per chunk; decryption
/// buffers CHUNK_LENGTH + tag bytes. A full buffer is only sealed or opened
/// once more input arrives behind it, so the final (possibly short) chunk is
/// always handled at Finish, where the trailing tag is known to be complete.
struct AesOcbOperation {
    purpose: Purpose,
    cipher: OcbCipher,
    unit: usize,
    nonce: [u8; OCB_NONCE_LENGTH],
    nonce_handled: bool,
    chunks_processed: u64,
    buf: Vec<u8>,
}

impl AesOcbOperation {
    fn new(purpose: Purpose, cipher: OcbCipher, chunk_length: usize) -> Self {
        let unit = match purpose {
            Purpose::Decrypt => chunk_length + OCB_TAG_LENGTH,
            _ => chunk_length,
        };
        AesOcbOperation {
            purpose,
            cipher,
            unit,
            nonce: [0; OCB_NONCE_LENGTH],
            nonce_handled: false,
            chunks_processed: 0,
            buf: Vec::with_capacity(unit),
        }
    }

    fn emit_nonce(&mut self, output: &mut Buffer) {
        OsRng.fill_bytes(&mut self.nonce);
        output.reserve(OCB_NONCE_LENGTH);
        output.write(&self.nonce);
        self.nonce_handled = true;
    }

    /// Advance to the next per-chunk nonce: big-endian increment over bytes
    /// 1..12, leaving byte 0 untouched
    fn increment_nonce(&mut self) {
        for byte in self.nonce[1..].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    fn process_chunk(&mut self, output: &mut Buffer) -> Result<(), ErrorCode> {
        if self.chunks_processed > 0 {
            self.increment_nonce();
        }
        self.chunks_processed += 1;

        match self.purpose {
            Purpose::Encrypt => {
                let sealed = self.cipher.encrypt(&self.nonce, &self.buf)?;
                output.reserve(sealed.len());
                output.write(&sealed);
            }
            Purpose::Decrypt => {
                if self.buf.len() < OCB_TAG_LENGTH {
                    return Err(ErrorCode::InvalidInputLength);
                }
                let plaintext = self.cipher.decrypt(&self.nonce, &self.buf)?;
                output.reserve(plaintext.len());
                output.write(&plaintext);
            }
            _ => return Err(ErrorCode::UnsupportedPurpose),
        }
        self.buf.clear();
        Ok(())
    }
}

impl Operation for AesOcbOperation {
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
        output: &mut Buffer,
    ) -> Result<usize, ErrorCode> {
        let mut data = input.peek_read();
        let consumed = data.len();
        while !data.is_empty() {
            if !self.nonce_handled {
                match self.purpose {
                    Purpose::Encrypt => self.emit_nonce(output),
                    Purpose::Decrypt => {
                        // The leading bytes of the ciphertext are the nonce.
                        let need = OCB_NONCE_LENGTH - self.buf.len();
                        let take = need.min(data.len());
                        self.buf.extend_from_slice(&data[..take]);
                        data = &data[take..];
                        if self.buf.len() == OCB_NONCE_LENGTH {
                            self.nonce.copy_from_slice(&self.buf);
                            self.buf.clear();
                            self.nonce_handled = true;
                        }
                        continue;
                    }
                    _ => return Err(ErrorCode::UnsupportedPurpose),
                }
            }
            if self.buf.len() == self.unit {
                // A full unit with input behind it is a complete chunk.
                self.process_chunk(output)?;
            }
            let take = (self.unit - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(consumed)
    }

    fn finish(
        &mut self,
        _additional_params: &AuthorizationSet,
        _signature: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), ErrorCode> {
        if !self.nonce_handled {
            match self.purpose {
                Purpose::Encrypt => self.emit_nonce(output),
                // Shorter than even the nonce.
                Purpose::Decrypt => return Err(ErrorCode::InvalidInputLength),
                _ => return Err(ErrorCode::UnsupportedPurpose),
            }
        }
        self.process_chunk(output)
    }
}

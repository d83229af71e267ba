//! Sealed key blobs.
//!
//! A key blob is the client-held form of a key: an AEAD-sealed container
//! binding the key's policy and the service's hidden authorizations to the
//! encrypted key material. The AEAD is OCB with AES-128, keyed by the
//! service's master key. The associated data is the serialization of
//! `enforced ‖ unenforced ‖ hidden`, so editing the stored policy or
//! presenting different hidden inputs (APPLICATION_ID, APPLICATION_DATA,
//! ROOT_OF_TRUST) makes authentication fail and the blob unusable.
//!
//! Wire layout:
//!
//! ```text
//! nonce(12) ‖ enforced ‖ unenforced ‖ u32 key_material_len ‖ ciphertext ‖ tag(16)
//! ```

use aead::{Aead, KeyInit, Payload};
use aes::Aes128;
use bytes::{Buf, BufMut};
use ocb3::Ocb3;
use zeroize::Zeroizing;

use crate::authorization::AuthorizationSet;
use crate::coding::{self, BufExt, BufMutExt};
use crate::error::ErrorCode;
use crate::tag::Tag;
use crate::Algorithm;

/// AEAD nonce length in bytes
pub const NONCE_LENGTH: usize = 12;
/// AEAD authentication tag length in bytes
pub const TAG_LENGTH: usize = 16;

type BlobCipher = Ocb3<Aes128>;

/// The parsed form of a sealed key blob. Key material stays encrypted until
/// [`unseal`](KeyBlob::unseal) authenticates the whole container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    nonce: [u8; NONCE_LENGTH],
    enforced: AuthorizationSet,
    unenforced: AuthorizationSet,
    encrypted_key_material: Vec<u8>,
    tag: [u8; TAG_LENGTH],
}

impl KeyBlob {
    /// Seal `key_material` under `master_key`, binding the three
    /// authorization sets into the authentication.
    pub fn seal(
        key_material: &[u8],
        enforced: &AuthorizationSet,
        unenforced: &AuthorizationSet,
        hidden: &AuthorizationSet,
        master_key: &[u8; 16],
        nonce: [u8; NONCE_LENGTH],
    ) -> Result<Self, ErrorCode> {
        let cipher =
            BlobCipher::new_from_slice(master_key).map_err(|_| ErrorCode::UnknownError)?;
        let aad = associated_data(enforced, unenforced, hidden);
        let mut sealed = cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: key_material,
                    aad: &aad,
                },
            )
            .map_err(|_| ErrorCode::UnknownError)?;

        // The AEAD appends the tag; ciphertext length equals the plaintext's.
        debug_assert_eq!(sealed.len(), key_material.len() + TAG_LENGTH);
        let tag_bytes = sealed.split_off(sealed.len() - TAG_LENGTH);
        let mut tag = [0; TAG_LENGTH];
        tag.copy_from_slice(&tag_bytes);

        Ok(KeyBlob {
            nonce,
            enforced: enforced.clone(),
            unenforced: unenforced.clone(),
            encrypted_key_material: sealed,
            tag,
        })
    }

    /// Authenticate the blob against `hidden` and recover the plaintext key
    /// material. Any failure is reported as [`ErrorCode::InvalidKeyBlob`].
    pub fn unseal(
        &self,
        hidden: &AuthorizationSet,
        master_key: &[u8; 16],
    ) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        let cipher =
            BlobCipher::new_from_slice(master_key).map_err(|_| ErrorCode::InvalidKeyBlob)?;
        let aad = associated_data(&self.enforced, &self.unenforced, hidden);

        let mut combined =
            Vec::with_capacity(self.encrypted_key_material.len() + TAG_LENGTH);
        combined.extend_from_slice(&self.encrypted_key_material);
        combined.extend_from_slice(&self.tag);

        cipher
            .decrypt(
                (&self.nonce).into(),
                Payload {
                    msg: &combined,
                    aad: &aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| ErrorCode::InvalidKeyBlob)
    }

    pub fn enforced(&self) -> &AuthorizationSet {
        &self.enforced
    }

    pub fn unenforced(&self) -> &AuthorizationSet {
        &self.unenforced
    }

    /// The key's algorithm, read from the stored policy
    pub fn algorithm(&self) -> Result<Algorithm, ErrorCode> {
        self.enforced
            .enum_value(Tag::ALGORITHM)
            .or_else(|| self.unenforced.enum_value(Tag::ALGORITHM))
            .and_then(Algorithm::from_u32)
            .ok_or(ErrorCode::UnsupportedAlgorithm)
    }

    pub fn serialized_size(&self) -> usize {
        NONCE_LENGTH
            + self.enforced.serialized_size()
            + self.unenforced.serialized_size()
            + coding::byte_string_size(&self.encrypted_key_material)
            + TAG_LENGTH
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.nonce);
        self.enforced.encode(buf);
        self.unenforced.encode(buf);
        buf.write_byte_string(&self.encrypted_key_material);
        buf.put_slice(&self.tag);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.encode(&mut buf);
        buf
    }

    /// Parse an opaque blob. Truncation or any structural damage is
    /// indistinguishable from tampering and reports `InvalidKeyBlob`.
    pub fn decode(data: &[u8]) -> Result<Self, ErrorCode> {
        let mut buf = data;
        Self::decode_fields(&mut buf).map_err(|_| ErrorCode::InvalidKeyBlob)
    }

    fn decode_fields<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        let mut nonce = [0; NONCE_LENGTH];
        buf.copy_exact(&mut nonce)?;
        let enforced = AuthorizationSet::decode(buf)?;
        let unenforced = AuthorizationSet::decode(buf)?;
        let encrypted_key_material = buf.get_byte_string()?;
        let mut tag = [0; TAG_LENGTH];
        buf.copy_exact(&mut tag)?;
        Ok(KeyBlob {
            nonce,
            enforced,
            unenforced,
            encrypted_key_material,
            tag,
        })
    }
}

/// An unsealed blob: authenticated policy plus plaintext key material. Lives
/// only for the duration of the request that opened it.
pub struct UnsealedKeyBlob {
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
    pub hidden: AuthorizationSet,
    pub algorithm: Algorithm,
    pub key_material: Zeroizing<Vec<u8>>,
}

impl UnsealedKeyBlob {
    /// The key's complete policy, enforced entries first
    pub fn authorizations(&self) -> AuthorizationSet {
        let mut merged = self.enforced.clone();
        merged.extend(&self.unenforced);
        merged
    }
}

fn associated_data(
    enforced: &AuthorizationSet,
    unenforced: &AuthorizationSet,
    hidden: &AuthorizationSet,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(
        enforced.serialized_size() + unenforced.serialized_size() + hidden.serialized_size(),
    );
    enforced.encode(&mut aad);
    unenforced.encode(&mut aad);
    hidden.encode(&mut aad);
    aad
}

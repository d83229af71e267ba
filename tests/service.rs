//! End-to-end exercises of the keymaster façade: generate/import keys, run
//! begin/update/finish sessions, and check the policy and failure behavior
//! a client would observe.

use keymaster_proto::messages::{
    BeginOperationRequest, ExportKeyRequest, FinishOperationRequest, GenerateKeyRequest,
    GetKeyCharacteristicsRequest, ImportKeyRequest, MessageVersion, UpdateOperationRequest,
};
use keymaster_proto::{
    Algorithm, AuthorizationSet, BlockMode, Buffer, Digest, ErrorCode, KeyFormat, KeyOrigin,
    KeyParam, Keymaster, KeymasterConfig, PaddingMode, Purpose, Tag,
};

use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;

const VERSION: MessageVersion = MessageVersion::V1;
const APP_ID: &[u8] = b"app_id";

fn service() -> Keymaster {
    Keymaster::new(KeymasterConfig::default())
}

fn client_params() -> Vec<KeyParam> {
    vec![KeyParam::blob(Tag::APPLICATION_ID, APP_ID)]
}

fn signing_purposes() -> Vec<KeyParam> {
    vec![
        KeyParam::enumerated(Tag::PURPOSE, Purpose::Sign as u32),
        KeyParam::enumerated(Tag::PURPOSE, Purpose::Verify as u32),
    ]
}

fn encryption_purposes() -> Vec<KeyParam> {
    vec![
        KeyParam::enumerated(Tag::PURPOSE, Purpose::Encrypt as u32),
        KeyParam::enumerated(Tag::PURPOSE, Purpose::Decrypt as u32),
    ]
}

fn set(params: Vec<KeyParam>) -> AuthorizationSet {
    params.into_iter().collect()
}

fn rsa_signing_key(key_size: u32) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, key_size),
        KeyParam::enumerated(Tag::DIGEST, Digest::None as u32),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::None as u32),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    params
}

fn aes_key(key_size: u32, extra: Vec<KeyParam>) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Aes as u32),
        KeyParam::integer(Tag::KEY_SIZE, key_size),
    ];
    params.extend(encryption_purposes());
    params.extend(client_params());
    params.extend(extra);
    params
}

fn hmac_key(key_size: u32, digest: Digest, mac_length: u32) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Hmac as u32),
        KeyParam::integer(Tag::KEY_SIZE, key_size),
        KeyParam::enumerated(Tag::DIGEST, digest as u32),
        KeyParam::integer(Tag::MAC_LENGTH, mac_length),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    params
}

fn generate(service: &Keymaster, params: Vec<KeyParam>) -> Vec<u8> {
    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(params);
    let response = service.generate_key(&request);
    assert_eq!(response.error, ErrorCode::Ok);
    assert!(response.enforced.is_empty());
    response.key_blob
}

fn begin(
    service: &mut Keymaster,
    purpose: Purpose,
    key_blob: &[u8],
    extra: Vec<KeyParam>,
) -> Result<u64, ErrorCode> {
    let mut request = BeginOperationRequest::new(VERSION);
    request.purpose = purpose;
    request.key_blob = key_blob.to_vec();
    let mut params = client_params();
    params.extend(extra);
    request.additional_params = set(params);
    let response = service.begin(&request);
    if response.error.is_ok() {
        assert_ne!(response.op_handle, 0);
        Ok(response.op_handle)
    } else {
        Err(response.error)
    }
}

fn update(
    service: &mut Keymaster,
    op_handle: u64,
    input: &[u8],
) -> Result<(Vec<u8>, usize), ErrorCode> {
    let mut request = UpdateOperationRequest::new(VERSION);
    request.op_handle = op_handle;
    request.input = Buffer::from(input);
    let response = service.update(&request);
    if response.error.is_ok() {
        Ok((
            response.output.peek_read().to_vec(),
            response.input_consumed as usize,
        ))
    } else {
        Err(response.error)
    }
}

fn finish(
    service: &mut Keymaster,
    op_handle: u64,
    signature: &[u8],
) -> Result<Vec<u8>, ErrorCode> {
    let mut request = FinishOperationRequest::new(VERSION);
    request.op_handle = op_handle;
    request.signature = Buffer::from(signature);
    let response = service.finish(&request);
    if response.error.is_ok() {
        Ok(response.output.peek_read().to_vec())
    } else {
        Err(response.error)
    }
}

/// Run a whole operation, asserting that the entire message is consumed
fn process(
    service: &mut Keymaster,
    purpose: Purpose,
    key_blob: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<Vec<u8>, ErrorCode> {
    let op_handle = begin(service, purpose, key_blob, vec![])?;
    let (mut output, consumed) = update(service, op_handle, message)?;
    assert_eq!(consumed, message.len());
    output.extend(finish(service, op_handle, signature)?);
    Ok(output)
}

fn sign(service: &mut Keymaster, key_blob: &[u8], message: &[u8]) -> Vec<u8> {
    let signature = process(service, Purpose::Sign, key_blob, message, &[]).unwrap();
    assert!(!signature.is_empty());
    signature
}

fn verify(
    service: &mut Keymaster,
    key_blob: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), ErrorCode> {
    process(service, Purpose::Verify, key_blob, message, signature).map(|_| ())
}

fn encrypt(service: &mut Keymaster, key_blob: &[u8], message: &[u8]) -> Vec<u8> {
    process(service, Purpose::Encrypt, key_blob, message, &[]).unwrap()
}

fn decrypt(
    service: &mut Keymaster,
    key_blob: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ErrorCode> {
    process(service, Purpose::Decrypt, key_blob, ciphertext, &[])
}

#[test]
fn rsa_generate_sign_verify_raw() {
    let mut service = service();
    let key_blob = generate(&service, rsa_signing_key(256));

    let message = b"12345678901234567890123456789012";
    let signature = sign(&mut service, &key_blob, message);
    assert_eq!(signature.len(), 32);
    verify(&mut service, &key_blob, message, &signature).unwrap();

    let mut corrupt = signature.clone();
    corrupt[signature.len() / 2] ^= 0x01;
    assert_eq!(
        verify(&mut service, &key_blob, message, &corrupt),
        Err(ErrorCode::VerificationFailed)
    );
}

fn pkcs8_rsa_fixture(bits: usize) -> Vec<u8> {
    let key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits).unwrap();
    key.to_pkcs8_der().unwrap().as_bytes().to_vec()
}

#[test]
fn rsa_import_pkcs8_and_use() {
    let mut service = service();
    let key_data = pkcs8_rsa_fixture(1024);

    let mut request = ImportKeyRequest::new(VERSION);
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::enumerated(Tag::DIGEST, Digest::None as u32),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::None as u32),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    request.key_description = set(params);
    request.key_format = KeyFormat::Pkcs8;
    request.key_data = key_data;

    let response = service.import_key(&request);
    assert_eq!(response.error, ErrorCode::Ok);
    assert!(response.enforced.is_empty());
    let unenforced = &response.unenforced;
    assert_eq!(
        unenforced.enum_value(Tag::ALGORITHM),
        Some(Algorithm::Rsa as u32)
    );
    assert_eq!(unenforced.int_value(Tag::KEY_SIZE), Some(1024));
    assert_eq!(unenforced.long_value(Tag::RSA_PUBLIC_EXPONENT), Some(65537));
    assert_eq!(
        unenforced.enum_value(Tag::ORIGIN),
        Some(KeyOrigin::Imported as u32)
    );
    assert!(unenforced.date_value(Tag::CREATION_DATETIME).is_some());

    let message = vec![0x61; 128];
    let signature = sign(&mut service, &response.key_blob, &message);
    verify(&mut service, &response.key_blob, &message, &signature).unwrap();
}

#[test]
fn rsa_import_key_size_mismatch() {
    let service = service();
    let key_data = pkcs8_rsa_fixture(1024);

    let mut request = ImportKeyRequest::new(VERSION);
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 2048),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    request.key_description = set(params);
    request.key_format = KeyFormat::Pkcs8;
    request.key_data = key_data;

    assert_eq!(
        service.import_key(&request).error,
        ErrorCode::ImportParameterMismatch
    );
}

#[test]
fn rsa_export_x509_public_key() {
    let service = service();
    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(rsa_signing_key(512));
    let generated = service.generate_key(&request);
    assert_eq!(generated.error, ErrorCode::Ok);

    let mut export = ExportKeyRequest::new(VERSION);
    export.additional_params = set(client_params());
    export.key_format = KeyFormat::X509;
    export.key_blob = generated.key_blob;
    let response = service.export_key(&export);
    assert_eq!(response.error, ErrorCode::Ok);

    let public = rsa::RsaPublicKey::from_public_key_der(&response.key_data).unwrap();
    assert_eq!(public.size() * 8, 512);
}

#[test]
fn rsa_pss_sha256_sign_verify() {
    let mut service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 1024),
        KeyParam::enumerated(Tag::DIGEST, Digest::Sha256 as u32),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::RsaPss as u32),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    let key_blob = generate(&service, params);

    let message = b"pss-protected message";
    let signature = sign(&mut service, &key_blob, message);
    assert_eq!(signature.len(), 128);
    verify(&mut service, &key_blob, message, &signature).unwrap();
    assert_eq!(
        verify(&mut service, &key_blob, b"some other message...", &signature),
        Err(ErrorCode::VerificationFailed)
    );
}

#[test]
fn rsa_pss_key_too_small_for_digest() {
    let mut service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 256),
        KeyParam::enumerated(Tag::DIGEST, Digest::Sha256 as u32),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::RsaPss as u32),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    let key_blob = generate(&service, params);

    // 256-bit key leaves no room for a SHA-256 PSS encoding.
    let op = begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
    update(&mut service, op, b"message").unwrap();
    assert_eq!(
        finish(&mut service, op, &[]),
        Err(ErrorCode::IncompatibleDigest)
    );
}

#[test]
fn rsa_oaep_encrypt_decrypt() {
    let mut service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 1024),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::RsaOaep as u32),
    ];
    params.extend(encryption_purposes());
    params.extend(client_params());
    let key_blob = generate(&service, params);

    let message = b"oaep sealed";
    let ciphertext = encrypt(&mut service, &key_blob, message);
    assert_eq!(ciphertext.len(), 128);
    assert_eq!(
        decrypt(&mut service, &key_blob, &ciphertext).unwrap(),
        message
    );

    // Corrupted ciphertext fails inside the backend.
    let mut corrupt = ciphertext;
    corrupt[64] ^= 0x01;
    assert_eq!(
        decrypt(&mut service, &key_blob, &corrupt),
        Err(ErrorCode::UnknownError)
    );
}

#[test]
fn rsa_encrypt_input_too_long() {
    let mut service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Rsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 512),
        KeyParam::enumerated(Tag::PADDING, PaddingMode::RsaOaep as u32),
    ];
    params.extend(encryption_purposes());
    params.extend(client_params());
    let key_blob = generate(&service, params);

    let op = begin(&mut service, Purpose::Encrypt, &key_blob, vec![]).unwrap();
    update(&mut service, op, &[0x77; 100]).unwrap();
    assert_eq!(
        finish(&mut service, op, &[]),
        Err(ErrorCode::InvalidInputLength)
    );
}

#[test]
fn aes_ocb_roundtrip_and_tamper_detection() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::CHUNK_LENGTH, 4096),
                KeyParam::integer(Tag::MAC_LENGTH, 16),
            ],
        ),
    );

    let message = b"Hello World!";
    let ciphertext1 = encrypt(&mut service, &key_blob, message);
    let ciphertext2 = encrypt(&mut service, &key_blob, message);
    // nonce(12) + ciphertext + tag(16)
    assert_eq!(ciphertext1.len(), 12 + message.len() + 16);
    assert_ne!(ciphertext1, ciphertext2);

    let plaintext = decrypt(&mut service, &key_blob, &ciphertext1).unwrap();
    assert_eq!(plaintext, message);

    let mut corrupt = ciphertext1.clone();
    let middle = corrupt.len() / 2;
    corrupt[middle] ^= 0x01;
    assert_eq!(
        decrypt(&mut service, &key_blob, &corrupt),
        Err(ErrorCode::VerificationFailed)
    );
}

#[test]
fn aes_ocb_empty_plaintext() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::CHUNK_LENGTH, 4096),
                KeyParam::integer(Tag::MAC_LENGTH, 16),
            ],
        ),
    );

    let ciphertext = encrypt(&mut service, &key_blob, b"");
    assert_eq!(ciphertext.len(), 12 + 16);
    assert_eq!(decrypt(&mut service, &key_blob, &ciphertext).unwrap(), b"");
}

#[test]
fn aes_ocb_truncated_ciphertext() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::CHUNK_LENGTH, 4096),
                KeyParam::integer(Tag::MAC_LENGTH, 16),
            ],
        ),
    );

    // Shorter than nonce + tag can never authenticate.
    assert_eq!(
        decrypt(&mut service, &key_blob, &[0; 27]),
        Err(ErrorCode::InvalidInputLength)
    );
}

#[test]
fn aes_ocb_missing_chunk_length() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::MAC_LENGTH, 16),
            ],
        ),
    );
    assert_eq!(
        begin(&mut service, Purpose::Encrypt, &key_blob, vec![]),
        Err(ErrorCode::InvalidArgument)
    );
}

#[test]
fn aes_ocb_wrong_mac_length() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::CHUNK_LENGTH, 4096),
                KeyParam::integer(Tag::MAC_LENGTH, 12),
            ],
        ),
    );
    assert_eq!(
        begin(&mut service, Purpose::Encrypt, &key_blob, vec![]),
        Err(ErrorCode::InvalidArgument)
    );
}

#[test]
fn aes_ocb_multi_chunk_stream() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ocb as u32),
                KeyParam::integer(Tag::CHUNK_LENGTH, 16),
                KeyParam::integer(Tag::MAC_LENGTH, 16),
            ],
        ),
    );

    // Three full chunks and a partial one, fed in uneven pieces.
    let message: Vec<u8> = (0u8..58).collect();
    let op = begin(&mut service, Purpose::Encrypt, &key_blob, vec![]).unwrap();
    let mut ciphertext = Vec::new();
    for piece in message.chunks(7) {
        let (out, consumed) = update(&mut service, op, piece).unwrap();
        assert_eq!(consumed, piece.len());
        ciphertext.extend(out);
    }
    ciphertext.extend(finish(&mut service, op, &[]).unwrap());
    // nonce + per-chunk tags: 3 full 16-byte chunks plus a 10-byte tail.
    assert_eq!(ciphertext.len(), 12 + 58 + 4 * 16);

    assert_eq!(
        decrypt(&mut service, &key_blob, &ciphertext).unwrap(),
        message
    );
}

#[test]
fn hmac_sha256_sign_verify() {
    let mut service = service();
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 256));

    let message = [0xab; 32];
    let signature = sign(&mut service, &key_blob, &message);
    assert_eq!(signature.len(), 32);
    verify(&mut service, &key_blob, &message, &signature).unwrap();

    let mut too_long = signature.clone();
    too_long.push(0);
    assert_eq!(
        verify(&mut service, &key_blob, &message, &too_long),
        Err(ErrorCode::InvalidInputLength)
    );

    let mut corrupt = signature;
    corrupt[0] ^= 0x80;
    assert_eq!(
        verify(&mut service, &key_blob, &message, &corrupt),
        Err(ErrorCode::VerificationFailed)
    );
}

#[test]
fn hmac_truncated_mac_is_accepted_on_verify() {
    let mut service = service();
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 128));

    let signature = sign(&mut service, &key_blob, b"message");
    assert_eq!(signature.len(), 16);
    verify(&mut service, &key_blob, b"message", &signature).unwrap();
}

#[test]
fn hmac_mac_length_not_multiple_of_8() {
    let mut service = service();
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 123));
    assert_eq!(
        begin(&mut service, Purpose::Sign, &key_blob, vec![]),
        Err(ErrorCode::UnsupportedMacLength)
    );
}

#[test]
fn hmac_mac_length_exceeding_digest() {
    let mut service = service();
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 512));
    assert_eq!(
        begin(&mut service, Purpose::Sign, &key_blob, vec![]),
        Err(ErrorCode::UnsupportedMacLength)
    );
}

#[test]
fn aes_cbc_pkcs7_all_lengths() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cbc as u32),
                KeyParam::enumerated(Tag::PADDING, PaddingMode::Pkcs7 as u32),
            ],
        ),
    );

    for i in 0..32usize {
        let message: Vec<u8> = (0..i as u8).collect();
        let ciphertext = encrypt(&mut service, &key_blob, &message);
        assert_eq!(ciphertext.len(), i + 32 - (i % 16), "message length {i}");
        assert_eq!(
            decrypt(&mut service, &key_blob, &ciphertext).unwrap(),
            message,
            "message length {i}"
        );
    }
}

#[test]
fn aes_cbc_pkcs7_corrupt_padding() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cbc as u32),
                KeyParam::enumerated(Tag::PADDING, PaddingMode::Pkcs7 as u32),
            ],
        ),
    );

    let ciphertext = encrypt(&mut service, &key_blob, b"a");
    assert_eq!(ciphertext.len(), 32);
    // Corrupt the data block (after the IV); the padding check must fail.
    let mut corrupt = ciphertext;
    corrupt[20] ^= 0x01;
    assert_eq!(
        decrypt(&mut service, &key_blob, &corrupt),
        Err(ErrorCode::InvalidArgument)
    );
}

#[test]
fn aes_ecb_requires_block_aligned_input_without_padding() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ecb as u32)],
        ),
    );

    let op = begin(&mut service, Purpose::Encrypt, &key_blob, vec![]).unwrap();
    update(&mut service, op, &[0; 17]).unwrap();
    assert_eq!(
        finish(&mut service, op, &[]),
        Err(ErrorCode::InvalidInputLength)
    );

    let aligned = encrypt(&mut service, &key_blob, &[0x42; 32]);
    assert_eq!(aligned.len(), 32);
    assert_eq!(
        decrypt(&mut service, &key_blob, &aligned).unwrap(),
        vec![0x42; 32]
    );
}

#[test]
fn aes_cfb_roundtrip_any_length() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            192,
            vec![KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cfb as u32)],
        ),
    );

    let message = b"stream ciphers take any length";
    let ciphertext = encrypt(&mut service, &key_blob, message);
    assert_eq!(ciphertext.len(), 16 + message.len());
    assert_eq!(
        decrypt(&mut service, &key_blob, &ciphertext).unwrap(),
        message
    );
}

#[test]
fn aes_cbc_caller_nonce() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cbc as u32),
                KeyParam::enumerated(Tag::PADDING, PaddingMode::Pkcs7 as u32),
                KeyParam::boolean(Tag::CALLER_NONCE),
            ],
        ),
    );

    let iv = [0x11; 16];
    let nonce_param = vec![KeyParam::blob(Tag::NONCE, &iv[..])];
    let op = begin(&mut service, Purpose::Encrypt, &key_blob, nonce_param.clone()).unwrap();
    update(&mut service, op, b"fixed iv").unwrap();
    let first = finish(&mut service, op, &[]).unwrap();
    assert_eq!(&first[..16], &iv);

    let op = begin(&mut service, Purpose::Encrypt, &key_blob, nonce_param).unwrap();
    update(&mut service, op, b"fixed iv").unwrap();
    let second = finish(&mut service, op, &[]).unwrap();
    // Same key, same IV, same plaintext: identical ciphertext.
    assert_eq!(first, second);
}

#[test]
fn aes_caller_nonce_requires_authorization() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cbc as u32),
                KeyParam::enumerated(Tag::PADDING, PaddingMode::Pkcs7 as u32),
            ],
        ),
    );

    assert_eq!(
        begin(
            &mut service,
            Purpose::Encrypt,
            &key_blob,
            vec![KeyParam::blob(Tag::NONCE, vec![0x11; 16])],
        ),
        Err(ErrorCode::InvalidArgument)
    );
}

#[test]
fn ecdsa_key_sizes() {
    let mut service = service();
    let mut base = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Ec as u32),
        KeyParam::enumerated(Tag::DIGEST, Digest::None as u32),
    ];
    base.extend(signing_purposes());
    base.extend(client_params());

    for bits in [192u32, 224, 256, 384, 521] {
        let mut params = base.clone();
        params.push(KeyParam::integer(Tag::KEY_SIZE, bits));
        let key_blob = generate(&service, params);

        let message = b"ecdsa message";
        let signature = sign(&mut service, &key_blob, message);
        verify(&mut service, &key_blob, message, &signature).unwrap();

        let mut corrupt = message.to_vec();
        corrupt[0] ^= 0x01;
        assert_eq!(
            verify(&mut service, &key_blob, &corrupt, &signature),
            Err(ErrorCode::VerificationFailed),
            "curve size {bits}"
        );
    }

    let mut params = base.clone();
    params.push(KeyParam::integer(Tag::KEY_SIZE, 190));
    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(params);
    assert_eq!(
        service.generate_key(&request).error,
        ErrorCode::UnsupportedKeySize
    );
}

#[test]
fn dsa_generate_sign_verify() {
    let mut service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Dsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 1024),
        KeyParam::enumerated(Tag::DIGEST, Digest::None as u32),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());
    let key_blob = generate(&service, params);

    let message = b"dsa message bytes";
    let signature = sign(&mut service, &key_blob, message);
    verify(&mut service, &key_blob, message, &signature).unwrap();
    assert_eq!(
        verify(&mut service, &key_blob, b"other message....", &signature),
        Err(ErrorCode::VerificationFailed)
    );
}

#[test]
fn dsa_partial_parameters() {
    let service = service();
    let mut params = vec![
        KeyParam::enumerated(Tag::ALGORITHM, Algorithm::Dsa as u32),
        KeyParam::integer(Tag::KEY_SIZE, 1024),
        KeyParam::blob(Tag::DSA_P, vec![1, 2, 3]),
        KeyParam::blob(Tag::DSA_Q, vec![4, 5, 6]),
    ];
    params.extend(signing_purposes());
    params.extend(client_params());

    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(params);
    assert_eq!(
        service.generate_key(&request).error,
        ErrorCode::InvalidDsaParams
    );
}

#[test]
fn characteristics_strip_hidden_tags_and_stamp_origin() {
    let service = service();
    let key_blob = generate(&service, rsa_signing_key(256));

    let mut request = GetKeyCharacteristicsRequest::new(VERSION);
    request.key_blob = key_blob;
    request.additional_params = set(client_params());
    let response = service.get_key_characteristics(&request);
    assert_eq!(response.error, ErrorCode::Ok);
    assert!(response.enforced.is_empty());

    let unenforced = &response.unenforced;
    assert!(unenforced.blob_value(Tag::APPLICATION_ID).is_none());
    assert!(unenforced.blob_value(Tag::ROOT_OF_TRUST).is_none());
    assert_eq!(
        unenforced.enum_value(Tag::ORIGIN),
        Some(KeyOrigin::Software as u32)
    );
    assert!(unenforced.date_value(Tag::CREATION_DATETIME).is_some());
    assert!(unenforced.contains_enum(Tag::PURPOSE, Purpose::Sign as u32));
    assert!(unenforced.contains_enum(Tag::PURPOSE, Purpose::Verify as u32));
    assert_eq!(unenforced.int_value(Tag::KEY_SIZE), Some(256));
}

#[test]
fn client_supplied_origin_is_rejected() {
    let service = service();
    let mut params = rsa_signing_key(256);
    params.push(KeyParam::enumerated(Tag::ORIGIN, KeyOrigin::Software as u32));
    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(params);
    assert_eq!(service.generate_key(&request).error, ErrorCode::InvalidTag);
}

#[test]
fn rollback_resistant_is_unsupported() {
    let service = service();
    let mut params = rsa_signing_key(256);
    params.push(KeyParam::boolean(Tag::ROLLBACK_RESISTANT));
    let mut request = GenerateKeyRequest::new(VERSION);
    request.key_description = set(params);
    assert_eq!(
        service.generate_key(&request).error,
        ErrorCode::UnsupportedTag
    );
}

#[test]
fn blob_rejects_wrong_hidden_inputs_and_tampering() {
    let mut service = service();
    let key_blob = generate(&service, rsa_signing_key(256));

    // Mismatched application id shifts the hidden set: AEAD failure.
    let mut request = BeginOperationRequest::new(VERSION);
    request.purpose = Purpose::Sign;
    request.key_blob = key_blob.clone();
    request.additional_params = set(vec![KeyParam::blob(Tag::APPLICATION_ID, &b"wrong"[..])]);
    assert_eq!(service.begin(&request).error, ErrorCode::InvalidKeyBlob);

    // Missing application id entirely.
    request.additional_params = AuthorizationSet::new();
    assert_eq!(service.begin(&request).error, ErrorCode::InvalidKeyBlob);

    // Any single-byte corruption.
    let mut corrupt = key_blob;
    let middle = corrupt.len() / 2;
    corrupt[middle] ^= 0x04;
    assert_eq!(
        begin(&mut service, Purpose::Sign, &corrupt, vec![]),
        Err(ErrorCode::InvalidKeyBlob)
    );
}

#[test]
fn unauthorized_purpose_is_rejected() {
    let mut service = service();
    let key_blob = generate(
        &service,
        aes_key(
            128,
            vec![
                KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Cbc as u32),
                KeyParam::enumerated(Tag::PADDING, PaddingMode::Pkcs7 as u32),
            ],
        ),
    );
    assert_eq!(
        begin(&mut service, Purpose::Sign, &key_blob, vec![]),
        Err(ErrorCode::UnsupportedPurpose)
    );
}

#[test]
fn handles_are_released_on_finish_and_abort() {
    let mut service = service();
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 256));

    let op = begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
    update(&mut service, op, b"data").unwrap();
    finish(&mut service, op, &[]).unwrap();
    assert_eq!(
        update(&mut service, op, b"more"),
        Err(ErrorCode::InvalidOperationHandle)
    );
    assert_eq!(
        finish(&mut service, op, &[]),
        Err(ErrorCode::InvalidOperationHandle)
    );

    let op = begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
    assert_eq!(service.abort(op), ErrorCode::Ok);
    assert_eq!(service.abort(op), ErrorCode::InvalidOperationHandle);
}

#[test]
fn failing_operation_releases_only_its_own_handle() {
    let mut service = service();
    let hmac_blob = generate(&service, hmac_key(128, Digest::Sha256, 256));
    let ecb_blob = generate(
        &service,
        aes_key(
            128,
            vec![KeyParam::enumerated(Tag::BLOCK_MODE, BlockMode::Ecb as u32)],
        ),
    );

    let survivor = begin(&mut service, Purpose::Sign, &hmac_blob, vec![]).unwrap();
    let doomed = begin(&mut service, Purpose::Encrypt, &ecb_blob, vec![]).unwrap();

    update(&mut service, doomed, &[0; 3]).unwrap();
    assert_eq!(
        finish(&mut service, doomed, &[]),
        Err(ErrorCode::InvalidInputLength)
    );
    assert_eq!(
        finish(&mut service, doomed, &[]),
        Err(ErrorCode::InvalidOperationHandle)
    );

    // The unrelated operation is still live.
    update(&mut service, survivor, b"still alive").unwrap();
    finish(&mut service, survivor, &[]).unwrap();
}

#[test]
fn operation_table_capacity_is_fixed() {
    let mut service = Keymaster::new(KeymasterConfig {
        operation_table_size: 2,
        ..KeymasterConfig::default()
    });
    let key_blob = generate(&service, hmac_key(128, Digest::Sha256, 256));

    let first = begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
    let second = begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
    assert_ne!(first, second);
    assert_eq!(
        begin(&mut service, Purpose::Sign, &key_blob, vec![]),
        Err(ErrorCode::TooManyOperations)
    );

    // Aborting one frees a slot.
    assert_eq!(service.abort(first), ErrorCode::Ok);
    begin(&mut service, Purpose::Sign, &key_blob, vec![]).unwrap();
}

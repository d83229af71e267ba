//! The keymaster façade: parameter validation, policy binding, and the
//! operation lifecycle.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::authorization::{AuthorizationSet, KeyParam};
use crate::error::ErrorCode;
use crate::keyblob::{KeyBlob, UnsealedKeyBlob, NONCE_LENGTH};
use crate::keys::{Key, KeyFactoryRegistry};
use crate::messages::{
    AddEntropyRequest, BeginOperationRequest, BeginOperationResponse, ExportKeyRequest,
    ExportKeyResponse, FinishOperationRequest, FinishOperationResponse, GenerateKeyRequest,
    GenerateKeyResponse, GetKeyCharacteristicsRequest, GetKeyCharacteristicsResponse,
    GetVersionRequest, GetVersionResponse, ImportKeyRequest, ImportKeyResponse,
    UpdateOperationRequest, UpdateOperationResponse, MAJOR_VERSION, MINOR_VERSION,
    SUBMINOR_VERSION,
};
use crate::ops::{OperationFactoryRegistry, OperationType};
use crate::table::OperationTable;
use crate::tag::Tag;
use crate::{Algorithm, BlockMode, Digest, KeyFormat, KeyOrigin, PaddingMode, Purpose};

/// Provisioned inputs for a service instance
#[derive(Clone)]
pub struct KeymasterConfig {
    /// The blob-sealing master key, supplied by the host's provisioning step
    pub master_key: [u8; 16],
    /// Root-of-trust bytes bound into every blob's hidden authorizations
    pub root_of_trust: Vec<u8>,
    /// Fixed capacity of the operation table
    pub operation_table_size: usize,
}

impl Default for KeymasterConfig {
    fn default() -> Self {
        KeymasterConfig {
            master_key: [0; 16],
            root_of_trust: Vec::new(),
            operation_table_size: 16,
        }
    }
}

/// A software keymaster service instance.
///
/// Single-threaded per request: every call runs to completion, and the only
/// state carried between calls is the operation table.
pub struct Keymaster {
    master_key: Zeroizing<[u8; 16]>,
    root_of_trust: Vec<u8>,
    key_factories: KeyFactoryRegistry,
    operation_factories: OperationFactoryRegistry,
    operations: OperationTable,
}

impl Keymaster {
    pub fn new(config: KeymasterConfig) -> Self {
        Keymaster {
            master_key: Zeroizing::new(config.master_key),
            root_of_trust: config.root_of_trust,
            key_factories: KeyFactoryRegistry::with_defaults(),
            operation_factories: OperationFactoryRegistry::with_defaults(),
            operations: OperationTable::new(config.operation_table_size),
        }
    }

    pub fn get_version(&self, _request: &GetVersionRequest) -> GetVersionResponse {
        let mut response = GetVersionResponse::new();
        response.major_ver = MAJOR_VERSION;
        response.minor_ver = MINOR_VERSION;
        response.subminor_ver = SUBMINOR_VERSION;
        response.error = ErrorCode::Ok;
        response
    }

    pub fn generate_key(&self, request: &GenerateKeyRequest) -> GenerateKeyResponse {
        let mut response = GenerateKeyResponse::new(request.version);
        match self.create_key(&request.key_description, None) {
            Ok((key_blob, enforced, unenforced)) => {
                response.key_blob = key_blob;
                response.enforced = enforced;
                response.unenforced = unenforced;
                response.error = ErrorCode::Ok;
            }
            Err(error) => response.error = error,
        }
        response
    }

    pub fn import_key(&self, request: &ImportKeyRequest) -> ImportKeyResponse {
        let mut response = ImportKeyResponse::new(request.version);
        match self.create_key(
            &request.key_description,
            Some((request.key_format, &request.key_data)),
        ) {
            Ok((key_blob, enforced, unenforced)) => {
                response.key_blob = key_blob;
                response.enforced = enforced;
                response.unenforced = unenforced;
                response.error = ErrorCode::Ok;
            }
            Err(error) => response.error = error,
        }
        response
    }

    pub fn get_key_characteristics(
        &self,
        request: &GetKeyCharacteristicsRequest,
    ) -> GetKeyCharacteristicsResponse {
        let mut response = GetKeyCharacteristicsResponse::new(request.version);
        match self.load_unsealed(&request.key_blob, &request.additional_params) {
            Ok(unsealed) => {
                response.enforced = unsealed.enforced;
                response.unenforced = unsealed.unenforced;
                response.error = ErrorCode::Ok;
            }
            Err(error) => response.error = error,
        }
        response
    }

    pub fn export_key(&self, request: &ExportKeyRequest) -> ExportKeyResponse {
        let mut response = ExportKeyResponse::new(request.version);
        let result = self
            .load_unsealed(&request.key_blob, &request.additional_params)
            .and_then(|unsealed| {
                let factory = self
                    .key_factories
                    .get(unsealed.algorithm)
                    .ok_or(ErrorCode::UnsupportedAlgorithm)?;
                let key = factory.load_key(&unsealed)?;
                key.formatted_key_material(request.key_format)
            });
        match result {
            Ok(key_data) => {
                response.key_data = key_data;
                response.error = ErrorCode::Ok;
            }
            Err(error) => response.error = error,
        }
        response
    }

    pub fn begin(&mut self, request: &BeginOperationRequest) -> BeginOperationResponse {
        let mut response = BeginOperationResponse::new(request.version);
        match self.begin_operation(request) {
            Ok((op_handle, output_params)) => {
                response.op_handle = op_handle;
                response.output_params = output_params;
                response.error = ErrorCode::Ok;
            }
            Err(error) => response.error = error,
        }
        response
    }

    fn begin_operation(
        &mut self,
        request: &BeginOperationRequest,
    ) -> Result<(u64, AuthorizationSet), ErrorCode> {
        let unsealed = self.load_unsealed(&request.key_blob, &request.additional_params)?;
        let algorithm = unsealed.algorithm;

        if !unsealed
            .authorizations()
            .contains_enum(Tag::PURPOSE, request.purpose as u32)
        {
            return Err(ErrorCode::UnsupportedPurpose);
        }

        let key_factory = self
            .key_factories
            .get(algorithm)
            .ok_or(ErrorCode::UnsupportedAlgorithm)?;
        let key = key_factory.load_key(&unsealed)?;

        let operation_factory = self
            .operation_factories
            .get(OperationType::new(algorithm, request.purpose))
            .ok_or(ErrorCode::UnsupportedPurpose)?;
        let mut operation = operation_factory.create_operation(key, &request.additional_params)?;

        let mut output_params = AuthorizationSet::new();
        operation.begin(&request.additional_params, &mut output_params)?;

        let op_handle = self.operations.add(operation)?;
        debug!(op_handle, ?algorithm, purpose = ?request.purpose, "operation started");
        Ok((op_handle, output_params))
    }

    pub fn update(&mut self, request: &UpdateOperationRequest) -> UpdateOperationResponse {
        let mut response = UpdateOperationResponse::new(request.version);
        let result = match self.operations.find(request.op_handle) {
            None => None,
            Some(operation) => Some(operation.update(
                &request.additional_params,
                &request.input,
                &mut response.output,
            )),
        };
        match result {
            None => response.error = ErrorCode::InvalidOperationHandle,
            Some(Ok(input_consumed)) => {
                response.input_consumed = input_consumed as u32;
                response.error = ErrorCode::Ok;
            }
            Some(Err(error)) => {
                // Any error invalidates the operation.
                debug!(op_handle = request.op_handle, %error, "update failed");
                self.operations.release(request.op_handle);
                response.error = error;
            }
        }
        response
    }

    pub fn finish(&mut self, request: &FinishOperationRequest) -> FinishOperationResponse {
        let mut response = FinishOperationResponse::new(request.version);
        let result = match self.operations.find(request.op_handle) {
            None => None,
            Some(operation) => Some(operation.finish(
                &request.additional_params,
                &request.signature,
                &mut response.output,
            )),
        };
        match result {
            None => response.error = ErrorCode::InvalidOperationHandle,
            Some(result) => {
                self.operations.release(request.op_handle);
                response.error = result.err().unwrap_or(ErrorCode::Ok);
            }
        }
        response
    }

    pub fn abort(&mut self, op_handle: u64) -> ErrorCode {
        let result = match self.operations.find(op_handle) {
            None => return ErrorCode::InvalidOperationHandle,
            Some(operation) => operation.abort(),
        };
        self.operations.release(op_handle);
        result.err().unwrap_or(ErrorCode::Ok)
    }

    /// Accept caller-supplied entropy. The backend draws from the platform
    /// CSPRNG, which takes no external seeding, so the data is acknowledged
    /// and discarded.
    pub fn add_entropy(&mut self, request: &AddEntropyRequest) -> ErrorCode {
        trace!(
            bytes = request.random_data.available_read(),
            "add_entropy accepted"
        );
        ErrorCode::Ok
    }

    /// Registered algorithms, in registry insertion order
    pub fn supported_algorithms(&self) -> Vec<Algorithm> {
        self.key_factories.algorithms()
    }

    pub fn supported_block_modes(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<BlockMode>, ErrorCode> {
        Ok(self
            .operation_factory(algorithm, purpose)?
            .supported_block_modes()
            .to_vec())
    }

    pub fn supported_padding_modes(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<PaddingMode>, ErrorCode> {
        Ok(self
            .operation_factory(algorithm, purpose)?
            .supported_padding_modes()
            .to_vec())
    }

    pub fn supported_digests(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<Digest>, ErrorCode> {
        Ok(self
            .operation_factory(algorithm, purpose)?
            .supported_digests()
            .to_vec())
    }

    pub fn supported_import_formats(
        &self,
        algorithm: Algorithm,
    ) -> Result<Vec<KeyFormat>, ErrorCode> {
        self.key_factories
            .get(algorithm)
            .map(|f| f.supported_import_formats().to_vec())
            .ok_or(ErrorCode::UnsupportedAlgorithm)
    }

    pub fn supported_export_formats(
        &self,
        algorithm: Algorithm,
    ) -> Result<Vec<KeyFormat>, ErrorCode> {
        self.key_factories
            .get(algorithm)
            .map(|f| f.supported_export_formats().to_vec())
            .ok_or(ErrorCode::UnsupportedAlgorithm)
    }

    fn operation_factory(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<&dyn crate::ops::OperationFactory, ErrorCode> {
        self.key_factories
            .get(algorithm)
            .ok_or(ErrorCode::UnsupportedAlgorithm)?;
        self.operation_factories
            .get(OperationType::new(algorithm, purpose))
            .ok_or(ErrorCode::UnsupportedPurpose)
    }

    fn create_key(
        &self,
        description: &AuthorizationSet,
        import: Option<(KeyFormat, &[u8])>,
    ) -> Result<(Vec<u8>, AuthorizationSet, AuthorizationSet), ErrorCode> {
        let algorithm = description
            .enum_value(Tag::ALGORITHM)
            .and_then(Algorithm::from_u32)
            .ok_or(ErrorCode::UnsupportedAlgorithm)?;
        let factory = self
            .key_factories
            .get(algorithm)
            .ok_or(ErrorCode::UnsupportedAlgorithm)?;

        let (key, origin) = match import {
            None => (factory.generate_key(description)?, KeyOrigin::Software),
            Some((format, key_data)) => (
                factory.import_key(description, format, key_data)?,
                KeyOrigin::Imported,
            ),
        };
        self.seal_key(key.as_ref(), origin)
    }

    fn seal_key(
        &self,
        key: &dyn Key,
        origin: KeyOrigin,
    ) -> Result<(Vec<u8>, AuthorizationSet, AuthorizationSet), ErrorCode> {
        let (enforced, unenforced) = self.split_authorizations(key.authorizations(), origin)?;
        let hidden = self.build_hidden_authorizations(key.authorizations())?;
        let key_material = key.key_material()?;

        let mut nonce = [0; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let blob = KeyBlob::seal(
            &key_material,
            &enforced,
            &unenforced,
            &hidden,
            &self.master_key,
            nonce,
        )?;
        Ok((blob.encode_to_vec(), enforced, unenforced))
    }

    /// Sort a key's authorizations into the characteristics returned to the
    /// client. Service-owned tags must not come from the caller; hidden tags
    /// are withheld; everything else is software-enforced. A creation
    /// timestamp and the key's origin are stamped in.
    fn split_authorizations(
        &self,
        key_authorizations: &AuthorizationSet,
        origin: KeyOrigin,
    ) -> Result<(AuthorizationSet, AuthorizationSet), ErrorCode> {
        let mut unenforced = AuthorizationSet::new();
        for param in key_authorizations.iter() {
            match param.tag {
                Tag::ROOT_OF_TRUST | Tag::ORIGIN => return Err(ErrorCode::InvalidTag),
                Tag::ROLLBACK_RESISTANT => return Err(ErrorCode::UnsupportedTag),
                Tag::APPLICATION_ID | Tag::APPLICATION_DATA => {}
                _ => unenforced.push(param.clone())?,
            }
        }

        unenforced.push(KeyParam::date_time(Tag::CREATION_DATETIME, unix_millis()))?;
        unenforced.push(KeyParam::enumerated(Tag::ORIGIN, origin as u32))?;

        // Nothing is hardware-enforced in a software implementation.
        Ok((AuthorizationSet::new(), unenforced))
    }

    /// The authorizations bound into a blob's AEAD but never stored in it:
    /// caller-supplied application identity plus the service root of trust
    fn build_hidden_authorizations(
        &self,
        client_params: &AuthorizationSet,
    ) -> Result<AuthorizationSet, ErrorCode> {
        let mut hidden = AuthorizationSet::new();
        if let Some(data) = client_params.blob_value(Tag::APPLICATION_ID) {
            hidden.push(KeyParam::blob(Tag::APPLICATION_ID, data))?;
        }
        if let Some(data) = client_params.blob_value(Tag::APPLICATION_DATA) {
            hidden.push(KeyParam::blob(Tag::APPLICATION_DATA, data))?;
        }
        hidden.push(KeyParam::blob(
            Tag::ROOT_OF_TRUST,
            self.root_of_trust.clone(),
        ))?;
        Ok(hidden)
    }

    fn load_unsealed(
        &self,
        key_blob: &[u8],
        client_params: &AuthorizationSet,
    ) -> Result<UnsealedKeyBlob, ErrorCode> {
        let hidden = self.build_hidden_authorizations(client_params)?;
        let blob = KeyBlob::decode(key_blob)?;
        let key_material = blob.unseal(&hidden, &self.master_key)?;

        let algorithm = blob.algorithm()?;
        blob.enforced()
            .int_value(Tag::KEY_SIZE)
            .or_else(|| blob.unenforced().int_value(Tag::KEY_SIZE))
            .ok_or(ErrorCode::UnsupportedKeySize)?;

        Ok(UnsealedKeyBlob {
            enforced: blob.enforced().clone(),
            unenforced: blob.unenforced().clone(),
            hidden,
            algorithm,
            key_material,
        })
    }
}

fn unix_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_millis() as i64),
    }
}

use crate::api::error::AppError;
use crate::config::IntakeConfig;
use crate::models::{
    AuthorizedCaller, Credentials, Field, FieldError, MethodContract, UploadRequest,
    ValidationResult,
};
use crate::services::authenticator::Authenticator;
use crate::services::checksum::{blocking_read, checksums_match, compute_checksum};
use crate::services::schema::{SchemaValidator, validate_against};
use crate::services::secret_store::SecretStore;
use crate::utils::validation::has_gzip_suffix;
use std::io::{Read, Seek};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Field validation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Checksum,
    Filename,
    Schema,
}

impl Stage {
    pub fn field(&self) -> Field {
        match self {
            Stage::Checksum => Field::SentMd5,
            Stage::Filename => Field::Filename,
            Stage::Schema => Field::Schema,
        }
    }
}

/// Stages in execution order. The first failure ends the run.
pub const STAGES: [Stage; 3] = [Stage::Checksum, Stage::Filename, Stage::Schema];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    ChecksumChecked,
    FilenameChecked,
    SchemaChecked,
    Done,
    Failed(Field),
}

impl PipelineState {
    fn passed(self, stage: Stage) -> Self {
        match (self, stage) {
            (PipelineState::Pending, Stage::Checksum) => PipelineState::ChecksumChecked,
            (PipelineState::ChecksumChecked, Stage::Filename) => PipelineState::FilenameChecked,
            (PipelineState::FilenameChecked, Stage::Schema) => PipelineState::SchemaChecked,
            (state, stage) => unreachable!("stage {:?} run out of order from {:?}", stage, state),
        }
    }

    fn finish(self) -> Self {
        match self {
            PipelineState::SchemaChecked => PipelineState::Done,
            state => state,
        }
    }
}

enum StageVerdict {
    Passed,
    Failed(FieldError),
}

/// Fail-fast validation of gzip uploads.
///
/// Authentication always comes first: `validate` needs the `AuthorizedCaller`
/// that only `authorize` hands out. Every run leaves the upload content at
/// offset 0 for the storage dispatcher.
pub struct UploadPipeline {
    authenticator: Authenticator,
    schema: SchemaValidator,
    chunk_size: usize,
    checksum_case_sensitive: bool,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn SecretStore>, config: &IntakeConfig) -> Self {
        Self {
            authenticator: Authenticator::new(store.clone()),
            schema: SchemaValidator::new(store),
            chunk_size: config.chunk_size,
            checksum_case_sensitive: config.checksum_case_sensitive,
        }
    }

    pub async fn authorize(&self, credentials: &Credentials) -> Result<AuthorizedCaller, AppError> {
        let username = credentials.username.as_deref();
        let authenticated = self
            .authenticator
            .authenticate(username, credentials.secret_key.as_deref())
            .await?;

        match username {
            Some(username) if authenticated => Ok(AuthorizedCaller::new(username.to_string())),
            _ => {
                warn!(
                    "🚫 Upload credentials rejected for '{}'",
                    username.unwrap_or("<missing>")
                );
                Err(AppError::Forbidden)
            }
        }
    }

    pub async fn validate<R: Read + Seek + Send>(
        &self,
        caller: &AuthorizedCaller,
        request: &mut UploadRequest<R>,
    ) -> Result<ValidationResult, AppError> {
        if request.username() != caller.username() {
            return Err(AppError::Forbidden);
        }

        let mut state = PipelineState::Pending;
        let mut md5 = String::new();
        let mut contract = None;

        for stage in STAGES {
            let verdict = match stage {
                Stage::Checksum => self.check_checksum(request, &mut md5)?,
                Stage::Filename => check_filename(request),
                Stage::Schema => self.check_schema(request, &mut contract).await?,
            };

            match verdict {
                StageVerdict::Passed => {
                    state = state.passed(stage);
                    debug!("Upload '{}' -> {:?}", request.filename, state);
                }
                StageVerdict::Failed(error) => {
                    state = PipelineState::Failed(stage.field());
                    warn!(
                        "Upload '{}' from '{}' rejected at {}: {}",
                        request.filename,
                        request.username(),
                        stage.field(),
                        error.message
                    );
                    rewind(&mut request.content)?;
                    return Ok(ValidationResult::rejected(md5, error));
                }
            }
        }

        state = state.finish();
        rewind(&mut request.content)?;
        info!(
            "✅ Upload '{}' from '{}' accepted ({:?}, md5={})",
            request.filename,
            request.username(),
            state,
            md5
        );

        Ok(ValidationResult::accepted(md5, contract))
    }

    fn check_checksum<R: Read + Seek>(
        &self,
        request: &mut UploadRequest<R>,
        md5: &mut String,
    ) -> Result<StageVerdict, AppError> {
        let chunk_size = self.chunk_size;
        *md5 = blocking_read(|| compute_checksum(&mut request.content, chunk_size))
            .map_err(|e| AppError::Internal(format!("Failed to hash upload: {}", e)))?;

        if checksums_match(&request.sent_md5, md5, self.checksum_case_sensitive) {
            Ok(StageVerdict::Passed)
        } else {
            Ok(StageVerdict::Failed(FieldError::checksum_mismatch()))
        }
    }

    /// Resolves the method contract once and hands it back through `contract`
    /// so dispatch routes by the same mapping the header was checked against.
    async fn check_schema<R: Read + Seek + Send>(
        &self,
        request: &mut UploadRequest<R>,
        contract: &mut Option<MethodContract>,
    ) -> Result<StageVerdict, AppError> {
        *contract = self
            .schema
            .contract_for(request.username(), &request.method)
            .await?;
        let outcome = validate_against(contract.as_ref(), &mut request.content)
            .map_err(|e| AppError::Internal(format!("Failed to read upload: {}", e)))?;

        Ok(match outcome.detail() {
            None => StageVerdict::Passed,
            Some(detail) => StageVerdict::Failed(FieldError::invalid_schema(detail)),
        })
    }
}

fn check_filename<R>(request: &UploadRequest<R>) -> StageVerdict {
    let declared = has_gzip_suffix(&request.filename);
    let underlying = request.file_name.as_deref().is_some_and(has_gzip_suffix);

    if declared || underlying {
        StageVerdict::Passed
    } else {
        StageVerdict::Failed(FieldError::not_gzip())
    }
}

fn rewind<R: Seek>(content: &mut R) -> Result<(), AppError> {
    content
        .rewind()
        .map_err(|e| AppError::Internal(format!("Failed to rewind upload: {}", e)))
}

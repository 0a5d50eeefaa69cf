use crate::AppState;
use crate::api::error::AppError;
use crate::models::{AuthorizedCaller, Credentials, UploadRequest, ValidationResult};
use crate::services::dispatcher::DispatchTarget;
use crate::utils::validation::{UploadForm, storage_filename};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use tempfile::SpooledTempFile;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// MD5 computed by the server, empty when the file was never hashed
    pub md5: String,
    /// Field name to messages, empty on success
    pub error: BTreeMap<String, Vec<String>>,
}

impl From<&ValidationResult> for UploadResponse {
    fn from(result: &ValidationResult) -> Self {
        Self {
            md5: result.md5().to_string(),
            error: result.errors().clone(),
        }
    }
}

struct SpooledUpload {
    content: SpooledTempFile,
    file_name: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

fn respond(result: &ValidationResult) -> (StatusCode, Json<UploadResponse>) {
    (result.status(), Json(UploadResponse::from(result)))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Multipart, description = "Fields: nome/username, SECRET, method, filename, sent_md5/md5, file (gzip)"),
    responses(
        (status = 201, description = "Upload validated and forwarded to storage", body = UploadResponse),
        (status = 400, description = "Checksum mismatch, invalid schema or missing field", body = UploadResponse),
        (status = 403, description = "Unknown username or secret"),
        (status = 415, description = "File is not gzip", body = UploadResponse)
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut form = UploadForm::default();
    let mut credentials = Credentials::default();
    let mut caller: Option<AuthorizedCaller> = None;
    let mut upload: Option<SpooledUpload> = None;

    // Capture errors so the rest of the multipart stream can be consumed
    let parsed: Result<(), AppError> = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                // Reject before buffering when the credentials came first
                if caller.is_none() && credentials.is_complete() {
                    caller = Some(state.pipeline.authorize(&credentials).await?);
                }

                let file_name = field.file_name().map(str::to_string);
                let mut content = SpooledTempFile::new(state.config.spool_threshold);
                let mut size = 0usize;

                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    size += chunk.len();
                    if size > state.config.max_file_size {
                        return Err(AppError::PayloadTooLarge(format!(
                            "File exceeds the maximum allowed size of {} MB",
                            state.config.max_file_size / 1024 / 1024
                        )));
                    }
                    content
                        .write_all(&chunk)
                        .map_err(|e| AppError::Internal(format!("Failed to buffer upload: {}", e)))?;
                }

                content
                    .rewind()
                    .map_err(|e| AppError::Internal(format!("Failed to rewind upload: {}", e)))?;
                debug!("Buffered upload part {:?} ({} bytes)", file_name, size);

                upload = Some(SpooledUpload { content, file_name });
                continue;
            }

            let value = field.text().await.map_err(multipart_error)?;
            let value = Some(value).filter(|v| !v.is_empty());

            match name.as_str() {
                "username" | "nome" => {
                    form.username = value.clone();
                    credentials.username = value;
                }
                "SECRET" | "secret" => credentials.secret_key = value,
                "method" => form.method = value,
                "filename" => form.filename = value,
                "sent_md5" | "md5" => form.sent_md5 = value,
                other => debug!("Ignoring unknown upload field '{}'", other),
            }
        }

        Ok(())
    }
    .await;

    if let Err(e) = parsed {
        tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
        return Err(e);
    }

    // Authentication gates everything below
    let caller = match caller {
        Some(caller) if credentials.username.as_deref() == Some(caller.username()) => caller,
        _ => state.pipeline.authorize(&credentials).await?,
    };

    if let Some(error) = form.first_error(upload.is_some()) {
        return Ok(respond(&ValidationResult::rejected(String::new(), error)));
    }
    let Some(SpooledUpload { content, file_name }) = upload else {
        return Err(AppError::BadRequest("No file provided".to_string()));
    };

    let mut request = UploadRequest::new(
        &caller,
        form.method.unwrap_or_default(),
        form.filename.unwrap_or_default(),
        form.sent_md5.unwrap_or_default(),
        file_name,
        content,
    );

    let result = state.pipeline.validate(&caller, &mut request).await?;

    if result.is_accepted() {
        let target = dispatch_target(&state, &request, &result);
        state
            .dispatcher
            .dispatch(&target, Box::new(request.into_content()))
            .await?;
    }

    Ok(respond(&result))
}

/// Routes by the contract the pipeline validated against, falling back to
/// `<default_storage_prefix>/<method>` for methods without a mapping.
fn dispatch_target<R>(
    state: &AppState,
    request: &UploadRequest<R>,
    result: &ValidationResult,
) -> DispatchTarget {
    let uri = match result.contract() {
        Some(contract) => contract.uri.clone(),
        None => format!(
            "{}/{}",
            state.config.default_storage_prefix.trim_end_matches('/'),
            request.method
        ),
    };

    let filename = storage_filename(&request.filename)
        .or_else(|| request.file_name.as_deref().and_then(storage_filename))
        .unwrap_or_else(|| format!("{}.gz", Uuid::new_v4().simple()));

    DispatchTarget::new(uri, filename)
}

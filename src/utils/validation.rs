use crate::models::{Field, FieldError};
use axum::http::StatusCode;
use std::collections::HashMap;
use std::path::Path;
use validator::Validate;

/// Suffix every accepted upload must carry, on the declared or the transport file name
pub const GZIP_SUFFIX: &str = ".gz";

const REQUIRED: &str = "This field is required.";
const NO_FILE: &str = "No file was submitted.";

/// Text fields of an upload, checked before the validation pipeline runs.
///
/// Empty submissions must be normalised to `None` by the caller.
#[derive(Debug, Default, Clone, Validate)]
pub struct UploadForm {
    #[validate(
        required(message = "This field is required."),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub username: Option<String>,

    #[validate(
        required(message = "This field is required."),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub method: Option<String>,

    #[validate(
        required(message = "This field is required."),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub filename: Option<String>,

    #[validate(
        required(message = "This field is required."),
        length(max = 32, message = "Ensure this value has at most 32 characters.")
    )]
    pub sent_md5: Option<String>,
}

impl UploadForm {
    /// First failing field in declaration order.
    pub fn first_error(&self, has_file: bool) -> Option<FieldError> {
        if let Err(errors) = self.validate() {
            let by_field: HashMap<String, _> = errors
                .field_errors()
                .into_iter()
                .map(|(name, errs)| (name.to_string(), errs))
                .collect();

            let ordered = [
                ("username", Field::Username),
                ("method", Field::Method),
                ("filename", Field::Filename),
                ("sent_md5", Field::SentMd5),
            ];

            for (name, field) in ordered {
                if let Some(error) = by_field.get(name).and_then(|errs| errs.first()) {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| REQUIRED.to_string());
                    return Some(FieldError::new(field, message, StatusCode::BAD_REQUEST));
                }
            }
        }

        if !has_file {
            return Some(FieldError::new(Field::File, NO_FILE, StatusCode::BAD_REQUEST));
        }

        None
    }
}

pub fn has_gzip_suffix(name: &str) -> bool {
    name.ends_with(GZIP_SUFFIX)
}

/// Reduces a client supplied filename to a safe object name.
/// Returns `None` when nothing usable is left.
pub fn storage_filename(filename: &str) -> Option<String> {
    // Get only the filename component (remove any path)
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> UploadForm {
        UploadForm {
            username: Some("anyname".to_string()),
            method: Some("cpf".to_string()),
            filename: Some("cpf.csv.gz".to_string()),
            sent_md5: Some("d3a4646728a9de9a74d8fc4c41966a42".to_string()),
        }
    }

    #[test]
    fn test_complete_form_is_valid() {
        assert!(complete_form().first_error(true).is_none());
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let form = UploadForm {
            method: None,
            sent_md5: None,
            ..complete_form()
        };
        let error = form.first_error(true).unwrap();
        assert_eq!(error.field, Field::Method);
        assert_eq!(error.message, REQUIRED);
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_sent_md5_length() {
        let form = UploadForm {
            sent_md5: Some("a".repeat(33)),
            ..complete_form()
        };
        let error = form.first_error(true).unwrap();
        assert_eq!(error.field, Field::SentMd5);
        assert_eq!(error.message, "Ensure this value has at most 32 characters.");

        // Shorter values pass here and fail the checksum comparison later
        let form = UploadForm {
            sent_md5: Some("wrongmd5".to_string()),
            ..complete_form()
        };
        assert!(form.first_error(true).is_none());
    }

    #[test]
    fn test_filename_length() {
        let form = UploadForm {
            filename: Some(format!("{}.gz", "a".repeat(300))),
            ..complete_form()
        };
        assert_eq!(form.first_error(true).unwrap().field, Field::Filename);
    }

    #[test]
    fn test_missing_file() {
        let error = complete_form().first_error(false).unwrap();
        assert_eq!(error.field, Field::File);
        assert_eq!(error.message, NO_FILE);
    }

    #[test]
    fn test_has_gzip_suffix() {
        assert!(has_gzip_suffix("cpf.csv.gz"));
        assert!(has_gzip_suffix(".gz"));
        assert!(!has_gzip_suffix("cpf.csv"));
        assert!(!has_gzip_suffix("cpf.GZ"));
        assert!(!has_gzip_suffix("cpf.gz.csv"));
    }

    #[test]
    fn test_storage_filename() {
        assert_eq!(storage_filename("cpf.csv.gz").as_deref(), Some("cpf.csv.gz"));
        assert_eq!(
            storage_filename("../../etc/passwd.gz").as_deref(),
            Some("passwd.gz")
        );
        assert_eq!(storage_filename("a:b|c.gz").as_deref(), Some("a_b_c.gz"));
        assert_eq!(storage_filename(".hidden.gz").as_deref(), Some("hidden.gz"));
        assert_eq!(storage_filename("..").as_deref(), None);
        assert_eq!(storage_filename("").as_deref(), None);
    }
}

use axum::http::StatusCode;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek};

/// Raw credential pair as submitted by the client. Either half may be absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub secret_key: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, secret_key: Option<String>) -> Self {
        Self {
            username,
            secret_key,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.username.is_some() && self.secret_key.is_some()
    }
}

/// Proof that a username passed authentication.
///
/// Only the upload pipeline can mint one, so an `UploadRequest` cannot exist
/// for a caller that was never authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedCaller {
    username: String,
}

impl AuthorizedCaller {
    pub(crate) fn new(username: String) -> Self {
        Self { username }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Header contract and storage destination of a (username, method) pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContract {
    pub method: String,
    pub uri: String,
    pub mandatory_headers: Vec<String>,
}

impl MethodContract {
    /// Builds a contract from the comma separated header list kept in storage.
    /// An empty list means no schema check is required.
    pub fn from_header_list(method: &str, uri: &str, header_list: &str) -> Self {
        let mandatory_headers = if header_list.is_empty() {
            Vec::new()
        } else {
            header_list.split(',').map(str::to_string).collect()
        };

        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            mandatory_headers,
        }
    }

    pub fn requires_schema(&self) -> bool {
        !self.mandatory_headers.is_empty()
    }

    pub fn expected_headers(&self) -> String {
        self.mandatory_headers.join(",")
    }
}

/// One upload, owned by the request handler for the duration of a call.
pub struct UploadRequest<R> {
    username: String,
    pub method: String,
    pub filename: String,
    pub sent_md5: String,
    /// Name the transport reported for the file part, if any.
    pub file_name: Option<String>,
    pub content: R,
}

impl<R: Read + Seek> UploadRequest<R> {
    pub fn new(
        caller: &AuthorizedCaller,
        method: String,
        filename: String,
        sent_md5: String,
        file_name: Option<String>,
        content: R,
    ) -> Self {
        Self {
            username: caller.username().to_string(),
            method,
            filename,
            sent_md5,
            file_name,
            content,
        }
    }
}

impl<R> UploadRequest<R> {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn into_content(self) -> R {
        self.content
    }
}

/// Request fields that can carry a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Username,
    Method,
    Filename,
    SentMd5,
    File,
    Schema,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Username => "username",
            Field::Method => "method",
            Field::Filename => "filename",
            Field::SentMd5 => "sent_md5",
            Field::File => "file",
            Field::Schema => "schema",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
    pub status: StatusCode,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            field,
            message: message.into(),
            status,
        }
    }

    pub fn checksum_mismatch() -> Self {
        Self::new(
            Field::SentMd5,
            "md5 checksum does not match",
            StatusCode::BAD_REQUEST,
        )
    }

    pub fn not_gzip() -> Self {
        Self::new(
            Field::Filename,
            "file must be GZIP",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        )
    }

    pub fn invalid_schema(detail: impl Into<String>) -> Self {
        Self::new(Field::Schema, detail, StatusCode::BAD_REQUEST)
    }
}

/// Outcome of validating one upload. Built once and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    md5: String,
    errors: BTreeMap<String, Vec<String>>,
    status: StatusCode,
    contract: Option<MethodContract>,
}

impl ValidationResult {
    /// `contract` is the one the schema stage resolved, if the method has one.
    pub fn accepted(md5: String, contract: Option<MethodContract>) -> Self {
        Self {
            md5,
            errors: BTreeMap::new(),
            status: StatusCode::CREATED,
            contract,
        }
    }

    pub fn rejected(md5: String, error: FieldError) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(error.field.to_string(), vec![error.message]);
        Self {
            md5,
            errors,
            status: error.status,
            contract: None,
        }
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed_field(&self) -> Option<&str> {
        self.errors.keys().next().map(String::as_str)
    }

    /// Contract the upload was checked against. Always `None` when rejected.
    pub fn contract(&self) -> Option<&MethodContract> {
        self.contract.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_from_empty_header_list() {
        let contract = MethodContract::from_header_list("cpf", "/datalake/cpf", "");
        assert!(contract.mandatory_headers.is_empty());
        assert!(!contract.requires_schema());
    }

    #[test]
    fn test_contract_keeps_header_order() {
        let contract =
            MethodContract::from_header_list("cpf", "/datalake/cpf", "field1,field2,field3");
        assert_eq!(contract.mandatory_headers, vec!["field1", "field2", "field3"]);
        assert_eq!(contract.expected_headers(), "field1,field2,field3");
    }

    #[test]
    fn test_rejected_result_has_single_entry() {
        let result = ValidationResult::rejected("abc".to_string(), FieldError::not_gzip());
        assert_eq!(result.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.failed_field(), Some("filename"));
        assert!(!result.is_accepted());
        assert_eq!(result.md5(), "abc");
        assert!(result.contract().is_none());
    }

    #[test]
    fn test_accepted_result() {
        let contract = MethodContract::from_header_list("cpf", "/datalake/cpf", "");
        let result = ValidationResult::accepted("abc".to_string(), Some(contract.clone()));
        assert_eq!(result.status(), StatusCode::CREATED);
        assert!(result.is_accepted());
        assert!(result.failed_field().is_none());
        assert_eq!(result.contract(), Some(&contract));
    }

    #[test]
    fn test_credentials_completeness() {
        assert!(!Credentials::default().is_complete());
        assert!(!Credentials::new(Some("anyname".into()), None).is_complete());
        assert!(Credentials::new(Some("anyname".into()), Some("key".into())).is_complete());
    }
}

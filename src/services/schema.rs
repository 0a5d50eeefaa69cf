use crate::models::MethodContract;
use crate::services::checksum::{blocking_read, with_rewind};
use crate::services::secret_store::SecretStore;
use anyhow::Result;
use flate2::read::GzDecoder;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOutcome {
    Valid,
    /// The header row differs from the contract.
    Mismatch {
        /// Comma separated, as the contract lists them
        expected: String,
        found: Vec<String>,
    },
    /// The upload could not be decompressed or parsed as CSV.
    Malformed(String),
}

impl SchemaOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaOutcome::Valid)
    }

    /// Client facing explanation, `None` when valid.
    pub fn detail(&self) -> Option<String> {
        match self {
            SchemaOutcome::Valid => None,
            SchemaOutcome::Mismatch { expected, .. } => Some(format!(
                "File must contain the following headers: {}",
                expected
            )),
            SchemaOutcome::Malformed(reason) => Some(format!(
                "File is not a valid gzip CSV archive: {}",
                reason
            )),
        }
    }
}

/// Validates the CSV header row of gzip uploads against the caller's method contract.
#[derive(Clone)]
pub struct SchemaValidator {
    store: Arc<dyn SecretStore>,
}

impl SchemaValidator {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Methods without a contract are accepted as is.
    pub async fn validate_schema<R: Read + Seek + Send + ?Sized>(
        &self,
        username: &str,
        method: &str,
        file: &mut R,
    ) -> Result<SchemaOutcome> {
        let contract = self.contract_for(username, method).await?;
        Ok(validate_against(contract.as_ref(), file)?)
    }

    pub async fn contract_for(
        &self,
        username: &str,
        method: &str,
    ) -> Result<Option<MethodContract>> {
        let contract = self.store.find_method_contract(username, method).await?;
        if contract.is_none() {
            tracing::debug!(
                "No contract for {}/{}, skipping schema check",
                username,
                method
            );
        }
        Ok(contract)
    }
}

/// Header check against an already resolved contract. No contract means valid.
///
/// Decompression runs through `blocking_read` so large uploads do not hold up
/// other requests.
pub fn validate_against<R: Read + Seek + ?Sized>(
    contract: Option<&MethodContract>,
    file: &mut R,
) -> io::Result<SchemaOutcome> {
    match contract {
        Some(contract) => blocking_read(|| check_header(contract, file)),
        None => Ok(SchemaOutcome::Valid),
    }
}

/// Compares the first CSV record of a gzip stream with the contract's headers.
///
/// The file is not touched when the contract has no mandatory headers.
/// Otherwise it is rewound to offset 0 whatever the outcome.
pub fn check_header<R: Read + Seek + ?Sized>(
    contract: &MethodContract,
    file: &mut R,
) -> io::Result<SchemaOutcome> {
    if !contract.requires_schema() {
        return Ok(SchemaOutcome::Valid);
    }

    with_rewind(file, |file| {
        file.seek(SeekFrom::Start(0))?;

        let outcome = match read_header_row(&mut *file) {
            Ok(found) if found == contract.mandatory_headers => SchemaOutcome::Valid,
            Ok(found) => SchemaOutcome::Mismatch {
                expected: contract.expected_headers(),
                found,
            },
            Err(e) => SchemaOutcome::Malformed(e.to_string()),
        };

        Ok(outcome)
    })
}

fn read_header_row<R: Read>(reader: R) -> Result<Vec<String>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(GzDecoder::new(reader));

    let mut record = csv::StringRecord::new();
    if !csv_reader.read_record(&mut record)? {
        return Ok(Vec::new());
    }

    Ok(record.iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::secret_store::InMemorySecretStore;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn contract(headers: &str) -> MethodContract {
        MethodContract::from_header_list("cpf", "/path/to/storage/cpf", headers)
    }

    #[test]
    fn test_validate_file_header() {
        let mut file = Cursor::new(gzip(b"field1,field2,field3\n1,2,3\n4,5,6\n"));
        let outcome = check_header(&contract("field1,field2,field3"), &mut file).unwrap();
        assert_eq!(outcome, SchemaOutcome::Valid);
        assert_eq!(file.position(), 0);
    }

    #[test]
    fn test_header_with_crlf_line_endings() {
        let mut file = Cursor::new(gzip(b"field1,field2,field3\r\n1,2,3\r\n"));
        let outcome = check_header(&contract("field1,field2,field3"), &mut file).unwrap();
        assert!(outcome.is_valid());
    }

    #[test]
    fn test_header_mismatch_lists_expected_headers() {
        let expected = contract("field1,field2,field3");
        let headers: [&[u8]; 4] = [
            b"field2,field1,field3\n",
            b"field1,field2\n",
            b"field1,field2,field3,field4\n",
            b"Field1,field2,field3\n",
        ];
        for header in headers {
            let mut file = Cursor::new(gzip(header));
            let outcome = check_header(&expected, &mut file).unwrap();
            assert!(!outcome.is_valid());
            assert_eq!(
                outcome.detail().unwrap(),
                "File must contain the following headers: field1,field2,field3"
            );
            assert_eq!(file.position(), 0);
        }
    }

    #[test]
    fn test_mismatch_reports_what_was_found() {
        let mut file = Cursor::new(gzip(b"b,a\n"));
        let outcome = check_header(&contract("a,b"), &mut file).unwrap();
        assert_eq!(
            outcome,
            SchemaOutcome::Mismatch {
                expected: "a,b".to_string(),
                found: vec!["b".to_string(), "a".to_string()],
            }
        );
    }

    #[test]
    fn test_validate_against_without_contract() {
        let mut file = Cursor::new(b"garbage".to_vec());
        assert!(validate_against(None, &mut file).unwrap().is_valid());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_against_on_multi_thread_runtime() {
        let expected = contract("field1,field2");
        let mut file = Cursor::new(gzip(b"field1,field2\n1,2\n"));
        assert!(validate_against(Some(&expected), &mut file).unwrap().is_valid());
        assert_eq!(file.position(), 0);
    }

    #[test]
    fn test_empty_contract_skips_decompression() {
        let mut file = Cursor::new(b"definitely not gzip".to_vec());
        file.set_position(5);
        let outcome = check_header(&contract(""), &mut file).unwrap();
        assert_eq!(outcome, SchemaOutcome::Valid);
        // Untouched, not even rewound
        assert_eq!(file.position(), 5);
    }

    #[test]
    fn test_malformed_archive_is_a_failure_not_a_crash() {
        let mut file = Cursor::new(b"field1,field2,field3\n".to_vec());
        let outcome = check_header(&contract("field1,field2,field3"), &mut file).unwrap();
        assert!(matches!(outcome, SchemaOutcome::Malformed(_)));
        assert!(
            outcome
                .detail()
                .unwrap()
                .starts_with("File is not a valid gzip CSV archive")
        );
        assert_eq!(file.position(), 0);
    }

    #[test]
    fn test_header_is_read_from_start_of_stream() {
        let mut file = Cursor::new(gzip(b"field1,field2,field3\n"));
        file.set_position(10);
        let outcome = check_header(&contract("field1,field2,field3"), &mut file).unwrap();
        assert!(outcome.is_valid());
    }

    #[tokio::test]
    async fn test_validator_without_contract_is_permissive() {
        let validator = SchemaValidator::new(Arc::new(InMemorySecretStore::new()));
        let mut file = Cursor::new(b"garbage".to_vec());
        let outcome = validator
            .validate_schema("anyname", "cpf", &mut file)
            .await
            .unwrap();
        assert!(outcome.is_valid());
    }

    #[tokio::test]
    async fn test_validator_uses_user_contract() {
        let store = InMemorySecretStore::new().with_contract("anyname", contract("a,b"));
        let validator = SchemaValidator::new(Arc::new(store));

        let mut good = Cursor::new(gzip(b"a,b\n"));
        assert!(
            validator
                .validate_schema("anyname", "cpf", &mut good)
                .await
                .unwrap()
                .is_valid()
        );

        let mut bad = Cursor::new(gzip(b"b,a\n"));
        assert!(
            !validator
                .validate_schema("anyname", "cpf", &mut bad)
                .await
                .unwrap()
                .is_valid()
        );
    }
}

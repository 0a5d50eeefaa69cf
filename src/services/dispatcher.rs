use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::io::Read;

/// Where an accepted upload is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub uri: String,
    pub filename: String,
}

impl DispatchTarget {
    pub fn new(uri: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            filename: filename.into(),
        }
    }

    /// Object key: `<uri>/<filename>` without a leading slash
    pub fn object_key(&self) -> String {
        let prefix = self.uri.trim_matches('/');
        if prefix.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", prefix, self.filename)
        }
    }
}

/// Forwards validated uploads to long-term storage.
#[async_trait]
pub trait StorageDispatcher: Send + Sync {
    /// `content` is positioned at offset 0.
    async fn dispatch(&self, target: &DispatchTarget, content: Box<dyn Read + Send>) -> Result<()>;

    /// Check if the destination is reachable
    async fn health_check(&self) -> bool;
}

/// Size of each multipart part. Uploads smaller than one part go up in a single request.
pub const PART_SIZE: usize = 10 * 1024 * 1024;

/// Reads up to `part_size` bytes, retrying short reads until the part is full or the
/// reader is exhausted.
fn read_part<R: Read + ?Sized>(reader: &mut R, part_size: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; part_size];
    let mut n = 0;
    while n < part_size {
        match reader.read(&mut buffer[n..]) {
            Ok(0) => break,
            Ok(read) => n += read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buffer.truncate(n);
    Ok(buffer)
}

/// Pulls fixed-size parts out of a blocking reader, one `spawn_blocking` read per part,
/// so at most one part of an upload is held in memory.
pub struct PartReader {
    content: Option<Box<dyn Read + Send>>,
    part_size: usize,
}

impl PartReader {
    pub fn new(content: Box<dyn Read + Send>, part_size: usize) -> Self {
        Self {
            content: Some(content),
            part_size: part_size.max(1),
        }
    }

    /// Next part of at most `part_size` bytes; empty once the content is exhausted.
    pub async fn next_part(&mut self) -> Result<Vec<u8>> {
        let Some(mut content) = self.content.take() else {
            return Ok(Vec::new());
        };

        let part_size = self.part_size;
        let (content, part) = tokio::task::spawn_blocking(move || {
            let part = read_part(&mut content, part_size);
            (content, part)
        })
        .await
        .context("upload reader task failed")?;
        let part = part?;

        // A short part means the reader hit EOF
        if part.len() == part_size {
            self.content = Some(content);
        }
        Ok(part)
    }
}

pub struct S3Dispatcher {
    client: Client,
    bucket: String,
}

impl S3Dispatcher {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn put_single(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to store {} in bucket {}", key, self.bucket))?;
        Ok(())
    }

    /// Uploads `first` and every remaining part, then completes the upload.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        parts: &mut PartReader,
    ) -> Result<usize> {
        let mut completed_parts = Vec::new();
        let mut part_number = 1;
        let mut total_size = 0;
        let mut part = first;

        while !part.is_empty() {
            total_size += part.len();
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .with_context(|| format!("Failed to upload part {} of {}", part_number, key))?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            part_number += 1;
            part = parts.next_part().await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .with_context(|| format!("Failed to complete multipart upload of {}", key))?;

        Ok(total_size)
    }
}

#[async_trait]
impl StorageDispatcher for S3Dispatcher {
    async fn dispatch(&self, target: &DispatchTarget, content: Box<dyn Read + Send>) -> Result<()> {
        let key = target.object_key();
        let mut parts = PartReader::new(content, PART_SIZE);

        let first = parts.next_part().await?;
        if first.len() < PART_SIZE {
            let size = first.len();
            self.put_single(&key, first).await?;
            tracing::info!("☁️  Stored {} ({} bytes) in {}", key, size, self.bucket);
            return Ok(());
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/gzip")
            .send()
            .await
            .with_context(|| format!("Failed to start multipart upload of {}", key))?;
        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID for {}", key))?
            .to_string();

        match self.upload_parts(&key, &upload_id, first, &mut parts).await {
            Ok(size) => {
                tracing::info!(
                    "☁️  Stored {} ({} bytes, multipart) in {}",
                    key,
                    size,
                    self.bucket
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort multipart upload {} of {}: {}",
                        upload_id,
                        key,
                        abort_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

/// Dispatcher that drops uploads (for development)
pub struct NoOpDispatcher;

#[async_trait]
impl StorageDispatcher for NoOpDispatcher {
    async fn dispatch(
        &self,
        target: &DispatchTarget,
        mut content: Box<dyn Read + Send>,
    ) -> Result<()> {
        let size = tokio::task::spawn_blocking(move || std::io::copy(&mut content, &mut std::io::sink()))
            .await
            .context("upload reader task failed")??;

        tracing::warn!(
            "NoOpDispatcher: Discarding {} ({} bytes, development mode)",
            target.object_key(),
            size
        );
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_strips_slashes() {
        let target = DispatchTarget::new("/user/datalake/staging/cpf/", "cpf.csv.gz");
        assert_eq!(target.object_key(), "user/datalake/staging/cpf/cpf.csv.gz");
    }

    #[test]
    fn test_object_key_without_prefix() {
        let target = DispatchTarget::new("", "cpf.csv.gz");
        assert_eq!(target.object_key(), "cpf.csv.gz");
    }

    /// Hands out at most `step` bytes per read, like a socket or pipe would.
    struct Trickle {
        data: std::io::Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    fn trickle(len: usize, step: usize) -> Box<dyn Read + Send> {
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        Box::new(Trickle {
            data: std::io::Cursor::new(data),
            step,
        })
    }

    #[test]
    fn test_read_part_fills_across_short_reads() {
        let mut reader = trickle(25, 3);
        assert_eq!(read_part(&mut reader, 10).unwrap().len(), 10);
        assert_eq!(read_part(&mut reader, 10).unwrap().len(), 10);
        assert_eq!(read_part(&mut reader, 10).unwrap().len(), 5);
        assert!(read_part(&mut reader, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_part_reader_splits_into_bounded_parts() {
        let mut parts = PartReader::new(trickle(25, 4), 10);
        let mut sizes = Vec::new();
        let mut joined = Vec::new();
        loop {
            let part = parts.next_part().await.unwrap();
            if part.is_empty() {
                break;
            }
            assert!(part.len() <= 10);
            sizes.push(part.len());
            joined.extend_from_slice(&part);
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        let expected: Vec<u8> = (0..25).map(|i| (i % 251) as u8).collect();
        assert_eq!(joined, expected);
    }

    #[tokio::test]
    async fn test_part_reader_exact_multiple_ends_with_empty_part() {
        let mut parts = PartReader::new(trickle(20, 20), 10);
        assert_eq!(parts.next_part().await.unwrap().len(), 10);
        assert_eq!(parts.next_part().await.unwrap().len(), 10);
        assert!(parts.next_part().await.unwrap().is_empty());
        assert!(parts.next_part().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_part_reader_small_upload_is_a_single_short_part() {
        let mut parts = PartReader::new(trickle(7, 2), PART_SIZE);
        let first = parts.next_part().await.unwrap();
        assert_eq!(first.len(), 7);
        assert!(first.len() < PART_SIZE);
        assert!(parts.next_part().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_dispatcher() {
        let dispatcher = NoOpDispatcher;
        let target = DispatchTarget::new("uploads/cpf", "file.gz");
        let content = Box::new(std::io::Cursor::new(b"test content".to_vec()));
        dispatcher.dispatch(&target, content).await.unwrap();
        assert!(dispatcher.health_check().await);
    }
}

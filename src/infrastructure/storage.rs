use crate::config::IntakeConfig;
use crate::services::dispatcher::{NoOpDispatcher, S3Dispatcher, StorageDispatcher};
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

pub async fn setup_dispatcher(config: &IntakeConfig) -> anyhow::Result<Arc<dyn StorageDispatcher>> {
    match config.dispatcher_type.to_lowercase().as_str() {
        "s3" => Ok(Arc::new(setup_s3().await?)),
        "noop" | "none" | "disabled" => {
            tracing::warn!("⚠️  Storage dispatch disabled, accepted uploads will be discarded");
            Ok(Arc::new(NoOpDispatcher))
        }
        other => {
            tracing::warn!("Unknown dispatcher type '{}', using NoOpDispatcher", other);
            Ok(Arc::new(NoOpDispatcher))
        }
    }
}

async fn setup_s3() -> anyhow::Result<S3Dispatcher> {
    let endpoint_url = required_env("S3_ENDPOINT")?;
    let access_key = required_env("S3_ACCESS_KEY")?;
    let secret_key = required_env("S3_SECRET_KEY")?;
    let bucket = required_env("S3_BUCKET")?;

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Ok(S3Dispatcher::new(s3_client, bucket))
}

fn required_env(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))
}

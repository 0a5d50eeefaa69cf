use std::env;

/// Runtime configuration for the upload intake endpoint
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Maximum upload size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Read size used while hashing an upload in bytes (default: 64 KB)
    pub chunk_size: usize,

    /// Uploads up to this size stay in memory before spilling to a temp file (default: 8 MB)
    pub spool_threshold: usize,

    /// Compare claimed and computed checksums byte for byte (default: false)
    pub checksum_case_sensitive: bool,

    /// Storage dispatcher type: "s3" or "noop" (default: "s3")
    pub dispatcher_type: String,

    /// Storage prefix for methods without a mapping (default: "uploads")
    pub default_storage_prefix: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: 256 * 1024 * 1024, // 256 MB
            chunk_size: 64 * 1024,            // 64 KB
            spool_threshold: 8 * 1024 * 1024, // 8 MB
            checksum_case_sensitive: false,
            dispatcher_type: "s3".to_string(),
            default_storage_prefix: "uploads".to_string(),
        }
    }
}

impl IntakeConfig {
    /// Load configuration from environment variables.
    ///
    /// `APP_ENV` picks the preset that unset variables fall back to.
    pub fn from_env() -> Self {
        let default = Self::preset(env::var("APP_ENV").ok().as_deref());

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.chunk_size),

            spool_threshold: env::var("SPOOL_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.spool_threshold),

            checksum_case_sensitive: env::var("CHECKSUM_CASE_SENSITIVE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.checksum_case_sensitive),

            dispatcher_type: env::var("DISPATCHER_TYPE").unwrap_or(default.dispatcher_type),

            default_storage_prefix: env::var("DEFAULT_STORAGE_PREFIX")
                .unwrap_or(default.default_storage_prefix),
        }
    }

    /// Preset for an `APP_ENV` value; unknown or missing names get `Default`.
    pub fn preset(app_env: Option<&str>) -> Self {
        match app_env.map(str::to_ascii_lowercase).as_deref() {
            Some("development" | "dev") => Self::development(),
            Some("production" | "prod") => Self::production(),
            _ => Self::default(),
        }
    }

    /// Create config for development (no remote storage, small spool)
    pub fn development() -> Self {
        Self {
            max_file_size: 64 * 1024 * 1024,
            chunk_size: 64 * 1024,
            spool_threshold: 1024 * 1024,
            checksum_case_sensitive: false,
            dispatcher_type: "noop".to_string(),
            default_storage_prefix: "dev/uploads".to_string(),
        }
    }

    /// Create config for production
    pub fn production() -> Self {
        Self {
            max_file_size: 256 * 1024 * 1024,
            chunk_size: 1024 * 1024,
            spool_threshold: 8 * 1024 * 1024,
            checksum_case_sensitive: false,
            dispatcher_type: "s3".to_string(),
            default_storage_prefix: "uploads".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IntakeConfig::default();
        assert_eq!(config.max_file_size, 256 * 1024 * 1024);
        assert_eq!(config.chunk_size, 64 * 1024);
        assert!(!config.checksum_case_sensitive);
        assert_eq!(config.dispatcher_type, "s3");
        assert_eq!(config.default_storage_prefix, "uploads");
    }

    #[test]
    fn test_development_config() {
        let config = IntakeConfig::development();
        assert_eq!(config.dispatcher_type, "noop");
        assert!(config.spool_threshold < IntakeConfig::default().spool_threshold);
    }

    #[test]
    fn test_production_config() {
        let config = IntakeConfig::production();
        assert_eq!(config.dispatcher_type, "s3");
        assert!(!config.checksum_case_sensitive);
        assert_eq!(config.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_preset_selection() {
        assert_eq!(IntakeConfig::preset(Some("development")).dispatcher_type, "noop");
        assert_eq!(IntakeConfig::preset(Some("PROD")).chunk_size, 1024 * 1024);
        assert_eq!(IntakeConfig::preset(Some("staging")).chunk_size, 64 * 1024);
        assert_eq!(IntakeConfig::preset(None).default_storage_prefix, "uploads");
    }
}

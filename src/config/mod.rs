use std::env;
use std::path::PathBuf;

/// Runtime configuration of the media backend.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// First path segment of the media route (default: "media")
    pub media_prefix: String,

    /// Bytes of each ingested stream retained for random-access inspection
    /// by the identification tools (default: 2048)
    pub head_buffer_size: usize,

    /// Directory for digest-tap staging files (default: system temp dir)
    pub temp_dir: PathBuf,

    /// URL template of the signature-database identifier; `[[PATH]]` is
    /// replaced with the escaped sample path. Sniffing-only when unset.
    pub signature_identifier_url: Option<String>,

    /// Image-metadata tool executable (default: "magick")
    pub identify_path: String,

    /// Video prober executable (default: "ffprobe")
    pub ffprobe_path: String,

    /// Bound on external tool and identifier calls in seconds (default: 30)
    pub tool_timeout_secs: u64,

    /// Lifetime of pre-signed URLs handed to external tools in seconds
    /// (default: 3600)
    pub presign_expiry_secs: u64,

    /// Name under which the S3 backend registers, as `s3://{name}`
    /// (default: "minio")
    pub s3_backend_name: String,

    /// Name under which the local backend registers, as `local://{name}`
    /// (default: "media")
    pub local_backend_name: String,

    /// Base directory of the local filesystem backend; backend disabled
    /// when unset.
    pub local_basedir: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_prefix: "media".to_string(),
            head_buffer_size: 2048,
            temp_dir: env::temp_dir(),
            signature_identifier_url: None,
            identify_path: "magick".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            tool_timeout_secs: 30,
            presign_expiry_secs: 3600,
            s3_backend_name: "minio".to_string(),
            local_backend_name: "media".to_string(),
            local_basedir: None,
        }
    }
}

impl MediaConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            media_prefix: env::var("MEDIA_PREFIX").unwrap_or(default.media_prefix),

            head_buffer_size: env::var("HEAD_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.head_buffer_size),

            temp_dir: env::var("MEDIA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            signature_identifier_url: env::var("SIGNATURE_IDENTIFIER_URL").ok(),

            identify_path: env::var("IDENTIFY_PATH").unwrap_or(default.identify_path),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            tool_timeout_secs: env::var("TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tool_timeout_secs),

            presign_expiry_secs: env::var("PRESIGN_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_expiry_secs),

            s3_backend_name: env::var("S3_BACKEND_NAME").unwrap_or(default.s3_backend_name),

            local_backend_name: env::var("LOCAL_BACKEND_NAME")
                .unwrap_or(default.local_backend_name),

            local_basedir: env::var("LOCAL_BASEDIR").ok().map(PathBuf::from),
        }
    }

    /// Config for development and tests: local backend only, short tool
    /// timeout.
    pub fn development(local_basedir: impl Into<PathBuf>) -> Self {
        Self {
            tool_timeout_secs: 5,
            local_basedir: Some(local_basedir.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MediaConfig::default();
        assert_eq!(config.media_prefix, "media");
        assert_eq!(config.head_buffer_size, 2048);
        assert_eq!(config.tool_timeout_secs, 30);
        assert!(config.signature_identifier_url.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = MediaConfig::development("/tmp/media");
        assert_eq!(config.local_basedir, Some(PathBuf::from("/tmp/media")));
        assert_eq!(config.tool_timeout_secs, 5);
    }
}

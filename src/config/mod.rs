use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the chunked upload endpoint
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base temporary directory for partial uploads (default: "./runtime/plupload")
    pub tmp_dir: PathBuf,

    /// Vary the temporary directory by the client's session key (default: true)
    pub vary_by_session: bool,

    /// Seconds after which a temp file is treated as garbage (default: 1440)
    pub tmp_file_lifetime_secs: u64,

    /// Maximum execution time for a single upload request in seconds (default: 300)
    pub max_execution_secs: u64,

    /// Suffix marking entries eligible for garbage collection (default: ".tmp")
    pub tmp_suffix: String,

    /// Maximum directory entries inspected per garbage collection run (default: 10000)
    pub gc_scan_limit: usize,

    /// Cookie carrying the session key (default: "session_id")
    pub session_cookie: String,

    /// Maximum request body size in bytes (default: 1 GB)
    pub max_body_size: usize,

    /// Directory holding persisted uploads (default: "./storage")
    pub storage_dir: PathBuf,

    /// SQLite connection string for the file record store
    pub database_url: String,

    /// Base URL for download links handed back on completion
    pub base_download_url: String,

    /// Base URL for delete links handed back on completion
    pub base_delete_url: String,

    /// Background sweep interval in seconds (default: 3600)
    pub sweep_interval_secs: u64,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tmp_dir: PathBuf::from("./runtime/plupload"),
            vary_by_session: true,
            tmp_file_lifetime_secs: 1440,
            max_execution_secs: 5 * 60,
            tmp_suffix: ".tmp".to_string(),
            gc_scan_limit: 10_000,
            session_cookie: "session_id".to_string(),
            max_body_size: 1024 * 1024 * 1024, // 1 GB
            storage_dir: PathBuf::from("./storage"),
            database_url: "sqlite://uploads.db?mode=rwc".to_string(),
            base_download_url: "/files".to_string(),
            base_delete_url: "/files".to_string(),
            sweep_interval_secs: 3600,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            tmp_dir: env::var("UPLOAD_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.tmp_dir),

            vary_by_session: env::var("UPLOAD_VARY_BY_SESSION")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.vary_by_session),

            tmp_file_lifetime_secs: env::var("UPLOAD_TMP_FILE_LIFETIME_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tmp_file_lifetime_secs),

            max_execution_secs: env::var("UPLOAD_MAX_EXECUTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_execution_secs),

            tmp_suffix: env::var("UPLOAD_TMP_SUFFIX").unwrap_or(default.tmp_suffix),

            gc_scan_limit: env::var("UPLOAD_GC_SCAN_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.gc_scan_limit),

            session_cookie: env::var("UPLOAD_SESSION_COOKIE").unwrap_or(default.session_cookie),

            max_body_size: env::var("MAX_UPLOAD_BODY_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_body_size),

            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            base_download_url: env::var("BASE_DOWNLOAD_URL").unwrap_or(default.base_download_url),

            base_delete_url: env::var("BASE_DELETE_URL").unwrap_or(default.base_delete_url),

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sweep_interval_secs),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (shared temp directory, short sweeps)
    pub fn development() -> Self {
        Self {
            vary_by_session: false,
            sweep_interval_secs: 60,
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn tmp_file_lifetime(&self) -> Duration {
        Duration::from_secs(self.tmp_file_lifetime_secs)
    }

    pub fn max_execution_time(&self) -> Duration {
        Duration::from_secs(self.max_execution_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Import Pipeline Constants
// ============================================================================

/// Maximum number of objects accepted in a single chunk.
pub const DEFAULT_MAX_OBJECTS_PER_CHUNK: usize = 10_000;

/// Maximum serialized size of a single chunk in bytes (8 MiB).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Number of objects sent to the backend in one batch request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Maximum number of batch requests in flight per job.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

/// Delay between successive batch starts, in milliseconds.
pub const DEFAULT_BATCH_START_DELAY_MS: u64 = 100;

/// TTL applied to job, chunk, and failure keys (24 hours).
pub const DEFAULT_STATE_TTL_SECS: u64 = 24 * 60 * 60;

/// Age past which the retention sweep deletes job state (24 hours).
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// Backend Transport Constants
// ============================================================================

/// Default downstream aggregate-import endpoint.
pub const DEFAULT_BACKEND_URL: &str = "https://localhost:9443/aggregate/import";

/// Deadline for a single batch request in seconds.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Rate Limit Constants
// ============================================================================

/// Chunk submissions allowed per owner per window.
pub const DEFAULT_RATE_LIMIT_MAX_CHUNKS: u32 = 120;

/// Rate-limit window length in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub import: ImportConfig,
    pub backend: BackendConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Import pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Object-count ceiling per submitted chunk
    pub max_objects_per_chunk: usize,
    /// Serialized-size ceiling per submitted chunk
    pub max_chunk_bytes: usize,
    /// Batch size for backend requests; independent of chunk size
    pub batch_size: usize,
    /// Bounded fan-out of concurrent batch requests
    pub max_in_flight: usize,
    /// Delay between successive batch starts
    pub batch_start_delay_ms: u64,
    /// TTL for job/chunk/failure keys
    pub state_ttl_secs: u64,
    /// Retention age used by the cleanup sweep
    pub retention_secs: u64,
}

/// Downstream aggregate-import API transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Full URL of the aggregate-import endpoint
    pub import_url: String,
    /// Per-request deadline
    pub timeout_secs: u64,
    /// PEM client certificate for mutual TLS
    pub client_cert_path: Option<PathBuf>,
    /// PEM private key for mutual TLS
    pub client_key_path: Option<PathBuf>,
}

/// Per-owner chunk submission rate limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_chunks: u32,
    pub window_secs: u64,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env_or("RELAY_HOST", DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("RELAY_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "RELAY_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: env_or(
                    "CORS_ALLOWED_ORIGINS",
                    DEFAULT_CORS_ALLOWED_ORIGIN.to_string(),
                )
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
            import: ImportConfig {
                max_objects_per_chunk: env_parse(
                    "IMPORT_MAX_OBJECTS_PER_CHUNK",
                    DEFAULT_MAX_OBJECTS_PER_CHUNK,
                ),
                max_chunk_bytes: env_parse("IMPORT_MAX_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES),
                batch_size: env_parse("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                max_in_flight: env_parse("IMPORT_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
                batch_start_delay_ms: env_parse(
                    "IMPORT_BATCH_START_DELAY_MS",
                    DEFAULT_BATCH_START_DELAY_MS,
                ),
                state_ttl_secs: env_parse("IMPORT_STATE_TTL_SECS", DEFAULT_STATE_TTL_SECS),
                retention_secs: env_parse("IMPORT_RETENTION_SECS", DEFAULT_RETENTION_SECS),
            },
            backend: BackendConfig {
                import_url: env_or("BACKEND_IMPORT_URL", DEFAULT_BACKEND_URL.to_string()),
                timeout_secs: env_parse("BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS),
                client_cert_path: std::env::var("BACKEND_CLIENT_CERT").ok().map(PathBuf::from),
                client_key_path: std::env::var("BACKEND_CLIENT_KEY").ok().map(PathBuf::from),
            },
            rate_limit: RateLimitConfig {
                max_chunks: env_parse("RATE_LIMIT_MAX_CHUNKS", DEFAULT_RATE_LIMIT_MAX_CHUNKS),
                window_secs: env_parse(
                    "RATE_LIMIT_WINDOW_SECS",
                    DEFAULT_RATE_LIMIT_WINDOW_SECS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.import.batch_size == 0 {
            anyhow::bail!("Import batch_size must be greater than 0");
        }

        if self.import.max_in_flight == 0 {
            anyhow::bail!("Import max_in_flight must be greater than 0");
        }

        if self.import.max_objects_per_chunk == 0 {
            anyhow::bail!("Import max_objects_per_chunk must be greater than 0");
        }

        if self.backend.import_url.is_empty() {
            anyhow::bail!("Backend import URL cannot be empty");
        }

        if self.backend.client_cert_path.is_some() != self.backend.client_key_path.is_some() {
            anyhow::bail!(
                "Backend client certificate and key must be configured together"
            );
        }

        if self.rate_limit.max_chunks == 0 || self.rate_limit.window_secs == 0 {
            anyhow::bail!("Rate limit max_chunks and window_secs must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            import: ImportConfig::default(),
            backend: BackendConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_objects_per_chunk: DEFAULT_MAX_OBJECTS_PER_CHUNK,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            batch_start_delay_ms: DEFAULT_BATCH_START_DELAY_MS,
            state_ttl_secs: DEFAULT_STATE_TTL_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            import_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_RATE_LIMIT_MAX_CHUNKS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

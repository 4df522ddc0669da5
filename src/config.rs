use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LLM_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MAP_MODEL: &str = "sonar";
const DEFAULT_REDUCE_MODEL: &str = "sonar-pro";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CHUNK_SIZE: usize = 3000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_SHORT_DOCUMENT_THRESHOLD: usize = 3000;
const DEFAULT_MAP_CONCURRENCY: usize = 5;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the study guide server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the OpenAI-compatible chat-completions service.
    pub llm_base_url: String,
    /// Optional bearer token sent with every chat-completion request.
    pub llm_api_key: Option<String>,
    /// Lightweight model used for per-chunk extraction.
    pub map_model: String,
    /// Stronger model used to compose the final document.
    pub reduce_model: String,
    /// Model used by the chat passthrough endpoint.
    pub chat_model: String,
    /// Upper bound on a single remote call, in seconds.
    pub llm_timeout_secs: u64,
    /// Target chunk size in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Documents shorter than this many characters skip the map phase.
    pub short_document_threshold: usize,
    /// Maximum number of concurrent map-phase calls.
    pub map_concurrency: usize,
    /// Directory holding uploaded documents.
    pub upload_dir: PathBuf,
    /// Maximum accepted request body size for uploads.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Tunables consumed by the pipeline orchestrator.
///
/// Kept separate from [`Config`] so the pipeline never reaches for the global configuration and
/// tests can build one directly.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model used for the map phase.
    pub map_model: String,
    /// Model used for the reduce phase.
    pub reduce_model: String,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Character count below which the short-document path is taken.
    pub short_document_threshold: usize,
    /// Bounded worker count for the map phase.
    pub map_concurrency: usize,
    /// Timeout applied to every remote call.
    pub call_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            map_model: DEFAULT_MAP_MODEL.into(),
            reduce_model: DEFAULT_REDUCE_MODEL.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            short_document_threshold: DEFAULT_SHORT_DOCUMENT_THRESHOLD,
            map_concurrency: DEFAULT_MAP_CONCURRENCY,
            call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let reduce_model =
            optional("LLM_REDUCE_MODEL").unwrap_or_else(|| DEFAULT_REDUCE_MODEL.to_string());
        let config = Self {
            llm_base_url: optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key: optional("LLM_API_KEY"),
            map_model: optional("LLM_MAP_MODEL").unwrap_or_else(|| DEFAULT_MAP_MODEL.to_string()),
            chat_model: optional("LLM_CHAT_MODEL").unwrap_or_else(|| reduce_model.clone()),
            reduce_model,
            llm_timeout_secs: parse_or("LLM_TIMEOUT_SECS", optional("LLM_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS)?,
            text_splitter_chunk_size: parse_or(
                "TEXT_SPLITTER_CHUNK_SIZE",
                optional("TEXT_SPLITTER_CHUNK_SIZE"),
                DEFAULT_CHUNK_SIZE,
            )?,
            text_splitter_chunk_overlap: parse_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                optional("TEXT_SPLITTER_CHUNK_OVERLAP"),
                DEFAULT_CHUNK_OVERLAP,
            )?,
            short_document_threshold: parse_or(
                "SHORT_DOCUMENT_THRESHOLD",
                optional("SHORT_DOCUMENT_THRESHOLD"),
                DEFAULT_SHORT_DOCUMENT_THRESHOLD,
            )?,
            map_concurrency: parse_or(
                "MAP_CONCURRENCY",
                optional("MAP_CONCURRENCY"),
                DEFAULT_MAP_CONCURRENCY,
            )?,
            upload_dir: optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                optional("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            server_port: optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };

        if config.text_splitter_chunk_size <= config.text_splitter_chunk_overlap {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE must exceed TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }
        if config.map_concurrency == 0 {
            return Err(ConfigError::InvalidValue("MAP_CONCURRENCY".into()));
        }
        if config.llm_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("LLM_TIMEOUT_SECS".into()));
        }

        Ok(config)
    }

    /// Derive the pipeline tunables from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            map_model: self.map_model.clone(),
            reduce_model: self.reduce_model.clone(),
            chunk_size: self.text_splitter_chunk_size,
            chunk_overlap: self.text_splitter_chunk_overlap,
            short_document_threshold: self.short_document_threshold,
            map_concurrency: self.map_concurrency,
            call_timeout: self.llm_timeout(),
        }
    }

    /// Per-call timeout as a [`Duration`].
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Call after [`crate::logging::init_tracing`] so the load report reaches a subscriber.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    report_loaded(&config);
    CONFIG.set(config).expect("Failed to set config");
}

fn report_loaded(config: &Config) {
    tracing::debug!(
        llm_base_url = %config.llm_base_url,
        map_model = %config.map_model,
        reduce_model = %config.reduce_model,
        chunk_size = config.text_splitter_chunk_size,
        overlap = config.text_splitter_chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    if config.llm_api_key.is_none() {
        tracing::warn!("LLM_API_KEY is not set; requests will be sent without authorization");
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnimusConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub embedding: EmbeddingConfig,
    pub session: SessionConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub facts_path: String,
}

/// Reasoning model endpoint. Any OpenAI-compatible `/chat/completions`
/// provider works; the model must honor JSON response mode.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// TTS/STT endpoint, also OpenAI-compatible. May point at a different
/// provider than the reasoning model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub stt_model: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of inactivity before the first unsolicited turn.
    pub base_idle_secs: u64,
    /// Ceiling for the adaptive idle threshold.
    pub max_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    /// External command that writes a JPEG screenshot to stdout.
    /// Unset disables vision capture entirely.
    pub capture_command: Option<String>,
}

impl Default for AnimusConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            speech: SpeechConfig::default(),
            embedding: EmbeddingConfig::default(),
            session: SessionConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_animus_dir();
        Self {
            db_path: dir.join("episodes.db").to_string_lossy().into_owned(),
            facts_path: dir.join("user_facts.json").to_string_lossy().into_owned(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 30,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            tts_model: "tts-1".into(),
            tts_voice: "nova".into(),
            stt_model: "whisper-1".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "text-embedding-3-small".into(),
            dimensions: 1024,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_idle_secs: 40,
            max_idle_secs: 3600,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            capture_command: None,
        }
    }
}

/// Returns `~/.animus/`
pub fn default_animus_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".animus")
}

/// Returns the default config file path: `~/.animus/config.toml`
pub fn default_config_path() -> PathBuf {
    default_animus_dir().join("config.toml")
}

impl AnimusConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AnimusConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. API keys are expected to come
    /// from the environment rather than the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ANIMUS_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_FACTS") {
            self.storage.facts_path = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_LLM_BASE_URL") {
            self.llm.base_url = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_LLM_API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_SPEECH_BASE_URL") {
            self.speech.base_url = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_SPEECH_API_KEY") {
            self.speech.api_key = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_EMBEDDING_BASE_URL") {
            self.embedding.base_url = val;
        }
        if let Ok(val) = std::env::var("ANIMUS_EMBEDDING_API_KEY") {
            self.embedding.api_key = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the fact table path, expanding `~` if needed.
    pub fn resolved_facts_path(&self) -> PathBuf {
        expand_tilde(&self.storage.facts_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

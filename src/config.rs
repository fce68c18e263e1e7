//! Configuration types for the chat pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Character identity and system prompt.
    pub character: CharacterConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Segmentation and speech queue settings.
    pub speech: SpeechConfig,
    /// Idle behaviour ("life") settings.
    pub life: LifeConfig,
}

/// Who the assistant is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Display name, also used as the speaker label in completion prompts.
    pub name: String,
    /// System prompt prepended to every chat request.
    pub system_prompt: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: "Amica".to_owned(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You will behave as a friendly human named Amica and engage in conversation with the user. \
There are six types of emotions: [neutral], [happy], [angry], [sad], [relaxed] and [surprised]. \
Start each sentence with the emotion that fits it in brackets, for example \"[happy] It is nice to see you!\". \
Keep replies short and conversational.";

/// Which language model backend to stream responses from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Echoes the last message back. Useful offline and in tests.
    #[default]
    Echo,
    /// OpenAI-compatible `/v1/chat/completions` with SSE streaming.
    #[serde(alias = "chatgpt")]
    OpenAi,
    /// Ollama `/api/generate` with newline-delimited JSON streaming.
    Ollama,
    /// llama.cpp server `/completion` with SSE streaming.
    #[serde(alias = "llama.cpp")]
    LlamaCpp,
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    /// Number of most recent chat log messages included in each request.
    pub history_limit: usize,

    pub openai_url: String,
    pub openai_model: String,
    /// Empty means "read `OPENAI_API_KEY` from the environment".
    pub openai_api_key: String,
    pub max_tokens: u32,

    pub ollama_url: String,
    pub ollama_model: String,

    pub llamacpp_url: String,
    pub llamacpp_n_predict: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            history_limit: 10,
            openai_url: "https://api.openai.com".to_owned(),
            openai_model: "gpt-3.5-turbo".to_owned(),
            openai_api_key: String::new(),
            max_tokens: 200,
            ollama_url: "http://localhost:11434".to_owned(),
            ollama_model: "llama2".to_owned(),
            llamacpp_url: "http://127.0.0.1:8080".to_owned(),
            llamacpp_n_predict: 400,
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    /// The OpenAI key from config, falling back to `OPENAI_API_KEY`.
    pub fn resolved_openai_key(&self) -> Option<String> {
        resolve_secret(&self.openai_api_key, "OPENAI_API_KEY")
    }
}

/// Which voice backend synthesizes speech.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    /// No speech; segments still drive expressions and the transcript.
    #[default]
    None,
    /// OpenAI-compatible `/v1/audio/speech`.
    OpenAi,
    /// ElevenLabs text-to-speech.
    ElevenLabs,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub backend: TtsBackend,

    pub openai_url: String,
    /// Empty means "read `OPENAI_API_KEY` from the environment".
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_voice: String,

    pub elevenlabs_url: String,
    /// Empty means "read `ELEVENLABS_API_KEY` from the environment".
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::default(),
            openai_url: "https://api.openai.com".to_owned(),
            openai_api_key: String::new(),
            openai_model: "tts-1".to_owned(),
            openai_voice: "nova".to_owned(),
            elevenlabs_url: "https://api.elevenlabs.io".to_owned(),
            elevenlabs_api_key: String::new(),
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_owned(),
            elevenlabs_model: "eleven_monolingual_v1".to_owned(),
        }
    }
}

impl TtsConfig {
    pub fn resolved_openai_key(&self) -> Option<String> {
        resolve_secret(&self.openai_api_key, "OPENAI_API_KEY")
    }

    pub fn resolved_elevenlabs_key(&self) -> Option<String> {
        resolve_secret(&self.elevenlabs_api_key, "ELEVENLABS_API_KEY")
    }
}

/// Segmentation and speech queue behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Maximum number of speech jobs waiting for playback before the
    /// stream loop is made to wait.
    pub queue_capacity: usize,
    /// Speak the unterminated tail of a response when the stream ends.
    ///
    /// Off by default: a reply without final punctuation loses its last
    /// fragment, matching the historical behaviour.
    pub flush_trailing_fragment: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            flush_trailing_fragment: false,
        }
    }
}

/// Idle behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeConfig {
    /// Start the idle producer together with the controller.
    pub enabled: bool,
    /// Seconds since the last activity after which the character counts as idle.
    pub time_before_idle_sec: u64,
    /// Seconds since the last activity after which the character falls asleep.
    pub time_to_sleep_sec: u64,
    /// Lower bound of the random wait between idle cycles.
    pub min_interval_sec: u64,
    /// Upper bound of the random wait between idle cycles.
    pub max_interval_sec: u64,
    /// Chance of doing nothing in a cycle, in `[0, 1]`.
    pub skip_probability: f64,
    /// Upper bound on the stored subconscious diary, in characters.
    pub subconscious_max_chars: usize,
    /// Prompts sent to the model on the character's own initiative.
    pub idle_text_prompts: Vec<String>,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_before_idle_sec: 20,
            time_to_sleep_sec: 90,
            min_interval_sec: 10,
            max_interval_sec: 20,
            skip_probability: 0.25,
            subconscious_max_chars: 3000,
            idle_text_prompts: vec![
                "Tell me a short, interesting fact you know.".to_owned(),
                "Share a random thought that is on your mind right now.".to_owned(),
                "Ask me a question about my day.".to_owned(),
                "Hum a little and say what song you are thinking of.".to_owned(),
            ],
        }
    }
}

fn resolve_secret(configured: &str, env_var: &str) -> Option<String> {
    let configured = configured.trim();
    if !configured.is_empty() {
        return Some(configured.to_owned());
    }
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl ChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/amica/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("amica").join("config.toml")
        } else if let Some(config) = dirs::config_dir() {
            config.join("amica").join("config.toml")
        } else {
            PathBuf::from("/tmp/amica-config/config.toml")
        }
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChatError::Config`] describing the first violation.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ChatError;

        if self.speech.queue_capacity == 0 {
            return Err(ChatError::Config(
                "speech.queue_capacity must be at least 1".to_owned(),
            ));
        }
        if self.life.min_interval_sec > self.life.max_interval_sec {
            return Err(ChatError::Config(format!(
                "life.min_interval_sec ({}) exceeds life.max_interval_sec ({})",
                self.life.min_interval_sec, self.life.max_interval_sec
            )));
        }
        if !(0.0..=1.0).contains(&self.life.skip_probability) {
            return Err(ChatError::Config(
                "life.skip_probability must be within [0, 1]".to_owned(),
            ));
        }
        Ok(())
    }
}

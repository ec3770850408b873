use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TutorConfig {
    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Plain-text source document. Pages may be separated by form feeds.
    pub source: Option<PathBuf>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            source: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Substrings that, together with a question mark, mark a scaffold question.
    #[serde(default = "default_scaffold_markers")]
    pub scaffold_markers: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            scaffold_markers: default_scaffold_markers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmbedderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    #[default]
    OpenAi,
    /// Deterministic feature-hashing embedder, no network.
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub kind: EmbedderKind,

    #[serde(default = "default_embedder_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    pub dimensions: Option<u32>,

    #[serde(default = "default_embedding_batch")]
    pub batch_size: usize,

    /// Vector size used by the hashing embedder.
    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            url: default_embedder_url(),
            model: default_embedding_model(),
            dimensions: None,
            batch_size: default_embedding_batch(),
            hashing_dimension: default_hashing_dimension(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClassifierKind {
    /// Text-classification HTTP endpoint returning `[{label, score}]`.
    #[default]
    Http,
    /// Keyword lookup, labels a question positive when any keyword matches.
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub kind: ClassifierKind,

    #[serde(default = "default_classifier_url")]
    pub url: String,

    /// Class id that means "on-topic".
    #[serde(default = "default_positive_class")]
    pub positive_class: i64,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default = "default_classifier_timeout", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::default(),
            url: default_classifier_url(),
            positive_class: default_positive_class(),
            keywords: Vec::new(),
            timeout: default_classifier_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeneratorKind {
    /// OpenAI-compatible streaming `/completions` endpoint.
    #[default]
    CompletionServer,
    /// Canned answers keyed by prompt substrings.
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub kind: GeneratorKind,

    #[serde(default = "default_generator_url")]
    pub url: String,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default = "default_generation_timeout", with = "duration_ms")]
    pub timeout: Duration,

    /// Pattern → answer table for the scripted generator.
    #[serde(default)]
    pub script: Vec<ScriptEntry>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::default(),
            url: default_generator_url(),
            model: default_generator_model(),
            sampling: SamplingConfig::default(),
            timeout: default_generation_timeout(),
            script: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub pattern: String,
    pub answer: String,
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Exclude-top-choices kicks in when the top token probability exceeds this.
    #[serde(default = "default_xtc_threshold")]
    pub xtc_threshold: f32,

    /// Chance that exclude-top-choices is applied at a qualifying step.
    #[serde(default = "default_xtc_probability")]
    pub xtc_probability: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            xtc_threshold: default_xtc_threshold(),
            xtc_probability: default_xtc_probability(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Durable generation cache. `null` keeps the state in memory only.
    #[serde(default = "some_default_cache_file")]
    pub cache_file: Option<PathBuf>,

    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Reset the generation state when it has been idle longer than this.
    #[serde(default, with = "option_duration_ms")]
    pub ttl: Option<Duration>,

    /// Keep at most this many exchanges in the generation state.
    #[serde(default)]
    pub max_cached_exchanges: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_file: Some(default_cache_file()),
            session_key: default_session_key(),
            ttl: None,
            max_cached_exchanges: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

/// Secret settings (secret.json)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SecretConfig {
    #[serde(default)]
    pub embedder: Option<ProviderSecretConfig>,
    #[serde(default)]
    pub classifier: Option<ProviderSecretConfig>,
    #[serde(default)]
    pub generator: Option<ProviderSecretConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderSecretConfig {
    pub api_key: String,
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::config(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader).map_err(|e| {
        Error::config(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

impl TutorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }
}

impl SecretConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_top_k() -> usize {
    1
}
fn default_scaffold_markers() -> Vec<String> {
    vec!["df[".to_string(), "groupby".to_string()]
}
fn default_embedder_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_batch() -> usize {
    32
}
fn default_hashing_dimension() -> usize {
    384
}
fn default_classifier_url() -> String {
    "http://127.0.0.1:8081/predict".to_string()
}
fn default_positive_class() -> i64 {
    1
}
fn default_classifier_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_generator_url() -> String {
    "http://127.0.0.1:8080/v1".to_string()
}
fn default_generator_model() -> String {
    "tutor".to_string()
}
fn default_generation_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_temperature() -> f32 {
    0.4
}
fn default_top_p() -> f32 {
    0.85
}
fn default_xtc_threshold() -> f32 {
    0.5
}
fn default_xtc_probability() -> f32 {
    0.5
}
fn default_max_tokens() -> usize {
    256
}
fn default_session_key() -> String {
    "default".to_string()
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("generation_cache.json")
}
fn some_default_cache_file() -> Option<PathBuf> {
    Some(default_cache_file())
}
fn default_log_path() -> PathBuf {
    PathBuf::from("conversation_log.csv")
}

// Duration serde helpers
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

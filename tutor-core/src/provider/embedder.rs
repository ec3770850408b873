use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::config::EmbedderConfig;

use super::types::{ProviderError, ProviderResult};

/// Maps text into the vector space shared by the corpus and the questions.
#[mockall::automock]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>>;

    /// Embeds several texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: Option<u32>,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbedderConfig, api_key: Option<SecretString>) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_base(config.url.clone());
        if let Some(api_key) = api_key {
            openai_config = openai_config.with_api_key(api_key.expose_secret());
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }

    #[tracing::instrument(skip(self, texts), fields(count = texts.len()))]
    async fn create_embeddings(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut builder = CreateEmbeddingRequestArgs::default();
        builder
            .model(self.model.clone())
            .input(EmbeddingInput::StringArray(texts.to_vec()));
        if let Some(dimensions) = self.dimensions {
            builder.dimensions(dimensions);
        }
        let request = builder
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        data.sort_by_key(|embedding| embedding.index);
        debug!("received {} embeddings", data.len());

        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        let mut vectors = self.create_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("No embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.create_embeddings(texts).await
    }
}

// Fixed seed keeps vectors stable across runs and toolchains.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Vectors are L2-normalized, so the dot product is the cosine similarity.
/// Useful for offline runs and tests where no embedding service is available.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn hash_token(&self, token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        hasher.finish()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|token| !token.is_empty())
            .map(|token| token.to_lowercase());
        for token in tokens {
            let hash = self.hash_token(&token);
            let idx = (hash % self.dimension as u64) as usize;
            // high bit picks the sign
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

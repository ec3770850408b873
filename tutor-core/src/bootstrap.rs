//! Startup wiring from configuration to a ready [`AnswerPipeline`].

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{
    ClassifierKind, EmbedderKind, GeneratorKind, ProviderSecretConfig, SecretConfig, TutorConfig,
};
use crate::corpus::{self, index::CorpusIndex};
use crate::logger::ConversationLogger;
use crate::pipeline::AnswerPipeline;
use crate::pipeline::scaffold::DataFrameScaffold;
use crate::provider::classifier::{
    ClassifierModel, HttpClassifierModel, KeywordClassifierModel, TopicClassifier,
};
use crate::provider::embedder::{Embedder, HashingEmbedder, OpenAIEmbedder};
use crate::provider::generator::{CompletionServerGenerator, Generator, ScriptedGenerator};
use crate::session::GenerationSession;
use crate::session::in_memory::InMemoryCacheStore;
use crate::session::local_fs::LocalFileCacheStore;
use crate::session::state::GenerationState;
use crate::session::store::CacheStore;
use crate::InternalResult;

fn api_key(secret: &Option<ProviderSecretConfig>) -> Option<SecretString> {
    secret
        .as_ref()
        .filter(|s| !s.api_key.is_empty())
        .map(|s| SecretString::from(s.api_key.clone()))
}

pub fn build_embedder(config: &TutorConfig, secrets: &SecretConfig) -> Arc<dyn Embedder> {
    match config.embedder.kind {
        EmbedderKind::OpenAi => Arc::new(OpenAIEmbedder::new(
            &config.embedder,
            api_key(&secrets.embedder),
        )),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.embedder.hashing_dimension)),
    }
}

pub fn build_classifier(
    config: &TutorConfig,
    secrets: &SecretConfig,
) -> InternalResult<TopicClassifier> {
    let classifier = &config.classifier;
    let model: Arc<dyn ClassifierModel> = match classifier.kind {
        ClassifierKind::Http => Arc::new(HttpClassifierModel::new(
            classifier,
            api_key(&secrets.classifier),
        )?),
        ClassifierKind::Keyword => Arc::new(KeywordClassifierModel::new(
            classifier.keywords.clone(),
            classifier.positive_class,
        )),
    };
    Ok(TopicClassifier::new(model, classifier.positive_class))
}

pub fn build_generator(
    config: &TutorConfig,
    secrets: &SecretConfig,
) -> InternalResult<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.generator.kind {
        GeneratorKind::CompletionServer => Arc::new(CompletionServerGenerator::new(
            &config.generator,
            api_key(&secrets.generator),
        )?),
        GeneratorKind::Scripted => Arc::new(ScriptedGenerator::new(config.generator.script.clone())),
    };
    Ok(generator)
}

/// Restores the generation session; an unreadable cache starts fresh.
pub async fn build_session(config: &TutorConfig) -> GenerationSession {
    let session_config = &config.session;
    let store: Arc<dyn CacheStore> = match &session_config.cache_file {
        Some(path) => Arc::new(LocalFileCacheStore::new(path)),
        None => Arc::new(InMemoryCacheStore::new()),
    };

    let session = match GenerationSession::restore(&session_config.session_key, store.clone()).await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("failed to restore generation state, starting fresh: {}", e);
            GenerationSession::new(&session_config.session_key, GenerationState::new(), store)
        }
    };
    session.with_reset_policy(session_config.ttl, session_config.max_cached_exchanges)
}

/// Builds the whole pipeline: corpus, providers, session and logger.
#[tracing::instrument(skip_all)]
pub async fn build_pipeline(
    config: &TutorConfig,
    secrets: &SecretConfig,
) -> InternalResult<AnswerPipeline> {
    let embedder = build_embedder(config, secrets);
    let segments = corpus::load_segments(&config.corpus).await?;
    let index = CorpusIndex::build(segments, embedder, config.embedder.batch_size).await?;

    let classifier = build_classifier(config, secrets)?;
    let generator = build_generator(config, secrets)?;
    let session = build_session(config).await;
    let logger = ConversationLogger::new(&config.log.path);

    info!(
        "pipeline ready: {} segments, embedder={}, classifier={}, generator={}",
        index.len(),
        config.embedder.kind,
        config.classifier.kind,
        config.generator.kind
    );

    Ok(AnswerPipeline::new(
        classifier,
        Arc::new(index),
        generator,
        Arc::new(session),
        Arc::new(logger),
    )
    .with_top_k(config.retrieval.top_k)
    .with_scaffold_detector(Arc::new(DataFrameScaffold::new(
        config.retrieval.scaffold_markers.clone(),
    )))
    .with_sampling(config.generator.sampling.clone())
    .with_generation_timeout(config.generator.timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptEntry;
    use crate::Topic;

    fn offline_config(dir: &std::path::Path) -> TutorConfig {
        let mut config = TutorConfig::default();
        config.embedder.kind = EmbedderKind::Hashing;
        config.classifier.kind = ClassifierKind::Keyword;
        config.classifier.keywords = vec!["python".into(), "function".into()];
        config.generator.kind = GeneratorKind::Scripted;
        config.generator.script = vec![ScriptEntry {
            pattern: "function".into(),
            answer: "A function is a named set of steps.".into(),
        }];
        config.session.cache_file = Some(dir.join("cache.json"));
        config.log.path = dir.join("log.csv");
        config
    }

    #[tokio::test]
    async fn test_offline_pipeline_answers() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        std::fs::write(&corpus, "Functions in Python are defined with def.").unwrap();
        let mut config = offline_config(dir.path());
        config.corpus.source = Some(corpus);

        let pipeline = build_pipeline(&config, &SecretConfig::default())
            .await
            .unwrap();
        assert_eq!(pipeline.index().len(), 1);

        let answer = pipeline.ask("What is a function?").await.unwrap();
        assert_eq!(answer, "A function is a named set of steps.");
        assert!(dir.path().join("cache.json").exists());
        assert_eq!(
            pipeline.logger().recent(1).await.unwrap()[0].topic,
            Topic::OnTopic
        );
    }

    #[tokio::test]
    async fn test_corrupt_cache_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cache.json"), "garbage").unwrap();
        let config = offline_config(dir.path());

        let session = build_session(&config).await;
        assert_eq!(session.exchange_count().await, 0);

        let mut guard = session.lock().await;
        guard.commit("p", "c".to_string());
        guard.persist().await.unwrap();
        drop(guard);

        let reloaded = build_session(&config).await;
        assert_eq!(reloaded.exchange_count().await, 1);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        assert!(api_key(&None).is_none());
        assert!(api_key(&Some(ProviderSecretConfig { api_key: String::new() })).is_none());
        assert!(api_key(&Some(ProviderSecretConfig { api_key: "sk-1".into() })).is_some());
    }
}

//! # Answer pipeline
//!
//! [`AnswerPipeline::ask`] runs one question through a fixed sequence:
//!
//! 1. validate: a blank question returns [`EMPTY_QUESTION_REPLY`] and stops
//! 2. classify the question as on- or off-topic
//! 3. resolve the context: on-topic questions retrieve the top segments and
//!    drop those containing `?` unless the question is a scaffold question;
//!    off-topic questions get an empty context without touching the index
//! 4. assemble the ChatML prompt ([`prompt::build_prompt`])
//! 5. stream the answer from the generator, continuing the session state
//! 6. commit the exchange and persist the session state
//! 7. append the exchange to the conversation log
//!
//! Classifier, embedder and generator failures abort the invocation before
//! anything is committed or logged. Persistence and logging failures are
//! reported through `tracing` and never fail the answer.

pub mod cancel;
pub mod prompt;
pub mod scaffold;

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::corpus::index::{CorpusIndex, IndexError};
use crate::logger::{ConversationLogger, LogEntry};
use crate::provider::classifier::{Topic, TopicClassifier};
use crate::provider::generator::Generator;
use crate::provider::types::ProviderError;
use crate::session::GenerationSession;

use cancel::CancelToken;
use scaffold::{DataFrameScaffold, ScaffoldDetector, filter_segments};

/// Reply to a blank question.
pub const EMPTY_QUESTION_REPLY: &str = "Please provide a question.";

const DEFAULT_TOP_K: usize = 1;
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(#[source] ProviderError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("Generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// `None` when the question was rejected before classification.
    pub topic: Option<Topic>,
    /// Context handed to the model.
    pub context: String,
}

impl Answer {
    fn rejected() -> Self {
        Self {
            text: EMPTY_QUESTION_REPLY.to_string(),
            topic: None,
            context: String::new(),
        }
    }
}

pub struct AnswerPipeline {
    classifier: TopicClassifier,
    index: Arc<CorpusIndex>,
    generator: Arc<dyn Generator>,
    session: Arc<GenerationSession>,
    logger: Arc<ConversationLogger>,
    scaffold: Arc<dyn ScaffoldDetector>,
    top_k: usize,
    sampling: SamplingConfig,
    generation_timeout: Duration,
}

impl AnswerPipeline {
    pub fn new(
        classifier: TopicClassifier,
        index: Arc<CorpusIndex>,
        generator: Arc<dyn Generator>,
        session: Arc<GenerationSession>,
        logger: Arc<ConversationLogger>,
    ) -> Self {
        Self {
            classifier,
            index,
            generator,
            session,
            logger,
            scaffold: Arc::new(DataFrameScaffold::default()),
            top_k: DEFAULT_TOP_K,
            sampling: SamplingConfig::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_scaffold_detector(mut self, scaffold: Arc<dyn ScaffoldDetector>) -> Self {
        self.scaffold = scaffold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    /// Answers `question`.
    ///
    /// A question that is empty or only whitespace gets
    /// [`EMPTY_QUESTION_REPLY`] without classification, generation or logging.
    pub async fn ask(&self, question: &str) -> PipelineResult<String> {
        let answer = self.answer(question, &CancelToken::never()).await?;
        Ok(answer.text)
    }

    /// Answers `question`, giving up when `cancel` fires.
    #[tracing::instrument(skip(self, question, cancel), fields(question_len = question.len()))]
    pub async fn answer(&self, question: &str, cancel: &CancelToken) -> PipelineResult<Answer> {
        if question.trim().is_empty() {
            debug!("blank question rejected");
            return Ok(Answer::rejected());
        }

        let topic = self
            .classifier
            .classify(question)
            .await
            .map_err(PipelineError::Classification)?;
        info!("question classified as {}", topic);

        let context = self.resolve_context(question, topic).await?;
        let prompt = prompt::build_prompt(&context, question);

        let text = self.generate(question, topic, &prompt, cancel).await?;

        Ok(Answer {
            text,
            topic: Some(topic),
            context,
        })
    }

    /// Context string for `question` given its topic.
    pub async fn resolve_context(&self, question: &str, topic: Topic) -> PipelineResult<String> {
        if !topic.is_on_topic() {
            return Ok(String::new());
        }

        let segments = self.index.retrieve(question, self.top_k).await?;
        let scaffold = self.scaffold.is_scaffold(question);
        let retrieved = segments.len();
        let kept = filter_segments(segments, scaffold);
        debug!(
            "scaffold={} kept {} of {} segments",
            scaffold,
            kept.len(),
            retrieved
        );
        Ok(kept.join("\n"))
    }

    /// Streams one generation under the session lock, then commits, persists
    /// and logs it before the lock is released.
    ///
    /// Log rows therefore follow the order of committed exchanges.
    async fn generate(
        &self,
        question: &str,
        topic: Topic,
        prompt: &str,
        cancel: &CancelToken,
    ) -> PipelineResult<String> {
        let mut guard = self.session.lock().await;

        let streamed = async {
            let mut fragments = self
                .generator
                .generate(prompt, guard.state(), &self.sampling)
                .await?;
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                text.push_str(&fragment?);
            }
            Ok::<_, ProviderError>(text)
        };

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("generation cancelled");
                return Err(PipelineError::Cancelled);
            }
            result = tokio::time::timeout(self.generation_timeout, streamed) => match result {
                Ok(text) => text.map_err(PipelineError::Generation)?,
                Err(_) => {
                    warn!("generation timed out after {:?}", self.generation_timeout);
                    return Err(PipelineError::Timeout(self.generation_timeout));
                }
            },
        };

        guard.commit(prompt, text.clone());
        if let Err(e) = guard.persist().await {
            warn!("failed to persist generation state: {}", e);
        }

        let entry = LogEntry::now(question, text.clone(), topic);
        if let Err(e) = self.logger.append(&entry).await {
            warn!("failed to log conversation: {}", e);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::segment::Segment;
    use crate::provider::classifier::{ClassLabel, Classification, MockClassifierModel};
    use crate::provider::embedder::MockEmbedder;
    use crate::provider::generator::{FragmentStream, MockGenerator};
    use crate::session::in_memory::InMemoryCacheStore;
    use crate::session::state::GenerationState;
    use crate::session::store::{CacheStoreError, MockCacheStore};
    use futures::stream;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn classifier(label: i64) -> TopicClassifier {
        let mut model = MockClassifierModel::new();
        model.expect_predict().returning(move |_| {
            Ok(Classification {
                label: ClassLabel::Name(format!("LABEL_{}", label)),
                score: 0.9,
            })
        });
        TopicClassifier::new(Arc::new(model), 1)
    }

    fn index(texts: &[&str]) -> Arc<CorpusIndex> {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0]));
        // descending scores in corpus order
        let embeddings = (0..texts.len())
            .map(|i| vec![(texts.len() - i) as f32])
            .collect();
        let segments = texts.iter().map(|t| Segment::new(*t)).collect();
        Arc::new(CorpusIndex::new(segments, embeddings, Arc::new(embedder)).unwrap())
    }

    fn fragments(parts: &[&str]) -> FragmentStream {
        let items: Vec<_> = parts.iter().map(|p| Ok(p.to_string())).collect();
        stream::iter(items).boxed()
    }

    fn echo_generator() -> Arc<dyn Generator> {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(fragments(&["Hello", ", ", "student."])));
        Arc::new(generator)
    }

    struct Fixture {
        _dir: TempDir,
        logger: Arc<ConversationLogger>,
        session: Arc<GenerationSession>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(ConversationLogger::new(dir.path().join("log.csv")));
        let session = Arc::new(GenerationSession::new(
            "default",
            GenerationState::new(),
            Arc::new(InMemoryCacheStore::new()),
        ));
        Fixture {
            _dir: dir,
            logger,
            session,
        }
    }

    fn pipeline(
        fx: &Fixture,
        label: i64,
        corpus: &[&str],
        generator: Arc<dyn Generator>,
    ) -> AnswerPipeline {
        AnswerPipeline::new(
            classifier(label),
            index(corpus),
            generator,
            fx.session.clone(),
            fx.logger.clone(),
        )
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected_without_side_effects() {
        let fx = fixture();
        let mut model = MockClassifierModel::new();
        model.expect_predict().never();
        let mut generator = MockGenerator::new();
        generator.expect_generate().never();
        let pipeline = AnswerPipeline::new(
            TopicClassifier::new(Arc::new(model), 1),
            index(&["a"]),
            Arc::new(generator),
            fx.session.clone(),
            fx.logger.clone(),
        );

        assert_eq!(pipeline.ask("").await.unwrap(), EMPTY_QUESTION_REPLY);
        assert_eq!(pipeline.ask("   \n").await.unwrap(), EMPTY_QUESTION_REPLY);
        assert!(fx.logger.recent(10).await.unwrap().is_empty());
        assert_eq!(fx.session.exchange_count().await, 0);
    }

    #[tokio::test]
    async fn test_fragments_are_concatenated_in_order() {
        let fx = fixture();
        let pipeline = pipeline(&fx, 1, &["A function is reusable."], echo_generator());

        let answer = pipeline.ask("What is a function?").await.unwrap();
        assert_eq!(answer, "Hello, student.");

        let log = fx.logger.recent(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].user, "What is a function?");
        assert_eq!(log[0].assistant, "Hello, student.");
        assert_eq!(log[0].topic, Topic::OnTopic);
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_question() {
        let fx = fixture();
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt, _, sampling| {
                prompt.contains("Context:\nA function is reusable.\n<|im_end|>")
                    && prompt.contains("<|im_start|>user\nWhat is a function?\n<|im_end|>")
                    && sampling.max_tokens == 256
            })
            .times(1)
            .returning(|_, _, _| Ok(fragments(&["ok"])));
        let pipeline = pipeline(&fx, 1, &["A function is reusable."], Arc::new(generator));

        pipeline.ask("What is a function?").await.unwrap();
    }

    #[tokio::test]
    async fn test_off_topic_skips_retrieval() {
        let fx = fixture();
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();
        let index = Arc::new(
            CorpusIndex::new(vec![Segment::new("ctx")], vec![vec![1.0]], Arc::new(embedder))
                .unwrap(),
        );
        let pipeline = AnswerPipeline::new(
            classifier(0),
            index,
            echo_generator(),
            fx.session.clone(),
            fx.logger.clone(),
        );

        let answer = pipeline
            .answer("What's the weather today?", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(answer.topic, Some(Topic::OffTopic));
        assert_eq!(answer.context, "");
        assert_eq!(fx.logger.recent(1).await.unwrap()[0].topic, Topic::OffTopic);
        // off-topic generations still extend the state
        assert_eq!(fx.session.exchange_count().await, 1);
    }

    #[tokio::test]
    async fn test_question_mark_segments_filtered_without_scaffold() {
        let fx = fixture();
        let pipeline = pipeline(&fx, 1, &["x = df[?]", "plain"], echo_generator()).with_top_k(2);

        let context = pipeline
            .resolve_context("What is a variable?", Topic::OnTopic)
            .await
            .unwrap();
        assert_eq!(context, "plain");
    }

    #[tokio::test]
    async fn test_scaffold_question_keeps_question_mark_segments() {
        let fx = fixture();
        let pipeline = pipeline(&fx, 1, &["x = df[?]", "plain"], echo_generator()).with_top_k(2);

        let context = pipeline
            .resolve_context("What goes in df['col'] ?", Topic::OnTopic)
            .await
            .unwrap();
        assert_eq!(context, "x = df[?]\nplain");
    }

    #[tokio::test]
    async fn test_custom_scaffold_detector() {
        let fx = fixture();
        let pipeline = pipeline(&fx, 1, &["fill ?"], echo_generator())
            .with_scaffold_detector(Arc::new(|q: &str| q.contains("blank")));

        let context = pipeline
            .resolve_context("fill the blank", Topic::OnTopic)
            .await
            .unwrap();
        assert_eq!(context, "fill ?");
    }

    #[tokio::test]
    async fn test_generator_sees_previous_state() {
        let fx = fixture();
        let mut generator = MockGenerator::new();
        let mut seq = mockall::Sequence::new();
        generator
            .expect_generate()
            .withf(|_, state, _| state.is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(fragments(&["first"])));
        generator
            .expect_generate()
            .withf(|_, state, _| state.len() == 1 && state.exchanges()[0].completion == "first")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(fragments(&["second"])));
        let pipeline = pipeline(&fx, 1, &["ctx"], Arc::new(generator));

        pipeline.ask("one?").await.unwrap();
        pipeline.ask("two?").await.unwrap();
        assert_eq!(fx.session.exchange_count().await, 2);
    }

    #[tokio::test]
    async fn test_classifier_failure_propagates() {
        let fx = fixture();
        let mut model = MockClassifierModel::new();
        model
            .expect_predict()
            .returning(|_| Err(ProviderError::Transport("down".into())));
        let pipeline = AnswerPipeline::new(
            TopicClassifier::new(Arc::new(model), 1),
            index(&["a"]),
            echo_generator(),
            fx.session.clone(),
            fx.logger.clone(),
        );

        assert!(matches!(
            pipeline.ask("What is a loop?").await,
            Err(PipelineError::Classification(_))
        ));
        assert!(fx.logger.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_commits_nothing() {
        let fx = fixture();
        let mut generator = MockGenerator::new();
        generator.expect_generate().returning(|_, _, _| {
            let items = vec![
                Ok("partial".to_string()),
                Err(ProviderError::Transport("reset".into())),
            ];
            Ok(stream::iter(items).boxed())
        });
        let pipeline = pipeline(&fx, 1, &["a"], Arc::new(generator));

        assert!(matches!(
            pipeline.ask("What is a loop?").await,
            Err(PipelineError::Generation(ProviderError::Transport(_)))
        ));
        assert_eq!(fx.session.exchange_count().await, 0);
        assert!(fx.logger.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let fx = fixture();
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(stream::pending().boxed()));
        let pipeline = pipeline(&fx, 1, &["a"], Arc::new(generator))
            .with_generation_timeout(Duration::from_millis(20));

        assert!(matches!(
            pipeline.ask("What is a loop?").await,
            Err(PipelineError::Timeout(_))
        ));
        assert_eq!(fx.session.exchange_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let fx = fixture();
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(stream::pending().boxed()));
        let pipeline = pipeline(&fx, 1, &["a"], Arc::new(generator));

        let (handle, token) = cancel::cancel_pair();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let result = pipeline.answer("What is a loop?", &token).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(fx.logger.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(ConversationLogger::new(dir.path().join("log.csv")));
        let mut store = MockCacheStore::new();
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(CacheStoreError::Io("disk full".into())));
        let session = Arc::new(GenerationSession::new(
            "default",
            GenerationState::new(),
            Arc::new(store),
        ));
        let pipeline = AnswerPipeline::new(
            classifier(1),
            index(&["a"]),
            echo_generator(),
            session,
            logger.clone(),
        );

        assert_eq!(pipeline.ask("What is a loop?").await.unwrap(), "Hello, student.");
        assert_eq!(logger.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // the log path is a directory, so appends fail
        let logger = Arc::new(ConversationLogger::new(dir.path()));
        let session = Arc::new(GenerationSession::new(
            "default",
            GenerationState::new(),
            Arc::new(InMemoryCacheStore::new()),
        ));
        let pipeline = AnswerPipeline::new(
            classifier(1),
            index(&["a"]),
            echo_generator(),
            session.clone(),
            logger,
        );

        assert_eq!(pipeline.ask("What is a loop?").await.unwrap(), "Hello, student.");
        assert_eq!(session.exchange_count().await, 1);
    }
}

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::config::ClassifierConfig;

use super::types::{ProviderError, ProviderResult};

/// Relevance of a question to the tutoring domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, ToSchema,
)]
pub enum Topic {
    #[serde(rename = "on-topic")]
    #[strum(to_string = "on-topic")]
    OnTopic,
    #[serde(rename = "off-topic")]
    #[strum(to_string = "off-topic")]
    OffTopic,
}

impl Topic {
    pub fn is_on_topic(&self) -> bool {
        matches!(self, Topic::OnTopic)
    }
}

/// Class label as reported by a sequence-classification model.
///
/// Models report either a bare class id (`1`, `"1"`) or a `LABEL_<id>` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    Id(i64),
    Name(String),
}

impl ClassLabel {
    /// Numeric class id, `None` when the label carries no id.
    pub fn class_id(&self) -> Option<i64> {
        match self {
            ClassLabel::Id(id) => Some(*id),
            ClassLabel::Name(name) => {
                let name = name.trim();
                name.strip_prefix("LABEL_")
                    .unwrap_or(name)
                    .trim()
                    .parse()
                    .ok()
            }
        }
    }
}

/// Top prediction of a classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: ClassLabel,
    pub score: f32,
}

#[mockall::automock]
#[async_trait]
pub trait ClassifierModel: Send + Sync {
    async fn predict(&self, text: &str) -> ProviderResult<Classification>;
}

/// Hard binary topic decision on top of a [`ClassifierModel`].
///
/// Only the top label is used; the score is ignored.
#[derive(Clone)]
pub struct TopicClassifier {
    model: Arc<dyn ClassifierModel>,
    positive_class: i64,
}

impl TopicClassifier {
    pub fn new(model: Arc<dyn ClassifierModel>, positive_class: i64) -> Self {
        Self {
            model,
            positive_class,
        }
    }

    #[tracing::instrument(skip(self, text), level = "debug")]
    pub async fn classify(&self, text: &str) -> ProviderResult<Topic> {
        let prediction = self.model.predict(text).await?;
        debug!("prediction: {:?}", prediction);
        Ok(self.topic_for(&prediction.label))
    }

    pub fn topic_for(&self, label: &ClassLabel) -> Topic {
        if label.class_id() == Some(self.positive_class) {
            Topic::OnTopic
        } else {
            Topic::OffTopic
        }
    }
}

/// Classifier backed by a text-classification HTTP endpoint.
///
/// Sends `{"inputs": text}` and accepts `[{label, score}]` or the nested
/// `[[{label, score}]]` shape, picking the highest score.
pub struct HttpClassifierModel {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpClassifierModel {
    pub fn new(config: &ClassifierConfig, api_key: Option<SecretString>) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
        })
    }

    fn top_prediction(body: Value) -> ProviderResult<Classification> {
        let candidates = match body {
            Value::Array(items) => {
                if matches!(items.first(), Some(Value::Array(_))) {
                    match items.into_iter().next() {
                        Some(Value::Array(inner)) => inner,
                        _ => Vec::new(),
                    }
                } else {
                    items
                }
            }
            Value::Object(_) => vec![body],
            other => {
                return Err(ProviderError::InvalidResponse(format!(
                    "unexpected classification payload: {}",
                    other
                )));
            }
        };

        candidates
            .into_iter()
            .map(serde_json::from_value::<Classification>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| ProviderError::InvalidResponse("No classification returned".into()))
    }
}

#[async_trait]
impl ClassifierModel for HttpClassifierModel {
    #[tracing::instrument(skip(self, text), level = "debug")]
    async fn predict(&self, text: &str) -> ProviderResult<Classification> {
        let mut request = self.client.post(&self.url).json(&json!({ "inputs": text }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?.error_for_status()?;
        let body: Value = response.json().await?;
        Self::top_prediction(body)
    }
}

/// Keyword classifier: positive class when the text mentions any keyword.
pub struct KeywordClassifierModel {
    keywords: Vec<String>,
    positive_class: i64,
}

impl KeywordClassifierModel {
    pub fn new(keywords: Vec<String>, positive_class: i64) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            positive_class,
        }
    }
}

#[async_trait]
impl ClassifierModel for KeywordClassifierModel {
    async fn predict(&self, text: &str) -> ProviderResult<Classification> {
        let text = text.to_lowercase();
        let hit = self.keywords.iter().any(|k| text.contains(k.as_str()));
        let class_id = if hit {
            self.positive_class
        } else if self.positive_class == 0 {
            1
        } else {
            0
        };
        Ok(Classification {
            label: ClassLabel::Name(format!("LABEL_{}", class_id)),
            score: 1.0,
        })
    }
}

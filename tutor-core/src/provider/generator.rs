use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::{GeneratorConfig, SamplingConfig, ScriptEntry};
use crate::session::state::GenerationState;

use super::types::{ProviderError, ProviderResult};

/// Text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, ProviderResult<String>>;

#[mockall::automock]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Starts a streamed generation for `prompt`, continuing from `state`.
    ///
    /// Only fragments of the new completion are yielded, never the cached
    /// transcript or the prompt.
    async fn generate(
        &self,
        prompt: &str,
        state: &GenerationState,
        sampling: &SamplingConfig,
    ) -> ProviderResult<FragmentStream>;
}

/// Generator backed by an OpenAI-compatible streaming `/completions` endpoint
/// (llama.cpp server and friends).
///
/// The prompt is sent raw so the chat sentinels reach the model untouched.
pub struct CompletionServerGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl CompletionServerGenerator {
    pub fn new(config: &GeneratorConfig, api_key: Option<SecretString>) -> ProviderResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/completions", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, prompt: &str, sampling: &SamplingConfig) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
            "xtc_threshold": sampling.xtc_threshold,
            "xtc_probability": sampling.xtc_probability,
            "max_tokens": sampling.max_tokens,
            "cache_prompt": true,
        })
    }
}

#[async_trait]
impl Generator for CompletionServerGenerator {
    #[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn generate(
        &self,
        prompt: &str,
        state: &GenerationState,
        sampling: &SamplingConfig,
    ) -> ProviderResult<FragmentStream> {
        let input = state.continuation(prompt);
        debug!(
            "continuing {} cached exchanges ({} bytes)",
            state.len(),
            input.len() - prompt.len()
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(&input, sampling));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?.error_for_status()?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(sse_fragments(body))
    }
}

/// Incremental parser for a `text/event-stream` completion body.
struct EventStreamDecoder {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<ProviderResult<String>>,
    done: bool,
}

impl EventStreamDecoder {
    fn drain_lines(&mut self) {
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end());
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim_end());
        }
        self.done = true;
    }

    fn handle_line(&mut self, line: &str) {
        if self.done {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match parse_event(data) {
            Ok(Some(fragment)) => self.pending.push_back(Ok(fragment)),
            Ok(None) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.done = true;
            }
        }
    }
}

fn sse_fragments(body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> FragmentStream {
    let decoder = EventStreamDecoder {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.pending.pop_front() {
                return Some((item, decoder));
            }
            if decoder.done {
                return None;
            }
            match decoder.body.next().await {
                Some(Ok(chunk)) => {
                    decoder.buffer.extend_from_slice(&chunk);
                    decoder.drain_lines();
                }
                Some(Err(e)) => {
                    decoder.done = true;
                    return Some((Err(e.into()), decoder));
                }
                None => decoder.finish(),
            }
        }
    })
    .boxed()
}

/// Extracts the text of one streamed completion event.
///
/// Accepts the OpenAI shape (`choices[0].text`) and the llama.cpp native
/// shape (`content`).
fn parse_event(data: &str) -> ProviderResult<Option<String>> {
    let event: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad stream event: {}", e)))?;

    if let Some(error) = event.get("error") {
        return Err(ProviderError::ApiError(error.to_string()));
    }

    let text = event
        .pointer("/choices/0/text")
        .or_else(|| event.get("content"))
        .and_then(Value::as_str);

    match text {
        Some(text) if !text.is_empty() => Ok(Some(text.to_string())),
        _ => Ok(None),
    }
}

/// Offline generator returning canned answers.
///
/// The question is taken from the user block of the prompt; the first script
/// entry whose pattern occurs in it (case-insensitive) wins. Answers are
/// streamed word by word.
pub struct ScriptedGenerator {
    script: Vec<ScriptEntry>,
    fallback: String,
}

pub const SCRIPTED_FALLBACK: &str =
    "Let's think about that together. What do you already know about it?";

impl ScriptedGenerator {
    pub fn new(script: Vec<ScriptEntry>) -> Self {
        Self {
            script,
            fallback: SCRIPTED_FALLBACK.to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    fn answer_for(&self, prompt: &str) -> &str {
        let question = user_block(prompt).to_lowercase();
        self.script
            .iter()
            .find(|entry| question.contains(&entry.pattern.to_lowercase()))
            .map(|entry| entry.answer.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

fn user_block(prompt: &str) -> &str {
    const USER_START: &str = "<|im_start|>user\n";
    match prompt.rfind(USER_START) {
        Some(start) => {
            let rest = &prompt[start + USER_START.len()..];
            rest.split("<|im_end|>").next().unwrap_or(rest)
        }
        None => prompt,
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _state: &GenerationState,
        sampling: &SamplingConfig,
    ) -> ProviderResult<FragmentStream> {
        let answer = self.answer_for(prompt);
        if answer.split_whitespace().count() > sampling.max_tokens {
            warn!("scripted answer exceeds max_tokens, truncating");
        }
        let fragments: Vec<ProviderResult<String>> = answer
            .split_inclusive(' ')
            .take(sampling.max_tokens)
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(stream::iter(fragments).boxed())
    }
}

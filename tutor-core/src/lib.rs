//! # Tutor: retrieval-gated answer pipeline
//!
//! `tutor-core` answers a student's question in four steps:
//!
//! ```text
//! Question → Topic Classifier → (on-topic) Corpus Index → Prompt Template → Generator
//!                                                                              │
//!                                   Conversation Log ← Generation Cache ←──────┘
//! ```
//!
//! ## Components
//!
//! - Corpus: chunked source segments and their embeddings ([`corpus`])
//! - External model services: embedder, topic classifier and streaming
//!   generator ([`provider`])
//! - Generation state shared across calls and its durable store ([`session`])
//! - Append-only conversation log ([`logger`])
//! - The orchestrating answer pipeline ([`pipeline`])
//!
//! ## Wiring
//!
//! [`bootstrap::build_pipeline`] turns a [`config::TutorConfig`] into a ready
//! [`pipeline::AnswerPipeline`]: it chunks and embeds the corpus once, restores
//! the generation state from disk and connects the configured providers.

pub mod bootstrap;
pub mod config;
pub mod corpus;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod provider;
pub mod session;

// Re-exports
pub use error::*;
pub use pipeline::{AnswerPipeline, EMPTY_QUESTION_REPLY};
pub use provider::classifier::Topic;

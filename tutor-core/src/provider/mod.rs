//! # External model services
//!
//! The pipeline talks to three model services, each behind a trait so the
//! network adapters can be swapped for local or scripted implementations:
//!
//! * [`embedder::Embedder`] maps text into the corpus vector space
//! * [`classifier::ClassifierModel`] predicts the top class of a question,
//!   wrapped by [`classifier::TopicClassifier`] to produce a [`classifier::Topic`]
//! * [`generator::Generator`] streams completion fragments for a prompt,
//!   continuing from the session's [`crate::session::state::GenerationState`]
//!
//! Errors from all adapters are reported as [`types::ProviderError`].

pub mod classifier;
pub mod embedder;
pub mod generator;
pub mod types;

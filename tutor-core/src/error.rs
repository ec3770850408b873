use thiserror::Error;

use crate::corpus::index::IndexError;
use crate::logger::LogError;
use crate::pipeline::PipelineError;
use crate::provider::types::ProviderError;
use crate::session::store::CacheStoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Cache store error: {0}")]
    CacheStore(#[from] CacheStoreError),
    #[error("Log error: {0}")]
    Log(#[from] LogError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }
}

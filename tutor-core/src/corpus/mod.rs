//! # Corpus
//!
//! The retrievable knowledge of the tutor: a source document split into
//! [`segment::Segment`]s by the [`segment::TextChunker`], embedded once at
//! startup and searched by the [`index::CorpusIndex`].

pub mod index;
pub mod segment;

use std::path::Path;

use segment::{Segment, TextChunker};

use crate::config::CorpusConfig;
use crate::{Error, InternalResult};

/// Reads and chunks the configured source document.
///
/// No source configured yields an empty corpus.
pub async fn load_segments(config: &CorpusConfig) -> InternalResult<Vec<Segment>> {
    let Some(source) = &config.source else {
        return Ok(Vec::new());
    };
    let document = read_source(source).await?;
    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap);
    Ok(chunker.segment_document(&document))
}

async fn read_source(path: &Path) -> InternalResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::config(format!("Failed to read corpus {}: {}", path.display(), e)))
}

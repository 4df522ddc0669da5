//! Core data types and error definitions for the study guide pipeline.

use crate::{extraction::ExtractionError, llm::LlmClientError, storage::StorageError};
use serde::Serialize;
use thiserror::Error;

/// A contiguous slice of the document text, addressed in character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in document order.
    pub index: usize,
    /// Inclusive start offset, in characters.
    pub start: usize,
    /// Exclusive end offset, in characters.
    pub end: usize,
    /// Text covered by `[start, end)`.
    pub text: String,
}

/// Errors produced while splitting document text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Window never advances when the overlap is not smaller than the chunk size.
    #[error("chunk size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidWindow {
        /// Requested chunk size in characters.
        chunk_size: usize,
        /// Requested overlap in characters.
        overlap: usize,
    },
}

/// Path taken by the orchestrator for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Document was composed directly from its full text.
    Short,
    /// Document went through the map phase before composing.
    Long,
}

/// Final output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyGuide {
    /// Cleaned HTML document produced by the reduce phase.
    pub html: String,
    /// Strategy selected for the document.
    pub strategy: Strategy,
    /// Number of chunks the document was split into (0 for short documents).
    pub chunk_count: usize,
    /// Chunks whose extraction failed and were dropped before composing.
    pub failed_chunks: usize,
}

/// Errors emitted by the study guide pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Source document was unreadable or yielded no text.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Reduce-phase call failed; no document is produced.
    #[error("Failed to compose study guide: {0}")]
    Compose(#[source] LlmClientError),
    /// Chat passthrough call failed.
    #[error("Chat request failed: {0}")]
    Chat(#[source] LlmClientError),
    /// Caller supplied missing or invalid parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// No stored document matches the requested identifier.
    #[error("File not found: {0}")]
    DocumentNotFound(String),
    /// Upload storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ChunkingError> for ProcessingError {
    fn from(error: ChunkingError) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }
}

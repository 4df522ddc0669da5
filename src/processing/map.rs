//! Map phase: turn one chunk into extracted notes.
//!
//! A failed call never fails the document. The error is logged with the chunk position and the
//! note degrades to an empty string, which the orchestrator drops before composing.

use crate::llm::{ChatClient, ChatMessage, LlmClientError, complete_with_timeout};
use std::time::Duration;

use super::types::Chunk;

/// Instruction sent as system context with every chunk.
pub(crate) const EXTRACTION_PROMPT: &str = "You are a meticulous technical note-taker. \
Extract every technical definition, number, statistic, code snippet, formula, and key argument \
from the text provided by the user. Keep concrete details verbatim; do not summarize detail away. \
Return plain-text notes as a flat bulleted list with no introduction or closing remarks.";

/// Notes extracted from a single chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkNote {
    /// Index of the chunk the note belongs to.
    pub index: usize,
    /// Extracted text; empty when the call failed.
    pub text: String,
}

impl ChunkNote {
    /// Whether extraction produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Wraps the chat client with the extraction prompt and failure policy of the map phase.
pub struct ChunkSummarizer<'a> {
    client: &'a dyn ChatClient,
    model: &'a str,
    timeout: Duration,
}

impl<'a> ChunkSummarizer<'a> {
    /// Build a summarizer issuing calls to `model` through `client`.
    pub fn new(client: &'a dyn ChatClient, model: &'a str, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }

    /// Extract notes from `chunk`, degrading to an empty note on failure.
    pub async fn summarize(&self, chunk: &Chunk) -> ChunkNote {
        let text = match self.try_summarize(chunk).await {
            Ok(notes) => notes,
            Err(error) => {
                tracing::warn!(
                    chunk = chunk.index,
                    start = chunk.start,
                    end = chunk.end,
                    error = %error,
                    "Chunk extraction failed; continuing without its notes"
                );
                String::new()
            }
        };
        ChunkNote {
            index: chunk.index,
            text,
        }
    }

    async fn try_summarize(&self, chunk: &Chunk) -> Result<String, LlmClientError> {
        let messages = vec![
            ChatMessage::system(EXTRACTION_PROMPT),
            ChatMessage::user(chunk.text.clone()),
        ];
        let reply = complete_with_timeout(self.client, self.model, messages, self.timeout).await?;
        tracing::debug!(chunk = chunk.index, chars = reply.content.len(), "Chunk notes extracted");
        Ok(reply.content.trim().to_string())
    }
}

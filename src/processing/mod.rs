//! Study guide pipeline: splitting, map-phase extraction, reduce-phase composition.

pub mod chunking;
pub mod clean;
pub mod map;
pub mod reduce;
mod service;
pub mod types;

pub use service::{
    NOTE_SEPARATOR, StudyGuideApi, StudyGuidePipeline, StudyGuideService, combine_notes,
};
pub use types::{Chunk, ChunkingError, ProcessingError, Strategy, StudyGuide};

#![deny(missing_docs)]

//! Core library for the study guide generator.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Page text extraction from uploaded documents.
pub mod extraction;
/// Chat-completion client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Map-reduce study guide pipeline.
pub mod processing;
/// Filesystem storage for uploaded documents.
pub mod storage;

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_summarized: AtomicU64,
    chunk_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed document along with its map-phase results.
    pub fn record_document(&self, chunks_summarized: u64, chunk_failures: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_summarized
            .fetch_add(chunks_summarized, Ordering::Relaxed);
        self.chunk_failures
            .fetch_add(chunk_failures, Ordering::Relaxed);
    }

    /// Record a document whose pipeline run failed.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_summarized: self.chunks_summarized.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents turned into a study guide since startup.
    pub documents_processed: u64,
    /// Documents whose pipeline run failed.
    pub documents_failed: u64,
    /// Chunks that produced a non-empty note.
    pub chunks_summarized: u64,
    /// Chunks whose extraction call failed and degraded to an empty note.
    pub chunk_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(3, 1);
        metrics.record_document(0, 0);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.chunks_summarized, 3);
        assert_eq!(snapshot.chunk_failures, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}

//! Pipeline orchestration: extraction, strategy selection, map fan-out, and composition.

use crate::{
    config::{Config, PipelineSettings},
    extraction::{ExtractionError, PdfTextExtractor, TextExtractor, extract_document_text},
    llm::{ChatClient, ChatMessage, OpenAiCompatibleClient, complete_with_timeout},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::split_text,
        map::{ChunkNote, ChunkSummarizer},
        reduce::FinalComposer,
        types::{Chunk, ProcessingError, Strategy, StudyGuide},
    },
    storage::UploadStore,
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Separator placed between non-empty chunk notes.
pub const NOTE_SEPARATOR: &str = "\n\n";

/// Map-reduce pipeline turning a stored document into a study guide.
///
/// Collaborators are injected so tests can replace the model and the PDF reader.
pub struct StudyGuidePipeline {
    client: Arc<dyn ChatClient>,
    extractor: Arc<dyn TextExtractor>,
    settings: PipelineSettings,
}

impl StudyGuidePipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        client: Arc<dyn ChatClient>,
        extractor: Arc<dyn TextExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            client,
            extractor,
            settings,
        }
    }

    /// Tunables the pipeline was built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Extract the document at `path` and generate its study guide.
    pub async fn run(&self, path: &Path) -> Result<StudyGuide, ProcessingError> {
        let text = self.extract(path).await?;
        self.generate(&text).await
    }

    /// Generate a study guide from already extracted document text.
    pub async fn generate(&self, text: &str) -> Result<StudyGuide, ProcessingError> {
        let char_count = text.chars().count();
        let (source, strategy, chunk_count, failed_chunks) =
            if char_count < self.settings.short_document_threshold {
                tracing::info!(chars = char_count, "Short document; composing directly");
                (text.to_string(), Strategy::Short, 0, 0)
            } else {
                let chunks = split_text(
                    text,
                    self.settings.chunk_size,
                    self.settings.chunk_overlap,
                )?;
                tracing::info!(
                    chars = char_count,
                    chunks = chunks.len(),
                    concurrency = self.settings.map_concurrency,
                    "Long document; starting map phase"
                );
                let notes = self.map_chunks(&chunks).await;
                let failed = notes.iter().filter(|note| note.is_empty()).count();
                tracing::info!(
                    chunks = chunks.len(),
                    succeeded = chunks.len() - failed,
                    failed,
                    "Map phase complete"
                );
                (combine_notes(&notes), Strategy::Long, chunks.len(), failed)
            };

        let composer = FinalComposer::new(
            self.client.as_ref(),
            &self.settings.reduce_model,
            self.settings.call_timeout,
        );
        let html = composer.compose(&source).await.map_err(|error| {
            tracing::error!(error = %error, ?strategy, "Compose call failed");
            ProcessingError::Compose(error)
        })?;

        Ok(StudyGuide {
            html,
            strategy,
            chunk_count,
            failed_chunks,
        })
    }

    async fn extract(&self, path: &Path) -> Result<String, ProcessingError> {
        let extractor = Arc::clone(&self.extractor);
        let path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || {
            extract_document_text(extractor.as_ref(), &path)
        })
        .await
        .map_err(|error| ExtractionError::Reader(format!("extraction task failed: {error}")))??;
        Ok(text)
    }

    /// Summarize every chunk with at most `map_concurrency` calls in flight.
    ///
    /// Notes come back in chunk order regardless of which call finished first, and the future
    /// resolves only once every call has completed or timed out.
    async fn map_chunks(&self, chunks: &[Chunk]) -> Vec<ChunkNote> {
        let summarizer = ChunkSummarizer::new(
            self.client.as_ref(),
            &self.settings.map_model,
            self.settings.call_timeout,
        );
        let summarizer = &summarizer;
        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| summarizer.summarize(chunk))
            .collect();
        stream::iter(calls)
            .buffered(self.settings.map_concurrency.max(1))
            .collect()
            .await
    }
}

/// Join non-empty notes in chunk order, separated by a blank line.
pub fn combine_notes(notes: &[ChunkNote]) -> String {
    notes
        .iter()
        .filter(|note| !note.is_empty())
        .map(|note| note.text.as_str())
        .collect::<Vec<_>>()
        .join(NOTE_SEPARATOR)
}

/// Abstraction over the study guide service used by the HTTP surface.
#[async_trait]
pub trait StudyGuideApi: Send + Sync {
    /// Store an uploaded file and return its identifier.
    async fn store_upload(&self, file_name: &str, bytes: Vec<u8>)
    -> Result<String, ProcessingError>;

    /// Run the pipeline on a stored file.
    async fn analyze(&self, file_name: &str) -> Result<StudyGuide, ProcessingError>;

    /// Forward a message list verbatim to the chat model.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates upload storage, the pipeline, and the chat passthrough.
///
/// Construct the service once near process start and share it through an `Arc`.
pub struct StudyGuideService {
    pipeline: StudyGuidePipeline,
    store: UploadStore,
    chat_model: String,
    metrics: Arc<PipelineMetrics>,
}

impl StudyGuideService {
    /// Build the production service: OpenAI-compatible client, `lopdf` reader, filesystem store.
    pub fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        let client = OpenAiCompatibleClient::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            config.llm_timeout(),
        )
        .map_err(|error| ProcessingError::InvalidConfiguration(error.to_string()))?;
        tracing::info!(base_url = %config.llm_base_url, "LLM client initialized");

        let pipeline = StudyGuidePipeline::new(
            Arc::new(client),
            Arc::new(PdfTextExtractor),
            config.pipeline_settings(),
        );
        Ok(Self::new(
            pipeline,
            UploadStore::new(config.upload_dir.clone()),
            config.chat_model.clone(),
        ))
    }

    /// Assemble a service from an existing pipeline and store.
    pub fn new(pipeline: StudyGuidePipeline, store: UploadStore, chat_model: String) -> Self {
        Self {
            pipeline,
            store,
            chat_model,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Pipeline used for analysis requests.
    pub fn pipeline(&self) -> &StudyGuidePipeline {
        &self.pipeline
    }

    async fn analyze_stored(&self, file_name: &str) -> Result<StudyGuide, ProcessingError> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(ProcessingError::InvalidConfiguration(
                "file_name is required".into(),
            ));
        }
        let path = self
            .store
            .resolve(file_name)
            .await?
            .ok_or_else(|| ProcessingError::DocumentNotFound(file_name.to_string()))?;
        self.pipeline.run(&path).await
    }
}

#[async_trait]
impl StudyGuideApi for StudyGuideService {
    async fn store_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ProcessingError> {
        Ok(self.store.save(file_name, &bytes).await?)
    }

    async fn analyze(&self, file_name: &str) -> Result<StudyGuide, ProcessingError> {
        let span = tracing::info_span!("analyze", request_id = %Uuid::new_v4(), file = file_name);
        async {
            tracing::info!("Processing document");
            match self.analyze_stored(file_name).await {
                Ok(guide) => {
                    let summarized = guide.chunk_count - guide.failed_chunks;
                    self.metrics
                        .record_document(summarized as u64, guide.failed_chunks as u64);
                    tracing::info!(
                        strategy = ?guide.strategy,
                        chunks = guide.chunk_count,
                        failed_chunks = guide.failed_chunks,
                        html_chars = guide.html.len(),
                        "Study guide generated"
                    );
                    Ok(guide)
                }
                Err(error) => {
                    self.metrics.record_failure();
                    tracing::warn!(error = %error, "Study guide generation failed");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage, ProcessingError> {
        if messages.is_empty() {
            return Err(ProcessingError::InvalidConfiguration(
                "messages must not be empty".into(),
            ));
        }
        tracing::info!(messages = messages.len(), model = %self.chat_model, "Forwarding chat");
        complete_with_timeout(
            self.pipeline.client.as_ref(),
            &self.chat_model,
            messages,
            self.pipeline.settings.call_timeout,
        )
        .await
        .map_err(ProcessingError::Chat)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClientError, Role};
    use crate::processing::map::EXTRACTION_PROMPT;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const MAP_MODEL: &str = "map-model";
    const REDUCE_MODEL: &str = "reduce-model";

    #[derive(Clone, Copy)]
    enum MapBehavior {
        /// Reply `note-<first char>`, finishing later chunks first.
        Echo,
        Fail,
        Hang,
    }

    struct ScriptedClient {
        map: MapBehavior,
        compose_reply: Option<&'static str>,
        calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(map: MapBehavior, compose_reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                map,
                compose_reply,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls_for(&self, model: &str) -> Vec<Vec<ChatMessage>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(called, _)| called == model)
                .map(|(_, messages)| messages.clone())
                .collect()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    fn assistant(content: impl Into<String>) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
        ) -> Result<ChatMessage, LlmClientError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), messages.clone()));

            if model != MAP_MODEL {
                return match self.compose_reply {
                    Some(reply) => Ok(assistant(reply)),
                    None => Err(LlmClientError::Transport("reduce unreachable".into())),
                };
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            let result = match self.map {
                MapBehavior::Echo => {
                    let first = messages[1].content.chars().next().unwrap_or('a');
                    let rank = (first as u64).saturating_sub('a' as u64);
                    tokio::time::sleep(Duration::from_millis(80u64.saturating_sub(rank * 10)))
                        .await;
                    Ok(assistant(format!("note-{first}")))
                }
                MapBehavior::Fail => Err(LlmClientError::InvalidResponse("garbled".into())),
                MapBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(assistant("too late"))
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    struct FixedPages(Vec<String>);

    impl TextExtractor for FixedPages {
        fn read_pages(&self, _path: &Path) -> Result<Vec<String>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            map_model: MAP_MODEL.into(),
            reduce_model: REDUCE_MODEL.into(),
            call_timeout: Duration::from_secs(5),
            ..PipelineSettings::default()
        }
    }

    fn pipeline(client: Arc<ScriptedClient>, pages: Vec<String>) -> StudyGuidePipeline {
        StudyGuidePipeline::new(client, Arc::new(FixedPages(pages)), settings())
    }

    /// 10,000 characters in 100-character blocks lettered a..z, no sentence terminators.
    fn lettered_document() -> String {
        (0..100)
            .map(|block| {
                let letter = char::from(b'a' + (block % 26) as u8);
                letter.to_string().repeat(100)
            })
            .collect()
    }

    #[tokio::test]
    async fn short_document_is_composed_directly() {
        let client = ScriptedClient::new(MapBehavior::Echo, Some("```html\n<h1>Guide</h1>\n```"));
        let text = "Short lecture notes. ".repeat(25);
        let pipeline = pipeline(client.clone(), vec![text.clone()]);

        let guide = pipeline.run(Path::new("short.pdf")).await.expect("guide");

        assert_eq!(guide.html, "<h1>Guide</h1>");
        assert_eq!(guide.strategy, Strategy::Short);
        assert_eq!(guide.chunk_count, 0);
        assert_eq!(client.total_calls(), 1);
        let compose = client.calls_for(REDUCE_MODEL);
        assert_eq!(compose[0][1], ChatMessage::user(text));
    }

    #[tokio::test]
    async fn long_document_maps_chunks_and_keeps_document_order() {
        let client = ScriptedClient::new(MapBehavior::Echo, Some("<h1>Guide</h1>"));
        let pipeline = pipeline(client.clone(), vec![lettered_document()]);

        let guide = pipeline.run(Path::new("long.pdf")).await.expect("guide");

        assert_eq!(guide.strategy, Strategy::Long);
        assert_eq!(guide.chunk_count, 4);
        assert_eq!(guide.failed_chunks, 0);

        let map_calls = client.calls_for(MAP_MODEL);
        assert_eq!(map_calls.len(), 4);
        assert!(map_calls
            .iter()
            .all(|messages| messages[0] == ChatMessage::system(EXTRACTION_PROMPT)));

        let compose = client.calls_for(REDUCE_MODEL);
        assert_eq!(compose.len(), 1);
        assert_eq!(compose[0][1].content, "note-a\n\nnote-c\n\nnote-e\n\nnote-g");
    }

    #[tokio::test]
    async fn failed_chunks_still_reach_compose_with_empty_notes() {
        let client = ScriptedClient::new(MapBehavior::Fail, Some("<h1>Partial</h1>"));
        let pipeline = pipeline(client.clone(), vec![lettered_document()]);

        let guide = pipeline.run(Path::new("long.pdf")).await.expect("guide");

        assert_eq!(guide.failed_chunks, 4);
        assert_eq!(guide.html, "<h1>Partial</h1>");
        let compose = client.calls_for(REDUCE_MODEL);
        assert_eq!(compose.len(), 1);
        assert_eq!(compose[0][1].content, "");
    }

    #[tokio::test]
    async fn blank_extraction_fails_without_remote_calls() {
        let client = ScriptedClient::new(MapBehavior::Echo, Some("<h1>Guide</h1>"));
        let pipeline = pipeline(client.clone(), vec![String::new(), "  \n".into()]);

        let error = pipeline
            .run(Path::new("scan.pdf"))
            .await
            .expect_err("no text");

        assert!(matches!(error, ProcessingError::Extraction(ExtractionError::NoText)));
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn compose_failure_fails_the_request() {
        let client = ScriptedClient::new(MapBehavior::Echo, None);
        let pipeline = pipeline(client.clone(), vec![lettered_document()]);

        let error = pipeline
            .run(Path::new("long.pdf"))
            .await
            .expect_err("compose failure");

        assert!(matches!(error, ProcessingError::Compose(_)));
        assert_eq!(client.calls_for(MAP_MODEL).len(), 4);
    }

    #[tokio::test]
    async fn map_phase_respects_concurrency_limit() {
        let client = ScriptedClient::new(MapBehavior::Echo, Some("<h1>Guide</h1>"));
        let settings = PipelineSettings {
            chunk_size: 500,
            chunk_overlap: 50,
            short_document_threshold: 500,
            map_concurrency: 3,
            ..settings()
        };
        let pipeline = StudyGuidePipeline::new(
            client.clone(),
            Arc::new(FixedPages(vec![lettered_document()])),
            settings,
        );

        let guide = pipeline.run(Path::new("long.pdf")).await.expect("guide");

        assert!(guide.chunk_count > 3);
        let peak = client.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2, "map calls should overlap, peak {peak}");
    }

    #[tokio::test]
    async fn hung_map_calls_time_out_and_degrade() {
        let client = ScriptedClient::new(MapBehavior::Hang, Some("<h1>Guide</h1>"));
        let settings = PipelineSettings {
            call_timeout: Duration::from_millis(50),
            ..settings()
        };
        let pipeline = StudyGuidePipeline::new(
            client.clone(),
            Arc::new(FixedPages(vec![lettered_document()])),
            settings,
        );

        let guide = pipeline.run(Path::new("long.pdf")).await.expect("guide");

        assert_eq!(guide.failed_chunks, guide.chunk_count);
        assert_eq!(client.calls_for(REDUCE_MODEL).len(), 1);
    }

    #[test]
    fn combine_notes_skips_empty_and_preserves_order() {
        let notes = vec![
            ChunkNote {
                index: 0,
                text: "first".into(),
            },
            ChunkNote {
                index: 1,
                text: "  ".into(),
            },
            ChunkNote {
                index: 2,
                text: "third".into(),
            },
        ];
        assert_eq!(combine_notes(&notes), "first\n\nthird");
        assert_eq!(combine_notes(&[]), "");
    }

    fn service_with(
        client: Arc<ScriptedClient>,
        pages: Vec<String>,
        root: &Path,
    ) -> StudyGuideService {
        StudyGuideService::new(
            pipeline(client, pages),
            UploadStore::new(root),
            "chat-model".into(),
        )
    }

    #[tokio::test]
    async fn service_analyzes_uploaded_file_and_records_metrics() {
        let dir = tempfile::tempdir().expect("temp dir");
        let client = ScriptedClient::new(MapBehavior::Fail, Some("<h1>Guide</h1>"));
        let service = service_with(client, vec![lettered_document()], dir.path());

        let identifier = service
            .store_upload("lecture.pdf", b"%PDF".to_vec())
            .await
            .expect("stored");
        let guide = service.analyze(&identifier).await.expect("guide");

        assert_eq!(guide.html, "<h1>Guide</h1>");
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_processed, 1);
        assert_eq!(snapshot.chunk_failures, 4);
        assert_eq!(snapshot.chunks_summarized, 0);
    }

    #[tokio::test]
    async fn service_rejects_missing_and_unknown_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let client = ScriptedClient::new(MapBehavior::Echo, Some("<h1>Guide</h1>"));
        let service = service_with(client.clone(), vec!["text".into()], dir.path());

        let error = service.analyze("  ").await.expect_err("blank name");
        assert!(matches!(error, ProcessingError::InvalidConfiguration(_)));

        let error = service.analyze("absent.pdf").await.expect_err("unknown file");
        assert!(matches!(error, ProcessingError::DocumentNotFound(name) if name == "absent.pdf"));

        assert_eq!(client.total_calls(), 0);
        assert_eq!(service.metrics_snapshot().documents_failed, 2);
    }

    #[tokio::test]
    async fn chat_forwards_messages_verbatim() {
        let dir = tempfile::tempdir().expect("temp dir");
        let client = ScriptedClient::new(MapBehavior::Echo, Some("Hello back"));
        let service = service_with(client.clone(), Vec::new(), dir.path());
        let messages = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hello"),
        ];

        let reply = service.chat(messages.clone()).await.expect("reply");

        assert_eq!(reply, assistant("Hello back"));
        assert_eq!(client.calls_for("chat-model"), vec![messages]);

        let error = service.chat(Vec::new()).await.expect_err("empty list");
        assert!(matches!(error, ProcessingError::InvalidConfiguration(_)));
    }
}

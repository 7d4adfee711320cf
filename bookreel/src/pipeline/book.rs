//! Whole-book orchestration.
//!
//! Chunks run strictly one after another, in index order. A failed chunk is
//! skipped and the book continues; the final video joins the successful
//! chunks in index order, and their narrations become the audiobook.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::chunk::ChunkPipeline;
use super::failure::{FailureCollector, SkippedChunk};
use crate::chunking::{split_into_chunks, DEFAULT_CHUNK_SIZE};
use crate::cleanup::{CleanupFailure, CleanupRegistry};
use crate::config::BookreelConfig;
use crate::errors::{BookreelError, Result};
use crate::events::{event_data, EventSink, NoOpEventSink};
use crate::observability::{book_span, chunk_span};
use crate::ports::Capabilities;
use crate::retry::{Operation, RetryGovernor, RetryOutcome};

/// Outcome of a book run that produced a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookReport {
    /// Unique id of this run.
    pub run_id: String,
    /// Book title.
    pub title: String,
    /// Concatenated video.
    pub final_video: PathBuf,
    /// Concatenated narration, unless joining the audio failed.
    pub final_audio: Option<PathBuf>,
    /// Number of chunks the text was split into.
    pub total_chunks: usize,
    /// Indices of chunks included in the video, ascending.
    pub completed: Vec<usize>,
    /// Chunks left out of the video.
    pub skipped: Vec<SkippedChunk>,
    /// Fraction of chunks that made it into the video.
    pub success_rate: f64,
    /// Intermediate files that could not be removed.
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl BookReport {
    /// Returns true when no chunk was skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Indices of skipped chunks, ascending.
    #[must_use]
    pub fn skipped_indices(&self) -> Vec<usize> {
        self.skipped.iter().map(|s| s.index).collect()
    }
}

/// Drives the chunk pipeline over a whole book.
#[derive(Clone)]
pub struct BookOrchestrator {
    pipeline: ChunkPipeline,
    capabilities: Capabilities,
    governor: RetryGovernor,
    chunk_size: usize,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for BookOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookOrchestrator")
            .field("pipeline", &self.pipeline)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl BookOrchestrator {
    /// Creates an orchestrator writing into `work_dir`.
    #[must_use]
    pub fn new(
        capabilities: Capabilities,
        governor: RetryGovernor,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline: ChunkPipeline::new(capabilities.clone(), governor.clone(), work_dir),
            capabilities,
            governor,
            chunk_size: DEFAULT_CHUNK_SIZE,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Builds an orchestrator from configuration.
    ///
    /// The event sink receives `retry.*`, `stage.*` and `book.*` events.
    #[must_use]
    pub fn from_config(
        config: &BookreelConfig,
        capabilities: Capabilities,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let governor = RetryGovernor::new(config.retry.clone()).with_event_sink(events.clone());
        Self::new(capabilities, governor, &config.work_dir)
            .with_chunk_size(config.chunk_size)
            .with_event_sink(events)
    }

    /// Sets the chunk size in characters.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the sink for `stage.*` and `book.*` events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.pipeline = self.pipeline.with_event_sink(events.clone());
        self.events = events;
        self
    }

    /// Returns the working directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.pipeline.work_dir()
    }

    /// Converts `text` into a video.
    ///
    /// # Errors
    ///
    /// - [`BookreelError::InvalidChunkSize`] if the chunk size is zero.
    /// - [`BookreelError::NothingToAssemble`] if the text is empty or every
    ///   chunk failed; no concatenation is attempted.
    /// - [`BookreelError::Compositor`] if concatenation fails.
    /// - [`BookreelError::Io`] if the working directory cannot be created.
    pub async fn run(&self, text: &str, title: &str) -> Result<BookReport> {
        let run_id = Uuid::new_v4().to_string();
        self.run_with_id(run_id.clone(), text, title)
            .instrument(book_span(&run_id, title))
            .await
    }

    /// Fetches the text from `locator`, saves a copy, then runs the book.
    ///
    /// # Errors
    ///
    /// Returns [`BookreelError::Source`] if fetching fails or gives up on
    /// capacity errors, plus everything [`run`](Self::run) returns.
    pub async fn run_from_source(&self, locator: &str, title: &str) -> Result<BookReport> {
        let layout = self.pipeline.layout(title);
        layout.prepare().await?;

        let text = self.fetch(locator).await?;
        tokio::fs::write(layout.source_text_path(), &text).await?;
        info!(
            locator,
            characters = text.chars().count(),
            path = %layout.source_text_path().display(),
            "Saved book text"
        );

        self.run(&text, title).await
    }

    async fn fetch(&self, locator: &str) -> Result<String> {
        let source = &self.capabilities.text_source;
        let operation = Operation::new(format!("fetch {locator}"), move || source.fetch(locator));

        match self.governor.execute(operation).await {
            Ok(RetryOutcome::Success { value, .. }) => Ok(value),
            Ok(RetryOutcome::Exhausted {
                attempts,
                last_error,
            }) => Err(BookreelError::Source(format!(
                "gave up fetching {locator} after {attempts} attempt(s): {last_error}"
            ))),
            Err(failure) => Err(BookreelError::Source(format!(
                "failed to fetch {locator}: {failure}"
            ))),
        }
    }

    async fn run_with_id(&self, run_id: String, text: &str, title: &str) -> Result<BookReport> {
        let chunks = split_into_chunks(text, self.chunk_size)?;
        let total = chunks.len();
        if total == 0 {
            warn!(title, "Book text is empty");
            return Err(BookreelError::NothingToAssemble {
                title: title.to_string(),
                total: 0,
                skipped: 0,
            });
        }

        let layout = self.pipeline.layout(title);
        layout.prepare().await?;

        info!(title, total_chunks = total, chunk_size = self.chunk_size, "Starting book");
        self.emit(
            "book.started",
            serde_json::json!({
                "run_id": run_id,
                "title": title,
                "total_chunks": total,
                "chunk_size": self.chunk_size,
            }),
        )
        .await;

        let mut collector = FailureCollector::new();
        let cleanup = CleanupRegistry::new();
        let mut videos = Vec::with_capacity(total);
        let mut narrations = Vec::with_capacity(total);

        for chunk in &chunks {
            let index = chunk.index();
            info!("Processing chunk {}/{}", index, total);

            match self
                .pipeline
                .process(chunk, title)
                .instrument(chunk_span(index, total))
                .await
            {
                Ok(artifacts) => {
                    if let Some(video) = artifacts.video() {
                        videos.push(video.to_path_buf());
                    }
                    if let Some(audio) = artifacts.audio() {
                        narrations.push(audio.to_path_buf());
                    }
                    cleanup.register_all(artifacts.paths());
                    collector.record_completion(index);
                    self.emit(
                        "book.chunk_completed",
                        serde_json::json!({"run_id": run_id, "chunk": index}),
                    )
                    .await;
                }
                Err(failure) => {
                    warn!(
                        chunk = index,
                        stage = %failure.stage,
                        kind = failure.kind.as_str(),
                        error = %failure.kind,
                        "Skipping chunk"
                    );
                    self.emit(
                        "book.chunk_skipped",
                        serde_json::json!({
                            "run_id": run_id,
                            "chunk": index,
                            "stage": failure.stage.as_str(),
                            "kind": failure.kind.as_str(),
                            "error": failure.kind.to_string(),
                        }),
                    )
                    .await;
                    collector.record_failure(SkippedChunk::new(index, failure.stage, failure.kind));
                }
            }
        }

        let success_rate = collector.success_rate(total);
        let (completed, skipped) = collector.into_parts();
        if videos.is_empty() {
            warn!(title, total_chunks = total, "No chunk produced a video");
            self.emit(
                "book.failed",
                serde_json::json!({
                    "run_id": run_id,
                    "reason": "nothing_to_assemble",
                    "skipped": skipped.len(),
                }),
            )
            .await;
            return Err(BookreelError::NothingToAssemble {
                title: title.to_string(),
                total,
                skipped: skipped.len(),
            });
        }

        let final_video = layout.final_video_path();
        info!(
            parts = videos.len(),
            path = %final_video.display(),
            "Concatenating chunk videos"
        );
        let final_video = self
            .capabilities
            .video_compositor
            .concatenate(&videos, &final_video)
            .await
            .map_err(BookreelError::Compositor)?;

        let final_audio = self
            .join_narrations(&run_id, &narrations, &layout.final_audio_path())
            .await;
        let cleanup_failures = cleanup.run_all().await;

        info!(
            completed = completed.len(),
            skipped = skipped.len(),
            path = %final_video.display(),
            "Book complete"
        );
        self.emit(
            "book.completed",
            serde_json::json!({
                "run_id": run_id,
                "final_video": final_video.display().to_string(),
                "final_audio": final_audio.as_ref().map(|p| p.display().to_string()),
                "completed": completed,
                "skipped": skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
                "cleanup_failures": cleanup_failures.len(),
            }),
        )
        .await;

        Ok(BookReport {
            run_id,
            title: title.to_string(),
            final_video,
            final_audio,
            total_chunks: total,
            completed,
            skipped,
            success_rate,
            cleanup_failures,
        })
    }

    /// Joins the narrations into the audiobook. A failure here leaves the
    /// finished video intact and is reported as a missing audiobook.
    async fn join_narrations(&self, run_id: &str, parts: &[PathBuf], dest: &Path) -> Option<PathBuf> {
        info!(parts = parts.len(), path = %dest.display(), "Joining narrations");
        match self
            .capabilities
            .video_compositor
            .concatenate_audio(parts, dest)
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, path = %dest.display(), "Could not join narrations");
                self.emit(
                    "book.audio_failed",
                    serde_json::json!({"run_id": run_id, "error": e.to_string()}),
                )
                .await;
                None
            }
        }
    }

    async fn emit(&self, event_type: &str, fields: serde_json::Value) {
        self.events.emit(event_type, Some(event_data(fields))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::layout::WorkspaceLayout;
    use crate::pipeline::PipelineStage;
    use crate::retry::RetryPolicy;
    use crate::testing::{
        assert_completed_chunks, assert_event_order, assert_skipped_chunks, sample_book,
        sample_book_with_markers, FakeCall, FakeStudio, RecordingSleeper, INAUDIBLE_MARKER,
    };
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    const CHUNK: usize = 100;

    fn orchestrator(
        studio: &Arc<FakeStudio>,
        dir: &Path,
    ) -> (BookOrchestrator, Arc<CollectingEventSink>) {
        let events = Arc::new(CollectingEventSink::new());
        let governor = RetryGovernor::new(RetryPolicy::new().with_max_attempts(2))
            .with_sleeper(Arc::new(RecordingSleeper::new()))
            .with_event_sink(events.clone());
        let orchestrator = BookOrchestrator::new(studio.capabilities(), governor, dir)
            .with_chunk_size(CHUNK)
            .with_event_sink(events.clone());
        (orchestrator, events)
    }

    #[tokio::test]
    async fn test_failed_chunk_is_omitted_and_order_kept() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new());
        let (orchestrator, events) = orchestrator(&studio, dir.path());
        let layout = WorkspaceLayout::new(dir.path(), "Emma");

        // Chunk 3 gets through Illustrate and Narrate, then fails at Caption.
        let text = sample_book_with_markers(5, CHUNK, &[(3, INAUDIBLE_MARKER)]);
        let report = orchestrator.run(&text, "Emma").await.unwrap();

        assert_completed_chunks(&report, &[1, 2, 4, 5]);
        assert_skipped_chunks(&report, &[3]);
        assert_eq!(report.skipped[0].stage, PipelineStage::Caption);
        assert_eq!(report.total_chunks, 5);
        assert!((report.success_rate - 0.8).abs() < 1e-9);

        let parts: Vec<PathBuf> = [1, 2, 4, 5]
            .into_iter()
            .map(|i| layout.chunk_video_path(i))
            .collect();
        assert_eq!(studio.concatenated(), vec![parts]);
        assert_eq!(report.final_video, layout.final_video_path());
        assert_eq!(
            std::fs::read_to_string(&report.final_video).unwrap(),
            "chapter_1.mp4\nchapter_2.mp4\nchapter_4.mp4\nchapter_5.mp4"
        );

        let narrations: Vec<PathBuf> = [1, 2, 4, 5]
            .into_iter()
            .map(|i| layout.audio_path(i))
            .collect();
        assert_eq!(studio.audio_concatenated(), vec![narrations]);
        assert_eq!(report.final_audio, Some(layout.final_audio_path()));
        assert!(layout.final_audio_path().exists());

        for i in [1, 2, 4, 5] {
            assert!(layout.chunk_files(i).iter().all(|p| !p.exists()), "chunk {i} left files");
        }
        assert!(layout.image_path(3).exists());
        assert!(layout.audio_path(3).exists());
        assert!(!layout.captions_path(3).exists());
        assert!(report.cleanup_failures.is_empty());

        assert_eq!(events.count("book.chunk_skipped"), 1);
        assert_event_order(
            &events,
            &["book.started", "book.chunk_completed", "book.chunk_skipped", "book.completed"],
        );
    }

    #[tokio::test]
    async fn test_audiobook_failure_keeps_the_video() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new().with_hard_failure(FakeCall::ConcatenateAudio));
        let (orchestrator, events) = orchestrator(&studio, dir.path());

        let report = assert_ok!(orchestrator.run(&sample_book(2, CHUNK, &[]), "Emma").await);

        assert!(report.final_video.exists());
        assert_eq!(report.final_audio, None);
        assert_eq!(events.count("book.audio_failed"), 1);
        assert_event_order(&events, &["book.audio_failed", "book.completed"]);
        let layout = WorkspaceLayout::new(dir.path(), "Emma");
        assert!(!layout.audio_path(1).exists());
    }

    #[tokio::test]
    async fn test_partial_files_of_failed_chunks_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new().with_hard_failure(FakeCall::Compose));
        let (orchestrator, _) = orchestrator(&studio, dir.path());

        let err = orchestrator
            .run(&sample_book(2, CHUNK, &[]), "Emma")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BookreelError::NothingToAssemble { total: 2, skipped: 2, .. }
        ));
        assert_eq!(studio.call_count(FakeCall::Concatenate), 0);
        assert_eq!(studio.call_count(FakeCall::ConcatenateAudio), 0);
        let layout = WorkspaceLayout::new(dir.path(), "Emma");
        assert!(layout.audio_path(1).exists());
    }

    #[tokio::test]
    async fn test_empty_text_has_nothing_to_assemble() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new());
        let (orchestrator, _) = orchestrator(&studio, dir.path());

        let err = orchestrator.run("", "Emma").await.unwrap_err();

        assert!(matches!(
            err,
            BookreelError::NothingToAssemble { total: 0, skipped: 0, .. }
        ));
        assert!(studio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_soft_failures_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // Two attempts per call: chunk 1 exhausts narration, chunk 2 succeeds.
        let studio = Arc::new(FakeStudio::new().with_capacity_failures(FakeCall::Synthesize, 2));
        let (orchestrator, events) = orchestrator(&studio, dir.path());

        let report = orchestrator
            .run(&sample_book(2, CHUNK, &[]), "Emma")
            .await
            .unwrap();

        assert_completed_chunks(&report, &[2]);
        assert!(report.skipped[0].failure.is_soft());
        assert_eq!(events.count("retry.exhausted"), 1);
    }

    #[tokio::test]
    async fn test_compositor_failure_on_concatenation_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new().with_hard_failure(FakeCall::Concatenate));
        let (orchestrator, _) = orchestrator(&studio, dir.path());

        let err = assert_err!(orchestrator.run(&sample_book(1, CHUNK, &[]), "Emma").await);

        assert!(matches!(err, BookreelError::Compositor(_)));
    }

    #[tokio::test]
    async fn test_run_from_source_saves_text() {
        let dir = tempfile::tempdir().unwrap();
        let text = sample_book(2, CHUNK, &[]);
        let studio = Arc::new(
            FakeStudio::new()
                .with_book_text(text.clone())
                .with_capacity_failures(FakeCall::Fetch, 1),
        );
        let (orchestrator, _) = orchestrator(&studio, dir.path());

        let report = assert_ok!(
            orchestrator
                .run_from_source("https://www.gutenberg.org/ebooks/158.txt.utf-8", "Emma")
                .await
        );

        assert!(report.is_complete());
        assert_eq!(studio.call_count(FakeCall::Fetch), 2);
        let saved = WorkspaceLayout::new(dir.path(), "Emma").source_text_path();
        assert_eq!(std::fs::read_to_string(saved).unwrap(), text);
    }

    #[tokio::test]
    async fn test_run_from_source_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let studio = Arc::new(FakeStudio::new().with_hard_failure(FakeCall::Fetch));
        let (orchestrator, _) = orchestrator(&studio, dir.path());

        let err = orchestrator.run_from_source("missing", "Emma").await.unwrap_err();

        assert!(matches!(err, BookreelError::Source(_)));
        assert_eq!(studio.call_count(FakeCall::Analyze), 0);
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = BookreelConfig::new()
            .with_work_dir(dir.path())
            .with_chunk_size(CHUNK);
        let studio = Arc::new(FakeStudio::new());
        let events = Arc::new(CollectingEventSink::new());

        let orchestrator =
            BookOrchestrator::from_config(&config, studio.capabilities(), events.clone());
        let report = orchestrator
            .run(&sample_book(3, CHUNK, &[]), "Emma")
            .await
            .unwrap();

        assert_eq!(orchestrator.work_dir(), dir.path());
        assert_eq!(report.completed, vec![1, 2, 3]);
        assert_eq!(events.count("retry.succeeded"), 15);
    }
}

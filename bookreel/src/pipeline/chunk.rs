//! Per-chunk pipeline: Analyze, Illustrate, Narrate, Caption, Assemble.
//!
//! Every external call goes through the [`RetryGovernor`]. The first failing
//! stage aborts the chunk; later stages are never invoked.

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::failure::{FailureKind, PipelineStage};
use crate::chunking::Chunk;
use crate::cost::{
    analysis_input_tokens, estimate_tokens, image_prompt_tokens, ANALYSIS_MAX_OUTPUT_TOKENS,
};
use crate::events::{event_data, EventSink, NoOpEventSink};
use crate::layout::WorkspaceLayout;
use crate::observability::SpanTimer;
use crate::ports::{Capabilities, CompositionRequest};
use crate::retry::{Operation, RetryGovernor};
use crate::scene::SceneAnalysis;
use crate::subtitles::{format_srt, parse_srt, CaptionSegment};

/// Files produced for one chunk. Each path is set at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkArtifacts {
    index: usize,
    image: Option<PathBuf>,
    audio: Option<PathBuf>,
    captions: Option<PathBuf>,
    video: Option<PathBuf>,
}

impl ChunkArtifacts {
    /// Creates an empty set for chunk `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Chunk index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Generated illustration.
    #[must_use]
    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    /// Narration audio.
    #[must_use]
    pub fn audio(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    /// Caption file.
    #[must_use]
    pub fn captions(&self) -> Option<&Path> {
        self.captions.as_deref()
    }

    /// Chunk video.
    #[must_use]
    pub fn video(&self) -> Option<&Path> {
        self.video.as_deref()
    }

    /// Records the illustration.
    pub fn set_image(&mut self, path: PathBuf) {
        Self::set_once(self.index, "image", &mut self.image, path);
    }

    /// Records the narration.
    pub fn set_audio(&mut self, path: PathBuf) {
        Self::set_once(self.index, "audio", &mut self.audio, path);
    }

    /// Records the captions.
    pub fn set_captions(&mut self, path: PathBuf) {
        Self::set_once(self.index, "captions", &mut self.captions, path);
    }

    /// Records the chunk video.
    pub fn set_video(&mut self, path: PathBuf) {
        Self::set_once(self.index, "video", &mut self.video, path);
    }

    /// Every file recorded so far.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        [&self.image, &self.audio, &self.captions, &self.video]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn set_once(index: usize, kind: &str, slot: &mut Option<PathBuf>, path: PathBuf) {
        if let Some(existing) = slot {
            warn!(
                chunk = index,
                artifact = kind,
                existing = %existing.display(),
                ignored = %path.display(),
                "Artifact already set"
            );
            return;
        }
        *slot = Some(path);
    }
}

/// A chunk that stopped at a failing stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Chunk {index} failed at {stage}: {kind}")]
pub struct ChunkFailure {
    /// Chunk index.
    pub index: usize,
    /// Stage that failed.
    pub stage: PipelineStage,
    /// Failure details.
    pub kind: FailureKind,
    /// Files produced before the failure.
    pub artifacts: ChunkArtifacts,
}

type StageResult<T> = Result<T, (PipelineStage, FailureKind)>;

/// Runs the five stages for one chunk.
#[derive(Clone)]
pub struct ChunkPipeline {
    capabilities: Capabilities,
    governor: RetryGovernor,
    work_dir: PathBuf,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ChunkPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPipeline")
            .field("governor", &self.governor)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl ChunkPipeline {
    /// Creates a pipeline writing into `work_dir`.
    #[must_use]
    pub fn new(
        capabilities: Capabilities,
        governor: RetryGovernor,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            capabilities,
            governor,
            work_dir: work_dir.into(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink for `stage.*` events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the working directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// File layout for a book title.
    #[must_use]
    pub fn layout(&self, title: &str) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.work_dir, title)
    }

    /// Runs every stage for `chunk`, stopping at the first failure.
    ///
    /// The image directory must already exist (see [`WorkspaceLayout::prepare`]).
    ///
    /// # Errors
    ///
    /// Returns [`ChunkFailure`] naming the failed stage. Files produced by
    /// earlier stages are listed in its `artifacts`.
    pub async fn process(&self, chunk: &Chunk, title: &str) -> Result<ChunkArtifacts, ChunkFailure> {
        let layout = self.layout(title);
        let mut artifacts = ChunkArtifacts::new(chunk.index());

        match self.run_stages(chunk, title, &layout, &mut artifacts).await {
            Ok(()) => Ok(artifacts),
            Err((stage, kind)) => Err(ChunkFailure {
                index: chunk.index(),
                stage,
                kind,
                artifacts,
            }),
        }
    }

    async fn run_stages(
        &self,
        chunk: &Chunk,
        title: &str,
        layout: &WorkspaceLayout,
        artifacts: &mut ChunkArtifacts,
    ) -> StageResult<()> {
        let index = chunk.index();

        let analysis = self
            .stage(index, PipelineStage::Analyze, self.analyze(chunk, title))
            .await?;

        let image = self
            .stage(
                index,
                PipelineStage::Illustrate,
                self.illustrate(index, &analysis, title, layout.image_path(index)),
            )
            .await?;
        artifacts.set_image(image.clone());

        let audio = self
            .stage(
                index,
                PipelineStage::Narrate,
                self.narrate(chunk, layout.audio_path(index)),
            )
            .await?;
        artifacts.set_audio(audio.clone());

        let (captions, segments) = self
            .stage(
                index,
                PipelineStage::Caption,
                self.caption(index, &audio, layout.captions_path(index)),
            )
            .await?;
        artifacts.set_captions(captions.clone());

        let request = CompositionRequest {
            background_image: image,
            audio,
            captions,
            segments,
            title: format!("{title} - Part {index}"),
            output: layout.chunk_video_path(index),
        };
        let video = self
            .stage(index, PipelineStage::Assemble, self.assemble(index, &request))
            .await?;
        artifacts.set_video(video);

        Ok(())
    }

    async fn stage<T>(
        &self,
        index: usize,
        stage: PipelineStage,
        work: impl Future<Output = Result<T, FailureKind>>,
    ) -> StageResult<T> {
        debug!(chunk = index, stage = %stage, "Stage started");
        self.events
            .emit(
                "stage.started",
                Some(event_data(serde_json::json!({
                    "chunk": index,
                    "stage": stage.as_str(),
                }))),
            )
            .await;
        let timer = SpanTimer::start();

        match work.await {
            Ok(value) => {
                let duration_ms = timer.finish();
                info!(chunk = index, stage = %stage, duration_ms, "Stage completed");
                self.events
                    .emit(
                        "stage.completed",
                        Some(event_data(serde_json::json!({
                            "chunk": index,
                            "stage": stage.as_str(),
                            "duration_ms": duration_ms,
                        }))),
                    )
                    .await;
                Ok(value)
            }
            Err(kind) => {
                warn!(
                    chunk = index,
                    stage = %stage,
                    kind = kind.as_str(),
                    error = %kind,
                    "Stage failed"
                );
                self.events
                    .emit(
                        "stage.failed",
                        Some(event_data(serde_json::json!({
                            "chunk": index,
                            "stage": stage.as_str(),
                            "kind": kind.as_str(),
                            "error": kind.to_string(),
                        }))),
                    )
                    .await;
                Err((stage, kind))
            }
        }
    }

    async fn analyze(&self, chunk: &Chunk, title: &str) -> Result<SceneAnalysis, FailureKind> {
        let analyzer = &self.capabilities.scene_analyzer;
        let text = chunk.text();
        let operation = Operation::new(format!("scene analysis for chunk {}", chunk.index()), move || {
            analyzer.analyze(title, text)
        })
        .with_estimated_tokens(analysis_input_tokens(text) + ANALYSIS_MAX_OUTPUT_TOKENS);

        let reply = FailureKind::from_governed(self.governor.execute(operation).await)?;
        SceneAnalysis::from_json(&reply).map_err(FailureKind::parse)
    }

    async fn illustrate(
        &self,
        index: usize,
        analysis: &SceneAnalysis,
        title: &str,
        dest: PathBuf,
    ) -> Result<PathBuf, FailureKind> {
        let prompt = analysis.image_prompt(title);
        let generator = &self.capabilities.image_generator;
        let (prompt_ref, dest_ref) = (prompt.as_str(), dest.as_path());
        let operation = Operation::new(format!("image generation for chunk {index}"), move || {
            generator.generate(prompt_ref, dest_ref)
        })
        .with_estimated_tokens(image_prompt_tokens(&prompt));

        FailureKind::from_governed(self.governor.execute(operation).await)
    }

    async fn narrate(&self, chunk: &Chunk, dest: PathBuf) -> Result<PathBuf, FailureKind> {
        let synthesizer = &self.capabilities.speech_synthesizer;
        let text = chunk.text();
        let dest_ref = dest.as_path();
        let operation = Operation::new(format!("speech synthesis for chunk {}", chunk.index()), move || {
            synthesizer.synthesize(text, dest_ref)
        })
        .with_estimated_tokens(estimate_tokens(text));

        FailureKind::from_governed(self.governor.execute(operation).await)
    }

    async fn caption(
        &self,
        index: usize,
        audio: &Path,
        dest: PathBuf,
    ) -> Result<(PathBuf, Vec<CaptionSegment>), FailureKind> {
        let transcriber = &self.capabilities.transcriber;
        let operation = Operation::new(format!("transcription for chunk {index}"), move || {
            transcriber.transcribe(audio)
        });

        let srt = FailureKind::from_governed(self.governor.execute(operation).await)?;
        let segments = parse_srt(&srt).map_err(FailureKind::parse)?;
        if segments.is_empty() {
            return Err(FailureKind::parse("transcript contains no captions"));
        }

        tokio::fs::write(&dest, format_srt(&segments))
            .await
            .map_err(|e| FailureKind::io(&e))?;
        Ok((dest, segments))
    }

    async fn assemble(&self, index: usize, request: &CompositionRequest) -> Result<PathBuf, FailureKind> {
        let compositor = &self.capabilities.video_compositor;
        let operation = Operation::new(format!("video composition for chunk {index}"), move || {
            compositor.compose(request)
        });

        let video = FailureKind::from_governed(self.governor.execute(operation).await)?;
        let metadata = tokio::fs::metadata(&video).await.map_err(|e| FailureKind::Io {
            message: format!("video {} not written: {e}", video.display()),
        })?;
        debug!(chunk = index, path = %video.display(), bytes = metadata.len(), "Chunk video written");
        Ok(video)
    }
}

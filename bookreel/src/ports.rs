//! Ports: the external capabilities the pipeline depends on.
//!
//! Each capability is a trait so real adapters (see `providers`) and test
//! fakes (see [`crate::testing`]) are interchangeable. [`Capabilities`] bundles
//! one implementation of each and is constructed once, then passed to the
//! pipelines explicitly.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::CapabilityError;
use crate::subtitles::CaptionSegment;

#[cfg(test)]
use mockall::automock;

/// Provides raw book text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Fetches the text identified by `locator` (a URL or path).
    async fn fetch(&self, locator: &str) -> Result<String, CapabilityError>;
}

/// Analyzes the scene in a chunk of text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    /// Returns the model's raw JSON reply for the chunk.
    async fn analyze(&self, title: &str, text: &str) -> Result<String, CapabilityError>;
}

/// Generates illustrations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates one image for `prompt` and stores it at `dest`.
    async fn generate(&self, prompt: &str, dest: &Path) -> Result<PathBuf, CapabilityError>;
}

/// Synthesizes narration.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Reads `text` aloud into an audio file at `dest`.
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<PathBuf, CapabilityError>;
}

/// Transcribes narration into timed captions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns the transcript of `audio` in SRT format.
    async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError>;
}

/// Everything needed to render one chunk's video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionRequest {
    /// Still background image.
    pub background_image: PathBuf,
    /// Narration track.
    pub audio: PathBuf,
    /// SRT file with the captions.
    pub captions: PathBuf,
    /// Parsed captions.
    pub segments: Vec<CaptionSegment>,
    /// Title shown at the top of the frame.
    pub title: String,
    /// Output video path.
    pub output: PathBuf,
}

/// Renders and joins video files.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    /// Composes image, title, captions and audio into `request.output`.
    async fn compose(&self, request: &CompositionRequest) -> Result<PathBuf, CapabilityError>;

    /// Concatenates the video `parts`, in order, into `dest`.
    async fn concatenate(&self, parts: &[PathBuf], dest: &Path) -> Result<PathBuf, CapabilityError>;

    /// Concatenates the narration `parts`, in order, into one audio file at `dest`.
    async fn concatenate_audio(
        &self,
        parts: &[PathBuf],
        dest: &Path,
    ) -> Result<PathBuf, CapabilityError>;
}

/// One implementation of every capability.
#[derive(Clone)]
pub struct Capabilities {
    /// Book text provider.
    pub text_source: Arc<dyn TextSource>,
    /// Scene analysis model.
    pub scene_analyzer: Arc<dyn SceneAnalyzer>,
    /// Image model.
    pub image_generator: Arc<dyn ImageGenerator>,
    /// Text-to-speech model.
    pub speech_synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Speech-to-text model.
    pub transcriber: Arc<dyn Transcriber>,
    /// Video renderer.
    pub video_compositor: Arc<dyn VideoCompositor>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

impl Capabilities {
    /// Uses one object that implements every model-backed capability.
    ///
    /// Convenient for API clients that serve analysis, images, speech and
    /// transcription from one account.
    #[must_use]
    pub fn from_model_client<M>(
        models: Arc<M>,
        text_source: Arc<dyn TextSource>,
        video_compositor: Arc<dyn VideoCompositor>,
    ) -> Self
    where
        M: SceneAnalyzer + ImageGenerator + SpeechSynthesizer + Transcriber + 'static,
    {
        Self {
            text_source,
            scene_analyzer: models.clone(),
            image_generator: models.clone(),
            speech_synthesizer: models.clone(),
            transcriber: models,
            video_compositor,
        }
    }
}

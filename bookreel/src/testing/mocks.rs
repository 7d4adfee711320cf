//! Fake capabilities for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures::{FAIL_MARKER, INAUDIBLE_MARKER, SAMPLE_ANALYSIS_JSON, SAMPLE_SRT};
use crate::errors::CapabilityError;
use crate::ports::{
    Capabilities, CompositionRequest, ImageGenerator, SceneAnalyzer, SpeechSynthesizer,
    TextSource, Transcriber, VideoCompositor,
};
use crate::retry::Sleeper;

/// A sleeper that records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a new recording sleeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested wait, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Returns the sum of all requested waits.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// A capability call made against a [`FakeStudio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    /// `TextSource::fetch`
    Fetch,
    /// `SceneAnalyzer::analyze`
    Analyze,
    /// `ImageGenerator::generate`
    Generate,
    /// `SpeechSynthesizer::synthesize`
    Synthesize,
    /// `Transcriber::transcribe`
    Transcribe,
    /// `VideoCompositor::compose`
    Compose,
    /// `VideoCompositor::concatenate`
    Concatenate,
    /// `VideoCompositor::concatenate_audio`
    ConcatenateAudio,
}

/// Scripted in-memory implementation of every port.
///
/// Files are really written to the requested paths, so orchestration and
/// cleanup can be checked on disk. By default every call succeeds, except
/// analysis of text containing [`FAIL_MARKER`] and transcription of
/// narration containing [`INAUDIBLE_MARKER`].
#[derive(Debug)]
pub struct FakeStudio {
    book_text: String,
    analysis_reply: String,
    transcript: String,
    calls: Mutex<Vec<FakeCall>>,
    capacity_failures: Mutex<HashMap<FakeCall, u32>>,
    hard_failures: HashSet<FakeCall>,
    concatenated: Mutex<Vec<Vec<PathBuf>>>,
    audio_concatenated: Mutex<Vec<Vec<PathBuf>>>,
}

impl Default for FakeStudio {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStudio {
    /// Creates a studio where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            book_text: String::new(),
            analysis_reply: SAMPLE_ANALYSIS_JSON.to_string(),
            transcript: SAMPLE_SRT.to_string(),
            calls: Mutex::new(Vec::new()),
            capacity_failures: Mutex::new(HashMap::new()),
            hard_failures: HashSet::new(),
            concatenated: Mutex::new(Vec::new()),
            audio_concatenated: Mutex::new(Vec::new()),
        }
    }

    /// Sets the text returned by `fetch`.
    #[must_use]
    pub fn with_book_text(mut self, text: impl Into<String>) -> Self {
        self.book_text = text.into();
        self
    }

    /// Sets the raw reply returned by `analyze`.
    #[must_use]
    pub fn with_analysis_reply(mut self, reply: impl Into<String>) -> Self {
        self.analysis_reply = reply.into();
        self
    }

    /// Sets the SRT returned by `transcribe`.
    #[must_use]
    pub fn with_transcript(mut self, srt: impl Into<String>) -> Self {
        self.transcript = srt.into();
        self
    }

    /// Makes the next `count` calls of `call` fail with a rate limit.
    #[must_use]
    pub fn with_capacity_failures(self, call: FakeCall, count: u32) -> Self {
        self.capacity_failures.lock().insert(call, count);
        self
    }

    /// Makes every call of `call` fail with a non-capacity error.
    #[must_use]
    pub fn with_hard_failure(mut self, call: FakeCall) -> Self {
        self.hard_failures.insert(call);
        self
    }

    /// Wraps the studio as every capability.
    #[must_use]
    pub fn capabilities(self: &Arc<Self>) -> Capabilities {
        Capabilities {
            text_source: self.clone(),
            scene_analyzer: self.clone(),
            image_generator: self.clone(),
            speech_synthesizer: self.clone(),
            transcriber: self.clone(),
            video_compositor: self.clone(),
        }
    }

    /// Returns every call made, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    /// Returns how many times `call` was made.
    #[must_use]
    pub fn call_count(&self, call: FakeCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Returns the part lists passed to `concatenate`.
    #[must_use]
    pub fn concatenated(&self) -> Vec<Vec<PathBuf>> {
        self.concatenated.lock().clone()
    }

    /// Returns the part lists passed to `concatenate_audio`.
    #[must_use]
    pub fn audio_concatenated(&self) -> Vec<Vec<PathBuf>> {
        self.audio_concatenated.lock().clone()
    }

    fn enter(&self, call: FakeCall) -> Result<(), CapabilityError> {
        self.calls.lock().push(call);

        if self.hard_failures.contains(&call) {
            return Err(CapabilityError::other(format!("{call:?} failed")));
        }
        let mut remaining = self.capacity_failures.lock();
        if let Some(left) = remaining.get_mut(&call) {
            if *left > 0 {
                *left -= 1;
                return Err(CapabilityError::rate_limited(format!("{call:?} rate limited")));
            }
        }
        Ok(())
    }
}

async fn write_file(dest: &Path, contents: &[u8]) -> Result<PathBuf, CapabilityError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, contents).await?;
    Ok(dest.to_path_buf())
}

#[async_trait]
impl TextSource for FakeStudio {
    async fn fetch(&self, _locator: &str) -> Result<String, CapabilityError> {
        self.enter(FakeCall::Fetch)?;
        Ok(self.book_text.clone())
    }
}

#[async_trait]
impl SceneAnalyzer for FakeStudio {
    async fn analyze(&self, _title: &str, text: &str) -> Result<String, CapabilityError> {
        self.enter(FakeCall::Analyze)?;
        if text.contains(FAIL_MARKER) {
            return Err(CapabilityError::other("content rejected by the analyzer"));
        }
        Ok(self.analysis_reply.clone())
    }
}

#[async_trait]
impl ImageGenerator for FakeStudio {
    async fn generate(&self, prompt: &str, dest: &Path) -> Result<PathBuf, CapabilityError> {
        self.enter(FakeCall::Generate)?;
        write_file(dest, prompt.as_bytes()).await
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeStudio {
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<PathBuf, CapabilityError> {
        self.enter(FakeCall::Synthesize)?;
        write_file(dest, text.as_bytes()).await
    }
}

#[async_trait]
impl Transcriber for FakeStudio {
    async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError> {
        self.enter(FakeCall::Transcribe)?;
        let narration = tokio::fs::read_to_string(audio).await.map_err(|e| {
            CapabilityError::other(format!("audio file {} unreadable: {e}", audio.display()))
        })?;
        if narration.contains(INAUDIBLE_MARKER) {
            return Err(CapabilityError::other("speech could not be transcribed"));
        }
        Ok(self.transcript.clone())
    }
}

#[async_trait]
impl VideoCompositor for FakeStudio {
    async fn compose(&self, request: &CompositionRequest) -> Result<PathBuf, CapabilityError> {
        self.enter(FakeCall::Compose)?;
        write_file(&request.output, request.title.as_bytes()).await
    }

    async fn concatenate(&self, parts: &[PathBuf], dest: &Path) -> Result<PathBuf, CapabilityError> {
        self.enter(FakeCall::Concatenate)?;
        self.concatenated.lock().push(parts.to_vec());
        write_file(dest, listing(parts).as_bytes()).await
    }

    async fn concatenate_audio(
        &self,
        parts: &[PathBuf],
        dest: &Path,
    ) -> Result<PathBuf, CapabilityError> {
        self.enter(FakeCall::ConcatenateAudio)?;
        self.audio_concatenated.lock().push(parts.to_vec());
        write_file(dest, listing(parts).as_bytes()).await
    }
}

fn listing(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

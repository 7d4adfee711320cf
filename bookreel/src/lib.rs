//! # Bookreel
//!
//! Turns a public-domain book into a narrated, illustrated video.
//!
//! The book text is split into fixed-size chunks. Each chunk goes through
//! five stages:
//!
//! - **Analyze**: a language model describes the scene as structured JSON
//! - **Illustrate**: an image model paints the scene
//! - **Narrate**: text-to-speech reads the chunk aloud
//! - **Caption**: speech-to-text turns the narration into timed captions
//! - **Assemble**: the image, title, captions and audio become a video
//!
//! The chunk videos are then concatenated into one film. Every external call
//! goes through a [`retry::RetryGovernor`], which waits out quota and rate
//! limit errors and fails fast on anything else. A chunk that fails is
//! skipped and the book run carries on.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bookreel::prelude::*;
//!
//! let config = BookreelConfig::load(None)?;
//! let capabilities = bookreel::providers::default_capabilities(&config, url)?;
//! let orchestrator = BookOrchestrator::from_config(&config, capabilities, events);
//!
//! let report = orchestrator.run_from_source(url, "Pride and Prejudice").await?;
//! println!("{}", report.final_video.display());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chunking;
pub mod cleanup;
pub mod config;
pub mod cost;
pub mod errors;
pub mod events;
pub mod layout;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod retry;
pub mod scene;
pub mod subtitles;
pub mod testing;

#[cfg(feature = "providers")]
pub mod providers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chunking::{split_into_chunks, Chunk, DEFAULT_CHUNK_SIZE};
    pub use crate::cleanup::{CleanupFailure, CleanupRegistry};
    pub use crate::config::{BookreelConfig, LoggingConfig, OpenAiConfig, VideoConfig};
    pub use crate::cost::{CostBreakdown, CostEstimator, PriceTable};
    pub use crate::errors::{
        BookreelError, CapabilityError, CapacityReason, HardFailure, Result,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::layout::WorkspaceLayout;
    pub use crate::pipeline::{
        BookOrchestrator, BookReport, ChunkArtifacts, ChunkFailure, ChunkPipeline, FailureKind,
        PipelineStage, SkippedChunk,
    };
    pub use crate::ports::{
        Capabilities, CompositionRequest, ImageGenerator, SceneAnalyzer, SpeechSynthesizer,
        TextSource, Transcriber, VideoCompositor,
    };
    pub use crate::retry::{Operation, RetryGovernor, RetryOutcome, RetryPolicy, Sleeper};
    pub use crate::scene::SceneAnalysis;
    pub use crate::subtitles::{parse_srt, CaptionSegment};
}

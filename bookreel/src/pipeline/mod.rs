//! Chunk and book pipelines.
//!
//! This module provides:
//! - The per-chunk stage sequence ([`ChunkPipeline`])
//! - Book-level orchestration with chunk skipping ([`BookOrchestrator`])
//! - Failure records for skipped chunks

mod book;
mod chunk;
mod failure;

pub use book::{BookOrchestrator, BookReport};
pub use chunk::{ChunkArtifacts, ChunkFailure, ChunkPipeline};
pub use failure::{FailureCollector, FailureKind, PipelineStage, SkippedChunk};

//! Real capability adapters: OpenAI models, Project Gutenberg text and ffmpeg.

mod ffmpeg;
mod openai;
mod text_source;

pub use ffmpeg::{
    absolute_parts, build_compose_args, build_concat_args, build_filter, concat_list,
    escape_filter_path, FfmpegCompositor,
};
pub use openai::{classify_api_error, OpenAiClient};
pub use text_source::{
    html_to_text, is_remote, normalize_source_text, FileTextSource, GutenbergSource,
};

use std::sync::Arc;
use std::time::Duration;

use crate::config::BookreelConfig;
use crate::errors::Result;
use crate::ports::{Capabilities, TextSource};

/// Picks the text source for a locator: HTTP(S) URLs are fetched from the
/// web, anything else is read as a local file.
pub fn text_source_for(locator: &str, timeout: Duration) -> Result<Arc<dyn TextSource>> {
    if is_remote(locator) {
        Ok(Arc::new(GutenbergSource::new(timeout)?))
    } else {
        Ok(Arc::new(FileTextSource))
    }
}

/// Builds the production capabilities for a book at `locator`.
pub fn default_capabilities(config: &BookreelConfig, locator: &str) -> Result<Capabilities> {
    let models = Arc::new(OpenAiClient::new(config.openai.clone())?);
    let text_source = text_source_for(
        locator,
        Duration::from_secs(config.openai.request_timeout_secs),
    )?;
    let compositor = Arc::new(FfmpegCompositor::new(config.video.clone()));
    Ok(Capabilities::from_model_client(models, text_source, compositor))
}

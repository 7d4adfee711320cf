//! ffmpeg-backed video compositor.
//!
//! Each chunk video is the still illustration looped for the length of the
//! narration, with the title drawn at the top and the captions burned in at
//! the bottom. Chunk videos, and the narration tracks for the audiobook, are
//! joined with the concat demuxer.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::VideoConfig;
use crate::errors::CapabilityError;
use crate::ports::{CompositionRequest, VideoCompositor};
use crate::subtitles::total_duration;

/// Lines of ffmpeg stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Escapes a file path used as a filter argument.
#[must_use]
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

/// Builds the video filter chain for one chunk.
///
/// The title is read from `title_file` with expansion disabled, so it is
/// drawn verbatim whatever characters it contains.
#[must_use]
pub fn build_filter(request: &CompositionRequest, title_file: &Path, video: &VideoConfig) -> String {
    format!(
        "scale={width}:-2,\
         drawtext=textfile='{title}':expansion=none:fontsize={title_size}:fontcolor=white:x=(w-text_w)/2:y=50,\
         subtitles='{captions}':force_style='Fontsize={caption_size},Alignment=2,BorderStyle=3,\
         PrimaryColour=&H00FFFFFF,BackColour=&H33000000,MarginV=40'",
        width = video.width,
        title = escape_filter_path(title_file),
        title_size = video.title_font_size,
        captions = escape_filter_path(&request.captions),
        caption_size = video.caption_font_size,
    )
}

/// Builds the ffmpeg arguments that render one chunk video.
#[must_use]
pub fn build_compose_args(
    request: &CompositionRequest,
    title_file: &Path,
    video: &VideoConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-loop", "1", "-i"].map(OsString::from).to_vec();
    args.push(request.background_image.clone().into_os_string());
    args.push("-i".into());
    args.push(request.audio.clone().into_os_string());
    args.push("-vf".into());
    args.push(build_filter(request, title_file, video).into());
    for arg in [
        "-r".to_string(),
        video.fps.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        video.preset.clone(),
        "-tune".to_string(),
        "stillimage".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-shortest".to_string(),
    ] {
        args.push(arg.into());
    }
    args.push(request.output.clone().into_os_string());
    args
}

/// Builds the ffmpeg arguments that join the files listed in `list_file`.
#[must_use]
pub fn build_concat_args(list_file: &Path, dest: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .map(OsString::from)
        .to_vec();
    args.push(list_file.as_os_str().to_owned());
    args.push("-c".into());
    args.push("copy".into());
    args.push(dest.as_os_str().to_owned());
    args
}

/// Renders the concat demuxer list, one `file '...'` line per part.
///
/// The demuxer resolves relative entries against the list file's own
/// directory, so `parts` should be absolute (see [`absolute_parts`]).
#[must_use]
pub fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Resolves every part against the current directory.
pub fn absolute_parts(parts: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    parts.iter().map(std::path::absolute).collect()
}

/// Path of a scratch file next to `dest`, named `{stem}_{suffix}`.
fn sidecar(dest: &Path, suffix: &str) -> PathBuf {
    let stem = dest
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    dest.with_file_name(format!("{stem}_{suffix}"))
}

async fn remove_scratch(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove scratch file");
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}

/// Runs a local `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    video: VideoConfig,
}

impl FfmpegCompositor {
    /// Creates a compositor with the given render settings.
    #[must_use]
    pub const fn new(video: VideoConfig) -> Self {
        Self { video }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), CapabilityError> {
        let output = Command::new(&self.video.ffmpeg_binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CapabilityError::other(format!("cannot run {}: {e}", self.video.ffmpeg_binary))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CapabilityError::other(format!(
                "{} exited with {}: {}",
                self.video.ffmpeg_binary,
                output.status,
                stderr_tail(&output.stderr)
            )))
        }
    }

    async fn join(&self, kind: &str, parts: &[PathBuf], dest: &Path) -> Result<PathBuf, CapabilityError> {
        if parts.is_empty() {
            return Err(CapabilityError::other(format!("no {kind} segments to concatenate")));
        }

        let list_file = sidecar(dest, "concat.txt");
        tokio::fs::write(&list_file, concat_list(&absolute_parts(parts)?)).await?;

        let result = self.run(build_concat_args(&list_file, dest)).await;
        remove_scratch(&list_file).await;
        result?;

        info!(kind, parts = parts.len(), dest = %dest.display(), "Concatenated segments");
        Ok(dest.to_path_buf())
    }
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self::new(VideoConfig::default())
    }
}

#[async_trait]
impl VideoCompositor for FfmpegCompositor {
    async fn compose(&self, request: &CompositionRequest) -> Result<PathBuf, CapabilityError> {
        debug!(
            output = %request.output.display(),
            captions = request.segments.len(),
            duration_secs = total_duration(&request.segments).as_secs_f64(),
            "Rendering chunk video"
        );
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let title_file = sidecar(&request.output, "title.txt");
        tokio::fs::write(&title_file, &request.title).await?;
        let result = self
            .run(build_compose_args(request, &title_file, &self.video))
            .await;
        remove_scratch(&title_file).await;
        result?;

        Ok(request.output.clone())
    }

    async fn concatenate(&self, parts: &[PathBuf], dest: &Path) -> Result<PathBuf, CapabilityError> {
        self.join("video", parts, dest).await
    }

    async fn concatenate_audio(
        &self,
        parts: &[PathBuf],
        dest: &Path,
    ) -> Result<PathBuf, CapabilityError> {
        self.join("audio", parts, dest).await
    }
}

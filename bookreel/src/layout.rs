//! Working-directory file naming.
//!
//! Every per-chunk file embeds the chunk index, so no two chunks ever write
//! the same path.

use std::path::{Path, PathBuf};

/// Directory, under the work dir, holding generated images.
pub const IMAGES_DIR: &str = "generated_images";

/// File names for one book under a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    slug: String,
}

impl WorkspaceLayout {
    /// Creates the layout for a book title under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, title: &str) -> Self {
        Self {
            root: root.into(),
            slug: slugify(title),
        }
    }

    /// Returns the working directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file-name stem derived from the title.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Directory for generated images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Illustration of chunk `index`.
    #[must_use]
    pub fn image_path(&self, index: usize) -> PathBuf {
        self.images_dir().join(format!("scene_{index}.png"))
    }

    /// Narration of chunk `index`.
    #[must_use]
    pub fn audio_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("{}_part_{index}.mp3", self.slug))
    }

    /// Captions of chunk `index`.
    #[must_use]
    pub fn captions_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("{}_part_{index}.srt", self.slug))
    }

    /// Video segment of chunk `index`.
    #[must_use]
    pub fn chunk_video_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("chapter_{index}.mp4"))
    }

    /// Concatenated video of the whole book.
    #[must_use]
    pub fn final_video_path(&self) -> PathBuf {
        self.root.join(format!("{}_complete.mp4", self.slug))
    }

    /// Narrations of every completed chunk joined into one audiobook.
    #[must_use]
    pub fn final_audio_path(&self) -> PathBuf {
        self.root.join(format!("{}_complete.mp3", self.slug))
    }

    /// Saved copy of the fetched book text.
    #[must_use]
    pub fn source_text_path(&self) -> PathBuf {
        self.root.join(format!("{}.txt", self.slug))
    }

    /// Every intermediate file chunk `index` may produce.
    #[must_use]
    pub fn chunk_files(&self, index: usize) -> Vec<PathBuf> {
        vec![
            self.image_path(index),
            self.audio_path(index),
            self.captions_path(index),
            self.chunk_video_path(index),
        ]
    }

    /// Creates the working and image directories.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.images_dir()).await
    }
}

/// Lowercases the title and replaces spaces with underscores.
///
/// Characters other than ASCII letters, digits, `_` and `-` are dropped so
/// the result is always a single path component.
#[must_use]
pub fn slugify(title: &str) -> String {
    let slug: String = title
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            _ => None,
        })
        .collect();

    if slug.is_empty() {
        "book".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Pride and Prejudice"), "pride_and_prejudice");
        assert_eq!(slugify("  Alice's Adventures/../Wonderland "), "alices_adventureswonderland");
        assert_eq!(slugify("???"), "book");
    }

    #[test]
    fn test_paths() {
        let layout = WorkspaceLayout::new("/work", "Pride and Prejudice");

        assert_eq!(layout.image_path(3), PathBuf::from("/work/generated_images/scene_3.png"));
        assert_eq!(layout.audio_path(3), PathBuf::from("/work/pride_and_prejudice_part_3.mp3"));
        assert_eq!(layout.captions_path(3), PathBuf::from("/work/pride_and_prejudice_part_3.srt"));
        assert_eq!(layout.chunk_video_path(3), PathBuf::from("/work/chapter_3.mp4"));
        assert_eq!(
            layout.final_video_path(),
            PathBuf::from("/work/pride_and_prejudice_complete.mp4")
        );
        assert_eq!(
            layout.final_audio_path(),
            PathBuf::from("/work/pride_and_prejudice_complete.mp3")
        );
        assert_eq!(layout.source_text_path(), PathBuf::from("/work/pride_and_prejudice.txt"));
    }

    #[test]
    fn test_chunk_files_are_disjoint() {
        let layout = WorkspaceLayout::new("w", "Emma");
        let one = layout.chunk_files(1);
        let eleven = layout.chunk_files(11);
        assert_eq!(one.len(), 4);
        assert!(one.iter().all(|p| !eleven.contains(p)));
    }

    #[tokio::test]
    async fn test_prepare_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path().join("out"), "Emma");
        layout.prepare().await.unwrap();
        assert!(layout.images_dir().is_dir());
    }
}

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::StageError;
use crate::sequence::types::ImageEntry;

/// Digits in a staged frame number
pub const FRAME_NUMBER_WIDTH: usize = 4;

/// Largest frame count the numbering scheme can address
pub const MAX_FRAMES: usize = 9_999;

const FRAME_PREFIX: &str = "img";

/// Images copied into a private workspace as `img0001.ext`, `img0002.ext`, ...
///
/// The workspace directory is removed when this value is dropped; call
/// [`StagedSequence::cleanup`] to observe removal errors instead.
#[derive(Debug)]
pub struct StagedSequence {
    dir: TempDir,
    pattern: PathBuf,
    frame_count: usize,
    extension: String,
}

impl StagedSequence {
    /// printf-style input pattern for the encoder, e.g. `/tmp/imgseq_x/img%04d.png`
    pub fn pattern(&self) -> &Path {
        &self.pattern
    }

    /// Directory holding the staged frames
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Extension shared by every staged frame
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the staged copy for a 1-based frame number
    pub fn frame_path(&self, number: usize) -> PathBuf {
        self.dir.path().join(frame_file_name(number, &self.extension))
    }

    /// Delete the workspace and everything in it
    pub fn cleanup(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed staging directory {:?}", path);
        Ok(())
    }
}

/// Copies an ordered image list into a contiguous numbered sequence
#[derive(Debug, Clone)]
pub struct SequenceStager {
    temp_root: Option<PathBuf>,
    prefix: String,
}

impl Default for SequenceStager {
    fn default() -> Self {
        Self {
            temp_root: None,
            prefix: "imgseq_".to_string(),
        }
    }
}

impl SequenceStager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create workspaces under `root` instead of the system temp directory
    pub fn with_temp_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Name prefix of the workspace directory
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Reject inputs that can never be staged, without touching the filesystem
    pub fn check(images: &[ImageEntry]) -> Result<(), StageError> {
        if images.is_empty() {
            return Err(StageError::EmptyInput);
        }
        if images.len() > MAX_FRAMES {
            return Err(StageError::TooManyFrames {
                count: images.len(),
                max: MAX_FRAMES,
            });
        }
        Ok(())
    }

    /// Copy every image into a fresh workspace, in order
    ///
    /// All frames are named with the first image's extension. Staging is
    /// all-or-nothing: if any copy fails the workspace is removed before
    /// the error is returned.
    pub fn stage(&self, images: &[ImageEntry]) -> Result<StagedSequence, StageError> {
        Self::check(images)?;

        let dir = self.create_workspace()?;
        let extension = images[0].extension().to_string();

        debug!(
            "Staging {} images into {:?} as *.{}",
            images.len(),
            dir.path(),
            extension
        );

        for (i, image) in images.iter().enumerate() {
            let destination = dir.path().join(frame_file_name(i + 1, &extension));

            if let Err(e) = std::fs::copy(image.path(), &destination) {
                let error = StageError::CopyFailed {
                    path: image.path().display().to_string(),
                    cause: e.to_string(),
                };
                let workspace = dir.path().to_path_buf();
                if let Err(cleanup) = dir.close() {
                    warn!("Failed to remove staging directory {:?}: {}", workspace, cleanup);
                }
                return Err(error);
            }
        }

        let pattern = escape_pattern_dir(dir.path())
            .join(format!("{FRAME_PREFIX}%0{FRAME_NUMBER_WIDTH}d.{extension}"));

        info!("Staged {} frames", images.len());

        Ok(StagedSequence {
            dir,
            pattern,
            frame_count: images.len(),
            extension,
        })
    }

    fn create_workspace(&self) -> Result<TempDir, StageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);

        let result = match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };

        result.map_err(|e| StageError::WorkspaceFailed {
            cause: e.to_string(),
        })
    }
}

/// Double every `%` so the directory reads literally inside a printf-style pattern
fn escape_pattern_dir(dir: &Path) -> PathBuf {
    match dir.to_str() {
        Some(text) if text.contains('%') => PathBuf::from(text.replace('%', "%%")),
        _ => dir.to_path_buf(),
    }
}

fn frame_file_name(number: usize, extension: &str) -> String {
    format!("{FRAME_PREFIX}{number:0width$}.{extension}", width = FRAME_NUMBER_WIDTH)
}

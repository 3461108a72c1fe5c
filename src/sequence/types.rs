use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::SequenceError;

/// File extensions accepted as input frames (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Check whether a path carries one of the recognised image extensions
pub fn is_image_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// A single source image in the sequence
///
/// Only the extension is validated; the file itself is not opened until
/// it is staged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageEntry {
    path: PathBuf,
}

impl ImageEntry {
    /// Create an entry, rejecting paths without an image extension
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, SequenceError> {
        let path = path.into();
        if !is_image_file(&path) {
            return Err(SequenceError::UnsupportedExtension {
                path: path.display().to_string(),
            });
        }
        Ok(Self { path })
    }

    /// Path to the source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The extension exactly as written in the file name (no leading dot)
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    }
}

/// Direction for [`ImageList::move_items`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// User-ordered list of images; entry order is frame order
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    entries: Vec<ImageEntry>,
}

impl ImageList {
    /// Create a new empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an image, rejecting duplicates and unsupported files
    pub fn add<P: Into<PathBuf>>(&mut self, path: P) -> Result<(), SequenceError> {
        let entry = ImageEntry::new(path)?;
        if self.contains(entry.path()) {
            return Err(SequenceError::Duplicate {
                path: entry.path().display().to_string(),
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Append every image directly inside `dir`, sorted by file name
    ///
    /// Non-image files and images already present are skipped. Returns the
    /// number of images added.
    pub fn add_folder<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize, SequenceError> {
        let dir = dir.as_ref();
        let read_dir = std::fs::read_dir(dir).map_err(|e| SequenceError::ReadDirFailed {
            path: dir.display().to_string(),
            cause: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut added = 0;
        for path in paths {
            if self.add(path).is_ok() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove the entries at the given indices; out-of-range indices are ignored
    pub fn remove_indices(&mut self, indices: &[usize]) {
        let selected: BTreeSet<usize> = indices.iter().copied().collect();
        for &index in selected.iter().rev() {
            if index < self.entries.len() {
                self.entries.remove(index);
            }
        }
    }

    /// Remove a single entry
    pub fn remove(&mut self, index: usize) -> Result<ImageEntry, SequenceError> {
        if index >= self.entries.len() {
            return Err(SequenceError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    /// Move a selection one step up or down
    ///
    /// Items that would leave the list stay where they are, and so do items
    /// that would collide with a selected neighbour that could not move.
    /// Returns the new positions of the selection, sorted.
    pub fn move_items(&mut self, selection: &[usize], direction: MoveDirection) -> Vec<usize> {
        let len = self.entries.len();
        let selected: BTreeSet<usize> = selection.iter().copied().filter(|&i| i < len).collect();

        let order: Vec<usize> = match direction {
            MoveDirection::Up => selected.iter().copied().collect(),
            MoveDirection::Down => selected.iter().rev().copied().collect(),
        };

        let mut pinned = BTreeSet::new();
        let mut moved = Vec::with_capacity(order.len());

        for index in order {
            let target = match direction {
                MoveDirection::Up => index.checked_sub(1),
                MoveDirection::Down => Some(index + 1).filter(|&t| t < len),
            };

            match target {
                Some(target) if !pinned.contains(&target) => {
                    self.entries.swap(index, target);
                    moved.push(target);
                }
                _ => {
                    pinned.insert(index);
                    moved.push(index);
                }
            }
        }

        moved.sort_unstable();
        moved
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check whether a path is already in the list
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.entries.iter().any(|entry| entry.path() == path)
    }

    /// Get all entries in frame order
    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    /// Get an entry by position
    pub fn get(&self, index: usize) -> Option<&ImageEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }
}

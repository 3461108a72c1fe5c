//! # Image Sequence Module
//!
//! Holds the user-ordered image list and stages it into a numbered,
//! pattern-addressable workspace the encoder can read frame by frame.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use imgseq::sequence::{ImageList, SequenceStager};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut images = ImageList::new();
//! images.add("shots/first.png")?;
//! images.add_folder("shots/rest")?;
//!
//! let staged = SequenceStager::new().stage(images.entries())?;
//! println!("Encoder input: {}", staged.pattern().display());
//! staged.cleanup()?;
//! # Ok(())
//! # }
//! ```

pub mod stager;
pub mod types;

pub use stager::{SequenceStager, StagedSequence, FRAME_NUMBER_WIDTH, MAX_FRAMES};
pub use types::{is_image_file, ImageEntry, ImageList, MoveDirection, IMAGE_EXTENSIONS};

//! Character-level title generation library.
//!
//! This crate trains a recurrent next-character model on a corpus of titles
//! and samples new titles from it:
//! - Corpus loading and character vocabulary extraction
//! - Sliding-window one-hot vectorization
//! - A single-layer LSTM trained with mini-batch RMSprop
//! - Temperature-controlled sampling and deduplicated title collection

/// Error type shared by the whole crate.
pub mod error;

/// Core model, sampling and generation logic.
pub mod model;

/// I/O utilities (file loading, path helpers).
pub(crate) mod io;

pub use error::{Result, TitleGenError};
pub use io::build_output_path;

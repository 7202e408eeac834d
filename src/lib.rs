//! Static-probability arithmetic coding over real-valued codewords, with
//! coding stages that can be chained into a pipeline.
//!
//! An [`Encoder`] folds each run of symbols into one `f64` codeword by
//! narrowing `[0, 1)` to the nested segments of the run's symbols and
//! emitting the midpoint of what is left. A [`Decoder`] walks the same
//! segments back. A [`Pipeline`] streams a file through a graph of
//! [`Stage`]s, each of which encodes or decodes in blocks of its own size.

pub mod adapter;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod stage;
mod stream;

#[cfg(test)]
mod example;

pub use adapter::{Adapter, Block, ElementKind};
pub use decoder::{DecodeError, Decoder};
pub use encoder::{EncodeError, Encoder};
pub use error::{Error, Result};
pub use model::{ProbabilityTable, Segment, Symbol};
pub use pipeline::{Pipeline, RunSummary, WiringError};
pub use stage::{Direction, Stage};

/// Bits of interval resolution a codeword can be relied on to carry. Runs
/// are plain `f64` interval arithmetic with no renormalisation, so the
/// product of a run's probabilities must stay above `2^-BITS_OF_PRECISION`
/// for the codeword to decode; see [`ProbabilityTable::safe_run_length`].
pub const BITS_OF_PRECISION: u32 = 40;

//! Crate-level error type.

use crate::adapter::ElementKind;
use crate::config::ConfigError;
use crate::decoder::DecodeError;
use crate::encoder::EncodeError;
use crate::pipeline::WiringError;

/// Everything that can stop a pipeline from being built or run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),

    /// A stage was handed a block it cannot code.
    #[error("stage {stage} reads {expected}s but was given {found}s")]
    UnexpectedBlock {
        stage: String,
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

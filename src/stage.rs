use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;

use crate::adapter::{Adapter, Block, Element, ElementKind};
use crate::config::{ConfigError, StageConfig, StagePlan};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::model::{ProbabilityTable, Symbol};

/// Which way a stage codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

impl Direction {
    pub fn input_kind(self) -> ElementKind {
        match self {
            Direction::Encode => ElementKind::Symbol,
            Direction::Decode => ElementKind::Codeword,
        }
    }

    pub fn output_kind(self) -> ElementKind {
        match self {
            Direction::Encode => ElementKind::Codeword,
            Direction::Decode => ElementKind::Symbol,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encode => f.write_str("encode"),
            Direction::Decode => f.write_str("decode"),
        }
    }
}

#[derive(Debug)]
enum Codec {
    Encode {
        encoder: Encoder,
        /// Symbols left over from the last block, fewer than a full run.
        carry: Vec<Symbol>,
    },
    Decode {
        decoder: Decoder,
        /// The most recent codeword. It may turn out to be the last of the
        /// stream and stand for a shorter run.
        held: Option<f64>,
    },
}

/// One node of a pipeline: a table, a coding direction and the buffering
/// needed to code a stream block by block.
#[derive(Debug)]
pub struct Stage {
    name: String,
    direction: Direction,
    block_size: NonZeroUsize,
    text_len: Option<usize>,
    table: ProbabilityTable,
    codec: Codec,
    consumed: usize,
    emitted: usize,
}

impl Stage {
    pub fn new(name: impl Into<String>, config: StageConfig) -> Self {
        let name = name.into();
        let StageConfig {
            direction,
            block_size,
            text_len,
            table,
        } = config;

        let run_length = table.run_length().get();
        let safe = table.safe_run_length();
        if run_length > safe {
            log::warn!(
                "Stage {name}: run length {run_length} exceeds the safe bound {safe} for its table, codewords may not decode"
            );
        }

        let codec = match direction {
            Direction::Encode => Codec::Encode {
                encoder: Encoder::new(&table),
                carry: Vec::with_capacity(run_length),
            },
            Direction::Decode => Codec::Decode {
                decoder: Decoder::new(&table),
                held: None,
            },
        };

        Self {
            name,
            direction,
            block_size,
            text_len,
            table,
            codec,
            consumed: 0,
            emitted: 0,
        }
    }

    /// Build a stage from a parsed config, named after its file. `corpus` is
    /// the pipeline input.
    pub fn build(plan: StagePlan, corpus: &Path) -> std::result::Result<Self, ConfigError> {
        let name = plan.file().display().to_string();
        Ok(Self::new(name, plan.build(corpus)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn block_size(&self) -> usize {
        self.block_size.get()
    }

    pub fn table(&self) -> &ProbabilityTable {
        &self.table
    }

    /// Element kinds this stage can read.
    pub fn accepts(&self) -> [ElementKind; 1] {
        [self.direction.input_kind()]
    }

    pub fn output_kind(&self) -> ElementKind {
        self.direction.output_kind()
    }

    /// Number of symbols the stream this stage has produced so far stands
    /// for: symbols taken in when encoding, symbols put out when decoding.
    pub fn symbols(&self) -> usize {
        match self.direction {
            Direction::Encode => self.consumed,
            Direction::Decode => self.emitted,
        }
    }

    /// Pull up to a block-worth of elements through `adapter`.
    ///
    /// Returns the buffer and whether the producer's block ran dry, in which
    /// case the adapter has rewound and nothing more should be pulled from it
    /// until the producer emits again.
    pub fn pull(&self, adapter: &mut Adapter, source: &Block) -> (Block, bool) {
        match self.direction.input_kind() {
            ElementKind::Symbol => self.fill::<Symbol>(adapter, source),
            ElementKind::Codeword => self.fill::<f64>(adapter, source),
        }
    }

    fn fill<T: Element>(&self, adapter: &mut Adapter, source: &Block) -> (Block, bool) {
        let limit = self.block_size.get();
        let mut buffer = Vec::with_capacity(limit.min(source.len()));
        while buffer.len() < limit {
            match adapter.pull::<T>(source) {
                Some(element) => buffer.push(element),
                None => return (T::into_block(buffer), true),
            }
        }
        (T::into_block(buffer), false)
    }

    /// Code one input block.
    pub fn code(&mut self, input: Block) -> Result<Block> {
        let run_length = self.table.run_length().get();
        let output = match (&mut self.codec, input) {
            (Codec::Encode { encoder, carry }, Block::Symbols(symbols)) => {
                self.consumed += symbols.len();
                carry.extend(symbols);
                // Only whole runs; the rest waits for the next block.
                let aligned = carry.len() - carry.len() % run_length;
                let codewords = encoder
                    .encode(carry.drain(..aligned))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Block::Codewords(codewords)
            }
            (Codec::Decode { decoder, held }, Block::Codewords(codewords)) => {
                let mut pending: Vec<f64> = held.take().into_iter().chain(codewords).collect();
                *held = pending.pop();
                let limit = self.text_len;
                let symbols = decode_limited(decoder, &pending, limit, &mut self.emitted)?;
                Block::Symbols(symbols)
            }
            (_, input) => {
                return Err(Error::UnexpectedBlock {
                    stage: self.name.clone(),
                    expected: self.direction.input_kind(),
                    found: input.kind(),
                });
            }
        };

        log::debug!(
            "Stage {}: coded a block into {} {}(s)",
            self.name,
            output.len(),
            output.kind()
        );
        Ok(output)
    }

    /// Flush whatever the stage still holds once its input has ended.
    ///
    /// `upstream` is the number of symbols the input stream stood for, as
    /// reported by the producers; a configured `len` takes precedence.
    pub fn finish(&mut self, upstream: Option<usize>) -> Result<Block> {
        match &mut self.codec {
            Codec::Encode { encoder, carry } => {
                if let Some(expected) = self.text_len {
                    if expected != self.consumed {
                        log::warn!(
                            "Stage {}: expected {expected} symbols, encoded {}",
                            self.name,
                            self.consumed
                        );
                    }
                }
                let codewords = encoder
                    .encode(carry.drain(..))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Block::Codewords(codewords))
            }
            Codec::Decode { decoder, held } => {
                let limit = self.text_len.or(upstream);
                let tail: Vec<f64> = held.take().into_iter().collect();
                let symbols = decode_limited(decoder, &tail, limit, &mut self.emitted)?;
                log::info!("Stage {}: decoded {} symbols", self.name, self.emitted);
                Ok(Block::Symbols(symbols))
            }
        }
    }
}

/// Decode `codewords`, never letting the running total `emitted` exceed
/// `limit`.
fn decode_limited(
    decoder: &Decoder,
    codewords: &[f64],
    limit: Option<usize>,
    emitted: &mut usize,
) -> Result<Vec<Symbol>> {
    let run_length = decoder.run_length();
    let mut symbols = Vec::with_capacity(codewords.len() * run_length);

    for (i, &codeword) in codewords.iter().enumerate() {
        let count = match limit {
            Some(limit) => run_length.min(limit.saturating_sub(*emitted)),
            None => run_length,
        };
        if count == 0 {
            log::warn!(
                "Dropping {} codeword(s) past the known text length",
                codewords.len() - i
            );
            break;
        }
        symbols.extend(decoder.decode_run(codeword, count)?);
        *emitted += count;
    }

    Ok(symbols)
}

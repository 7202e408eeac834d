use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::NonZeroUsize;
use std::path::Path;

use crate::BITS_OF_PRECISION;
use crate::config::{self, ConfigError};

/// One byte of input.
pub type Symbol = u8;

/// How far the probabilities of a table may drift from summing to 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Errors that make a probability table unusable for coding.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TableError {
    #[error("probability {probability} of symbol {symbol} is outside (0, 1]")]
    InvalidProbability { symbol: Symbol, probability: f64 },
    #[error("table has no symbols")]
    Empty,
    #[error("probabilities sum to {0}, expected 1")]
    Unnormalized(f64),
}

/// The half-open interval `[left, right)` of `[0, 1)` assigned to a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub left: f64,
    pub right: f64,
}

impl Segment {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn contains(&self, code: f64) -> bool {
        self.left <= code && code < self.right
    }
}

/// The partition of `[0, 1)` derived from a table, laid out in ascending
/// symbol order.
#[derive(Debug, Clone, PartialEq)]
pub struct Segments {
    entries: Vec<(Symbol, Segment)>,
    index: [Option<u8>; 256],
}

impl Segments {
    fn new(probabilities: &BTreeMap<Symbol, f64>) -> Self {
        let mut entries = Vec::with_capacity(probabilities.len());
        let mut index = [None; 256];
        let mut left = 0.0;

        // BTreeMap iterates in ascending key order, which is the canonical
        // layout both ends of a coder must agree on.
        for (&symbol, &probability) in probabilities {
            let right = left + probability;
            index[symbol as usize] = Some(entries.len() as u8);
            entries.push((symbol, Segment { left, right }));
            left = right;
        }

        // Summation drift would otherwise leave a sliver below 1 uncovered.
        if let Some((_, last)) = entries.last_mut() {
            if (last.right - 1.0).abs() <= PROBABILITY_TOLERANCE {
                last.right = 1.0;
            }
        }

        Self { entries, index }
    }

    /// The segment of `symbol`, or `None` when the symbol has no probability.
    pub fn get(&self, symbol: Symbol) -> Option<Segment> {
        self.index[symbol as usize].map(|i| self.entries[i as usize].1)
    }

    /// Find the symbol whose segment contains `code`.
    pub fn locate(&self, code: f64) -> Option<(Symbol, Segment)> {
        let i = self.entries.partition_point(|(_, segment)| segment.right <= code);
        self.entries
            .get(i)
            .copied()
            .filter(|(_, segment)| segment.contains(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, Segment)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A static symbol -> probability table together with the run length its
/// codewords are built with.
#[derive(Debug, Clone)]
pub struct ProbabilityTable {
    run_length: NonZeroUsize,
    probabilities: BTreeMap<Symbol, f64>,
    segments: OnceCell<Segments>,
}

impl PartialEq for ProbabilityTable {
    fn eq(&self, other: &Self) -> bool {
        self.run_length == other.run_length && self.probabilities == other.probabilities
    }
}

impl ProbabilityTable {
    /// An empty table. Symbols are added with [`ProbabilityTable::insert`].
    pub fn new(run_length: NonZeroUsize) -> Self {
        Self {
            run_length,
            probabilities: BTreeMap::new(),
            segments: OnceCell::new(),
        }
    }

    /// Count byte frequencies over the whole of `reader` and turn them into
    /// probabilities. Bytes that never occur get no entry.
    pub fn from_reader<R: Read>(mut reader: R, run_length: NonZeroUsize) -> io::Result<Self> {
        let mut counts = [0u64; 256];
        let mut total = 0u64;
        let mut buffer = [0u8; 8192];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            for &byte in &buffer[..read] {
                counts[byte as usize] += 1;
            }
            total += read as u64;
        }

        let mut table = Self::new(run_length);
        for (symbol, &count) in counts.iter().enumerate() {
            if count > 0 {
                table
                    .probabilities
                    .insert(symbol as Symbol, count as f64 / total as f64);
            }
        }
        Ok(table)
    }

    /// Build a table from one pass over the file at `path`.
    pub fn from_corpus(path: &Path, run_length: NonZeroUsize) -> io::Result<Self> {
        let table = Self::from_reader(BufReader::new(File::open(path)?), run_length)?;
        log::info!(
            "Counted probabilities of {} symbols in {}",
            table.probabilities.len(),
            path.display()
        );
        Ok(table)
    }

    /// Load a table file: `num` and `prob` lines only.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        config::read_table(path)
    }

    /// Export the table in the format [`ProbabilityTable::read`] accepts.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        log::info!("Wrote probability table to {}", path.display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "num {}", self.run_length)?;
        // `{}` prints the shortest decimal that parses back to the same f64.
        for (symbol, probability) in &self.probabilities {
            writeln!(writer, "prob {symbol} {probability}")?;
        }
        Ok(())
    }

    pub fn insert(&mut self, symbol: Symbol, probability: f64) -> Result<(), TableError> {
        if !(probability > 0.0 && probability <= 1.0) {
            return Err(TableError::InvalidProbability {
                symbol,
                probability,
            });
        }
        self.probabilities.insert(symbol, probability);
        self.segments.take();
        Ok(())
    }

    pub fn set_run_length(&mut self, run_length: NonZeroUsize) {
        self.run_length = run_length;
    }

    pub fn run_length(&self) -> NonZeroUsize {
        self.run_length
    }

    pub fn probability(&self, symbol: Symbol) -> Option<f64> {
        self.probabilities.get(&symbol).copied()
    }

    /// Symbols and their probabilities in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, f64)> + '_ {
        self.probabilities.iter().map(|(&s, &p)| (s, p))
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Check that the table can be coded with: non-empty and summing to 1.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.probabilities.is_empty() {
            return Err(TableError::Empty);
        }
        let sum: f64 = self.probabilities.values().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(TableError::Unnormalized(sum));
        }
        Ok(())
    }

    /// The canonical segment partition, computed once per table contents.
    pub fn segments(&self) -> &Segments {
        self.segments.get_or_init(|| Segments::new(&self.probabilities))
    }

    /// The longest run that is guaranteed to fit in [`BITS_OF_PRECISION`]
    /// bits of interval resolution, assuming every symbol of the run is the
    /// least likely one.
    pub fn safe_run_length(&self) -> usize {
        let min = self
            .probabilities
            .values()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let bits_per_symbol = -min.log2();
        if !bits_per_symbol.is_finite() || bits_per_symbol <= 0.0 {
            return usize::MAX;
        }
        ((BITS_OF_PRECISION as f64 / bits_per_symbol).floor() as usize).max(1)
    }
}

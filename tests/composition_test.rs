use std::num::NonZeroUsize;

use arithmetic_pipeline::decoder::Decoder;
use arithmetic_pipeline::encoder::{EncodeError, Encoder};
use arithmetic_pipeline::model::{ProbabilityTable, Symbol};
use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;
use rand::Rng;

/// Integer weights over a set of distinct symbols, so we can easily generate
/// arbitrary tables whose probabilities sum to 1.
#[derive(Debug, Clone)]
struct WeightedSymbols {
    symbols: Vec<Symbol>,
    weights: Vec<u32>,
}

impl WeightedSymbols {
    fn table(&self, run_length: usize) -> ProbabilityTable {
        let total: u32 = self.weights.iter().sum();
        let mut table = ProbabilityTable::new(NonZeroUsize::new(run_length).unwrap());
        for (&symbol, &weight) in self.symbols.iter().zip(&self.weights) {
            table
                .insert(symbol, weight as f64 / total as f64)
                .expect("weights are positive");
        }
        table
    }

    /// Generate a stream of random symbols from the set.
    fn random_symbol_stream(&self, length: usize) -> Vec<Symbol> {
        (0..length)
            .map(|_| self.symbols[rand::rng().random_range(0..self.symbols.len())])
            .collect()
    }
}

impl Arbitrary for WeightedSymbols {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut symbols = Vec::<Symbol>::arbitrary(g);

        // Ensure that at least one symbol is present
        symbols.push(Symbol::arbitrary(g));
        symbols.sort_unstable();
        symbols.dedup();

        let weights = symbols
            .iter()
            .map(|_| u32::from(u16::arbitrary(g) % 1000) + 1)
            .collect();

        WeightedSymbols { symbols, weights }
    }
}

/// Encode then decode `input`, telling the decoder how long the trailing
/// run is the way a pipeline would.
fn round_trip(table: &ProbabilityTable, input: &[Symbol]) -> Vec<Symbol> {
    let run_length = table.run_length().get();
    let codewords: Vec<f64> = Encoder::new(table)
        .encode(input.iter().copied())
        .collect::<Result<_, EncodeError>>()
        .expect("Encoding failed");
    assert_eq!(codewords.len(), input.len().div_ceil(run_length));

    let decoder = Decoder::new(table);
    let Some((&last, full)) = codewords.split_last() else {
        return Vec::new();
    };
    let mut decoded: Vec<Symbol> = decoder
        .decode(full.iter().copied())
        .collect::<Result<_, _>>()
        .expect("Decoding failed");
    let tail = input.len() - full.len() * run_length;
    decoded.extend(decoder.decode_run(last, tail).expect("Decoding failed"));
    decoded
}

/// Property test verifying that decoding an encoded stream of symbols results
/// in the same stream of symbols, for any run length within the precision
/// bound of the table.
#[quickcheck]
fn encoder_and_decoder_cancel(alphabet: WeightedSymbols, length: u16, run: u8) -> TestResult {
    let bound = alphabet.table(1).safe_run_length().min(16);
    let run_length = 1 + run as usize % bound;
    let table = alphabet.table(run_length);

    let input = alphabet.random_symbol_stream(length as usize % 512);
    TestResult::from_bool(round_trip(&table, &input) == input)
}

/// Probabilities of every table sum to one and its segments tile [0, 1).
#[quickcheck]
fn segments_partition_unit_interval(alphabet: WeightedSymbols) -> bool {
    let table = alphabet.table(1);
    let mut left = 0.0;
    for (_, segment) in table.segments().iter() {
        if segment.left != left || segment.right <= segment.left {
            return false;
        }
        left = segment.right;
    }
    left == 1.0 && table.validate().is_ok()
}

#[test]
fn worked_example() {
    let mut table = ProbabilityTable::new(NonZeroUsize::new(2).unwrap());
    table.insert(b'a', 0.5).unwrap();
    table.insert(b'b', 0.25).unwrap();
    table.insert(b'c', 0.25).unwrap();

    let codewords: Vec<f64> = Encoder::new(&table)
        .encode(*b"ab")
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(codewords, vec![0.3125]);

    let decoded: Vec<u8> = Decoder::new(&table)
        .decode([0.3125])
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, b"ab");
}

#[test]
fn long_runs_of_likely_symbols() {
    let alphabet = WeightedSymbols {
        symbols: vec![0, 1],
        weights: vec![9, 1],
    };
    let table = alphabet.table(alphabet.table(1).safe_run_length());
    let input = alphabet.random_symbol_stream(1000);
    assert_eq!(round_trip(&table, &input), input);
}

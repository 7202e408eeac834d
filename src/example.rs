use std::num::NonZeroUsize;

use crate::model::ProbabilityTable;

pub fn run_length(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("run length must be positive")
}

/// A small table used throughout the unit tests:
///   a: 0.50 -> [0.00, 0.50)
///   b: 0.25 -> [0.50, 0.75)
///   c: 0.25 -> [0.75, 1.00)
pub fn example_table(n: usize) -> ProbabilityTable {
    let mut table = ProbabilityTable::new(run_length(n));
    table.insert(b'c', 0.25).unwrap();
    table.insert(b'a', 0.5).unwrap();
    table.insert(b'b', 0.25).unwrap();
    table
}

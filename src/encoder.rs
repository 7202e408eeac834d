use crate::model::{ProbabilityTable, Segment, Segments, Symbol};

/// Folds runs of symbols into single real-valued codewords.
#[derive(Debug, Clone)]
pub struct Encoder {
    segments: Segments,
    run_length: usize,
}

/// Errors that can occur while encoding
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EncodeError {
    #[error("symbol {0} has no probability in the table")]
    UnknownSymbol(Symbol),
}

/// Iterator over the codewords of an input stream. Each item consumes up to
/// `run_length` symbols.
pub struct EncoderOutput<'e, I>
where
    I: Iterator<Item = Symbol>,
{
    input: I,
    encoder: &'e Encoder,
}

/// Narrow `[left, right)` to the part that `segment` occupies inside it.
fn narrow((left, right): (f64, f64), segment: Segment) -> (f64, f64) {
    let width = right - left;
    (left + width * segment.left, left + width * segment.right)
}

// Encoder Algorithm
//
// for each run x_1, ..., x_n (n <= run length):
//     L = 0, R = 1
//     for i = 1, ..., n
//         R = L + (R - L) * right(x_i)
//         L = L + (R - L) * left(x_i)      (both from the old L and R)
//     emit (L + R) / 2
impl<I: Iterator<Item = Symbol>> Iterator for EncoderOutput<'_, I> {
    type Item = Result<f64, EncodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.input.next()?;
        let run = std::iter::once(first).chain(self.input.by_ref().take(self.encoder.run_length - 1));

        let mut interval = (0.0, 1.0);
        for symbol in run {
            match self.encoder.segments.get(symbol) {
                Some(segment) => interval = narrow(interval, segment),
                None => return Some(Err(EncodeError::UnknownSymbol(symbol))),
            }
        }

        let (left, right) = interval;
        Some(Ok((left + right) / 2.0))
    }
}

impl Encoder {
    /// Create an encoder for symbols drawn from `table`, folding
    /// `table.run_length()` symbols into each codeword.
    pub fn new(table: &ProbabilityTable) -> Self {
        Self {
            segments: table.segments().clone(),
            run_length: table.run_length().get(),
        }
    }

    pub fn run_length(&self) -> usize {
        self.run_length
    }

    /// Encode a stream of symbols as a stream of codewords.
    ///
    /// A trailing run shorter than the run length still yields a codeword of
    /// its own; the caller is responsible for remembering how many symbols
    /// it stands for.
    pub fn encode<I>(&self, input: I) -> EncoderOutput<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Symbol>,
    {
        EncoderOutput {
            input: input.into_iter(),
            encoder: self,
        }
    }
}

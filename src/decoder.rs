use crate::model::{ProbabilityTable, Segments, Symbol};

/// Unfolds codewords back into runs of symbols.
#[derive(Debug, Clone)]
pub struct Decoder {
    segments: Segments,
    run_length: usize,
}

/// Errors that can occur while decoding
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DecodeError {
    /// Either the codeword was corrupted or it was produced with a different
    /// table.
    #[error("codeword {0} is not covered by any segment")]
    UncoveredCodeword(f64),
}

/// Iterator over the symbols of a stream of codewords, `run_length` symbols
/// per codeword. Iteration stops after the first error.
pub struct DecoderOutput<'d, I>
where
    I: Iterator<Item = f64>,
{
    input: I,
    decoder: &'d Decoder,
    code: f64,
    remaining: usize,
    failed: bool,
}

impl<I: Iterator<Item = f64>> Iterator for DecoderOutput<'_, I> {
    type Item = Result<Symbol, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.remaining == 0 {
            self.code = self.input.next()?;
            self.remaining = self.decoder.run_length;
        }

        self.remaining -= 1;
        match self.decoder.step(self.code) {
            Ok((symbol, code)) => {
                self.code = code;
                Some(Ok(symbol))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Decoder {
    /// Create a decoder for codewords that were encoded using `table`.
    pub fn new(table: &ProbabilityTable) -> Self {
        Self {
            segments: table.segments().clone(),
            run_length: table.run_length().get(),
        }
    }

    pub fn run_length(&self) -> usize {
        self.run_length
    }

    /// Extract one symbol from `code` and rescale the remainder back onto
    /// `[0, 1)`.
    fn step(&self, code: f64) -> Result<(Symbol, f64), DecodeError> {
        let (symbol, segment) = self
            .segments
            .locate(code)
            .ok_or(DecodeError::UncoveredCodeword(code))?;
        Ok((symbol, (code - segment.left) / segment.width()))
    }

    /// Decode a stream of codewords, each standing for a full run.
    pub fn decode<I>(&self, input: I) -> DecoderOutput<'_, I::IntoIter>
    where
        I: IntoIterator<Item = f64>,
    {
        DecoderOutput {
            input: input.into_iter(),
            decoder: self,
            code: 0.0,
            remaining: 0,
            failed: false,
        }
    }

    /// Decode only the first `count` symbols of `codeword`. Used for a
    /// trailing codeword whose run was cut short by the end of the stream.
    pub fn decode_run(&self, codeword: f64, count: usize) -> Result<Vec<Symbol>, DecodeError> {
        let mut symbols = Vec::with_capacity(count);
        let mut code = codeword;
        for _ in 0..count {
            let (symbol, rest) = self.step(code)?;
            symbols.push(symbol);
            code = rest;
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::Encoder;
    use crate::example::example_table;

    fn decode(input: &[f64], n: usize) -> Result<Vec<u8>, DecodeError> {
        let decoder = Decoder::new(&example_table(n));
        decoder.decode(input.iter().copied()).collect()
    }

    #[test]
    fn decode_nothing() {
        assert_eq!(decode(&[], 3), Ok(vec![]));
    }

    #[test]
    fn decode_small_message() {
        assert_eq!(decode(&[0.3125], 2), Ok(b"ab".to_vec()));
    }

    #[test]
    fn decode_several_codewords() {
        // 0.875 sits in c, rescaled to 0.5 it sits in b.
        assert_eq!(decode(&[0.3125, 0.875], 2), Ok(b"abcb".to_vec()));
    }

    #[test]
    fn decode_partial_run() {
        let decoder = Decoder::new(&example_table(2));
        assert_eq!(decoder.decode_run(0.875, 1), Ok(b"c".to_vec()));
        assert_eq!(decoder.decode_run(0.3125, 0), Ok(vec![]));
    }

    #[test]
    fn error_on_uncovered_codeword() {
        assert_eq!(
            decode(&[1.5], 2),
            Err(DecodeError::UncoveredCodeword(1.5))
        );
        assert!(decode(&[-0.25], 1).is_err());
    }

    #[test]
    fn stops_after_error() {
        let decoder = Decoder::new(&example_table(1));
        let results: Vec<_> = decoder.decode([0.25, 2.0, 0.25]).collect();
        assert_eq!(
            results,
            vec![Ok(b'a'), Err(DecodeError::UncoveredCodeword(2.0))]
        );
    }

    #[test]
    fn encoder_and_decoder_cancel() {
        let table = example_table(4);
        let message = b"abcabbacccbaabacab".to_vec();
        let codewords: Vec<f64> = Encoder::new(&table)
            .encode(message.iter().copied())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(codewords.len(), 5);

        let decoder = Decoder::new(&table);
        let mut decoded: Vec<u8> = decoder
            .decode(codewords[..4].iter().copied())
            .collect::<Result<_, _>>()
            .unwrap();
        decoded.extend(decoder.decode_run(codewords[4], 2).unwrap());
        assert_eq!(decoded, message);
    }
}

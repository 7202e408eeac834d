//! Moving blocks between files and the pipeline.
//!
//! Symbols are stored as raw bytes, codewords as 8-byte big-endian doubles.

use std::io::{self, Read, Write};

use crate::adapter::{Block, ElementKind};

const CODEWORD_BYTES: usize = 8;

const PREALLOCATE_BYTES: usize = 64 * 1024;

/// Read up to `capacity` elements of `kind`. Returns `None` at end of input.
pub fn read_block<R: Read>(
    reader: &mut R,
    kind: ElementKind,
    capacity: usize,
) -> io::Result<Option<Block>> {
    let width = match kind {
        ElementKind::Symbol => 1,
        ElementKind::Codeword => CODEWORD_BYTES,
    };
    let limit = capacity
        .checked_mul(width)
        .and_then(|limit| u64::try_from(limit).ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("a block of {capacity} {kind}s does not fit in memory"),
            )
        })?;
    // The block size is only an upper bound; grow with the input instead.
    let mut bytes = Vec::with_capacity(capacity.saturating_mul(width).min(PREALLOCATE_BYTES));
    reader.by_ref().take(limit).read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }

    let block = match kind {
        ElementKind::Symbol => Block::Symbols(bytes),
        ElementKind::Codeword => {
            if bytes.len() % CODEWORD_BYTES != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "{} trailing bytes do not form a codeword",
                        bytes.len() % CODEWORD_BYTES
                    ),
                ));
            }
            let codewords = bytes
                .chunks_exact(CODEWORD_BYTES)
                .map(|chunk| {
                    let mut raw = [0u8; CODEWORD_BYTES];
                    raw.copy_from_slice(chunk);
                    f64::from_be_bytes(raw)
                })
                .collect();
            Block::Codewords(codewords)
        }
    };
    Ok(Some(block))
}

pub fn write_block<W: Write>(writer: &mut W, block: &Block) -> io::Result<()> {
    match block {
        Block::Symbols(symbols) => writer.write_all(symbols),
        Block::Codewords(codewords) => {
            for codeword in codewords {
                writer.write_all(&codeword.to_be_bytes())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_symbols_in_blocks() {
        let mut input = &b"abcde"[..];
        let kind = ElementKind::Symbol;
        assert_eq!(read_block(&mut input, kind, 2).unwrap(), Some(Block::Symbols(b"ab".to_vec())));
        assert_eq!(read_block(&mut input, kind, 2).unwrap(), Some(Block::Symbols(b"cd".to_vec())));
        assert_eq!(read_block(&mut input, kind, 2).unwrap(), Some(Block::Symbols(b"e".to_vec())));
        assert_eq!(read_block(&mut input, kind, 2).unwrap(), None);
    }

    #[test]
    fn test_codewords_through_bytes() {
        let block = Block::Codewords(vec![0.3125, 0.875, 0.1]);
        let mut bytes = Vec::new();
        write_block(&mut bytes, &block).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[..8], 0.3125f64.to_be_bytes());

        let mut input = &bytes[..];
        let kind = ElementKind::Codeword;
        assert_eq!(
            read_block(&mut input, kind, 2).unwrap(),
            Some(Block::Codewords(vec![0.3125, 0.875]))
        );
        assert_eq!(
            read_block(&mut input, kind, 2).unwrap(),
            Some(Block::Codewords(vec![0.1]))
        );
        assert_eq!(read_block(&mut input, kind, 2).unwrap(), None);
    }

    #[test]
    fn test_huge_block_over_short_input() {
        let mut input = &0.5f64.to_be_bytes()[..];
        let kind = ElementKind::Codeword;
        assert_eq!(
            read_block(&mut input, kind, usize::MAX / 8).unwrap(),
            Some(Block::Codewords(vec![0.5]))
        );

        let mut input = &b"ab"[..];
        let kind = ElementKind::Symbol;
        assert_eq!(
            read_block(&mut input, kind, usize::MAX).unwrap(),
            Some(Block::Symbols(b"ab".to_vec()))
        );
    }

    #[test]
    fn test_overflowing_block_size() {
        let mut input = &0.5f64.to_be_bytes()[..];
        let error = read_block(&mut input, ElementKind::Codeword, usize::MAX).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_truncated_codeword() {
        let mut input = &[0u8; 11][..];
        let error = read_block(&mut input, ElementKind::Codeword, 4).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}

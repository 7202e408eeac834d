use std::fmt;

use crate::model::Symbol;

/// The kind of element a stage reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Symbol,
    Codeword,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Symbol => f.write_str("symbol"),
            ElementKind::Codeword => f.write_str("codeword"),
        }
    }
}

/// A buffer of elements produced by one stage for the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Symbols(Vec<Symbol>),
    Codewords(Vec<f64>),
}

impl Block {
    pub fn empty(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Symbol => Block::Symbols(Vec::new()),
            ElementKind::Codeword => Block::Codewords(Vec::new()),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Block::Symbols(_) => ElementKind::Symbol,
            Block::Codewords(_) => ElementKind::Codeword,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Block::Symbols(symbols) => symbols.len(),
            Block::Codewords(codewords) => codewords.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An element type that can travel between stages inside a [`Block`].
pub trait Element: Copy {
    const KIND: ElementKind;

    /// The elements of `block`, or `None` if it holds another kind.
    fn view(block: &Block) -> Option<&[Self]>;

    fn into_block(elements: Vec<Self>) -> Block;
}

impl Element for Symbol {
    const KIND: ElementKind = ElementKind::Symbol;

    fn view(block: &Block) -> Option<&[Self]> {
        match block {
            Block::Symbols(symbols) => Some(symbols),
            Block::Codewords(_) => None,
        }
    }

    fn into_block(elements: Vec<Self>) -> Block {
        Block::Symbols(elements)
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::Codeword;

    fn view(block: &Block) -> Option<&[Self]> {
        match block {
            Block::Codewords(codewords) => Some(codewords),
            Block::Symbols(_) => None,
        }
    }

    fn into_block(elements: Vec<Self>) -> Block {
        Block::Codewords(elements)
    }
}

/// A pull cursor over the block a producer most recently emitted.
///
/// Each call to [`Adapter::pull`] hands out one element. Once the block is
/// exhausted it returns `None` and rewinds, ready for the producer's next
/// block.
#[derive(Debug)]
pub struct Adapter {
    kind: ElementKind,
    cursor: usize,
}

impl Adapter {
    /// Bind an edge whose producer emits `produced` to a consumer that reads
    /// one of `accepted`. Returns `None` if the two sides cannot talk.
    pub fn bind(produced: ElementKind, accepted: &[ElementKind]) -> Option<Self> {
        accepted.contains(&produced).then_some(Self {
            kind: produced,
            cursor: 0,
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The next element of `block`, or `None` at the end of the block.
    pub fn pull<T: Element>(&mut self, block: &Block) -> Option<T> {
        if T::KIND != self.kind {
            return None;
        }
        let elements = T::view(block)?;
        match elements.get(self.cursor) {
            Some(&element) => {
                self.cursor += 1;
                Some(element)
            }
            None => {
                self.cursor = 0;
                None
            }
        }
    }
}

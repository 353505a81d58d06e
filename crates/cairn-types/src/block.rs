use std::fmt;

/// Immutable unit of content.
///
/// A `Block` owns its bytes; there are no mutators. Borrowing the content via
/// [`Block::data`] ties the borrow to the block, so content can never be read
/// after the block is dropped. Zero-length blocks are legal but degenerate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Block {
    data: Vec<u8>,
}

impl Block {
    /// Create a block, taking ownership of the given bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Create a block by copying the given bytes.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// The block content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length block.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the block and return its content.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for Block {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for Block {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("len", &self.data.len()).finish()
    }
}

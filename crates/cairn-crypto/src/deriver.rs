use cairn_types::{Block, Key, KEY_LEN};

use crate::encoding::{self, EncodingError};

/// Domain-separated BLAKE3 key deriver.
///
/// The domain tag is prepended to every hash computation, so the same bytes
/// hashed for a different purpose never collide with a block address. The
/// deriver holds no state: the same content always yields the same key, in
/// any process, in any call order.
pub struct KeyDeriver {
    domain: &'static str,
}

impl KeyDeriver {
    /// Deriver for block content. This is the addressing scheme of the
    /// blockstore.
    pub const BLOCK: Self = Self {
        domain: "cairn-block-v1",
    };

    /// Create a deriver with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Size in bytes of a derived key, independent of content length.
    pub const fn key_size(&self) -> usize {
        KEY_LEN
    }

    /// Raw 32-byte digest of `data` under this domain.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Derive the key for `data`.
    pub fn derive(&self, data: &[u8]) -> Key {
        Key::from_digest(&self.digest(data))
    }

    /// Derive the key for a block.
    pub fn derive_block(&self, block: &Block) -> Key {
        self.derive(block.data())
    }

    /// Derive the key for `data` into a caller-owned buffer.
    ///
    /// The buffer must hold at least [`KeyDeriver::key_size`] bytes. Returns
    /// the number of bytes written.
    pub fn derive_into(&self, data: &[u8], output: &mut [u8]) -> Result<usize, EncodingError> {
        if output.len() < KEY_LEN {
            return Err(EncodingError::BufferTooSmall {
                required: KEY_LEN,
                actual: output.len(),
            });
        }
        encoding::encode_into(&self.digest(data), output)
    }

    /// Verify that `data` is addressed by `key`.
    pub fn verify(&self, data: &[u8], key: &Key) -> bool {
        self.derive(data) == *key
    }

    /// The domain tag used by this deriver.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

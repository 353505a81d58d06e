//! Fixed-alphabet text encoding used for keys.
//!
//! Keys are lowercase hexadecimal without padding or prefix. This is part of
//! the on-disk format: changing it orphans every stored block and journal
//! record.

/// Errors from encoding operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The caller-provided output buffer cannot hold the encoded text.
    #[error("output buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("hex encoding failed: {0}")]
    Hex(String),
}

/// Number of output bytes needed to encode `input_len` bytes.
pub const fn encoded_size(input_len: usize) -> usize {
    input_len * 2
}

/// Encode bytes into a freshly allocated string.
pub fn encode(input: &[u8]) -> String {
    hex::encode(input)
}

/// Encode bytes into a caller-owned buffer, returning the number of bytes
/// written. The buffer may be larger than [`encoded_size`]; the tail is left
/// untouched.
pub fn encode_into(input: &[u8], output: &mut [u8]) -> Result<usize, EncodingError> {
    let required = encoded_size(input.len());
    if output.len() < required {
        return Err(EncodingError::BufferTooSmall {
            required,
            actual: output.len(),
        });
    }
    hex::encode_to_slice(input, &mut output[..required])
        .map_err(|e| EncodingError::Hex(e.to_string()))?;
    Ok(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_twice_input() {
        assert_eq!(encoded_size(0), 0);
        assert_eq!(encoded_size(32), 64);
    }

    #[test]
    fn encode_is_lowercase_hex() {
        assert_eq!(encode(&[0x00, 0xab, 0xff]), "00abff");
    }

    #[test]
    fn encode_into_exact_buffer() {
        let mut buf = [0u8; 6];
        let written = encode_into(&[0x00, 0xab, 0xff], &mut buf).unwrap();
        assert_eq!(written, 6);
        assert_eq!(&buf, b"00abff");
    }

    #[test]
    fn encode_into_larger_buffer_leaves_tail() {
        let mut buf = [b'#'; 8];
        let written = encode_into(&[0x12], &mut buf).unwrap();
        assert_eq!(written, 2);
        assert_eq!(&buf, b"12######");
    }

    #[test]
    fn encode_into_rejects_small_buffer() {
        let mut buf = [0u8; 3];
        let err = encode_into(&[1, 2], &mut buf).unwrap_err();
        assert_eq!(
            err,
            EncodingError::BufferTooSmall {
                required: 4,
                actual: 3
            }
        );
    }
}

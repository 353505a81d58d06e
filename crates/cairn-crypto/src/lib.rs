//! Content addressing for the Cairn block repository.
//!
//! Provides the domain-separated BLAKE3 [`KeyDeriver`] that turns block
//! content into a [`cairn_types::Key`], and the fixed-alphabet [`encoding`]
//! helpers it is built on.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod deriver;
pub mod encoding;

pub use deriver::KeyDeriver;
pub use encoding::{encoded_size, EncodingError};

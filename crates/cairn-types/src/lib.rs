//! Foundation types for the Cairn block repository.
//!
//! Every other Cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`Key`]: Content-derived, fixed-alphabet textual address of a block
//! - [`Block`]: Immutable unit of content stored under its key
//! - [`Timestamp`]: Wall-clock milliseconds attached to journal records

pub mod block;
pub mod error;
pub mod key;
pub mod temporal;

pub use block::Block;
pub use error::TypeError;
pub use key::{Key, KEY_LEN};
pub use temporal::Timestamp;

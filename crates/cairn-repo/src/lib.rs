//! Repository lifecycle for Cairn.
//!
//! A [`Repository`] owns one root directory: its TOML `config`, the datastore
//! engine directory and the `repo.lock` file that keeps a second process out.
//!
//! ```text
//! Unbuilt --build--> Built --open--> Open --close--> Closed
//! ```
//!
//! ```no_run
//! use cairn_repo::{Block, RepoConfig, Repository};
//!
//! # fn main() -> Result<(), cairn_repo::RepoError> {
//! let mut repo = Repository::open_at("/var/lib/cairn".as_ref(), &RepoConfig::default())?;
//! let key = repo.put_block(&Block::from_slice(b"Hello, world!"))?;
//! repo.set_pin(&key, true)?;
//! repo.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lock;
pub mod repository;

pub use config::{Backend, DatastoreConfig, RepoConfig, CONFIG_VERSION};
pub use error::{RepoError, RepoResult};
pub use lock::{RepoLock, LOCK_FILE};
pub use repository::{BuildOutcome, RepoState, Repository, CONFIG_FILE, ENGINE_FILE};

pub use cairn_crypto::KeyDeriver;
pub use cairn_store::{CursorOp, Datastore, JournalCursor, JournalRecord, Operation};
pub use cairn_types::{Block, Key};

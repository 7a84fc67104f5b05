//! Common utilities and types shared across custodian crates.

pub mod error;
pub mod hash;
pub mod id;
pub mod timestamp;

pub use error::{EntityKind, Error, Result};
pub use hash::HashAlgorithm;
pub use id::IdGenerator;
pub use timestamp::Timestamp;

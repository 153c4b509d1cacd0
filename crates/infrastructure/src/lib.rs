//! Infrastructure crate: PostgreSQL implementations of the `core::ports`
//! store traits, plus connection/pool/migration plumbing.

pub mod database;
pub mod error;
pub mod repositories;

pub use database::*;
pub use error::*;
pub use repositories::*;

//! Post-processes an LSIF dump: derives package-scoped monikers
//! (`linker`), shards and canonically hashes per-document facts
//! (`document`), and validates the wire schema and stream invariants
//! (`validator`), all wired together by the streaming `driver`.

pub mod cli;
pub mod document;
pub mod driver;
pub mod error;
pub mod id;
pub mod linker;
pub mod protocol;
pub mod validator;
pub mod writer;

pub use driver::{Driver, DriverOptions};
pub use error::LinkError;

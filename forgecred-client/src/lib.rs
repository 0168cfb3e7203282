//! ForgeCred Client - Remote Data Source
//!
//! Defines the abstraction over the credential chain consumed by the
//! cache layer, plus an in-memory reference implementation with the
//! on-chain pallet's exact semantics (content-addressable ids, metadata
//! size cap, per-owner cap, ownership checks) and failure injection for
//! tests.

pub mod memory;
pub mod source;

pub use memory::InMemoryCredentialStore;
pub use source::{NetworkInfo, RemoteDataSource, TxReceipt};

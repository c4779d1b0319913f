//! KarmaChain storage abstractions.
//!
//! This crate defines the persistence contract consumed by the engine:
//! - user documents, mutated only through atomic balance mutations
//! - appeal / atonement plan pairs, created and completed as one unit
//! - append-only death events committed together with the lifecycle reset
//! - whole-table value snapshots (last write wins)
//!
//! `memory::InMemoryKarmaStorage` is the deterministic reference adapter.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{KarmaStorage, LifecycleStore, RemediationStore, UserStore, ValueTableStore};

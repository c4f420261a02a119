//! Source adapters for Inventory Warden.
//!
//! A source adapter turns one external inventory system into plain
//! [`iw_core::Record`]s. This crate defines the adapter trait and ships two
//! adapters: a static JSON file reader for fixtures and air-gapped exports,
//! and a canned-record mock for tests.

mod file;
mod mock;
mod traits;

pub use file::StaticFileSource;
pub use mock::MockSource;
pub use traits::{Source, SourceError};

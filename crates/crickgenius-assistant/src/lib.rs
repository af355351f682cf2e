//! Prompt assembly and upstream calls for the fantasy cricket assistant.
//!
//! [`generator::ResponseGenerator`] turns a query plus stored history into a
//! completion, pulling optional facts from [`enrich::Enricher`] along the way.

pub mod cache;
pub mod completion;
pub mod cricket;
pub mod enrich;
pub mod error;
pub mod generator;

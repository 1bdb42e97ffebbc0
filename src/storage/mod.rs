//! Persistence: `estimator_snapshot`, `event`, and `reading_archive` streams.
//!
//! `PersistenceLayer` is a trait so the default in-memory backend can be
//! swapped for a durable one without touching `ingest`/`query` call sites.

pub mod persistence;

pub use persistence::{EstimatorSnapshot, InMemoryDAL, PersistenceError, PersistenceLayer};

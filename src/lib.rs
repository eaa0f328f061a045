//! Index Upgrader - zero-downtime search index migrations
//!
//! Reads a versioned catalogue of index definitions and brings every alias
//! in a search cluster up to its newest version: create the next physical
//! index, copy the documents across, move the alias atomically, then drop
//! the superseded index. Readers querying through the alias never see a
//! missing or half-filled index.

pub mod catalogue;
pub mod cluster;
pub mod config;
pub mod migration;
pub mod utils;

//! Startup helpers shared by the binary.

pub mod bootstrap;
pub mod retry;

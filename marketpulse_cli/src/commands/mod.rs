//! CLI subcommand implementations.

pub mod sectors;
pub mod serve;
pub mod sync;

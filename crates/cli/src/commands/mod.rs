//! CLI subcommands.

pub mod license;
pub mod migrate;

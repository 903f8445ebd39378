//! CLI subcommand implementations.

pub mod record;
pub mod stats;
pub mod types;
pub mod util;

//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stt_core::{CategoryId, RangeLength, RecordId, TagId};

/// Activity time tracker.
///
/// Start and stop activities, then see where the time went over any day,
/// week, month, year, or custom range, including time nothing was tracked.
#[derive(Debug, Parser)]
#[command(name = "stt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage record types.
    #[command(subcommand)]
    Types(TypesAction),

    /// Add a completed record.
    Add {
        /// Record type name.
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Start time (ISO 8601, YYYY-MM-DD, 'now', or relative like '2 hours ago').
        #[arg(long)]
        from: String,

        /// End time (same formats as --from).
        #[arg(long)]
        to: String,

        /// Free-text comment.
        #[arg(long, default_value = "")]
        comment: String,

        /// Tag ID to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<TagId>,
    },

    /// Start tracking a record type.
    Start {
        /// Record type name.
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Start time (defaults to now).
        #[arg(long)]
        at: Option<String>,

        /// Free-text comment.
        #[arg(long, default_value = "")]
        comment: String,

        /// Tag ID to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<TagId>,
    },

    /// Stop tracking a record type and store the record.
    Stop {
        /// Record type name.
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Stop time (defaults to now).
        #[arg(long)]
        at: Option<String>,
    },

    /// Show time per record type for a range.
    Stats(StatsArgs),
}

/// Record type management actions.
#[derive(Debug, Subcommand)]
pub enum TypesAction {
    /// Create a record type.
    Add {
        name: String,

        /// Category ID (repeatable).
        #[arg(long = "category")]
        categories: Vec<CategoryId>,
    },

    /// List record types.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove a record type. Its records are kept.
    Remove { name: String },
}

/// Options for the stats command.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Range: day, week, month, year, all, or last-N (N days).
    #[arg(long, default_value = "week")]
    pub range: RangeLength,

    /// Periods to move the range by (-1 = previous).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub shift: i32,

    /// Custom range start; overrides --range.
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Custom range end.
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Only count these record types, by name (repeatable).
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Only count types in this category (repeatable).
    #[arg(long = "category")]
    pub categories: Vec<CategoryId>,

    /// Also count types without a category.
    #[arg(long)]
    pub uncategorized: bool,

    /// Only count records with exactly this comment.
    #[arg(long)]
    pub comment: Option<String>,

    /// Only count records that have a comment.
    #[arg(long)]
    pub any_comment: bool,

    /// Only count records without a comment.
    #[arg(long)]
    pub no_comment: bool,

    /// Only count records carrying this tag (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<TagId>,

    /// Also count records without tags.
    #[arg(long)]
    pub untagged: bool,

    /// Drop records carrying this tag (repeatable).
    #[arg(long = "exclude-tag")]
    pub exclude_tags: Vec<TagId>,

    /// Only count these records (repeatable).
    #[arg(long = "only-record", conflicts_with = "exclude_records")]
    pub only_records: Vec<RecordId>,

    /// Drop these records (repeatable).
    #[arg(long = "exclude-record")]
    pub exclude_records: Vec<RecordId>,

    /// Include time not covered by any record.
    #[arg(long)]
    pub untracked: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

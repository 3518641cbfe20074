//! CLI module

mod commands;
mod listing;
mod progress;

pub use commands::{Action, Cli, normalize_args, parse_number};
pub use listing::{format_disk_listing, format_volume_listing};
pub use progress::ProgressReporter;

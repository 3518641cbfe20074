//! Data Transfer Objects

mod copy_options;
mod copy_report;
mod enumeration_options;

pub use copy_options::CopyOptions;
pub use copy_report::CopyReport;
pub use enumeration_options::{DEFAULT_MAX_DISKS, EnumerationOptions};

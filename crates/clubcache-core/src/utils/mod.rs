//! Utility functions for date and URL formatting.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{human_readable_date, join_url, parse_timestamp, DATE_NOT_SPECIFIED};

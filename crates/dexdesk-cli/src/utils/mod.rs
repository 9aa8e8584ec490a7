//! Utility functions for string formatting.

pub mod format;

pub use format::{format_amount, format_optional_amount, truncate_string};

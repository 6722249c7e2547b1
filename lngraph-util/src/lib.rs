//! Logging and configuration helpers for processes embedding the Lightning graph

pub mod config;
pub mod log_utils;
#[cfg(feature = "main")]
pub mod util;

//! Library half of the xorshard CLI: configuration and progress display.

pub mod config;
pub mod progress;

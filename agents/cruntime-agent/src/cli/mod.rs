//! Command-line support: configuration file and console styling.

pub mod config;
pub mod style;

//! Subcommand implementations.

pub mod config;
pub mod evaluate;
pub mod infer;
pub mod models;

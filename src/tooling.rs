//! Tooling Layer
//!
//! Command-line entry points over the library.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};

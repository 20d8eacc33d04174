//! Command-line front end of the mcpod gateway.
#![deny(unsafe_code)]

pub mod commands;
pub mod handlers;
pub mod parser;

pub use commands::{CatalogAddArgs, CatalogCommand, Commands, LauncherKind, ServeArgs};
pub use parser::Cli;

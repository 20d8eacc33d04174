//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface of the MCP server gateway.
#[derive(Parser)]
#[command(name = "mcpod")]
#[command(about = "Run MCP servers as pods and proxy JSON-RPC to them")]
#[command(version)]
pub struct Cli {
    /// `SQLite` database file
    #[arg(
        long = "database",
        env = "MCPOD_DATABASE",
        default_value = "mcpod.db",
        global = true
    )]
    pub database: PathBuf,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CatalogCommand, LauncherKind};
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from([
            "mcpod",
            "--database",
            "/tmp/mcpod.db",
            "serve",
            "--port",
            "9999",
            "--launcher",
            "direct",
            "--allowed-origin",
            "http://a.test",
            "--allowed-origin",
            "http://b.test",
            "--provision-timeout-secs",
            "5",
        ]);

        assert_eq!(cli.database, PathBuf::from("/tmp/mcpod.db"));
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 9999);
        assert_eq!(args.launcher, LauncherKind::Direct);
        assert_eq!(args.allowed_origins, vec!["http://a.test", "http://b.test"]);

        let settings = args.settings();
        assert_eq!(settings.provision_timeout_secs, 5);
        assert_eq!(settings.discovery_attempts, 3);
    }

    #[test]
    fn test_catalog_add_flags() {
        let cli = Cli::parse_from([
            "mcpod",
            "catalog",
            "add",
            "echo",
            "Echo",
            "--image",
            "ghcr.io/acme/echo:1",
            "--command",
            "node",
            "--arg",
            "server.js",
            "--env",
            "LOG_LEVEL=debug",
        ]);

        let Some(Commands::Catalog {
            command: CatalogCommand::Add(add),
        }) = cli.command
        else {
            panic!("expected catalog add");
        };
        let entry = add.into_entry();
        let workload = entry.workload.unwrap();
        assert_eq!(workload.image, "ghcr.io/acme/echo:1");
        assert_eq!(workload.command.as_deref(), Some("node"));
        assert_eq!(workload.args, vec!["server.js"]);
        assert_eq!(workload.env["LOG_LEVEL"], "debug");
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}

//! CLI entry point.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use mcpod_cli::{CatalogCommand, Cli, Commands, handlers};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Serve(args) => {
            tracing::debug!(database = %cli.database.display(), "starting gateway");
            handlers::serve::execute(&cli.database, &args).await
        }
        Commands::Catalog { command } => match command {
            CatalogCommand::Add(args) => handlers::catalog::add(&cli.database, args.into_entry()).await,
            CatalogCommand::List => handlers::catalog::list(&cli.database).await,
        },
    }
}

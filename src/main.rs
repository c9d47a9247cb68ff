use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use estuary::app::AppContext;
use estuary::cli::{commands, Cli, Commands};
use estuary::daemon::Daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config, cli.db, cli.workers)?;
    let engine = ctx.start_engine().await?;

    if let Commands::Run = cli.command {
        Daemon::new(engine, ctx.config.update.clone()).run().await?;
        return Ok(());
    }

    let result = match cli.command {
        Commands::Add { ref url, ref name } => commands::add_feed(&engine, url, name.as_deref())
            .await
            .map(|_| ()),
        Commands::Remove { ref url } => commands::remove_feed(&engine, url),
        Commands::Update { ref url } => commands::update_feeds(&engine, url.as_deref()).await,
        Commands::List { items, feed, json } => {
            if items || feed.is_some() {
                commands::list_items(&engine, feed, json)
            } else {
                commands::list_feeds(&engine, json)
            }
        }
        Commands::Read { id, unset } => commands::mark_read(&engine, id, !unset),
        Commands::Star { id, unset } => commands::mark_starred(&engine, id, !unset),
        Commands::Delete { id } => commands::delete_item(&engine, id),
        Commands::Cleanup => commands::cleanup(&engine).await,
        Commands::Run => Ok(()),
    };

    // Persist whatever the command changed, even when it failed
    engine.shutdown().await?;
    result?;

    Ok(())
}

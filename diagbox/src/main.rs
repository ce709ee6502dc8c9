mod cli;
mod commands;
mod observability;

use anyhow::Result;
use clap::Parser;
use cli::{CacheAction, Cli, Commands};

fn main() -> Result<()> {
    diagbox_core::config::load_dotenv();
    observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { recipe, force } => commands::init::cmd_init(&recipe, force)?,
        Commands::Render { recipe, output } => {
            commands::render::cmd_render(recipe.as_deref(), output.as_deref())?
        }
        Commands::Build {
            recipe,
            context,
            tag,
            store,
            backend,
        } => commands::build::cmd_build(recipe.as_deref(), &context, &tag, store.as_deref(), backend)?,
        Commands::Inspect { tag, store } => commands::inspect::cmd_inspect(&tag, store.as_deref())?,
        Commands::Export { tag, dest, store } => {
            commands::inspect::cmd_export(&tag, &dest, store.as_deref())?
        }
        Commands::Cache { action } => match action {
            CacheAction::List { store } => commands::cache::cmd_list(store.as_deref())?,
            CacheAction::Prune { store, dry_run } => commands::cache::cmd_prune(store.as_deref(), dry_run)?,
            CacheAction::Clean {
                store,
                dry_run,
                force,
            } => commands::cache::cmd_clean(store.as_deref(), dry_run, force)?,
        },
        Commands::Serve { host, port } => commands::serve::cmd_serve(host, port)?,
    }

    Ok(())
}

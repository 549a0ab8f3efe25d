use clap::Parser;
use tokio_util::sync::CancellationToken;

use mediagraph::Settings;
use mediagraph::cli::commands::{self, watch::WatchArgs};
use mediagraph::cli::{Cli, Commands};
use mediagraph::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Init runs before any settings exist
    if let Commands::Init { force } = cli.command {
        commands::init::run_init(force);
        return;
    }

    let config = match &cli.config {
        Some(path) => Settings::load_from(path).map(|mut settings| {
            if settings.workspace_root.is_none() {
                settings.workspace_root = path
                    .parent()
                    .and_then(|dir| dir.parent())
                    .map(|root| root.to_path_buf());
            }
            settings
        }),
        None => Settings::load(),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    logging::init_with_config(&config.logging);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Shutting down, finishing in-flight work...");
            ctrl_c.cancel();
        }
    });

    let result = match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Config => {
            commands::init::run_config(&config);
            Ok(())
        }
        Commands::Watch {
            roots,
            debounce_ms,
            workers,
        } => {
            let args = WatchArgs {
                roots,
                debounce_ms,
                workers,
            };
            commands::watch::run(&config, args, shutdown).await
        }
        Commands::Scan { roots, threads } => {
            tokio::task::spawn_blocking(move || commands::scan::run(&config, roots, threads))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|scanned| scanned.map(|_| ()))
        }
        Commands::Consume { once, queue } => commands::consume::run(&config, once, queue, shutdown)
            .await
            .map(|_| ()),
        Commands::Prospect { path } => commands::prospect::run(&path),
        Commands::Graph { action } => commands::graph::run(&config, action),
        Commands::Queue { action } => commands::queue::run(&config, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

mod cli;
mod error;

use std::process;

use clap::Parser;
use hls_fixture::{FixtureServer, FixtureServerConfig, RulesFile};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::Args,
    error::{AppError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    let mut config = FixtureServerConfig::from_env_or_default();
    if let Some(base_dir) = args.base_dir {
        config.base_dir = base_dir;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let port = config.port;
    let server = FixtureServer::load(config)?;
    info!("Serving {} routes", server.routes().len());

    if let Some(path) = args.rules.as_deref() {
        RulesFile::from_path(path)?.apply(&server)?;
    }

    let addr = server.start(port).await?;
    info!("Listening on http://{} (Ctrl+C to stop)", addr);

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    server.stop().await?;
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}

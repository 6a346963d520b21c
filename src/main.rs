#![cfg(not(tarpaulin_include))]

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use xlbridge::app;
use xlbridge::config::AppConfig;

/// HTTP backend bridging spreadsheet clients to SQL and the connector API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Env file to load instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Address to listen on, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.env_file.as_deref())?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    app::run(config).await
}

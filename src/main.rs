//! devport - Local dev server orchestrator
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use devport::RunOptions;
use devport_core::{HostType, LaunchTarget};

/// devport - Local dev server orchestrator
#[derive(Parser, Debug)]
#[command(name = "devport")]
#[command(about = "Run a dev server and open the project on devices", long_about = None)]
struct Args {
    /// Path to the project
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Port to bind (defaults to the configured port)
    #[arg(long, short)]
    port: Option<u16>,

    /// How clients reach the server: lan, tunnel or localhost
    #[arg(long)]
    host: Option<HostType>,

    /// Serve over https
    #[arg(long)]
    https: bool,

    /// Open in a development build instead of Expo Go
    #[arg(long)]
    dev_client: bool,

    /// App scheme of the development build
    #[arg(long)]
    scheme: Option<String>,

    /// Open the project once the server is up: simulator, emulator or desktop
    #[arg(long)]
    open: Option<LaunchTarget>,

    /// Write a default `.devport/config.toml` if missing
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let project = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    devport::run(RunOptions {
        project,
        port: args.port,
        host_type: args.host,
        https: args.https,
        dev_client: args.dev_client,
        scheme: args.scheme,
        open: args.open,
        init: args.init,
    })
    .await?;
    Ok(())
}

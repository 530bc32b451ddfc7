//! arbord: the arbor daemon.
//!
//! # Usage
//!
//! ```text
//! arbord standalone --port 8443 --data-dir /var/lib/arbor --config /etc/arbor/arbord.toml
//! ```

use std::path::PathBuf;

use arbord::config::{DaemonConfig, Overrides};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,arbord=debug,arbor=debug";

#[derive(Parser)]
#[command(name = "arbord", about = "arbor application platform daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane with the embedded state store.
    Standalone {
        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Path to arbord.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Domain for default application routes (overrides the config file).
        #[arg(long)]
        domain: Option<String>,
    },
    /// Print the effective configuration as TOML and exit.
    ShowConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
            domain,
        } => {
            let overrides = Overrides {
                port,
                data_dir,
                domain,
            };
            let config = DaemonConfig::load(config.as_deref(), overrides)?;
            arbord::standalone::run(config).await
        }
        Command::ShowConfig { config } => {
            let config = DaemonConfig::load(config.as_deref(), Overrides::default())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

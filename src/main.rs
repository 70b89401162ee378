use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use linkwatch::config::Config;
use linkwatch::probes::{SpeedProbe, SpeedTestClient};

#[derive(Parser)]
#[command(
    name = "linkwatch",
    about = "Home-network health monitor",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor (scheduler + optional debug server)
    Serve {
        /// Configuration file
        #[arg(long, env = "LINKWATCH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Run a single latency probe
    Ping {
        /// Configuration file
        #[arg(long, env = "LINKWATCH_CONFIG")]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run a single throughput test
    SpeedTest {
        /// Configuration file
        #[arg(long, env = "LINKWATCH_CONFIG")]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and print the effective result
    CheckConfig {
        /// Configuration file
        #[arg(long, env = "LINKWATCH_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn load(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::resolve(path.as_deref())?;
    linkwatch::logging::init(&config.logging)?;
    Ok(config)
}

/// Like [`load`], but keeps stdout free for the command's own output.
fn load_for_report(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::resolve(path.as_deref())?;
    let mut logging = config.logging.clone();
    if logging.output == "stdout" {
        logging.output = "stderr".to_string();
    }
    linkwatch::logging::init(&logging)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = load(config)?;
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting linkwatch");
            linkwatch::run(config).await?;
        }
        Commands::Ping { config, json } => {
            let config = load_for_report(config)?;
            let client = SpeedTestClient::new(config.probe)?;
            let result = client.ping(&CancellationToken::new()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{:<20} {:.1} ms",
                    result.target,
                    result.latency.as_secs_f64() * 1000.0
                );
            }
        }
        Commands::SpeedTest { config, json } => {
            let config = load_for_report(config)?;
            let client = SpeedTestClient::new(config.probe)?;
            let result = client.speedtest(&CancellationToken::new()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\n=== linkwatch speed test ===");
                println!("Server:   {}", result.target);
                println!("Download: {:.2} Mbps", result.download_mbps);
                println!("Upload:   {:.2} Mbps", result.upload_mbps);
                println!("Latency:  {:.1} ms", result.latency.as_secs_f64() * 1000.0);
                println!();
            }
        }
        Commands::CheckConfig { config } => {
            // No logging init: stdout carries only the rendered config.
            let config = Config::resolve(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

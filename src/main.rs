use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use photobooth::camera::CliCamera;
use photobooth::devices::admin::AdminEffect;
use photobooth::devices::runtime::{self, ConsoleInput, KioskAction};
use photobooth::printing::cups::CupsBackend;
use photobooth::storage::{HttpDownloader, HttpUploader};
use photobooth::{Config, HubServerBuilder};

/// Photobooth - multi-station photo booth over a relay hub
#[derive(Parser)]
#[command(name = "photobooth", version, about)]
struct Cli {
    /// Hub base URL the stations connect to
    #[arg(long, env = "BOOTH_HUB_URL", global = true)]
    hub_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Station,
}

#[derive(Subcommand)]
enum Station {
    /// Run the relay hub server
    Hub {
        /// Port to listen on
        #[arg(long, env = "BOOTH_PORT")]
        port: Option<u16>,
    },
    /// Run the guest kiosk, reading actions from stdin
    Selector {
        /// Name announced on the hub
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the camera station
    Capture {
        /// Name announced on the hub
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the print station
    Print {
        /// Name announced on the hub
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the operator console, reading commands from stdin
    Admin {
        /// Name announced on the hub
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,photobooth=info",
        1 => "info,photobooth=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.hub_url {
        config.hub.url = url;
    }

    match cli.command {
        Station::Hub { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            HubServerBuilder::from_config(&config).build().run().await?;
        }
        Station::Selector { name } => {
            if let Some(name) = name {
                config.devices.selector = name;
            }
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(read_lines(tx, |line| match line.parse::<KioskAction>() {
                Ok(action) => Some(action),
                Err(e) => {
                    eprintln!("{e}");
                    None
                }
            }));
            runtime::run_selector(&config, rx).await?;
        }
        Station::Capture { name } => {
            if let Some(name) = name {
                config.devices.capture = name;
            }
            let camera = Arc::new(CliCamera::from_config(&config.capture));
            let uploader = Arc::new(HttpUploader::new(&config.hub.url)?);
            runtime::run_capture(&config, camera, uploader).await?;
        }
        Station::Print { name } => {
            if let Some(name) = name {
                config.devices.print = name;
            }
            let backend = CupsBackend::new();
            if let Err(e) = backend.preflight() {
                tracing::warn!(error = %e, "printing will fail until this is fixed");
            }
            let downloader = Arc::new(HttpDownloader::new(config.print.download_timeout)?);
            runtime::run_print(&config, Arc::new(backend), downloader).await?;
        }
        Station::Admin { name } => {
            if let Some(name) = name {
                config.devices.admin = name;
            }
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(read_lines(tx, |line| Some(ConsoleInput::from(line))));

            let (console_tx, mut console) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(effect) = console.recv().await {
                    match effect {
                        AdminEffect::Show(entry) => println!(
                            "{} [{}] {}",
                            entry.at.format("%H:%M:%S"),
                            entry.kind.label(),
                            entry.text
                        ),
                        AdminEffect::Clear => print!("\x1b[2J\x1b[H"),
                        AdminEffect::Send(_) => {}
                    }
                }
            });
            runtime::run_admin(&config, rx, console_tx).await?;
        }
    }

    Ok(())
}

/// Forward parsed stdin lines until stdin closes or the receiver goes away
async fn read_lines<T, F>(tx: mpsc::Sender<T>, parse: F)
where
    F: Fn(&str) -> Option<T>,
{
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(item) = parse(line) {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

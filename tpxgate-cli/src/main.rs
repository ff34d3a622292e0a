//! tpxgate command-line interface.
//!
//! `serve` runs the gateway in the foreground; `info` summarises a cluster
//! sink file.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tpxgate_io::ClusterFileReader;
use tpxgate_server::{event_channel, spawn_log_sink, DetachedLink, Gateway, GatewayConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File error: {0}")]
    TpxgateIo(#[from] tpxgate_io::Error),

    #[error("Gateway error: {0}")]
    Server(#[from] tpxgate_server::Error),
}

/// Real-time acquisition gateway for Timepix3 detectors.
#[derive(Parser)]
#[command(name = "tpxgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway until a worker fails or the run time elapses
    Serve {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Interface for UDP and bus endpoints
        #[arg(long)]
        host: Option<String>,

        /// UDP port for detector data (0 = auto)
        #[arg(long)]
        udp_port: Option<u16>,

        /// Client control port
        #[arg(long)]
        client_port: Option<u16>,

        /// Save clusters to this file
        #[arg(long)]
        cluster_file: Option<PathBuf>,

        /// Save raw TPX3 chunks to this file
        #[arg(long)]
        raw_file: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        run_for: Option<u64>,
    },

    /// Show information about a cluster file
    Info {
        /// Cluster file written by the gateway
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            udp_port,
            client_port,
            cluster_file,
            raw_file,
            run_for,
        } => {
            let mut config = match config {
                Some(path) => GatewayConfig::from_file(path)?,
                None => GatewayConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = udp_port {
                config.udp_port = port;
            }
            if let Some(port) = client_port {
                config.client_port = port;
            }
            if cluster_file.is_some() {
                config.cluster_file = cluster_file;
            }
            if raw_file.is_some() {
                config.raw_file = raw_file;
            }

            let (events, rx) = event_channel(config.log_capacity);
            let sink = spawn_log_sink(rx)?;

            let gateway = Gateway::start(config, Box::new(DetachedLink), &events)?;
            println!("Client endpoint: {}", gateway.client_address());
            if let Some(udp) = gateway.udp_address() {
                println!("UDP input:       {}", udp);
            }
            println!("Cluster stream:  {}", gateway.cluster_address());
            println!("Histograms:      {}", gateway.histogram_address());

            if let Some(secs) = run_for {
                let stop = gateway.stop_token();
                std::thread::Builder::new()
                    .name("tpxgate-timer".into())
                    .spawn(move || {
                        std::thread::sleep(Duration::from_secs(secs));
                        stop.cancel();
                    })?;
            }

            let started = Instant::now();
            let result = gateway.run();
            drop(events);
            let forwarded = sink.join().unwrap_or(0);
            log::debug!("{} log events forwarded", forwarded);
            println!("Ran for {:.1}s", started.elapsed().as_secs_f64());
            result?;
        }

        Commands::Info { input } => {
            let records = ClusterFileReader::read_all(&input)?;
            let size = std::fs::metadata(&input)?.len();

            println!("File: {}", input.display());
            println!("Size: {} bytes", size);
            println!("Clusters: {}", records.len());

            if !records.is_empty() {
                let n = records.len() as f64;
                let mean_x = records.iter().map(|r| r.x).sum::<f64>() / n;
                let mean_y = records.iter().map(|r| r.y).sum::<f64>() / n;
                let t_min = records.iter().map(|r| r.t).fold(f64::INFINITY, f64::min);
                let t_max = records.iter().map(|r| r.t).fold(f64::NEG_INFINITY, f64::max);
                println!("Mean position: ({:.2}, {:.2})", mean_x, mean_y);
                println!(
                    "Time range: {} - {} ticks ({:.3} ms)",
                    t_min as u64,
                    t_max as u64,
                    (t_max - t_min) * 1.5625e-6
                );
            }
        }
    }

    Ok(())
}

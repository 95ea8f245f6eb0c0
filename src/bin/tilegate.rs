//! tilegate: inspect and drive a tilegate cache from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilegate::{Config, ControlRequest, RequestInterceptor, RequestMode, Tilegate};

/// Tilegate CLI
#[derive(Parser)]
#[command(name = "tilegate")]
#[command(version = tilegate::PKG_VERSION)]
#[command(about = "Offline cache and request router for map clients")]
struct Args {
    /// Config file (default: ~/.tilegate/config.toml, then /etc/tilegate/config.toml)
    #[arg(short, long, env = "TILEGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the traffic class of a URL
    Classify {
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },

    /// Route one request through the cache
    Fetch {
        /// Absolute URL, or a path relative to the configured origin
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        navigate: bool,
        /// Write the response body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pre-cache the shell manifest
    Install,

    /// Delete partitions from other releases
    Activate,

    /// List partitions with entry counts and sample URLs
    Info,

    /// Delete cached partitions
    Clear {
        /// Only the tile partition
        #[arg(long)]
        tiles: bool,
    },

    /// Run a tile maintenance pass now
    Maintain,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let gate = Tilegate::builder().config(config).build()?;

    match args.command {
        Command::Classify { url, method } => {
            let class = gate.classifier().classify(&url, &method);
            match gate.classifier().tile_pattern(&url) {
                Some(pattern) => println!("{class} ({pattern})"),
                None => println!("{class}"),
            }
        }

        Command::Fetch {
            url,
            method,
            navigate,
            output,
        } => {
            let mut request = gate.request(&method, &url)?;
            if navigate {
                request = request.mode(RequestMode::Navigate);
            }
            let served = gate.fetch(&request).await?;
            gate.settle().await;

            let response = &served.response;
            println!("class:  {}", served.class);
            println!("source: {}", served.source.as_str());
            println!("status: {} {}", response.status, response.status_text);
            for (name, value) in &response.headers {
                println!("  {name}: {value}");
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, &response.body)?;
                    println!("wrote {} bytes to {}", response.body.len(), path.display());
                }
                None => println!("body:   {} bytes", response.body.len()),
            }
        }

        Command::Install => {
            let report = gate.install().await?;
            println!("cached {} shell assets", report.cached.len());
            for (url, reason) in &report.failed {
                println!("  failed {url}: {reason}");
            }
        }

        Command::Activate => {
            let report = gate.activate().await;
            if report.deleted.is_empty() {
                println!("no stale partitions");
            }
            for name in &report.deleted {
                println!("deleted {name}");
            }
            for name in &report.failed {
                println!("could not delete {name}");
            }
        }

        Command::Info => {
            let reply = gate.message(ControlRequest::GetCacheInfo).await;
            if !reply.success {
                return Err(reply.message.unwrap_or_default().into());
            }
            let info = reply.cache_info.unwrap_or_default();
            if info.is_empty() {
                println!("no partitions");
            }
            for (name, partition) in &info {
                println!("{name}: {} entries", partition.entry_count);
                for url in &partition.urls {
                    println!("  {url}");
                }
            }
        }

        Command::Clear { tiles } => {
            let request = if tiles {
                ControlRequest::ClearTilesCache
            } else {
                ControlRequest::ClearAllCaches
            };
            let reply = gate.message(request).await;
            let message = reply.message.unwrap_or_default();
            if !reply.success {
                return Err(message.into());
            }
            println!("{message}");
        }

        Command::Maintain => {
            let report = gate.maintain_tiles().await?;
            println!(
                "scanned {}, evicted {}, expired {}, {} remain",
                report.scanned,
                report.evicted,
                report.expired,
                report.remaining()
            );
        }
    }

    Ok(())
}

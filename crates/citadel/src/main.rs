// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use citadel::config::Config;
use citadel::transport::meshcore::device::mock::MockRadio;
use citadel::transport::meshcore::device::RadioDevice;

#[derive(Debug, Parser)]
#[command(name = "citadel", about = "Mesh-Citadel BBS server")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml", env = "CITADEL_CONFIG")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    // The vendor serial driver plugs in here; "mock" runs the scripted
    // in-process radio for hardware-free development.
    let device: Arc<dyn RadioDevice> = match config.transport.meshcore.serial_port.as_str() {
        "mock" => Arc::new(MockRadio::new(true)),
        port => {
            error!(port = %port, "no radio driver linked for this serial port; \
                   set transport.meshcore.serial_port to 'mock' to run without hardware");
            std::process::exit(1);
        }
    };

    if let Err(e) = citadel::run(config, device).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.log_level));

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.log_file_path);

    match file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(Arc::new(file)))
                .init();
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            tracing::warn!(path = %config.logging.log_file_path, err = %e,
                "could not open log file, logging to stdout only");
        }
    }
}

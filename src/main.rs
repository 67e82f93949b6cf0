// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod actions;
mod audio;
mod config;
mod controller;
mod gamepad;
mod midi;
mod patch;
mod samples;
mod state;
mod store;
#[cfg(test)]
mod testutil;

use clap::{crate_version, Parser, Subcommand};
use config::Instrument;
use samples::{Freesound, Search};
use state::Query;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=xamplr sampler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/xamplr
ExecStart=/usr/local/bin/xamplr start "$XAMPLR_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=xamplr.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A pad sampler driven by search, MIDI and the keyboard."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will run the instrument until interrupted.
    Start {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Lists the available audio output and input devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Lists the MIDI control schemes.
    Schemes {
        /// The path to an instrument config with extra schemes.
        config_path: Option<String>,
    },
    /// Runs one sample search and prints the results.
    Search {
        /// What to search for.
        pattern: String,
        /// The result page, starting at 1.
        #[arg[short, long, default_value_t = 1]]
        page: u32,
        /// The number of results per page.
        #[arg[short, long]]
        limit: Option<u32>,
        /// The path to an instrument config with search settings.
        #[arg[short, long]]
        config_path: Option<String>,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

fn instrument(config_path: Option<String>) -> Result<Instrument, Box<dyn Error>> {
    Ok(match config_path {
        Some(path) => Instrument::load(&PathBuf::from(path))?,
        None => Instrument::from_yaml("{}")?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let controller = config::init_controller(&PathBuf::from(config_path))?;
            tokio::signal::ctrl_c().await?;
            info!("Shutting down.");
            controller.shutdown();
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;
            let inputs = audio::list_input_devices()?;

            if devices.is_empty() && inputs.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Outputs:");
            for device in devices {
                println!("- {}", device);
            }
            println!("Inputs:");
            for input in inputs {
                println!("- {} ({})", input.label, input.id);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Schemes { config_path } => {
            let instrument = instrument(config_path)?;
            let schemes = instrument.midi().schemes()?;

            println!("Schemes:");
            for scheme in schemes.iter() {
                let marker = if scheme.name() == instrument.midi().scheme() {
                    " (startup)"
                } else {
                    ""
                };
                println!("- {} on channel {}{}", scheme.name(), scheme.channel(), marker);
            }
        }
        Commands::Search {
            pattern,
            page,
            limit,
            config_path,
        } => {
            let instrument = instrument(config_path)?;
            let settings = instrument.search();
            let client = Freesound::new(settings.endpoint(), settings.token().map(str::to_string));
            let query = Query {
                pattern,
                page,
                limit: limit.unwrap_or(settings.page_size()),
                ..Query::default()
            };
            let results = client.search(&query).await?;

            if results.is_empty() {
                println!("No samples found.");
                return Ok(());
            }

            println!("Samples (page {}):", query.page);
            for sample in results {
                println!(
                    "- {} [{}] by {}",
                    sample.name,
                    sample.id,
                    sample.author.as_deref().unwrap_or("unknown")
                );
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for geotrack.
//!
//! All subcommands read their configuration from the environment via
//! [`Config::from_env`].

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use geotrack_geofence::EvaluationResult;
use geotrack_ingest::config::Config;
use geotrack_ingest::geofence::GeofenceOutcome;
use geotrack_ingest::stream::EventHub;
use geotrack_ingest::{Pipeline, Services, publish_payload};
use geotrack_telemetry_models::{TransportMetadata, UNKNOWN_DEVICE};

#[derive(Parser)]
#[command(name = "geotrack", about = "GPS telemetry geofence engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and both consumer groups
    Serve,
    /// Publish every line of a JSON Lines file and process it to completion
    Replay {
        /// File with one JSON telemetry payload per line
        file: PathBuf,
    },
    /// Run the manual geofence check for one point
    Check {
        /// Latitude in degrees
        #[arg(long, default_value = "36.5273", allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, default_value = "5.86945", allow_hyphen_values = true)]
        lon: f64,
    },
    /// List every date with stored samples
    Dates,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(geotrack_server::run_server(config))
            })
            .await??;
        }
        Commands::Replay { file } => replay(&config, &file).await?,
        Commands::Check { lat, lon } => {
            let services = Services::from_config(&config).await;
            let outcome = services.geofence.check(lat, lon).await;
            if let GeofenceOutcome::BoundaryUnavailable { reason } = outcome {
                return Err(reason.into());
            }
            print_outcome(lat, lon, &outcome);
        }
        Commands::Dates => {
            let services = Services::from_config(&config).await;
            for date in services.samples.list_dates().await? {
                println!("{date}");
            }
        }
    }

    Ok(())
}

async fn replay(config: &Config, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let contents = tokio::fs::read_to_string(file).await?;
    let services = Services::from_config(config).await;
    let hub = EventHub::new(config.partitions);
    let pipeline = Pipeline::start(&hub, &services);

    let mut published = 0_usize;
    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str(line) {
            Ok(payload) => {
                publish_payload(&hub, &payload, TransportMetadata::default())?;
            }
            Err(e) => {
                // Published anyway so both groups account for it.
                log::warn!("Line {} is not valid JSON: {e}", line_number + 1);
                hub.publish(
                    UNKNOWN_DEVICE,
                    line.as_bytes().to_vec(),
                    TransportMetadata::default(),
                )?;
            }
        }
        published += 1;
    }

    log::info!("Published {published} event(s) from {}", file.display());
    hub.close();

    let (storage, geofence) = pipeline.join().await;
    println!("storage:  {storage}");
    println!("geofence: {geofence}");
    Ok(())
}

fn print_outcome(lat: f64, lon: f64, outcome: &GeofenceOutcome) {
    println!("Test geofence check completed for coordinates: {lat}, {lon}");

    let Some(evaluation) = outcome.evaluation() else {
        println!("skipped: {outcome:?}");
        return;
    };

    let result = EvaluationResult::from(*evaluation);
    println!("inside:   {}", result.inside);
    println!("distance: {:.2}m", result.distance_to_boundary_m);
    println!("decision: {:.2}", result.signed_decision_value);
    if let GeofenceOutcome::Alerted { delivered, .. } = outcome {
        println!("alerted:  {}", if *delivered { "sent" } else { "failed" });
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for geotrack telemetry.
//!
//! Accepts events over HTTP and publishes them onto the in-process event
//! hub, where the storage and geofence consumer groups pick them up. Also
//! serves the stored-date listing and the manual geofence check.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use geotrack_ingest::config::Config;
use geotrack_ingest::stream::EventHub;
use geotrack_ingest::{Pipeline, Services};

/// Shared application state.
pub struct AppState {
    /// Storage and geofence paths.
    pub services: Services,
    /// Hub that accepted events are published to.
    pub hub: Arc<EventHub>,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/events", web::post().to(handlers::publish_event))
            .route("/list_gps_dates", web::get().to(handlers::list_gps_dates))
            .route("/test_geofence", web::get().to(handlers::test_geofence)),
    );
}

/// Starts the geotrack API server and both consumer groups.
///
/// Runs until the HTTP server stops, then closes the hub and waits for the
/// consumer groups to finish the backlog. This is a regular async function;
/// the caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: Config) -> std::io::Result<()> {
    let services = Services::from_config(&config).await;
    let hub = EventHub::new(config.partitions);

    log::info!(
        "Starting consumer groups on {} partition(s)...",
        hub.partition_count()
    );
    let pipeline = Pipeline::start(&hub, &services);

    let state = web::Data::new(AppState {
        services,
        hub: Arc::clone(&hub),
    });

    let Config {
        bind_addr, port, ..
    } = config;

    log::info!("Starting server on {bind_addr}:{port}");

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await;

    log::info!("Server stopped, draining event hub...");
    hub.close();
    let (storage, geofence) = pipeline.join().await;
    log::info!("Storage: {storage}; geofence: {geofence}");

    result
}

//! HTTP handler functions for the geotrack API.

use actix_web::{HttpRequest, HttpResponse, web};
use geotrack_ingest::geofence::GeofenceOutcome;
use geotrack_ingest::publish_payload;
use geotrack_ingest::stream::PublishError;
use geotrack_server_models::{ApiEventAccepted, ApiHealth, TestGeofenceParams};
use geotrack_telemetry_models::TransportMetadata;

use crate::AppState;

/// Header carrying the authenticated device id.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Header carrying the transport enqueue time.
pub const ENQUEUED_TIME_HEADER: &str = "x-enqueued-time";

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `POST /api/events`
///
/// Publishes a JSON telemetry payload onto the event hub.
pub async fn publish_event(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Rejected event with invalid JSON: {e}");
            return HttpResponse::BadRequest().body(format!("Error: {e}"));
        }
    };

    let metadata = TransportMetadata {
        device_id: header(&req, DEVICE_ID_HEADER),
        enqueued_time: header(&req, ENQUEUED_TIME_HEADER),
    };

    match publish_payload(&state.hub, &payload, metadata) {
        Ok((partition, offset)) => {
            HttpResponse::Accepted().json(ApiEventAccepted { partition, offset })
        }
        Err(e @ PublishError::Closed) => {
            log::error!("Failed to publish event: {e}");
            HttpResponse::ServiceUnavailable().body(format!("Error: {e}"))
        }
    }
}

/// `GET /api/list_gps_dates`
///
/// Returns every date with stored samples as a sorted JSON array.
pub async fn list_gps_dates(state: web::Data<AppState>) -> HttpResponse {
    match state.services.samples.list_dates().await {
        Ok(dates) => HttpResponse::Ok().json(dates),
        Err(e) => {
            log::error!("Failed to list GPS dates: {e}");
            HttpResponse::InternalServerError().body(format!("Error: {e}"))
        }
    }
}

/// `GET /api/test_geofence`
///
/// Runs the geofence path for `lat`/`lon` as the test device.
pub async fn test_geofence(
    state: web::Data<AppState>,
    params: web::Query<TestGeofenceParams>,
) -> HttpResponse {
    let (lat, lon) = match params.coordinates() {
        Ok(coordinates) => coordinates,
        Err(e) => {
            log::error!("Manual geofence check rejected: {e}");
            return HttpResponse::InternalServerError().body(format!("Error: {e}"));
        }
    };

    match state.services.geofence.check(lat, lon).await {
        GeofenceOutcome::BoundaryUnavailable { reason } => {
            HttpResponse::InternalServerError().body(format!("Error: {reason}"))
        }
        outcome => {
            log::debug!("Manual geofence check at {lat}, {lon}: {outcome:?}");
            HttpResponse::Ok().body(format!(
                "Test geofence check completed for coordinates: {lat}, {lon}"
            ))
        }
    }
}

//! Process configuration, read once from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `STORAGE_BACKEND` | `local` | `s3`, `local`, or `memory` |
//! | `STORAGE_ROOT` | `data` | Root directory for the `local` backend |
//! | `S3_ENDPOINT_URL` | unset | Custom S3 endpoint (R2, `MinIO`) |
//! | `S3_REGION` | `auto` | S3 region |
//! | `S3_ACCESS_KEY_ID` | unset | Static access key (else the AWS provider chain) |
//! | `S3_SECRET_ACCESS_KEY` | unset | Static secret key |
//! | `SAMPLES_CONTAINER` | `gps-data` | Container for stored samples |
//! | `GEOFENCE_CONTAINER` | `geofences` | Container holding the boundary |
//! | `GEOFENCE_BLOB_NAME` | `geofence/geofence.json` | Boundary object key |
//! | `SENDGRID_API_KEY` | unset | Enables email alerts |
//! | `SENDER_EMAIL` | `notifications@yourdomain.com` | Alert sender |
//! | `ALERT_RECIPIENT_EMAIL` | unset | Alert recipient |
//! | `STREAM_PARTITIONS` | `4` | Partitions of the in-process event hub |
//! | `BIND_ADDR` | `127.0.0.1` | HTTP bind address |
//! | `PORT` | `8080` | HTTP port |

use std::path::PathBuf;

use geotrack_alert::SendGridSettings;
use geotrack_alert::sendgrid::DEFAULT_SENDER;
use geotrack_store::S3Settings;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to something that cannot be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Where objects are stored.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// An S3-compatible service.
    S3(S3Settings),
    /// A directory tree on local disk.
    Local {
        /// Root directory; each container is a subdirectory.
        root: PathBuf,
    },
    /// Process memory. Nothing survives a restart.
    Memory,
}

/// Immutable configuration for one process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Object storage backend.
    pub storage: StorageBackend,
    /// Container for stored samples.
    pub samples_container: String,
    /// Container holding the boundary definition.
    pub geofence_container: String,
    /// Key of the boundary definition.
    pub geofence_key: String,
    /// Email delivery settings, when alerts should leave the process.
    pub sendgrid: Option<SendGridSettings>,
    /// Number of event hub partitions.
    pub partitions: usize,
    /// HTTP bind address.
    pub bind_addr: String,
    /// HTTP port.
    pub port: u16,
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let storage = match or("STORAGE_BACKEND", "local").to_ascii_lowercase().as_str() {
            "s3" => StorageBackend::S3(S3Settings {
                endpoint_url: var("S3_ENDPOINT_URL"),
                region: or("S3_REGION", "auto"),
                access_key_id: var("S3_ACCESS_KEY_ID"),
                secret_access_key: var("S3_SECRET_ACCESS_KEY"),
            }),
            "local" => StorageBackend::Local {
                root: PathBuf::from(or("STORAGE_ROOT", "data")),
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let sendgrid = match (var("SENDGRID_API_KEY"), var("ALERT_RECIPIENT_EMAIL")) {
            (Some(api_key), Some(recipient)) => Some(SendGridSettings {
                api_key,
                sender: or("SENDER_EMAIL", DEFAULT_SENDER),
                recipient,
            }),
            (Some(_), None) => {
                log::warn!(
                    "SENDGRID_API_KEY is set but ALERT_RECIPIENT_EMAIL is not; \
                     alerts will be logged only"
                );
                None
            }
            (None, _) => None,
        };

        let partitions = parse_var(&var, "STREAM_PARTITIONS", 4_usize)?;
        if partitions == 0 {
            return Err(ConfigError::InvalidValue {
                name: "STREAM_PARTITIONS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            storage,
            samples_container: or("SAMPLES_CONTAINER", "gps-data"),
            geofence_container: or("GEOFENCE_CONTAINER", "geofences"),
            geofence_key: or("GEOFENCE_BLOB_NAME", "geofence/geofence.json"),
            sendgrid,
            partitions,
            bind_addr: or("BIND_ADDR", "127.0.0.1"),
            port: parse_var(&var, "PORT", 8080_u16)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    var(name).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value })
    })
}

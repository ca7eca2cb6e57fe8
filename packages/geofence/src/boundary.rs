//! Boundary definitions and the loader that fetches them.

use std::sync::Arc;

use geo::{Coord, LineString, Polygon};
use geojson::GeoJson;
use geotrack_store::{ObjectStore, StoreError};

/// Errors raised while loading a boundary definition.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The object store could not return the definition.
    #[error("Failed to fetch geofence: {0}")]
    Fetch(#[from] StoreError),

    /// The definition is not valid JSON.
    #[error("Geofence is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON is not valid `GeoJSON`.
    #[error("Geofence is not valid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The definition is a `FeatureCollection` without features.
    #[error("Geofence feature collection is empty")]
    EmptyCollection,

    /// The first feature carries no geometry.
    #[error("Geofence feature has no geometry")]
    MissingGeometry,

    /// Only `Polygon` boundaries are supported.
    #[error("Unsupported geofence geometry type: {found}")]
    UnsupportedGeometry {
        /// The `GeoJSON` type that was found instead.
        found: &'static str,
    },

    /// The polygon ring has fewer than three distinct vertices.
    #[error("Geofence polygon has {count} distinct vertices, need at least 3")]
    TooFewVertices {
        /// Number of distinct vertices found.
        count: usize,
    },
}

impl LoadError {
    /// Whether the definition could not be reached at all, as opposed to
    /// being reachable but unusable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

/// The current geofence: one closed ring of `(lon, lat)` vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    polygon: Polygon<f64>,
}

impl Boundary {
    /// Builds a boundary from `(lon, lat)` vertices. The ring is closed
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::TooFewVertices`] if fewer than three distinct
    /// vertices remain after dropping repeats.
    pub fn from_vertices(vertices: &[(f64, f64)]) -> Result<Self, LoadError> {
        let ring: LineString<f64> = vertices
            .iter()
            .map(|&(x, y)| Coord { x, y })
            .collect::<Vec<_>>()
            .into();
        Self::from_polygon(&Polygon::new(ring, Vec::new()))
    }

    /// Parses a `GeoJSON` document: a bare `Polygon` geometry, or a
    /// `FeatureCollection` whose first feature is a `Polygon`. Holes are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] describing why the document is unusable.
    pub fn from_geojson(bytes: &[u8]) -> Result<Self, LoadError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let geometry = match GeoJson::try_from(value)? {
            GeoJson::FeatureCollection(collection) => {
                if collection.features.len() > 1 {
                    log::debug!(
                        "Geofence collection has {} features, using the first",
                        collection.features.len()
                    );
                }
                collection
                    .features
                    .into_iter()
                    .next()
                    .ok_or(LoadError::EmptyCollection)?
                    .geometry
                    .ok_or(LoadError::MissingGeometry)?
            }
            GeoJson::Geometry(geometry) => geometry,
            GeoJson::Feature(_) => return Err(LoadError::UnsupportedGeometry { found: "Feature" }),
        };

        if !matches!(geometry.value, geojson::Value::Polygon(_)) {
            return Err(LoadError::UnsupportedGeometry {
                found: type_name(&geometry.value),
            });
        }

        match geo::Geometry::<f64>::try_from(geometry)? {
            geo::Geometry::Polygon(polygon) => Self::from_polygon(&polygon),
            _ => Err(LoadError::UnsupportedGeometry { found: "Unknown" }),
        }
    }

    fn from_polygon(polygon: &Polygon<f64>) -> Result<Self, LoadError> {
        let mut coords = polygon.exterior().0.clone();
        coords.dedup();
        if coords.len() > 1 && coords.first() == coords.last() {
            coords.pop();
        }
        if coords.len() < 3 {
            return Err(LoadError::TooFewVertices {
                count: coords.len(),
            });
        }

        Ok(Self {
            polygon: Polygon::new(LineString::from(coords), Vec::new()),
        })
    }

    /// The boundary as a polygon without holes.
    #[must_use]
    pub const fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// The closed outline of the boundary.
    #[must_use]
    pub fn ring(&self) -> &LineString<f64> {
        self.polygon.exterior()
    }

    /// Distinct `(lon, lat)` vertices, without the closing repeat.
    #[must_use]
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        let coords = &self.ring().0;
        coords[..coords.len() - 1]
            .iter()
            .map(|c| (c.x, c.y))
            .collect()
    }
}

fn type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Fetches the current boundary from an object store.
///
/// Holds no cache: every [`load`](Self::load) is a fresh fetch, so the
/// boundary always reflects the latest stored definition.
#[derive(Clone)]
pub struct BoundaryLoader {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl BoundaryLoader {
    /// Creates a loader reading `key` from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Key of the boundary object.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetches and parses the boundary.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Fetch`] if the store fails, or another
    /// [`LoadError`] if the stored document is not a usable polygon.
    pub async fn load(&self) -> Result<Boundary, LoadError> {
        log::info!(
            "Downloading geofence {}/{}",
            self.store.container(),
            self.key
        );
        let bytes = self.store.get(&self.key).await?;
        Boundary::from_geojson(&bytes)
    }
}

use geo::{coord, BoundingRect, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Meters per degree of latitude on the WGS84 equator approximation.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Shared geospatial settings carried by a session
/// Handles CRS (Coordinate Reference System), bounding box, and output paths
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// EPSG code of every geometry and raster handled by the session
    pub epsg: i32,
    /// Bounding box of the area being analysed
    pub bbox: Option<BoundingBox>,
    /// Output path for exported results
    pub output_path: Option<String>,
}

impl GeoCore {
    /// Create a new GeoCore with EPSG
    pub fn new(epsg: i32) -> Self {
        GeoCore {
            epsg,
            bbox: None,
            output_path: None,
        }
    }

    /// Get EPSG code
    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    /// Get bounding box
    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    /// Set bounding box
    pub fn set_bbox(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
    }

    /// Get output path
    pub fn get_output_path(&self) -> Option<&String> {
        self.output_path.as_ref()
    }

    /// Set output path
    pub fn set_output_path(&mut self, output_path: Option<String>) {
        self.output_path = output_path;
    }
}

impl Default for GeoCore {
    /// Geographic coordinates (EPSG:4326), the reference shared by all
    /// raster providers
    fn default() -> Self {
        GeoCore::new(4326)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounds of any geometry, `None` for empty geometries
    pub fn of<G: BoundingRect<f64>>(geometry: &G) -> Option<Self> {
        let rect: Option<Rect<f64>> = geometry.bounding_rect().into();
        rect.map(Self::from)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the box is finite and encloses a non-zero area
    pub fn has_area(&self) -> bool {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        finite && self.width() > 0.0 && self.height() > 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Inclusive containment test
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    /// Envelope in the `[x, y]` corner form used by the R-tree index
    pub fn corners(&self) -> ([f64; 2], [f64; 2]) {
        ([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Convert a distance in meters to degrees of latitude and longitude at `lat`
/// Returns `(degrees_lat, degrees_lon)`
pub fn meters_to_degrees(lat: f64, meters: f64) -> (f64, f64) {
    let degrees_lat = meters / METERS_PER_DEGREE;
    let degrees_lon = meters / (METERS_PER_DEGREE * lat.to_radians().cos());
    (degrees_lat, degrees_lon)
}

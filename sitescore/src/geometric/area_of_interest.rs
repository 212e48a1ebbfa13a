use anyhow::{Context, Result};
use geo::{Geometry as GeoGeometry, MultiPolygon};
use geojson::GeoJson;
use std::path::Path;

use crate::collect::global_variables::DEFAULT_PROJECT_NAME;
use crate::commons::basic_functions::project_name_from_filename;
use crate::geo_core::BoundingBox;

/// Area of interest: the polygon under analysis and its bounds
/// Immutable once loaded
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    /// Project name, taken from the source filename
    project_name: String,
    /// AOI geometry; single polygons are stored as one-member multipolygons
    geometry: MultiPolygon<f64>,
    /// Axis-aligned bounds of `geometry`
    bounds: BoundingBox,
}

impl AreaOfInterest {
    /// Build an area from a geometry; fails on empty geometries
    pub fn new(project_name: impl Into<String>, geometry: MultiPolygon<f64>) -> Result<Self> {
        let bounds =
            BoundingBox::of(&geometry).context("Area of interest geometry is empty")?;
        Ok(AreaOfInterest {
            project_name: project_name.into(),
            geometry,
            bounds,
        })
    }

    /// Load the first feature of a GeoJSON file
    /// The project name is the part of the file name before the first `_`
    pub fn from_geojson_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read area of interest file: {:?}", path))?;
        Self::from_geojson_bytes(&bytes, Some(path))
    }

    /// Load the first feature of in-memory GeoJSON (e.g. an uploaded file)
    /// `filename` only feeds the project name
    pub fn from_geojson_bytes(bytes: &[u8], filename: Option<&Path>) -> Result<Self> {
        let geojson: GeoJson = std::str::from_utf8(bytes)
            .context("Area of interest GeoJSON is not valid UTF-8")?
            .parse()
            .context("Failed to parse area of interest GeoJSON")?;

        let project_name = filename
            .map(project_name_from_filename)
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        let geometry = first_geometry(&geojson)?;
        let area = Self::new(project_name, geometry)?;
        log::info!(
            "Area of interest '{}' loaded, bounds {:?}",
            area.project_name,
            area.bounds
        );
        Ok(area)
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }
}

/// First polygonal geometry of a GeoJSON document
fn first_geometry(geojson: &GeoJson) -> Result<MultiPolygon<f64>> {
    let geometry = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .first()
            .context("Area of interest FeatureCollection has no features")?
            .geometry
            .as_ref(),
        GeoJson::Feature(f) => f.geometry.as_ref(),
        GeoJson::Geometry(g) => Some(g),
    }
    .context("Area of interest feature has no geometry")?;

    let geo_geom: GeoGeometry<f64> = GeoGeometry::try_from(&geometry.value)
        .context("Failed to convert GeoJSON geometry to geo geometry")?;
    to_multi_polygon(geo_geom).context("Area of interest must be a Polygon or MultiPolygon")
}

/// Polygonal geometries as a multipolygon, `None` for anything else
pub fn to_multi_polygon(geometry: GeoGeometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        GeoGeometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        GeoGeometry::MultiPolygon(mp) => Some(mp),
        GeoGeometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SQUARE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "field"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-64.0, -31.0], [-63.0, -31.0], [-63.0, -30.0], [-64.0, -30.0], [-64.0, -31.0]]]
                }
            }
        ]
    }"#;

    #[test]
    fn test_from_geojson_bytes() {
        let area = AreaOfInterest::from_geojson_bytes(SQUARE.as_bytes(), None).unwrap();
        assert_eq!(area.project_name(), DEFAULT_PROJECT_NAME);
        assert_eq!(area.bounds(), BoundingBox::new(-64.0, -31.0, -63.0, -30.0));
        assert_eq!(area.geometry().0.len(), 1);
    }

    #[test]
    fn test_from_geojson_file_names_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cordoba_aoi.geojson");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SQUARE.as_bytes()).unwrap();

        let area = AreaOfInterest::from_geojson_file(&path).unwrap();
        assert_eq!(area.project_name(), "cordoba");
    }

    #[test]
    fn test_rejects_non_polygon() {
        let point = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(AreaOfInterest::from_geojson_bytes(point.as_bytes(), None).is_err());
    }

    #[test]
    fn test_rejects_empty_collection() {
        let empty = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(AreaOfInterest::from_geojson_bytes(empty.as_bytes(), None).is_err());
    }

    #[test]
    fn test_rejects_empty_geometry() {
        assert!(AreaOfInterest::new("empty", MultiPolygon::new(Vec::new())).is_err());
    }
}

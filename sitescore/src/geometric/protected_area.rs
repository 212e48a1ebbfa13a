use anyhow::{Context, Result};
use geo::{Geometry as GeoGeometry, Intersects, MultiPolygon};
use geojson::{Feature, GeoJson};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use std::path::Path;

use crate::geo_core::BoundingBox;
use crate::geometric::area_of_interest::to_multi_polygon;

/// Feature properties tried, in order, for a protected area's name
const NAME_PROPERTIES: [&str; 3] = ["nombre", "name", "NOMBRE"];

type AreaEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// A legally protected polygon
#[derive(Debug, Clone)]
pub struct ProtectedArea {
    pub name: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// Read-only collection of protected areas with an envelope index
pub struct ProtectedAreaSet {
    areas: Vec<ProtectedArea>,
    index: RTree<AreaEnvelope>,
}

impl ProtectedAreaSet {
    pub fn new(areas: Vec<ProtectedArea>) -> Self {
        let envelopes = areas
            .iter()
            .enumerate()
            .filter_map(|(idx, area)| {
                let (min, max) = BoundingBox::of(&area.geometry)?.corners();
                Some(GeomWithData::new(Rectangle::from_corners(min, max), idx))
            })
            .collect();
        ProtectedAreaSet {
            areas,
            index: RTree::bulk_load(envelopes),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Load every polygonal feature of a GeoJSON file
    pub fn from_geojson_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read protected areas file: {:?}", path))?;
        let geojson: GeoJson = content
            .parse()
            .with_context(|| format!("Failed to parse protected areas GeoJSON: {:?}", path))?;
        let set = Self::from_geojson(&geojson)?;
        log::info!("Loaded {} protected areas from {:?}", set.len(), path);
        Ok(set)
    }

    /// Collect polygonal features; other geometry types are skipped
    pub fn from_geojson(geojson: &GeoJson) -> Result<Self> {
        let features: Vec<&Feature> = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features.iter().collect(),
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                anyhow::bail!("Protected areas must be a Feature or FeatureCollection")
            }
        };

        let mut areas = Vec::with_capacity(features.len());
        for (idx, feature) in features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry.as_ref() else {
                log::warn!("Protected area feature {} has no geometry, skipped", idx);
                continue;
            };
            let geo_geom: GeoGeometry<f64> = GeoGeometry::try_from(&geometry.value)
                .with_context(|| format!("Invalid geometry in protected area feature {}", idx))?;
            match to_multi_polygon(geo_geom) {
                Some(geometry) => areas.push(ProtectedArea {
                    name: feature_name(feature),
                    geometry,
                }),
                None => log::warn!("Protected area feature {} is not polygonal, skipped", idx),
            }
        }

        Ok(Self::new(areas))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn areas(&self) -> &[ProtectedArea] {
        &self.areas
    }

    /// True as soon as one protected area intersects `geometry`
    pub fn intersects(&self, geometry: &MultiPolygon<f64>) -> bool {
        let Some(bbox) = BoundingBox::of(geometry) else {
            return false;
        };
        let (min, max) = bbox.corners();
        self.index
            .locate_in_envelope_intersecting(&AABB::from_corners(min, max))
            .any(|candidate| self.areas[candidate.data].geometry.intersects(geometry))
    }
}

fn feature_name(feature: &Feature) -> Option<String> {
    NAME_PROPERTIES
        .iter()
        .find_map(|key| feature.property(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

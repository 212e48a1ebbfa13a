use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{get_temp_path, PROTECTED_AREAS_FILE};
use crate::collect::provider::{RasterProvider, RasterRequest};
use crate::geo_core::GeoCore;
use crate::geometric::area_of_interest::AreaOfInterest;
use crate::geometric::dem::TerrainDataset;
use crate::geometric::drainage::DrainageRaster;
use crate::geometric::grid::{partition, GridCell};
use crate::geometric::land_cover::{default_land_cover_window, LandCover};
use crate::geometric::protected_area::ProtectedAreaSet;
use crate::geometric::raster::DateWindow;
use crate::geometric::viability::{ScoringReport, ViabilityScorer};

/// Rasters fetched for the session's area
#[derive(Debug, Clone)]
pub struct GeospatialData {
    pub terrain: TerrainDataset,
    pub drainage: DrainageRaster,
    pub land_cover: LandCover,
}

/// One analysis of one area of interest
///
/// Owns the area, the protected areas and the raster provider. The provider is
/// opened with the session and closed by [`AnalysisSession::close`].
pub struct AnalysisSession<P: RasterProvider> {
    area: AreaOfInterest,
    provider: P,
    protected_areas: ProtectedAreaSet,
    land_cover_window: DateWindow,
    geo_core: GeoCore,
    data: Option<GeospatialData>,
}

impl<P: RasterProvider> AnalysisSession<P> {
    pub fn open(
        area: AreaOfInterest,
        mut provider: P,
        protected_areas: ProtectedAreaSet,
    ) -> Result<Self> {
        provider.open().with_context(|| {
            format!("Failed to open raster provider for '{}'", area.project_name())
        })?;

        let mut geo_core = GeoCore::default();
        geo_core.set_bbox(Some(area.bounds()));

        log::info!(
            "Session opened for '{}' (EPSG:{}) with {} protected areas",
            area.project_name(),
            geo_core.get_epsg(),
            protected_areas.len()
        );
        Ok(AnalysisSession {
            area,
            provider,
            protected_areas,
            land_cover_window: default_land_cover_window()?,
            geo_core,
            data: None,
        })
    }

    /// Open a session reading protected areas from `<data_path>/area_protegida.json`
    pub fn open_with_data_path<D: AsRef<Path>>(
        area: AreaOfInterest,
        provider: P,
        data_path: D,
    ) -> Result<Self> {
        let protected_areas =
            ProtectedAreaSet::from_geojson_file(data_path.as_ref().join(PROTECTED_AREAS_FILE))?;
        Self::open(area, provider, protected_areas)
    }

    pub fn area(&self) -> &AreaOfInterest {
        &self.area
    }

    pub fn protected_areas(&self) -> &ProtectedAreaSet {
        &self.protected_areas
    }

    pub fn geo_core(&self) -> &GeoCore {
        &self.geo_core
    }

    /// Set the directory results are written to
    pub fn set_output_path(&mut self, output_path: Option<String>) {
        self.geo_core.set_output_path(output_path);
    }

    pub fn land_cover_window(&self) -> DateWindow {
        self.land_cover_window
    }

    /// Change the land-cover window; loaded data is dropped
    pub fn set_land_cover_window(&mut self, window: DateWindow) {
        self.land_cover_window = window;
        self.data = None;
    }

    pub fn data(&self) -> Option<&GeospatialData> {
        self.data.as_ref()
    }

    /// Fetch elevation, drainage and land cover for the area
    pub fn load_all_geospatial_data(&mut self) -> Result<&GeospatialData> {
        let request = RasterRequest::for_bbox(self.area.bounds());
        log::info!(
            "Loading rasters for '{}' at {:?} degrees",
            self.area.project_name(),
            request.resolution_degrees
        );

        let elevation = self.provider.elevation(&request)?;
        let drainage = self.provider.drainage(&request)?;
        let land_cover = self
            .provider
            .land_cover(&request, &self.land_cover_window)?;
        if land_cover.is_empty() {
            anyhow::bail!(
                "No land cover acquired between {} and {}",
                self.land_cover_window.start,
                self.land_cover_window.end
            );
        }

        let data = GeospatialData {
            terrain: TerrainDataset::from_elevation(elevation),
            drainage: DrainageRaster::new(drainage),
            land_cover: LandCover::new(land_cover),
        };
        Ok(&*self.data.insert(data))
    }

    /// The 3x3 partition of the area
    pub fn grid_cells(&self) -> Vec<GridCell> {
        partition(self.area.geometry())
    }

    /// Score every grid cell of the area, loading rasters on first use
    pub fn area_viability(&mut self) -> Result<ScoringReport> {
        if self.data.is_none() {
            self.load_all_geospatial_data()?;
        }
        let data = self.data.as_ref().context("Geospatial data not loaded")?;

        let cells = self.grid_cells();
        if cells.is_empty() {
            log::warn!("Area '{}' yields no grid cells", self.area.project_name());
        }
        let scorer = ViabilityScorer::new(
            &data.terrain,
            &data.drainage,
            data.land_cover.scoring_slice()?,
            &self.protected_areas,
        );
        Ok(scorer.score(&cells))
    }

    /// `<output_path>/<project>_viability.geojson`, output path defaulting to the temp dir
    pub fn output_file(&self) -> PathBuf {
        let dir = self
            .geo_core
            .get_output_path()
            .map(PathBuf::from)
            .unwrap_or_else(get_temp_path);
        dir.join(format!("{}_viability.geojson", self.area.project_name()))
    }

    pub fn write_results(&self, report: &ScoringReport) -> Result<PathBuf> {
        let path = self.output_file();
        report.write_geojson(&path)?;
        Ok(path)
    }

    /// Close the provider and end the session
    pub fn close(mut self) -> Result<()> {
        self.provider
            .close()
            .context("Failed to close raster provider")?;
        log::info!("Session closed for '{}'", self.area.project_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::provider::InMemoryProvider;
    use crate::geo_core::BoundingBox;
    use crate::geometric::raster::{Raster, RasterStack};
    use crate::geometric::viability::{CellColor, ViabilityLabel};
    use chrono::NaiveDate;
    use geo::{polygon, MultiPolygon};
    use ndarray::Array2;

    fn area() -> AreaOfInterest {
        let square = polygon![
            (x: -64.0, y: -31.0),
            (x: -63.0, y: -31.0),
            (x: -63.0, y: -30.0),
            (x: -64.0, y: -30.0),
            (x: -64.0, y: -31.0),
        ];
        AreaOfInterest::new("cordoba", MultiPolygon::new(vec![square])).unwrap()
    }

    /// Flat terrain, well drained, grassland
    fn provider() -> InMemoryProvider {
        let bounds = BoundingBox::new(-64.0, -31.0, -63.0, -30.0);
        let layer = |v: f64| Raster::from_bounds(Array2::from_elem((6, 6), v), &bounds).unwrap();
        let labels = Raster::from_bounds(Array2::from_elem((6, 6), 2u8), &bounds).unwrap();
        InMemoryProvider::new()
            .with_elevation(layer(250.0))
            .with_drainage(layer(8.0))
            .with_land_cover(RasterStack::single(
                NaiveDate::from_ymd_opt(2019, 12, 15).unwrap(),
                labels,
            ))
    }

    #[test]
    fn test_area_viability() {
        let mut session =
            AnalysisSession::open(area(), provider(), ProtectedAreaSet::empty()).unwrap();
        assert_eq!(session.geo_core().get_bbox(), Some(area().bounds()));
        assert!(session.data().is_none());

        let report = session.area_viability().unwrap();
        assert!(session.data().is_some());
        assert_eq!(report.scored().len(), 9);
        for scored in report.scored() {
            assert_eq!(scored.good_slopes_percentage(), 0.0);
            assert!((scored.final_score() - 200.0 / 3.0).abs() < 1e-9);
            assert_eq!(scored.label(), ViabilityLabel::Medium);
            assert_eq!(scored.color(), CellColor::Orange);
        }
        session.close().unwrap();
    }

    #[test]
    fn test_empty_window_is_fatal() {
        let mut session =
            AnalysisSession::open(area(), provider(), ProtectedAreaSet::empty()).unwrap();
        session.set_land_cover_window(DateWindow::year(2022).unwrap());
        assert!(session.area_viability().is_err());
    }

    #[test]
    fn test_missing_layer_is_fatal() {
        let mut session = AnalysisSession::open(
            area(),
            InMemoryProvider::new(),
            ProtectedAreaSet::empty(),
        )
        .unwrap();
        assert!(session.load_all_geospatial_data().is_err());
    }

    #[test]
    fn test_protected_areas_from_data_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROTECTED_AREAS_FILE),
            r#"{
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"nombre": "Reserva"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-63.2, -30.2], [-62.0, -30.2], [-62.0, -29.0], [-63.2, -29.0], [-63.2, -30.2]]]
                    }
                }]
            }"#,
        )
        .unwrap();

        let mut session =
            AnalysisSession::open_with_data_path(area(), provider(), dir.path()).unwrap();
        assert_eq!(session.protected_areas().len(), 1);

        let report = session.area_viability().unwrap();
        let protected: Vec<_> = report
            .scored()
            .iter()
            .filter(|s| s.intersects_protected_area())
            .collect();
        // Only the north-east cell reaches the reserve
        assert_eq!(protected.len(), 1);
        assert_eq!((protected[0].cell().row, protected[0].cell().column), (2, 2));
        assert_eq!(protected[0].final_score(), 0.0);

        session.set_output_path(Some(dir.path().join("out").to_string_lossy().into_owned()));
        let path = session.write_results(&report).unwrap();
        assert!(path.ends_with("cordoba_viability.geojson"));
        assert!(path.exists());
    }

    #[test]
    fn test_missing_protected_areas_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AnalysisSession::open_with_data_path(area(), provider(), dir.path()).is_err());
    }
}

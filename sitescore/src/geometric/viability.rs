use anyhow::{Context, Result};
use geo::Centroid;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "polars")]
use polars::prelude::*;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::geo_core::BoundingBox;
use crate::geometric::dem::TerrainDataset;
use crate::geometric::drainage::DrainageRaster;
use crate::geometric::grid::GridCell;
use crate::geometric::land_cover::LandCoverSlice;
use crate::geometric::protected_area::ProtectedAreaSet;
use crate::commons::basic_functions::percentage_where;

/// Scores below this are labelled Low
pub const LOW_SCORE_THRESHOLD: f64 = 30.0;
/// Scores from this value up are labelled High
pub const HIGH_SCORE_THRESHOLD: f64 = 70.0;

/// Categorical viability of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViabilityLabel {
    Low,
    Medium,
    High,
}

impl ViabilityLabel {
    pub fn from_score(score: f64) -> Self {
        if score < LOW_SCORE_THRESHOLD {
            ViabilityLabel::Low
        } else if score < HIGH_SCORE_THRESHOLD {
            ViabilityLabel::Medium
        } else {
            ViabilityLabel::High
        }
    }

    pub fn color(&self) -> CellColor {
        match self {
            ViabilityLabel::Low => CellColor::Red,
            ViabilityLabel::Medium => CellColor::Orange,
            ViabilityLabel::High => CellColor::Green,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViabilityLabel::Low => "Low",
            ViabilityLabel::Medium => "Medium",
            ViabilityLabel::High => "High",
        }
    }
}

/// Map fill color matching a [`ViabilityLabel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellColor {
    Red,
    Orange,
    Green,
}

impl CellColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellColor::Red => "red",
            CellColor::Orange => "orange",
            CellColor::Green => "green",
        }
    }
}

/// Raster layers read while scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterLayer {
    SteepMask,
    Drainage,
    LandCover,
}

impl fmt::Display for RasterLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RasterLayer::SteepMask => "steep slope mask",
            RasterLayer::Drainage => "drainage",
            RasterLayer::LandCover => "land cover",
        };
        f.write_str(name)
    }
}

/// Why a single cell could not be scored
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("no {layer} pixels inside cell bounds {bbox:?}")]
    NoData { layer: RasterLayer, bbox: BoundingBox },
}

/// The three goodness percentages of a cell, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goodness {
    pub slopes: f64,
    pub drainage: f64,
    pub land_usage: f64,
}

impl Goodness {
    /// Unweighted mean of the three percentages
    pub fn mean(&self) -> f64 {
        (self.slopes + self.drainage + self.land_usage) / 3.0
    }
}

/// Score of a cell: zero inside protected areas, else the mean goodness
pub fn final_score(intersects_protected_area: bool, goodness: &Goodness) -> f64 {
    if intersects_protected_area {
        0.0
    } else {
        goodness.mean()
    }
}

/// A grid cell with its viability assessment
///
/// Built once by [`ScoredCell::new`]; label and color always follow the score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCell {
    cell: GridCell,
    intersects_protected_area: bool,
    goodness: Goodness,
    final_score: f64,
    label: ViabilityLabel,
    color: CellColor,
}

impl ScoredCell {
    pub fn new(cell: GridCell, intersects_protected_area: bool, goodness: Goodness) -> Self {
        let final_score = final_score(intersects_protected_area, &goodness);
        let label = ViabilityLabel::from_score(final_score);
        ScoredCell {
            cell,
            intersects_protected_area,
            goodness,
            final_score,
            label,
            color: label.color(),
        }
    }

    pub fn cell(&self) -> &GridCell {
        &self.cell
    }

    pub fn intersects_protected_area(&self) -> bool {
        self.intersects_protected_area
    }

    pub fn goodness(&self) -> Goodness {
        self.goodness
    }

    pub fn good_slopes_percentage(&self) -> f64 {
        self.goodness.slopes
    }

    pub fn good_drainage_percentage(&self) -> f64 {
        self.goodness.drainage
    }

    pub fn good_land_usage_percentage(&self) -> f64 {
        self.goodness.land_usage
    }

    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    pub fn label(&self) -> ViabilityLabel {
        self.label
    }

    pub fn color(&self) -> CellColor {
        self.color
    }

    /// Geometry plus attributes, ready for a choropleth layer
    pub fn to_feature(&self) -> Feature {
        let geometry = Geometry::new(geojson::Value::from(&self.cell.geometry));
        let mut feature = Feature::from(geometry);
        feature.set_property("row", self.cell.row);
        feature.set_property("column", self.cell.column);
        feature.set_property("intersects_protected_area", self.intersects_protected_area);
        feature.set_property("good_slopes_percentage", self.goodness.slopes);
        feature.set_property("good_drainage_percentage", self.goodness.drainage);
        feature.set_property("good_land_usage_percentage", self.goodness.land_usage);
        feature.set_property("final_score", self.final_score);
        feature.set_property("label", self.label.as_str());
        feature.set_property("color", self.color.as_str());
        feature
    }
}

/// A cell that could not be scored
#[derive(Debug, Clone, PartialEq)]
pub struct CellFailure {
    pub row: usize,
    pub column: usize,
    pub error: CellError,
}

/// Attribute row of the CSV export
#[derive(Debug, Serialize)]
struct CsvRecord {
    row: usize,
    column: usize,
    centroid_x: Option<f64>,
    centroid_y: Option<f64>,
    intersects_protected_area: bool,
    good_slopes_percentage: f64,
    good_drainage_percentage: f64,
    good_land_usage_percentage: f64,
    final_score: f64,
    label: ViabilityLabel,
    color: CellColor,
}

/// Outcome of a scoring run: scored cells in grid order, plus failed cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringReport {
    scored: Vec<ScoredCell>,
    failures: Vec<CellFailure>,
}

impl ScoringReport {
    pub fn scored(&self) -> &[ScoredCell] {
        &self.scored
    }

    pub fn failures(&self) -> &[CellFailure] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty() && self.failures.is_empty()
    }

    /// Scored cells as a GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> GeoJson {
        GeoJson::from(FeatureCollection {
            bbox: None,
            foreign_members: None,
            features: self.scored.iter().map(ScoredCell::to_feature).collect(),
        })
    }

    /// Write the scored cells as GeoJSON
    pub fn write_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create output directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(&self.to_geojson())
            .context("Failed to serialize viability layer")?;
        std::fs::write(path, content)
            .context(format!("Failed to write GeoJSON file: {:?}", path))?;
        log::info!("Viability layer saved to: {:?}", path);
        Ok(())
    }

    /// Write the attribute table (no geometry) as CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for scored in &self.scored {
            let centroid = scored.cell.geometry.centroid();
            csv_writer
                .serialize(CsvRecord {
                    row: scored.cell.row,
                    column: scored.cell.column,
                    centroid_x: centroid.map(|p| p.x()),
                    centroid_y: centroid.map(|p| p.y()),
                    intersects_protected_area: scored.intersects_protected_area,
                    good_slopes_percentage: scored.goodness.slopes,
                    good_drainage_percentage: scored.goodness.drainage,
                    good_land_usage_percentage: scored.goodness.land_usage,
                    final_score: scored.final_score,
                    label: scored.label,
                    color: scored.color,
                })
                .context("Failed to write CSV record")?;
        }
        csv_writer.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }

    /// Attribute table as a Polars DataFrame
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<DataFrame> {
        let mut row_vec: Vec<u32> = Vec::new();
        let mut column_vec: Vec<u32> = Vec::new();
        let mut protected_vec: Vec<bool> = Vec::new();
        let mut slopes_vec: Vec<f64> = Vec::new();
        let mut drainage_vec: Vec<f64> = Vec::new();
        let mut land_usage_vec: Vec<f64> = Vec::new();
        let mut score_vec: Vec<f64> = Vec::new();
        let mut label_vec: Vec<&str> = Vec::new();
        let mut color_vec: Vec<&str> = Vec::new();

        for scored in &self.scored {
            row_vec.push(scored.cell.row as u32);
            column_vec.push(scored.cell.column as u32);
            protected_vec.push(scored.intersects_protected_area);
            slopes_vec.push(scored.goodness.slopes);
            drainage_vec.push(scored.goodness.drainage);
            land_usage_vec.push(scored.goodness.land_usage);
            score_vec.push(scored.final_score);
            label_vec.push(scored.label.as_str());
            color_vec.push(scored.color.as_str());
        }

        let df = df! [
            "row" => row_vec,
            "column" => column_vec,
            "intersects_protected_area" => protected_vec,
            "good_slopes_percentage" => slopes_vec,
            "good_drainage_percentage" => drainage_vec,
            "good_land_usage_percentage" => land_usage_vec,
            "final_score" => score_vec,
            "label" => label_vec,
            "color" => color_vec,
        ]
        .context("Failed to create DataFrame")?;

        Ok(df)
    }
}

/// Scores grid cells against the terrain, drainage, land cover and
/// protected-area inputs; stateless and safe to rerun
#[derive(Clone, Copy)]
pub struct ViabilityScorer<'a> {
    terrain: &'a TerrainDataset,
    drainage: &'a DrainageRaster,
    land_cover: LandCoverSlice<'a>,
    protected_areas: &'a ProtectedAreaSet,
}

impl<'a> ViabilityScorer<'a> {
    pub fn new(
        terrain: &'a TerrainDataset,
        drainage: &'a DrainageRaster,
        land_cover: LandCoverSlice<'a>,
        protected_areas: &'a ProtectedAreaSet,
    ) -> Self {
        ViabilityScorer {
            terrain,
            drainage,
            land_cover,
            protected_areas,
        }
    }

    /// Assess one cell; fails when a raster has no pixel inside the cell bounds
    pub fn score_cell(&self, cell: &GridCell) -> Result<ScoredCell, CellError> {
        let bbox = cell.bbox;
        let no_data = |layer| CellError::NoData { layer, bbox };

        let intersects_protected_area = self.protected_areas.intersects(&cell.geometry);

        let slopes = percentage_where(self.terrain.steep_mask(&bbox), |v| *v == 1)
            .ok_or_else(|| no_data(RasterLayer::SteepMask))?;
        let drainage = self
            .drainage
            .well_drained_percentage(&bbox)
            .ok_or_else(|| no_data(RasterLayer::Drainage))?;
        let land_usage = self
            .land_cover
            .favorable_percentage(&bbox)
            .ok_or_else(|| no_data(RasterLayer::LandCover))?;

        Ok(ScoredCell::new(
            cell.clone(),
            intersects_protected_area,
            Goodness {
                slopes,
                drainage,
                land_usage,
            },
        ))
    }

    /// Assess every cell; a failing cell is reported and skipped
    pub fn score(&self, cells: &[GridCell]) -> ScoringReport {
        #[cfg(feature = "rayon")]
        let outcomes: Vec<Result<ScoredCell, CellError>> =
            cells.par_iter().map(|cell| self.score_cell(cell)).collect();

        #[cfg(not(feature = "rayon"))]
        let outcomes: Vec<Result<ScoredCell, CellError>> =
            cells.iter().map(|cell| self.score_cell(cell)).collect();

        let mut report = ScoringReport::default();
        for (cell, outcome) in cells.iter().zip(outcomes) {
            match outcome {
                Ok(scored) => {
                    log::debug!(
                        "Cell ({}, {}) scored {:.2} ({})",
                        cell.row,
                        cell.column,
                        scored.final_score(),
                        scored.label().as_str()
                    );
                    report.scored.push(scored);
                }
                Err(error) => {
                    log::warn!("Cell ({}, {}) not scored: {}", cell.row, cell.column, error);
                    report.failures.push(CellFailure {
                        row: cell.row,
                        column: cell.column,
                        error,
                    });
                }
            }
        }
        log::info!(
            "Scored {} cells, {} without raster coverage",
            report.scored.len(),
            report.failures.len()
        );
        report
    }
}

/// Score `cells` in one call
pub fn score(
    cells: &[GridCell],
    terrain: &TerrainDataset,
    drainage: &DrainageRaster,
    land_cover: LandCoverSlice<'_>,
    protected_areas: &ProtectedAreaSet,
) -> ScoringReport {
    ViabilityScorer::new(terrain, drainage, land_cover, protected_areas).score(cells)
}

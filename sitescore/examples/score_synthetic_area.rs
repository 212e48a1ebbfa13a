use anyhow::{Context, Result};
use chrono::NaiveDate;
use geo::{polygon, MultiPolygon};
use ndarray::Array2;
use sitescore::geo_core::BoundingBox;
use sitescore::geometric::protected_area::{ProtectedArea, ProtectedAreaSet};
use sitescore::geometric::raster::{Raster, RasterStack};
use sitescore::{AnalysisSession, AreaOfInterest, InMemoryProvider};

/// Example: Scoring a synthetic 1°x1° area near Córdoba, Argentina
/// Rasters are generated in memory, so no cache or network is needed
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Example: Area viability on synthetic rasters ===\n");

    let bounds = BoundingBox::new(-64.0, -31.0, -63.0, -30.0);
    let square = polygon![
        (x: -64.0, y: -31.0),
        (x: -63.0, y: -31.0),
        (x: -63.0, y: -30.0),
        (x: -64.0, y: -30.0),
        (x: -64.0, y: -31.0),
    ];
    let area = AreaOfInterest::new("synthetic", MultiPolygon::new(vec![square]))?;

    // Ridge rising steeply to the east, gentle elsewhere
    let elevation = Array2::from_shape_fn((30, 30), |(_, c)| {
        if c > 20 {
            (c * c) as f64
        } else {
            c as f64 * 0.5
        }
    });
    // Drainage improves northward (row 0 is north)
    let hand = Array2::from_shape_fn((30, 30), |(r, _)| (30 - r) as f64 / 6.0);
    // Crops in the south-west quarter, grass elsewhere
    let labels = Array2::from_shape_fn((30, 30), |(r, c)| if r > 15 && c < 15 { 4u8 } else { 2u8 });

    let provider = InMemoryProvider::new()
        .with_elevation(Raster::from_bounds(elevation, &bounds)?)
        .with_drainage(Raster::from_bounds(hand, &bounds)?)
        .with_land_cover(RasterStack::single(
            NaiveDate::from_ymd_opt(2019, 12, 15).context("Invalid date")?,
            Raster::from_bounds(labels, &bounds)?,
        ));

    let reserve = ProtectedAreaSet::new(vec![ProtectedArea {
        name: Some("Reserva hídrica".to_string()),
        geometry: MultiPolygon::new(vec![polygon![
            (x: -63.9, y: -30.2),
            (x: -63.7, y: -30.2),
            (x: -63.7, y: -30.05),
            (x: -63.9, y: -30.05),
            (x: -63.9, y: -30.2),
        ]]),
    }]);

    let mut session = AnalysisSession::open(area, provider, reserve)?;
    session.set_output_path(Some("./output".to_string()));

    let report = session.area_viability()?;

    println!(
        "\n{:>4} {:>6} {:>9} {:>8} {:>8} {:>8} {:>7} {:>7}",
        "row", "column", "protected", "slopes", "drainage", "land", "score", "label"
    );
    for cell in report.scored() {
        println!(
            "{:>4} {:>6} {:>9} {:>7.1}% {:>7.1}% {:>7.1}% {:>7.2} {:>7}",
            cell.cell().row,
            cell.cell().column,
            cell.intersects_protected_area(),
            cell.good_slopes_percentage(),
            cell.good_drainage_percentage(),
            cell.good_land_usage_percentage(),
            cell.final_score(),
            cell.label().as_str(),
        );
    }

    let path = session.write_results(&report)?;
    println!("\nViability layer written to {:?}", path);

    session.close()?;
    Ok(())
}

use anyhow::{Context, Result};
use sitescore::collect::geotiff::GeoTiffDirectory;
use sitescore::collect::global_variables::get_files_data_path;
use sitescore::{AnalysisSession, AreaOfInterest};

/// Example: Scoring an area of interest against cached GeoTIFFs
///
/// Usage: score_from_geotiff <project>_aoi.geojson [data_dir]
///
/// `data_dir` defaults to `./data` and must hold `area_protegida.json` plus
/// `<project>/<project>_elevation.tif`, `<project>/<project>_drainage.tif`
/// and `<project>/<project>_land_usage_<YYYY-MM-DD>.tif`.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let aoi_path = args
        .next()
        .context("Usage: score_from_geotiff <aoi.geojson> [data_dir]")?;
    let data_path = args.next().map(Into::into).unwrap_or_else(get_files_data_path);

    println!("=== Example: Area viability from cached GeoTIFFs ===\n");

    let area = AreaOfInterest::from_geojson_file(&aoi_path)?;
    println!("Project: {}", area.project_name());
    println!("Bounds: {:?}\n", area.bounds());

    let provider = GeoTiffDirectory::new(&data_path, area.project_name());
    let mut session = AnalysisSession::open_with_data_path(area, provider, &data_path)?;

    let report = session.area_viability()?;
    for failure in report.failures() {
        println!("Cell ({}, {}) skipped: {}", failure.row, failure.column, failure.error);
    }

    let path = session.write_results(&report)?;
    println!("Viability layer: {:?}", path);

    let csv_path = path.with_extension("csv");
    let file = std::fs::File::create(&csv_path)
        .context(format!("Failed to create CSV file: {:?}", csv_path))?;
    report.write_csv(file)?;
    println!("Attribute table: {:?}", csv_path);

    #[cfg(feature = "polars")]
    println!("\n{}", report.to_polars_df()?);

    session.close()?;
    Ok(())
}

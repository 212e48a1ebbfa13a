use std::path::PathBuf;

pub const TEMP_PATH: &str = "./temp";

/// Root of the cached geodata (protected areas, per-project rasters)
pub const FILES_DATA_PATH: &str = "./data";

/// Protected areas vector file, relative to `FILES_DATA_PATH`
pub const PROTECTED_AREAS_FILE: &str = "area_protegida.json";

/// Project name used when no area-of-interest filename is known
pub const DEFAULT_PROJECT_NAME: &str = "no_name_provided";

/// Target ground resolution of every raster request
pub const RASTER_RESOLUTION_METERS: f64 = 30.0;

/// Default land-cover acquisition window `[start, end)` as ISO dates
pub const LAND_COVER_WINDOW_START: &str = "2019-12-01";
pub const LAND_COVER_WINDOW_END: &str = "2020-01-01";

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}

pub fn get_files_data_path() -> PathBuf {
    PathBuf::from(FILES_DATA_PATH)
}

use anyhow::{Context, Result};

use crate::collect::global_variables::RASTER_RESOLUTION_METERS;
use crate::geo_core::{meters_to_degrees, BoundingBox};
use crate::geometric::raster::{DateWindow, Raster, RasterStack};

/// What a provider is asked for: an extent and a target pixel size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    pub bbox: BoundingBox,
    /// Target pixel size in degrees, `(dlat, dlon)`
    pub resolution_degrees: (f64, f64),
}

impl RasterRequest {
    /// Request `bbox` at `RASTER_RESOLUTION_METERS`, converted at the
    /// latitude of the box centre
    pub fn for_bbox(bbox: BoundingBox) -> Self {
        let (_, center_lat) = bbox.center();
        RasterRequest {
            bbox,
            resolution_degrees: meters_to_degrees(center_lat, RASTER_RESOLUTION_METERS),
        }
    }
}

/// Source of the rasters needed to score an area
///
/// A missing layer is an error; providers never hand back placeholder data.
pub trait RasterProvider {
    /// Acquire resources before any request
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources; the provider may not be used afterwards
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Elevation in meters
    fn elevation(&self, request: &RasterRequest) -> Result<Raster<f64>>;

    /// Height above nearest drainage in meters
    fn drainage(&self, request: &RasterRequest) -> Result<Raster<f64>>;

    /// Land-cover labels acquired inside `window`
    fn land_cover(&self, request: &RasterRequest, window: &DateWindow) -> Result<RasterStack<u8>>;
}

/// Provider over rasters already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    elevation: Option<Raster<f64>>,
    drainage: Option<Raster<f64>>,
    land_cover: Option<RasterStack<u8>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elevation(mut self, elevation: Raster<f64>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_drainage(mut self, drainage: Raster<f64>) -> Self {
        self.drainage = Some(drainage);
        self
    }

    pub fn with_land_cover(mut self, land_cover: RasterStack<u8>) -> Self {
        self.land_cover = Some(land_cover);
        self
    }
}

impl RasterProvider for InMemoryProvider {
    fn elevation(&self, _request: &RasterRequest) -> Result<Raster<f64>> {
        self.elevation.clone().context("No elevation raster loaded")
    }

    fn drainage(&self, _request: &RasterRequest) -> Result<Raster<f64>> {
        self.drainage.clone().context("No drainage raster loaded")
    }

    fn land_cover(&self, _request: &RasterRequest, window: &DateWindow) -> Result<RasterStack<u8>> {
        let stack = self
            .land_cover
            .as_ref()
            .context("No land cover raster loaded")?;
        Ok(stack.filter_date(window))
    }
}

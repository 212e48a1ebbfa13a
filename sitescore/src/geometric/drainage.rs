use ndarray::ArrayView2;

use crate::commons::basic_functions::percentage_where;
use crate::geo_core::BoundingBox;
use crate::geometric::raster::Raster;

/// Height above nearest drainage (meters) separating well-drained terrain
/// from poorly-drained terrain
pub const WELL_DRAINED_THRESHOLD: f64 = 1.0;

/// Height-above-nearest-drainage raster
#[derive(Debug, Clone)]
pub struct DrainageRaster {
    pub hand: Raster<f64>,
}

impl DrainageRaster {
    pub fn new(hand: Raster<f64>) -> Self {
        DrainageRaster { hand }
    }

    pub fn slice(&self, bbox: &BoundingBox) -> ArrayView2<'_, f64> {
        self.hand.slice(bbox)
    }

    /// Percentage of well-drained pixels inside `bbox`, `None` without coverage
    pub fn well_drained_percentage(&self, bbox: &BoundingBox) -> Option<f64> {
        percentage_where(self.slice(bbox), |v| is_well_drained(*v))
    }
}

/// NaN (no data) never counts as well drained
pub fn is_well_drained(hand: f64) -> bool {
    hand > WELL_DRAINED_THRESHOLD
}

use ndarray::{Array2, ArrayView2, Axis};

use crate::geo_core::BoundingBox;
use crate::geometric::raster::Raster;

/// Slope magnitude (rise over run, index units) above which a pixel is steep
pub const STEEP_SLOPE_THRESHOLD: f64 = 1.0;

/// Elevation model with the terrain layers derived from it
///
/// All layers share the elevation grid. `binary_slope` is 1 where
/// `|slope| > STEEP_SLOPE_THRESHOLD`, else 0.
#[derive(Debug, Clone)]
pub struct TerrainDataset {
    pub elevation: Raster<f64>,
    pub slope: Raster<f64>,
    pub slope_degrees: Raster<f64>,
    pub binary_slope: Raster<u8>,
}

impl TerrainDataset {
    /// Derive slope, slope in degrees and the steep mask from an elevation raster
    pub fn from_elevation(elevation: Raster<f64>) -> Self {
        let (dx, dy) = gradient(elevation.values().view());
        let slope_values = ndarray::Zip::from(&dx)
            .and(&dy)
            .map_collect(|gx, gy| (gx * gx + gy * gy).sqrt());

        let slope = elevation.with_values(slope_values);
        let slope_degrees = slope.map(|s| s.atan().to_degrees());
        let binary_slope = slope.map(|s| u8::from(s.abs() > STEEP_SLOPE_THRESHOLD));

        log::debug!(
            "Terrain derived on a {:?} grid, {} steep pixels",
            elevation.shape(),
            binary_slope.values().iter().filter(|v| **v == 1).count()
        );

        TerrainDataset {
            elevation,
            slope,
            slope_degrees,
            binary_slope,
        }
    }

    /// Steep mask restricted to `bbox`
    pub fn steep_mask(&self, bbox: &BoundingBox) -> ArrayView2<'_, u8> {
        self.binary_slope.slice(bbox)
    }
}

/// Finite-difference gradient along columns (`dx`) and rows (`dy`)
///
/// Central differences in the interior, one-sided differences on the edges,
/// unit pixel spacing. An axis of length 1 has a zero gradient.
pub fn gradient(values: ArrayView2<'_, f64>) -> (Array2<f64>, Array2<f64>) {
    let dx = axis_gradient(values, Axis(1));
    let dy = axis_gradient(values, Axis(0));
    (dx, dy)
}

fn axis_gradient(values: ArrayView2<'_, f64>, axis: Axis) -> Array2<f64> {
    let mut out = Array2::zeros(values.dim());
    let n = values.len_of(axis);
    if n < 2 {
        return out;
    }
    for (lane_in, mut lane_out) in values.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        lane_out[0] = lane_in[1] - lane_in[0];
        lane_out[n - 1] = lane_in[n - 1] - lane_in[n - 2];
        for i in 1..n - 1 {
            lane_out[i] = (lane_in[i + 1] - lane_in[i - 1]) / 2.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn unit_raster(values: Array2<f64>) -> Raster<f64> {
        let (rows, cols) = values.dim();
        Raster::from_bounds(values, &BoundingBox::new(0.0, 0.0, cols as f64, rows as f64))
            .unwrap()
    }

    #[test]
    fn test_gradient_central_and_edges() {
        let values = array![[0.0, 1.0, 4.0, 9.0]];
        let (dx, dy) = gradient(values.view());
        assert_eq!(dx, array![[1.0, 2.0, 4.0, 5.0]]);
        assert_eq!(dy, array![[0.0, 0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_gradient_along_rows() {
        let values = array![[0.0, 0.0], [2.0, 2.0], [6.0, 6.0]];
        let (dx, dy) = gradient(values.view());
        assert_eq!(dx, Array2::<f64>::zeros((3, 2)));
        assert_eq!(dy, array![[2.0, 2.0], [3.0, 3.0], [4.0, 4.0]]);
    }

    #[test]
    fn test_flat_terrain_is_not_steep() {
        let terrain = TerrainDataset::from_elevation(unit_raster(Array2::from_elem((3, 3), 120.0)));
        assert!(terrain.binary_slope.values().iter().all(|v| *v == 0));
        assert!(terrain.slope_degrees.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_steep_mask_threshold() {
        // Column steps of 2 per pixel: slope 2 everywhere along x
        let values = Array2::from_shape_fn((2, 4), |(_, c)| c as f64 * 2.0);
        let terrain = TerrainDataset::from_elevation(unit_raster(values));
        assert!(terrain.binary_slope.values().iter().all(|v| *v == 1));
        let expected_degrees = 2.0_f64.atan().to_degrees();
        assert!(terrain
            .slope_degrees
            .values()
            .iter()
            .all(|v| (v - expected_degrees).abs() < 1e-12));

        // A slope of exactly 1 stays below the strict threshold
        let gentle = Array2::from_shape_fn((2, 4), |(_, c)| c as f64);
        let terrain = TerrainDataset::from_elevation(unit_raster(gentle));
        assert!(terrain.binary_slope.values().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_steep_mask_slice() {
        // Flat western half, a 10 m step per pixel on the eastern half
        let values =
            Array2::from_shape_fn((4, 4), |(_, c)| if c < 2 { 0.0 } else { c as f64 * 10.0 });
        let terrain = TerrainDataset::from_elevation(unit_raster(values));
        assert_eq!(terrain.binary_slope.xs(), terrain.elevation.xs());

        let west = terrain.steep_mask(&BoundingBox::new(0.0, 0.0, 1.0, 4.0));
        assert_eq!(west.dim(), (4, 1));
        assert!(west.iter().all(|v| *v == 0));

        let east = terrain.steep_mask(&BoundingBox::new(3.0, 0.0, 4.0, 4.0));
        assert!(east.iter().all(|v| *v == 1));
    }
}

use geo::{Area, BooleanOps, MultiPolygon, Polygon};

use crate::geo_core::BoundingBox;

/// Rows of the partition grid
pub const GRID_ROWS: usize = 3;
/// Columns of the partition grid
pub const GRID_COLUMNS: usize = 3;

/// One sub-region of the grid, clipped to the partitioned polygon
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// Row of the grid rectangle, 0 at `min_y`
    pub row: usize,
    /// Column of the grid rectangle, 0 at `min_x`
    pub column: usize,
    /// Intersection of the grid rectangle with the polygon
    pub geometry: MultiPolygon<f64>,
    /// Bounds of `geometry`
    pub bbox: BoundingBox,
}

/// Split `polygon` into a `GRID_ROWS` x `GRID_COLUMNS` grid over its bounds
///
/// Each rectangle is intersected with the polygon and kept only when the
/// intersection is non-empty, so at most nine cells come back, column by
/// column from the west. Empty or zero-area inputs give no cells.
pub fn partition(polygon: &MultiPolygon<f64>) -> Vec<GridCell> {
    let bounds = match BoundingBox::of(polygon) {
        Some(bounds) if bounds.has_area() => bounds,
        _ => return Vec::new(),
    };

    let cell_width = bounds.width() / GRID_COLUMNS as f64;
    let cell_height = bounds.height() / GRID_ROWS as f64;

    let mut cells = Vec::with_capacity(GRID_ROWS * GRID_COLUMNS);
    for column in 0..GRID_COLUMNS {
        for row in 0..GRID_ROWS {
            // The last rectangle ends exactly on the bounds, free of rounding drift
            let max_x = if column + 1 == GRID_COLUMNS {
                bounds.max_x
            } else {
                bounds.min_x + (column + 1) as f64 * cell_width
            };
            let max_y = if row + 1 == GRID_ROWS {
                bounds.max_y
            } else {
                bounds.min_y + (row + 1) as f64 * cell_height
            };
            let rectangle = BoundingBox::new(
                bounds.min_x + column as f64 * cell_width,
                bounds.min_y + row as f64 * cell_height,
                max_x,
                max_y,
            );

            let clip = MultiPolygon::new(vec![rectangle.to_polygon()]);
            let geometry = polygon.intersection(&clip);
            match BoundingBox::of(&geometry) {
                // Edge or corner contacts leave zero-area remnants
                Some(bbox) if geometry.unsigned_area() > 0.0 => cells.push(GridCell {
                    row,
                    column,
                    geometry,
                    bbox,
                }),
                _ => log::debug!("Grid cell ({}, {}) misses the polygon", row, column),
            }
        }
    }

    log::debug!("Partitioned polygon into {} grid cells", cells.len());
    cells
}

/// [`partition`] for a single polygon
pub fn partition_polygon(polygon: &Polygon<f64>) -> Vec<GridCell> {
    partition(&MultiPolygon::new(vec![polygon.clone()]))
}

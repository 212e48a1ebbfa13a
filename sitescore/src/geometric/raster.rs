use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

use crate::geo_core::BoundingBox;

/// Errors raised while assembling a raster from values and coordinates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RasterError {
    #[error("raster of shape {rows}x{cols} does not match {ys} y and {xs} x coordinates")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        ys: usize,
        xs: usize,
    },
    #[error("{axis} coordinates are not monotonic")]
    NotMonotonic { axis: &'static str },
    #[error("pixel size must be finite and non-zero, got ({width}, {height})")]
    InvalidPixelSize { width: f64, height: f64 },
    #[error("time slice {date} has shape {found:?}, expected {expected:?}")]
    SliceShapeMismatch {
        date: NaiveDate,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// A 2-D grid of samples indexed by pixel-centre coordinates
///
/// Rows follow `ys` and columns follow `xs`; both coordinate vectors are kept
/// strictly ascending, so row 0 is the southernmost row. Bounding-box queries
/// select every pixel whose centre lies inside the box, bounds included.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    values: Array2<T>,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl<T: Clone> Raster<T> {
    /// Build a raster from values and coordinate vectors
    ///
    /// Descending coordinates are accepted and flipped to ascending order
    /// together with the matching axis of `values`.
    pub fn new(values: Array2<T>, xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, RasterError> {
        let (rows, cols) = values.dim();
        if rows != ys.len() || cols != xs.len() {
            return Err(RasterError::ShapeMismatch {
                rows,
                cols,
                ys: ys.len(),
                xs: xs.len(),
            });
        }

        let mut values = values;
        let mut xs = xs;
        let mut ys = ys;

        match monotonic_direction(&xs) {
            Some(true) => {}
            Some(false) => {
                xs.reverse();
                values = values.slice(s![.., ..;-1]).to_owned();
            }
            None => return Err(RasterError::NotMonotonic { axis: "x" }),
        }
        match monotonic_direction(&ys) {
            Some(true) => {}
            Some(false) => {
                ys.reverse();
                values = values.slice(s![..;-1, ..]).to_owned();
            }
            None => return Err(RasterError::NotMonotonic { axis: "y" }),
        }

        Ok(Raster { values, xs, ys })
    }

    /// Build a raster from an affine origin (top-left corner of the first
    /// pixel) and a pixel size; `pixel_height` is negative for north-up images
    pub fn from_geotransform(
        values: Array2<T>,
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
    ) -> Result<Self, RasterError> {
        let valid = |v: f64| v.is_finite() && v != 0.0;
        if !valid(pixel_width) || !valid(pixel_height) {
            return Err(RasterError::InvalidPixelSize {
                width: pixel_width,
                height: pixel_height,
            });
        }
        let (rows, cols) = values.dim();
        let xs = (0..cols)
            .map(|col| origin_x + (col as f64 + 0.5) * pixel_width)
            .collect();
        let ys = (0..rows)
            .map(|row| origin_y + (row as f64 + 0.5) * pixel_height)
            .collect();
        Self::new(values, xs, ys)
    }

    /// Spread a north-up image (row 0 at `max_y`) evenly over `bbox`
    pub fn from_bounds(values: Array2<T>, bbox: &BoundingBox) -> Result<Self, RasterError> {
        let (rows, cols) = values.dim();
        let pixel_width = bbox.width() / cols.max(1) as f64;
        let pixel_height = -bbox.height() / rows.max(1) as f64;
        Self::from_geotransform(values, bbox.min_x, bbox.max_y, pixel_width, pixel_height)
    }

    /// Samples whose pixel centre falls inside `bbox` (inclusive)
    ///
    /// The view is empty when the box misses the raster coverage.
    pub fn slice(&self, bbox: &BoundingBox) -> ArrayView2<'_, T> {
        let (c0, c1) = axis_range(&self.xs, bbox.min_x, bbox.max_x);
        let (r0, r1) = axis_range(&self.ys, bbox.min_y, bbox.max_y);
        self.values.slice(s![r0..r1, c0..c1])
    }

    /// Apply `f` to every sample, keeping the coordinates
    pub fn map<U, F>(&self, f: F) -> Raster<U>
    where
        F: Fn(&T) -> U,
    {
        Raster {
            values: self.values.map(f),
            xs: self.xs.clone(),
            ys: self.ys.clone(),
        }
    }
}

impl<T> Raster<T> {
    /// Same grid carrying `values`, which must have this raster's shape
    pub(crate) fn with_values<U>(&self, values: Array2<U>) -> Raster<U> {
        debug_assert_eq!(self.values.dim(), values.dim());
        Raster {
            values,
            xs: self.xs.clone(),
            ys: self.ys.clone(),
        }
    }

    pub fn values(&self) -> &Array2<T> {
        &self.values
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Extent of the pixel centres
    pub fn bounds(&self) -> Option<BoundingBox> {
        match (self.xs.first(), self.xs.last(), self.ys.first(), self.ys.last()) {
            (Some(&min_x), Some(&max_x), Some(&min_y), Some(&max_y)) => {
                Some(BoundingBox::new(min_x, min_y, max_x, max_y))
            }
            _ => None,
        }
    }
}

/// `Some(true)` for strictly ascending, `Some(false)` for strictly descending
fn monotonic_direction(coords: &[f64]) -> Option<bool> {
    if coords.iter().any(|c| !c.is_finite()) {
        return None;
    }
    if coords.windows(2).all(|w| w[0] < w[1]) {
        Some(true)
    } else if coords.windows(2).all(|w| w[0] > w[1]) {
        Some(false)
    } else {
        None
    }
}

/// Index range of ascending `coords` within `[min, max]`
fn axis_range(coords: &[f64], min: f64, max: f64) -> (usize, usize) {
    let start = coords.partition_point(|c| *c < min);
    let end = coords.partition_point(|c| *c <= max);
    (start, end.max(start))
}

/// Half-open date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateWindow { start, end }
    }

    /// Parse a window from two ISO `YYYY-MM-DD` dates
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .with_context(|| format!("Invalid window start date: {}", start))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .with_context(|| format!("Invalid window end date: {}", end))?;
        if end <= start {
            anyhow::bail!("Date window end {} must be after start {}", end, start);
        }
        Ok(DateWindow { start, end })
    }

    /// The whole calendar year
    pub fn year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
        Some(DateWindow { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// One dated layer of a [`RasterStack`]
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlice<T> {
    pub date: NaiveDate,
    pub raster: Raster<T>,
}

/// Time-indexed rasters sharing one grid, ordered by date
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStack<T> {
    slices: Vec<TimeSlice<T>>,
}

impl<T: Clone> RasterStack<T> {
    /// Build a stack; slices are sorted by date and must share a shape
    pub fn new(mut slices: Vec<TimeSlice<T>>) -> Result<Self, RasterError> {
        slices.sort_by_key(|slice| slice.date);
        if let Some(first) = slices.first() {
            let expected = first.raster.shape();
            if let Some(bad) = slices.iter().find(|s| s.raster.shape() != expected) {
                return Err(RasterError::SliceShapeMismatch {
                    date: bad.date,
                    expected,
                    found: bad.raster.shape(),
                });
            }
        }
        Ok(RasterStack { slices })
    }

    /// Stack holding a single slice
    pub fn single(date: NaiveDate, raster: Raster<T>) -> Self {
        RasterStack {
            slices: vec![TimeSlice { date, raster }],
        }
    }

    /// Slices acquired inside `window`
    pub fn filter_date(&self, window: &DateWindow) -> Self {
        RasterStack {
            slices: self
                .slices
                .iter()
                .filter(|slice| window.contains(slice.date))
                .cloned()
                .collect(),
        }
    }
}

impl<T> RasterStack<T> {
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.slices.iter().map(|slice| slice.date).collect()
    }

    pub fn get(&self, index: usize) -> Option<&Raster<T>> {
        self.slices.get(index).map(|slice| &slice.raster)
    }

    /// Earliest slice
    pub fn first(&self) -> Option<&Raster<T>> {
        self.get(0)
    }

    /// Earliest slice acquired during `year`
    pub fn first_in_year(&self, year: i32) -> Option<&Raster<T>> {
        self.slices
            .iter()
            .find(|slice| slice.date.year() == year)
            .map(|slice| &slice.raster)
    }

    pub fn slices(&self) -> &[TimeSlice<T>] {
        &self.slices
    }
}

use anyhow::{Context, Result};
use ndarray::ArrayView2;

use crate::collect::global_variables::{LAND_COVER_WINDOW_END, LAND_COVER_WINDOW_START};
use crate::commons::basic_functions::percentage_where;
use crate::geo_core::BoundingBox;
use crate::geometric::raster::{DateWindow, Raster, RasterStack};

/// Land cover classes of the Dynamic World `label` band
/// Name                 Code
/// Water                  0
/// Trees                  1
/// Grass                  2
/// Flooded_vegetation     3
/// Crops                  4
/// Shrub_and_scrub        5
/// Built                  6
/// Bare                   7
/// Snow_and_ice           8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandCoverType {
    Water = 0,
    Trees = 1,
    Grass = 2,
    FloodedVegetation = 3,
    Crops = 4,
    ShrubAndScrub = 5,
    Built = 6,
    Bare = 7,
    SnowAndIce = 8,
}

impl TryFrom<u8> for LandCoverType {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        match code {
            0 => Ok(LandCoverType::Water),
            1 => Ok(LandCoverType::Trees),
            2 => Ok(LandCoverType::Grass),
            3 => Ok(LandCoverType::FloodedVegetation),
            4 => Ok(LandCoverType::Crops),
            5 => Ok(LandCoverType::ShrubAndScrub),
            6 => Ok(LandCoverType::Built),
            7 => Ok(LandCoverType::Bare),
            8 => Ok(LandCoverType::SnowAndIce),
            other => Err(other),
        }
    }
}

impl LandCoverType {
    pub fn name(&self) -> &'static str {
        match self {
            LandCoverType::Water => "water",
            LandCoverType::Trees => "trees",
            LandCoverType::Grass => "grass",
            LandCoverType::FloodedVegetation => "flooded_vegetation",
            LandCoverType::Crops => "crops",
            LandCoverType::ShrubAndScrub => "shrub_and_scrub",
            LandCoverType::Built => "built",
            LandCoverType::Bare => "bare",
            LandCoverType::SnowAndIce => "snow_and_ice",
        }
    }
}

/// Classes that make a pixel unsuitable for a new site
pub const UNFAVORABLE_LAND_COVER: [LandCoverType; 2] = [LandCoverType::Trees, LandCoverType::Crops];

/// Label of masked pixels; outside the class table, hence favorable
pub const NO_DATA_LABEL: u8 = 255;

/// Any label outside `UNFAVORABLE_LAND_COVER` is favorable, unknown codes included
pub fn is_favorable_label(label: u8) -> bool {
    match LandCoverType::try_from(label) {
        Ok(class) => !UNFAVORABLE_LAND_COVER.contains(&class),
        Err(_) => true,
    }
}

/// Default acquisition window for land-cover slices
pub fn default_land_cover_window() -> Result<DateWindow> {
    DateWindow::parse(LAND_COVER_WINDOW_START, LAND_COVER_WINDOW_END)
        .context("Invalid default land cover window")
}

/// Dated land-cover classifications over a shared grid
#[derive(Debug, Clone)]
pub struct LandCover {
    stack: RasterStack<u8>,
}

impl LandCover {
    pub fn new(stack: RasterStack<u8>) -> Self {
        LandCover { stack }
    }

    pub fn stack(&self) -> &RasterStack<u8> {
        &self.stack
    }

    /// Keep the slices acquired inside `window`
    pub fn filter_date(&self, window: &DateWindow) -> Self {
        LandCover {
            stack: self.stack.filter_date(window),
        }
    }

    /// The slice used for scoring: the earliest one
    pub fn scoring_slice(&self) -> Result<LandCoverSlice<'_>> {
        let raster = self
            .stack
            .first()
            .context("Land cover stack holds no time slice")?;
        Ok(LandCoverSlice { raster })
    }

    /// Earliest slice of a given year, as browsed year by year
    pub fn year_slice(&self, year: i32) -> Option<LandCoverSlice<'_>> {
        self.stack
            .first_in_year(year)
            .map(|raster| LandCoverSlice { raster })
    }
}

/// A single land-cover time slice
#[derive(Debug, Clone, Copy)]
pub struct LandCoverSlice<'a> {
    raster: &'a Raster<u8>,
}

impl<'a> LandCoverSlice<'a> {
    pub fn from_raster(raster: &'a Raster<u8>) -> Self {
        LandCoverSlice { raster }
    }

    pub fn raster(&self) -> &'a Raster<u8> {
        self.raster
    }

    pub fn slice(&self, bbox: &BoundingBox) -> ArrayView2<'a, u8> {
        self.raster.slice(bbox)
    }

    /// Percentage of favorable pixels inside `bbox`, `None` without coverage
    pub fn favorable_percentage(&self, bbox: &BoundingBox) -> Option<f64> {
        let view = self.slice(bbox);
        let percentage = percentage_where(view, |label| is_favorable_label(*label))?;
        if log::log_enabled!(log::Level::Debug) {
            for class in UNFAVORABLE_LAND_COVER {
                let count = view.iter().filter(|label| **label == class as u8).count();
                if count > 0 {
                    log::debug!("{} {} pixels inside {:?}", count, class.name(), bbox);
                }
            }
        }
        Some(percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::raster::TimeSlice;
    use chrono::NaiveDate;
    use ndarray::array;

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 2.0, 2.0)
    }

    #[test]
    fn test_unfavorable_codes() {
        assert!(!is_favorable_label(1));
        assert!(!is_favorable_label(4));
        for label in [0u8, 2, 3, 5, 6, 7, 8, 9, NO_DATA_LABEL] {
            assert!(is_favorable_label(label), "label {} should be favorable", label);
        }
    }

    #[test]
    fn test_land_cover_type_codes() {
        assert_eq!(LandCoverType::try_from(4), Ok(LandCoverType::Crops));
        assert_eq!(LandCoverType::try_from(9), Err(9));
        assert_eq!(LandCoverType::FloodedVegetation.name(), "flooded_vegetation");
    }

    #[test]
    fn test_favorable_percentage() {
        let raster = Raster::from_bounds(array![[1u8, 2], [4, 6]], &bbox()).unwrap();
        let slice = LandCoverSlice::from_raster(&raster);
        assert_eq!(slice.favorable_percentage(&bbox()), Some(50.0));
        assert_eq!(
            slice.favorable_percentage(&BoundingBox::new(9.0, 9.0, 10.0, 10.0)),
            None
        );
    }

    #[test]
    fn test_masked_pixels_count_as_favorable() {
        let raster = Raster::from_bounds(array![[NO_DATA_LABEL, 1], [4, 2]], &bbox()).unwrap();
        let slice = LandCoverSlice::from_raster(&raster);
        assert_eq!(slice.favorable_percentage(&bbox()), Some(50.0));
    }

    #[test]
    fn test_scoring_slice_is_earliest() {
        let later = Raster::from_bounds(array![[1u8]], &bbox()).unwrap();
        let earlier = Raster::from_bounds(array![[7u8]], &bbox()).unwrap();
        let stack = RasterStack::new(vec![
            TimeSlice {
                date: NaiveDate::from_ymd_opt(2019, 12, 20).unwrap(),
                raster: later,
            },
            TimeSlice {
                date: NaiveDate::from_ymd_opt(2019, 12, 5).unwrap(),
                raster: earlier,
            },
        ])
        .unwrap();
        let land_cover = LandCover::new(stack);
        let slice = land_cover.scoring_slice().unwrap();
        assert_eq!(slice.raster().values()[[0, 0]], 7);
        assert!(land_cover.year_slice(2019).is_some());
        assert!(land_cover.year_slice(2020).is_none());
    }

    #[test]
    fn test_empty_stack_has_no_scoring_slice() {
        let land_cover = LandCover::new(RasterStack::new(Vec::new()).unwrap());
        assert!(land_cover.scoring_slice().is_err());
    }

    #[test]
    fn test_default_window() {
        let window = default_land_cover_window().unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2019, 12, 1).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    }
}

pub mod area_of_interest;
pub mod dem;
pub mod drainage;
pub mod grid;
pub mod land_cover;
pub mod protected_area;
pub mod raster;
pub mod viability;

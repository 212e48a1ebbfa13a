pub mod collect;
pub mod commons;
pub mod geo_core;
pub mod geometric;

pub use collect::provider::{InMemoryProvider, RasterProvider, RasterRequest};
pub use collect::session::AnalysisSession;
pub use geometric::area_of_interest::AreaOfInterest;
pub use geometric::grid::{partition, GridCell};
pub use geometric::viability::{score, ScoredCell, ScoringReport, ViabilityLabel};

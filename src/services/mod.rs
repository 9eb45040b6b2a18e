// Core calculation services
pub mod drive_time;
pub mod geopricing;
pub mod pricing;
pub mod zones;

pub use drive_time::{DriveTimeEstimate, DriveTimeOptions, DriveTimeResolver};
pub use geopricing::GeopricingService;
pub use pricing::{PriceBreakdown, PriceCalculator};
pub use zones::{ZoneMatch, ZoneResolver};

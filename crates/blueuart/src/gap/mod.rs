//! Generic Access Profile: addresses, advertising payloads and scan results

pub mod advertising;
pub mod constants;
pub mod scan;
pub mod types;


pub use advertising::{
    advertise_interval_ms, Advertisement, AdvertisementFields, AdvertisementOptions, AdvertisementPayload,
    ManufacturerDataElement, ServiceDataElement,
};
pub use constants::*;
pub use scan::ScanResult;
pub use types::*;

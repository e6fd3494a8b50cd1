// Library surface for the binary and for headless/integration tests.
pub mod acquisition;
pub mod app_dirs;
pub mod config;
pub mod fix;
pub mod fix_log;
pub mod geocode;
pub mod logging;
pub mod placemark;
pub mod position;
pub mod readout;
pub mod runtime;
pub mod store;
pub mod tag;

pub use acquisition::{AcquisitionError, LocationController, Phase, StopReason};
pub use fix::{Coordinate, Fix};

pub mod config;
pub mod error;
pub mod reading;
pub mod sensors;

pub use config::Config;
pub use error::*;
pub use reading::{parse_value, Reading, NO_READING};
pub use sensors::{MonitorConfig, PolicySpec, SensorConfig, MAX_WINDOW};

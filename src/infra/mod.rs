//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod pdf;
pub mod raster;
pub mod telemetry;

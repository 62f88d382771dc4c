pub mod affinity;
pub mod error;
pub mod points;
pub mod ports;
pub mod quota;
pub mod router;
pub mod stores;
pub mod telemetry;
pub mod types;
pub mod usage;

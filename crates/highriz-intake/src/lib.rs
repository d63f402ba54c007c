pub mod config;
pub mod error;
pub mod integrations;
pub mod submissions;
pub mod telemetry;

#[cfg(feature = "cache")]
pub mod cache;
#[cfg(feature = "config")]
pub mod config;
#[cfg(feature = "logging")]
pub mod logging;
#[cfg(feature = "persistence")]
pub mod persistence;

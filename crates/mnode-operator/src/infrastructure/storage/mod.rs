//! Storage infrastructure: configuration and derivation-cache persistence.
//!
//! - `config` reads and writes the TOML configuration file from the
//!   platform-appropriate directory, falling back to defaults on first run.
//! - `address_cache` keeps one JSON file of `path → address` pairs per
//!   device partition, loaded lazily and written back best effort.

pub mod address_cache;
pub mod config;

//! # Lobby Tracker
//!
//! Periodically harvests the Don't Starve Together lobby directory into dated
//! snapshots and answers listing and statistics queries over them.
//!
//! - **`collector`**: bounded fan-out over every capable region and platform
//! - **`geo`**: geolocation and platform labelling of raw listings
//! - **`store`**: epochs of records and rollups, in memory or in ClickHouse
//! - **`statistics`**: per-epoch rollups and rollup range queries
//! - **`scheduler`**: cron driven collect and clear jobs
//! - **`tracker`**: the service surface tying the above together

#[macro_use]
extern crate tracing;

pub mod collector;
pub mod error;
pub mod geo;
pub mod lobby;
pub mod logging;
pub mod model;
pub mod query;
pub mod report;
pub mod scheduler;
pub mod statistics;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use error::{
    Result,
    TrackerError,
};
pub use tracker::Tracker;

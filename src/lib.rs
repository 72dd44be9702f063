pub mod booking;
pub mod config;
pub mod confirmation;
pub mod deal;
pub mod error;
pub mod events;
pub mod launch;
pub mod lineage;
pub mod logging;
pub mod purchase;
pub mod schedule;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod tick;
pub mod types;
pub mod utils;

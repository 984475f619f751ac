//! Group wager ledger, settlement and dispute core.

pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod dispute;
pub mod error;
pub mod events;
pub mod latency;
pub mod ledger;
pub mod settlement;
pub mod sweeper;
pub mod types;

#[cfg(test)]
mod testing;

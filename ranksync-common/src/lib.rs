//! # ranksync common library
//!
//! Shared code for the ranksync crates:
//! - Catalog domain types (characteristics, difficulties, rank status, sources)
//! - Catalog database schema
//! - Change events and the event bus
//! - Bootstrap configuration
//! - Timestamp helpers

pub mod catalog;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};

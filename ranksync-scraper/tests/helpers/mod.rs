//! Test Helper Utilities
//!
//! Shared utilities for testing ranksync-scraper

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_source;

pub use db_utils::{
    create_test_db, difficulty_state, dump_catalog, map_state, seed_map, DifficultyState, MapState,
};
pub use fake_source::{
    day, modded_entry, qualified_entry, ranked_entry, RecordingSink, ScriptedSource,
};

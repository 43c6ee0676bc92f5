//! Integration test suite for keel.
//!
//! These tests drive the store, detector and rule engine together against
//! temporary instance directories, the way the CLI does.
//!
//! # Test Categories
//!
//! - `store_roundtrip`: snapshot persistence, validation and backups
//! - `reconciliation`: filesystem sync scenarios
//! - `rule_scenarios`: rule loading, ranking and rendering
//! - `legacy_compat`: legacy and generic accessors over one file
//! - `concurrency`: revision conflicts between writers

mod fixtures;

mod concurrency;
mod legacy_compat;
mod reconciliation;
mod rule_scenarios;
mod store_roundtrip;

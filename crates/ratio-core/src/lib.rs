//! Ratio Core -- shared reference data for the production planner.
//!
//! This crate holds the immutable catalogue every planner component reads:
//! goods, recipes, processing entities, modules, beacons and technologies,
//! together with the dependency indices derived from them. It also provides
//! the memento type used by the undo contract.
//!
//! # Key Types
//!
//! - [`database::DatabaseBuilder`] -- Registers definitions and validates
//!   every cross reference (including technology cycles) on `build`.
//! - [`database::Database`] -- Frozen catalogue with producer/consumer and
//!   technology reverse-dependency indices.
//! - [`snapshot::Memento`] -- Bitcode-encoded snapshot of an editable
//!   entity, captured before a mutation so the caller can restore it.

pub mod database;
pub mod id;
pub mod snapshot;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

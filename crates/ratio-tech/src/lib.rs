//! Technology science-cost analysis.
//!
//! # Overview
//!
//! Every technology costs `count` research units, each consuming a fixed set
//! of science packs. Researching a technology requires researching all of
//! its prerequisites first, so the pack bill for reaching it is the sum over
//! its ancestor set (itself included), with each ancestor counted once even
//! when it is reachable along several paths.
//!
//! [`TechnologyScience::compute`] produces that bill for every technology in
//! one pass over the prerequisite DAG. [`MilestoneOrder`] ranks packs so
//! callers can ask which pack gates a technology
//! ([`TechnologyScience::max_technology_ingredient`]).
//!
//! The analysis reads any [`TechGraph`]; the reference
//! [`Database`](ratio_core::database::Database) is the usual source.

pub mod bits;
pub mod science;

pub use bits::BitMatrix;
pub use science::{MilestoneList, MilestoneOrder, TechGraph, TechnologyScience};

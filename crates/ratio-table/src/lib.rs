//! Ratio Table -- the production sheet and its flow solver.
//!
//! A [`ProductionModel`] is a tree of tables. Each table holds recipe rows
//! and the links that balance goods between them; a row may own a nested
//! table (its subgroup). [`ProductionModel::solve`] derives every row's
//! parameters from its building and modules, solves each table as a linear
//! program, and writes rates and link diagnostics back into the model.
//!
//! # Key Types
//!
//! - [`ProductionModel`] -- Arena of tables, rows and links with the edit
//!   and memento operations used by the editor.
//! - [`ProductionLink`] -- Balance constraint on one goods type within a
//!   table, carrying the flags and flows of the last solve.
//! - [`ModuleTemplate`] / [`ModuleFiller`] -- Explicit and automatic module
//!   layouts feeding [`RecipeParameters`].
//! - [`SolveSettings`] / [`SolveSummary`] -- Solve configuration and result.

pub mod link;
pub mod model;
pub mod module;
pub mod parameters;
pub mod settings;
pub mod solve;

pub use link::{LinkAlgorithm, LinkFlags, ProductionLink};
pub use model::{LinkId, ProductionModel, ProductionTable, RecipeRow, RowId, TableError, TableId};
pub use module::{
    ModuleEffects, ModuleEntry, ModuleError, ModuleFiller, ModuleFillerParameters, ModuleTemplate,
};
pub use parameters::RecipeParameters;
pub use settings::SolveSettings;
pub use solve::SolveSummary;

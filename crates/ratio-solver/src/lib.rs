//! Ratio Solver -- a backend-agnostic linear-program builder.
//!
//! [`Solver`] collects variables, ranged constraints and a sparse
//! coefficient matrix keyed by caller-chosen types, then hands the model to
//! an [`LpBackend`] on every [`Solver::solve`]. Each solve opens a fresh
//! backend session and consumes it, so nothing survives in the backend
//! between calls.
//!
//! The default backend, [`SimplexBackend`], is a pure-Rust dual simplex
//! implementation provided by `minilp`.

pub mod backend;
pub mod solver;

pub use backend::{LpBackend, LpSession, SessionOutcome, SimplexBackend};
pub use solver::{SolveStatus, Solver, SolverKey};

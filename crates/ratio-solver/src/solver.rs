//! Keyed LP model.
//!
//! [`Solver`] owns named variables and constraints, a sparse coefficient
//! map, and the results of the last successful solve. Each call to
//! [`Solver::solve`] rebuilds a backend session from scratch.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::backend::{LpBackend, LpSession, SimplexBackend};

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    Abnormal,
    NotSolved,
}

impl SolveStatus {
    /// True when the solve produced usable variable values.
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    /// Ordering used when several solves are folded into one report:
    /// higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            SolveStatus::Optimal => 0,
            SolveStatus::Feasible => 1,
            SolveStatus::NotSolved => 2,
            SolveStatus::Unbounded => 3,
            SolveStatus::Infeasible => 4,
            SolveStatus::Abnormal => 5,
        }
    }
}

/// Anything usable as a variable or constraint handle.
pub trait SolverKey: Eq + Hash + Clone + Debug {}

impl<T: Eq + Hash + Clone + Debug> SolverKey for T {}

#[derive(Debug, Clone)]
struct Variable<V> {
    key: V,
    min: f64,
    max: f64,
}

#[derive(Debug, Clone)]
struct Constraint<C> {
    key: C,
    min: f64,
    max: f64,
}

/// A linear program addressed by caller-chosen keys.
pub struct Solver<V: SolverKey, C: SolverKey, B: LpBackend = SimplexBackend> {
    backend: B,
    variables: Vec<Variable<V>>,
    variable_index: HashMap<V, usize>,
    constraints: Vec<Constraint<C>>,
    constraint_index: HashMap<C, usize>,
    coefficients: HashMap<(V, C), f64>,
    objective: HashMap<V, f64>,
    results: HashMap<V, f64>,
    objective_value: f64,
    last_status: SolveStatus,
}

impl<V: SolverKey, C: SolverKey> Solver<V, C, SimplexBackend> {
    pub fn new() -> Self {
        Self::with_backend(SimplexBackend)
    }
}

impl<V: SolverKey, C: SolverKey> Default for Solver<V, C, SimplexBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: SolverKey, C: SolverKey, B: LpBackend> Solver<V, C, B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            variables: Vec::new(),
            variable_index: HashMap::new(),
            constraints: Vec::new(),
            constraint_index: HashMap::new(),
            coefficients: HashMap::new(),
            objective: HashMap::new(),
            results: HashMap::new(),
            objective_value: 0.0,
            last_status: SolveStatus::NotSolved,
        }
    }

    /// Register `key` with bounds `[min, max]` and an objective coefficient.
    /// Adding an existing key replaces its bounds and objective.
    pub fn add_variable(&mut self, key: V, min: f64, max: f64, objective: f64) {
        match self.variable_index.get(&key) {
            Some(&slot) => {
                self.variables[slot].min = min;
                self.variables[slot].max = max;
            }
            None => {
                self.variable_index.insert(key.clone(), self.variables.len());
                self.variables.push(Variable {
                    key: key.clone(),
                    min,
                    max,
                });
            }
        }
        self.objective.insert(key, objective);
    }

    /// Register constraint `key` as the range `[min, max]`. Adding an
    /// existing key replaces its bounds and keeps its coefficients.
    pub fn add_constraint(&mut self, key: C, min: f64, max: f64) {
        match self.constraint_index.get(&key) {
            Some(&slot) => {
                self.constraints[slot].min = min;
                self.constraints[slot].max = max;
            }
            None => {
                self.constraint_index.insert(key.clone(), self.constraints.len());
                self.constraints.push(Constraint { key, min, max });
            }
        }
    }

    pub fn set_constraint_bounds(&mut self, key: &C, min: f64, max: f64) {
        if let Some(&slot) = self.constraint_index.get(key) {
            self.constraints[slot].min = min;
            self.constraints[slot].max = max;
        }
    }

    pub fn has_variable(&self, key: &V) -> bool {
        self.variable_index.contains_key(key)
    }

    pub fn has_constraint(&self, key: &C) -> bool {
        self.constraint_index.contains_key(key)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Coefficient of `variable` in `constraint`; 0 when never set.
    pub fn coefficient(&self, variable: &V, constraint: &C) -> f64 {
        self.coefficients
            .get(&(variable.clone(), constraint.clone()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_coefficient(&mut self, variable: V, constraint: C, value: f64) {
        if value == 0.0 {
            self.coefficients.remove(&(variable, constraint));
        } else {
            self.coefficients.insert((variable, constraint), value);
        }
    }

    /// Accumulate into an existing coefficient.
    pub fn add_coefficient(&mut self, variable: V, constraint: C, delta: f64) {
        let current = self.coefficient(&variable, &constraint);
        self.set_coefficient(variable, constraint, current + delta);
    }

    /// Value of `key` from the last successful solve, 0 otherwise.
    pub fn value(&self, key: &V) -> f64 {
        self.results.get(key).copied().unwrap_or(0.0)
    }

    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }

    pub fn last_status(&self) -> SolveStatus {
        self.last_status
    }

    /// Drop all variables, constraints and coefficients. Results from the
    /// last solve stay readable until the next successful solve.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.variable_index.clear();
        self.constraints.clear();
        self.constraint_index.clear();
        self.coefficients.clear();
        self.objective.clear();
    }

    /// Build a backend session, solve it, and publish results on success.
    /// On failure the previous results are kept.
    pub fn solve(&mut self, maximize: bool) -> SolveStatus {
        let mut session = self.backend.open(maximize);
        for var in &self.variables {
            let objective = self.objective.get(&var.key).copied().unwrap_or(0.0);
            session.add_variable(var.min, var.max, objective);
        }

        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.constraints.len()];
        for ((var, con), &coef) in &self.coefficients {
            let v = self.variable_index.get(var);
            let c = self.constraint_index.get(con);
            let (Some(&v), Some(&c)) = (v, c) else {
                continue;
            };
            rows[c].push((v, coef));
        }
        for (constraint, terms) in self.constraints.iter().zip(rows.iter_mut()) {
            // HashMap iteration order is arbitrary; keep solves reproducible.
            terms.sort_by_key(|&(v, _)| v);
            session.add_constraint(constraint.min, constraint.max, terms);
        }

        let outcome = session.solve();
        self.last_status = outcome.status;
        tracing::debug!(
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            status = ?outcome.status,
            "lp solved"
        );

        if outcome.status.is_success() {
            self.results.clear();
            for (var, value) in self.variables.iter().zip(outcome.values) {
                self.results.insert(var.key.clone(), value);
            }
            self.objective_value = outcome.objective;
        }
        outcome.status
    }
}

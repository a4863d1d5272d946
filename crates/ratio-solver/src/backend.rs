//! Backend seam for the LP adapter.
//!
//! A backend hands out one [`LpSession`] per solve. The session is consumed
//! by [`LpSession::solve`], which releases every backend resource on every
//! path, including unwinding.

use crate::solver::SolveStatus;
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A linear-programming backend.
pub trait LpBackend {
    type Session: LpSession;

    /// Open a fresh, empty session.
    fn open(&self, maximize: bool) -> Self::Session;
}

/// One configured LP instance. Variables are addressed by the index
/// returned from [`add_variable`](Self::add_variable).
pub trait LpSession {
    /// Add a variable with bounds `[min, max]` and an objective coefficient.
    fn add_variable(&mut self, min: f64, max: f64, objective: f64) -> usize;

    /// Add the ranged row `min <= sum(coef * var) <= max`.
    fn add_constraint(&mut self, min: f64, max: f64, terms: &[(usize, f64)]);

    /// Solve and release the session.
    fn solve(self) -> SessionOutcome;
}

/// The result of one session solve. `values` is indexed like the session's
/// variables and is only meaningful on a successful status.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub status: SolveStatus,
    pub values: Vec<f64>,
    pub objective: f64,
}

impl SessionOutcome {
    fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// minilp backend
// ---------------------------------------------------------------------------

/// Pure-Rust simplex backend built on `minilp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexBackend;

impl LpBackend for SimplexBackend {
    type Session = SimplexSession;

    fn open(&self, maximize: bool) -> SimplexSession {
        let direction = if maximize {
            OptimizationDirection::Maximize
        } else {
            OptimizationDirection::Minimize
        };
        SimplexSession {
            problem: Problem::new(direction),
            maximize,
            variables: Vec::new(),
            bounds: Vec::new(),
            constraint_count: 0,
            trivially_infeasible: false,
            malformed: false,
        }
    }
}

/// A `minilp` problem under construction.
pub struct SimplexSession {
    problem: Problem,
    maximize: bool,
    variables: Vec<Variable>,
    /// (min, max, objective) per variable, kept for the constraint-free path.
    bounds: Vec<(f64, f64, f64)>,
    constraint_count: usize,
    trivially_infeasible: bool,
    malformed: bool,
}

fn expression(variables: &[Variable], terms: &[(usize, f64)]) -> LinearExpr {
    let mut expr = LinearExpr::empty();
    for &(index, coef) in terms {
        expr.add(variables[index], coef);
    }
    expr
}

impl LpSession for SimplexSession {
    fn add_variable(&mut self, min: f64, max: f64, objective: f64) -> usize {
        if min.is_nan() || max.is_nan() || !objective.is_finite() || min > max {
            self.malformed = true;
        }
        let index = self.variables.len();
        // Keep minilp away from malformed bounds; the session reports
        // Abnormal before solving anyway.
        let (lo, hi) = if self.malformed { (0.0, 0.0) } else { (min, max) };
        self.variables.push(self.problem.add_var(objective, (lo, hi)));
        self.bounds.push((min, max, objective));
        index
    }

    fn add_constraint(&mut self, min: f64, max: f64, terms: &[(usize, f64)]) {
        if min.is_nan() || max.is_nan() || terms.iter().any(|(_, c)| !c.is_finite()) {
            self.malformed = true;
            return;
        }
        if terms.iter().any(|&(index, _)| index >= self.variables.len()) {
            self.malformed = true;
            return;
        }
        if terms.is_empty() {
            if min > 0.0 || max < 0.0 {
                self.trivially_infeasible = true;
            }
            return;
        }

        self.constraint_count += 1;
        if min == max {
            let expr = expression(&self.variables, terms);
            self.problem.add_constraint(expr, ComparisonOp::Eq, min);
            return;
        }
        if min > max {
            self.trivially_infeasible = true;
            return;
        }
        if min.is_finite() {
            let expr = expression(&self.variables, terms);
            self.problem.add_constraint(expr, ComparisonOp::Ge, min);
        }
        if max.is_finite() {
            let expr = expression(&self.variables, terms);
            self.problem.add_constraint(expr, ComparisonOp::Le, max);
        }
    }

    fn solve(self) -> SessionOutcome {
        if self.malformed {
            return SessionOutcome::failed(SolveStatus::Abnormal);
        }
        if self.trivially_infeasible {
            return SessionOutcome::failed(SolveStatus::Infeasible);
        }
        if self.constraint_count == 0 {
            return solve_unconstrained(&self.bounds, self.maximize);
        }

        match self.problem.solve() {
            Ok(solution) => {
                let values = self.variables.iter().map(|&v| solution[v]).collect();
                SessionOutcome {
                    status: SolveStatus::Optimal,
                    values,
                    objective: solution.objective(),
                }
            }
            Err(minilp::Error::Infeasible) => SessionOutcome::failed(SolveStatus::Infeasible),
            Err(minilp::Error::Unbounded) => SessionOutcome::failed(SolveStatus::Unbounded),
            #[allow(unreachable_patterns)]
            Err(_) => SessionOutcome::failed(SolveStatus::Abnormal),
        }
    }
}

/// Without rows every variable independently sits at the bound its
/// objective coefficient favours; a zero coefficient picks the feasible
/// value closest to zero.
fn solve_unconstrained(bounds: &[(f64, f64, f64)], maximize: bool) -> SessionOutcome {
    let mut values = Vec::with_capacity(bounds.len());
    let mut objective = 0.0;
    for &(min, max, coef) in bounds {
        let pull = if maximize { coef } else { -coef };
        let value = if pull > 0.0 {
            max
        } else if pull < 0.0 {
            min
        } else {
            0.0_f64.clamp(min, max)
        };
        if !value.is_finite() {
            return SessionOutcome::failed(SolveStatus::Unbounded);
        }
        objective += coef * value;
        values.push(value);
    }
    SessionOutcome {
        status: SolveStatus::Optimal,
        values,
        objective,
    }
}

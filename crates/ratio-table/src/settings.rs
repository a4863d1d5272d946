use serde::{Deserialize, Serialize};

/// Tuning knobs for [`ProductionModel::solve`](crate::model::ProductionModel::solve).
///
/// Every field has a serde default, so a settings file only needs to name
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveSettings {
    /// Absolute slack above which a link counts as not matched.
    pub tolerance: f64,
    /// Objective cost per unit of deficit or surplus slack on a link.
    pub slack_penalty: f64,
    /// Re-solve each link with its target raised by one unit to obtain its
    /// marginal value.
    pub compute_dual_values: bool,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            slack_penalty: 1e5,
            compute_dual_values: true,
        }
    }
}

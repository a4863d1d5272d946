//! Per-row derived parameters: effective recipe time, module effects and
//! fuel use. Computed before each solve and fed into it as inputs.

use std::collections::BTreeMap;
use std::ops::BitOr;

use ratio_core::database::Database;
use ratio_core::id::GoodsId;
use serde::{Deserialize, Serialize};

use crate::model::RecipeRow;
use crate::module::{ModuleContext, ModuleEffects, ModuleFiller, UsedModules, resolve_row_modules};

/// Problems found while deriving a row's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RowWarnings(u8);

impl RowWarnings {
    pub const NONE: Self = Self(0);
    /// No building assigned; the recipe runs at its nominal speed.
    pub const ENTITY_NOT_SPECIFIED: Self = Self(1 << 0);
    /// The assigned fuel has no fuel value and is ignored.
    pub const FUEL_HAS_NO_VALUE: Self = Self(1 << 1);
    /// The building cannot run (zero crafting speed).
    pub const ENTITY_CANNOT_CRAFT: Self = Self(1 << 2);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RowWarnings {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Derived parameters of one row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecipeParameters {
    /// Seconds per execution on one building.
    pub recipe_time: f64,
    pub effects: ModuleEffects,
    pub modules: UsedModules,
    /// Fuel burned per execution.
    pub fuel_per_execution: f64,
    pub warnings: RowWarnings,
}

impl RecipeParameters {
    /// Derive the parameters of `row` from the database and the module
    /// filler in effect for it, if any.
    pub fn calculate(db: &Database, row: &RecipeRow, filler: Option<&dyn ModuleFiller>) -> Self {
        let Some(recipe) = db.recipe(row.recipe) else {
            return Self::default();
        };
        let Some(entity) = row.entity.and_then(|e| db.entity(e)) else {
            return Self {
                recipe_time: recipe.time,
                warnings: RowWarnings::ENTITY_NOT_SPECIFIED,
                ..Self::default()
            };
        };

        let ctx = ModuleContext { db, recipe, entity };
        let (effects, modules) = resolve_row_modules(row.modules.as_ref(), &ctx, filler);

        let speed = entity.crafting_speed * effects.speed_mod();
        let mut warnings = RowWarnings::NONE;
        let recipe_time = if speed > 0.0 {
            recipe.time / speed
        } else {
            warnings = warnings | RowWarnings::ENTITY_CANNOT_CRAFT;
            recipe.time
        };

        let mut fuel_per_execution = 0.0;
        if let Some(fuel) = row.fuel.and_then(|f| db.goods(f)) {
            if fuel.fuel_value > 0.0 {
                let energy = entity.energy_usage * effects.energy_usage_mod() * recipe_time;
                fuel_per_execution = energy / fuel.fuel_value;
            } else {
                warnings = warnings | RowWarnings::FUEL_HAS_NO_VALUE;
            }
        }

        Self {
            recipe_time,
            effects,
            modules,
            fuel_per_execution,
            warnings,
        }
    }

    pub fn productivity(&self) -> f64 {
        self.effects.productivity
    }
}

/// Net goods flow of one execution of `row`: products boosted by
/// productivity, minus ingredients, minus fuel.
pub(crate) fn net_flows(db: &Database, row: &RecipeRow) -> BTreeMap<GoodsId, f64> {
    let mut flows = BTreeMap::new();
    let Some(recipe) = db.recipe(row.recipe) else {
        return flows;
    };
    let boost = 1.0 + row.parameters.productivity();
    for product in &recipe.products {
        *flows.entry(product.goods).or_insert(0.0) += product.amount * boost;
    }
    for ingredient in &recipe.ingredients {
        *flows.entry(ingredient.goods).or_insert(0.0) -= ingredient.amount;
    }
    if let Some(fuel) = row.fuel {
        if row.parameters.fuel_per_execution > 0.0 {
            *flows.entry(fuel).or_insert(0.0) -= row.parameters.fuel_per_execution;
        }
    }
    flows.retain(|_, v| *v != 0.0);
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProductionModel;
    use crate::module::{ModuleFillerParameters, ModuleTemplate};
    use ratio_core::test_utils::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn row_without_entity_runs_at_nominal_time() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), gear_recipe()).unwrap();
        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), None);
        assert!(close(params.recipe_time, 0.5));
        assert!(params.warnings.contains(RowWarnings::ENTITY_NOT_SPECIFIED));
    }

    #[test]
    fn crafting_speed_and_modules_shorten_recipe_time() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), gear_recipe()).unwrap();
        model.set_entity(&db, row, Some(assembler())).unwrap();
        model
            .set_modules(&db, row, Some(ModuleTemplate::single(speed_module())))
            .unwrap();

        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), None);
        // 4 speed modules: speed_mod 1.8, crafting speed 0.75.
        assert!(close(params.recipe_time, 0.5 / (0.75 * 1.8)));
        assert!(params.warnings.is_empty());
    }

    #[test]
    fn filler_speeds_up_rows_without_template() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), gear_recipe()).unwrap();
        model.set_entity(&db, row, Some(assembler())).unwrap();
        let filler = ModuleFillerParameters {
            fill_module: Some(speed_module()),
            ..Default::default()
        };

        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), Some(&filler));
        assert!(close(params.recipe_time, 0.5 / (0.75 * 1.8)));
        assert_eq!(params.modules.modules[0].count, 4);
    }

    #[test]
    fn fuel_use_scales_with_energy_and_time() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), smelt_iron()).unwrap();
        model.set_entity(&db, row, Some(stone_furnace())).unwrap();
        model.set_fuel(&db, row, Some(coal())).unwrap();

        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), None);
        // 90 kW * 3.2 s / 4 MJ
        assert!(close(params.fuel_per_execution, 90_000.0 * 3.2 / 4_000_000.0));
    }

    #[test]
    fn fuel_without_value_is_flagged() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), smelt_iron()).unwrap();
        model.set_entity(&db, row, Some(stone_furnace())).unwrap();
        model.set_fuel(&db, row, Some(iron_ore())).unwrap();

        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), None);
        assert_eq!(params.fuel_per_execution, 0.0);
        assert!(params.warnings.contains(RowWarnings::FUEL_HAS_NO_VALUE));
    }

    #[test]
    fn net_flows_apply_productivity_to_products_only() {
        let db = sample_database();
        let mut model = ProductionModel::new();
        let row = model.add_recipe(&db, model.root(), gear_recipe()).unwrap();
        model.set_entity(&db, row, Some(assembler())).unwrap();
        model
            .set_modules(&db, row, Some(ModuleTemplate::single(productivity_module())))
            .unwrap();
        let params = RecipeParameters::calculate(&db, model.row(row).unwrap(), None);
        model.rows[row].parameters = params;

        let flows = net_flows(&db, model.row(row).unwrap());
        assert!(close(flows[&gear()], 1.16));
        assert!(close(flows[&iron_plate()], -2.0));
    }
}

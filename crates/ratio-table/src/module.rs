//! Module effects: how modules and beacons modify a row's speed,
//! productivity and energy use.
//!
//! A row either carries an explicit [`ModuleTemplate`] or leaves module
//! selection to a [`ModuleFiller`] policy. Templates list "internal" modules
//! (inserted in the building) and "beacon" modules (inserted in beacons
//! around it). An entry with a fixed count of zero is a floodfill entry: it
//! takes whatever slots remain once the entries before it are placed.

use ratio_core::database::{
    AllowedEffects, BeaconDef, Database, EntityDef, ModuleSpec, RecipeDef,
};
use ratio_core::id::{BeaconId, ModuleId};
use serde::{Deserialize, Serialize};

use crate::model::RecipeRow;

/// Lower bound of both derived multipliers.
const MIN_MULTIPLIER: f64 = 0.2;

/// How far consumption can drop before the energy multiplier hits its floor.
const CONSUMPTION_HEADROOM: f64 = 0.8;

// ---------------------------------------------------------------------------
// ModuleEffects
// ---------------------------------------------------------------------------

/// Accumulated module effects on one building.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleEffects {
    pub speed: f64,
    pub productivity: f64,
    pub consumption: f64,
}

impl ModuleEffects {
    /// Crafting speed multiplier, never below 0.2.
    pub fn speed_mod(&self) -> f64 {
        (1.0 + self.speed).max(MIN_MULTIPLIER)
    }

    /// Energy usage multiplier, never below 0.2.
    pub fn energy_usage_mod(&self) -> f64 {
        (1.0 + self.consumption).max(MIN_MULTIPLIER)
    }

    /// Add `count` copies of `module`, honouring the receiving entity's
    /// effect mask. Negative productivity is never applied.
    pub fn add_modules(&mut self, module: &ModuleSpec, count: f64, allowed: AllowedEffects) {
        if allowed.contains(AllowedEffects::SPEED) {
            self.speed += module.speed * count;
        }
        if allowed.contains(AllowedEffects::PRODUCTIVITY) && module.productivity > 0.0 {
            self.productivity += module.productivity * count;
        }
        if allowed.contains(AllowedEffects::CONSUMPTION) {
            self.consumption += module.consumption * count;
        }
    }

    /// How many copies of `module` are worth inserting given the effects
    /// accumulated so far.
    ///
    /// Modules that add productivity or speed, or cut pollution, fill every
    /// slot. Modules that only cut consumption stop once the energy
    /// multiplier would hit its floor. Anything else is not worth a slot.
    pub fn module_soft_limit(&self, module: &ModuleSpec, hard_limit: u32) -> u32 {
        if module.productivity > 0.0 || module.speed > 0.0 || module.pollution < 0.0 {
            return hard_limit;
        }
        if module.consumption >= 0.0 {
            return 0;
        }
        let wanted = (-(self.consumption + CONSUMPTION_HEADROOM) / module.consumption).ceil();
        wanted.clamp(0.0, hard_limit as f64) as u32
    }
}

// ---------------------------------------------------------------------------
// Used modules
// ---------------------------------------------------------------------------

/// One module kind placed on a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsedModule {
    pub module: ModuleId,
    pub count: u32,
    /// Placed in beacons rather than the building itself.
    pub in_beacon: bool,
}

/// The modules and beacons a row ended up with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsedModules {
    pub modules: Vec<UsedModule>,
    pub beacon: Option<BeaconId>,
    pub beacon_count: u32,
}

// ---------------------------------------------------------------------------
// Filler policy
// ---------------------------------------------------------------------------

/// The recipe and building a module decision is made for.
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub db: &'a Database,
    pub recipe: &'a RecipeDef,
    pub entity: &'a EntityDef,
}

impl ModuleContext<'_> {
    /// Whether both the recipe and the building take `module`.
    pub fn accepts(&self, module: ModuleId) -> bool {
        match self.db.module(module) {
            Some(def) => {
                self.recipe.can_accept_module(module) && self.entity.can_accept_module(&def.spec)
            }
            None => false,
        }
    }
}

/// Automatic module selection for rows without a complete template.
pub trait ModuleFiller {
    /// Choose internal modules for a row with no template.
    fn fill_modules(
        &self,
        ctx: &ModuleContext<'_>,
        effects: &mut ModuleEffects,
        used: &mut UsedModules,
    );

    /// Choose beacons for a row whose template has no beacon.
    fn fill_beacons(
        &self,
        ctx: &ModuleContext<'_>,
        effects: &mut ModuleEffects,
        used: &mut UsedModules,
    );
}

/// The stock filler: one module kind up to its soft limit, plus an optional
/// beacon layout applied to every building.
///
/// Tables carry one of these; a row uses the one on the nearest table
/// between its link root and the sheet root.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleFillerParameters {
    pub fill_module: Option<ModuleId>,
    pub beacon: Option<BeaconId>,
    pub beacon_module: Option<ModuleId>,
    pub beacons_per_building: u32,
}

impl ModuleFillerParameters {
    /// Check that every referenced module and beacon exists.
    pub fn validate(&self, db: &Database) -> Result<(), ModuleError> {
        for module in [self.fill_module, self.beacon_module].into_iter().flatten() {
            if db.module(module).is_none() {
                return Err(ModuleError::UnknownModule(module));
            }
        }
        if let Some(beacon) = self.beacon {
            if db.beacon(beacon).is_none() {
                return Err(ModuleError::UnknownBeacon(beacon));
            }
        }
        Ok(())
    }
}

impl ModuleFiller for ModuleFillerParameters {
    fn fill_modules(
        &self,
        ctx: &ModuleContext<'_>,
        effects: &mut ModuleEffects,
        used: &mut UsedModules,
    ) {
        let Some(module) = self.fill_module else {
            return;
        };
        if ctx.entity.module_slots == 0 || !ctx.accepts(module) {
            return;
        }
        let Some(def) = ctx.db.module(module) else {
            return;
        };
        let count = effects.module_soft_limit(&def.spec, ctx.entity.module_slots);
        if count == 0 {
            return;
        }
        effects.add_modules(&def.spec, count as f64, ctx.entity.allowed_effects);
        used.modules.push(UsedModule {
            module,
            count,
            in_beacon: false,
        });
    }

    fn fill_beacons(
        &self,
        ctx: &ModuleContext<'_>,
        effects: &mut ModuleEffects,
        used: &mut UsedModules,
    ) {
        let (Some(beacon), Some(module)) = (self.beacon, self.beacon_module) else {
            return;
        };
        if self.beacons_per_building == 0 || !ctx.accepts(module) {
            return;
        }
        let (Some(beacon_def), Some(def)) = (ctx.db.beacon(beacon), ctx.db.module(module)) else {
            return;
        };
        let count = beacon_def
            .module_slots
            .saturating_mul(self.beacons_per_building);
        if count == 0 {
            return;
        }
        effects.add_modules(&def.spec, beacon_def.efficiency * count as f64, AllowedEffects::ALL);
        used.modules.push(UsedModule {
            module,
            count,
            in_beacon: true,
        });
        used.beacon = Some(beacon);
        used.beacon_count = self.beacons_per_building;
    }
}

// ---------------------------------------------------------------------------
// ModuleTemplate
// ---------------------------------------------------------------------------

/// One line of a template. A `fixed_count` of zero is a floodfill entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module: ModuleId,
    pub fixed_count: u32,
}

impl ModuleEntry {
    pub fn fixed(module: ModuleId, count: u32) -> Self {
        Self {
            module,
            fixed_count: count,
        }
    }

    pub fn floodfill(module: ModuleId) -> Self {
        Self {
            module,
            fixed_count: 0,
        }
    }

    pub fn is_floodfill(&self) -> bool {
        self.fixed_count == 0
    }
}

/// An explicit module layout for a row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleTemplate {
    pub beacon: Option<BeaconId>,
    pub list: Vec<ModuleEntry>,
    pub beacon_list: Vec<ModuleEntry>,
}

impl ModuleTemplate {
    /// A template holding a single floodfill module.
    pub fn single(module: ModuleId) -> Self {
        Self {
            list: vec![ModuleEntry::floodfill(module)],
            ..Self::default()
        }
    }

    /// Check that every referenced module and beacon exists.
    pub fn validate(&self, db: &Database) -> Result<(), ModuleError> {
        for entry in self.list.iter().chain(self.beacon_list.iter()) {
            if db.module(entry.module).is_none() {
                return Err(ModuleError::UnknownModule(entry.module));
            }
        }
        if let Some(beacon) = self.beacon {
            if db.beacon(beacon).is_none() {
                return Err(ModuleError::UnknownBeacon(beacon));
            }
        }
        Ok(())
    }

    /// Whether this template can be applied to `row` as-is.
    ///
    /// Fixed entries must all fit the recipe and the building, and their
    /// counts must fit the slots. Floodfill entries only need one of them
    /// to fit.
    pub fn is_compatible_with(&self, db: &Database, row: &RecipeRow) -> bool {
        let Some(entity) = row.entity.and_then(|e| db.entity(e)) else {
            return false;
        };
        let Some(recipe) = db.recipe(row.recipe) else {
            return false;
        };
        let ctx = ModuleContext { db, recipe, entity };

        let mut has_floodfill = false;
        let mut has_compatible_floodfill = false;
        let mut total = 0u32;
        for entry in &self.list {
            let compatible = ctx.accepts(entry.module);
            if entry.is_floodfill() {
                has_floodfill = true;
                has_compatible_floodfill |= compatible;
            } else {
                if !compatible {
                    return false;
                }
                total = total.saturating_add(entry.fixed_count);
            }
        }
        (!has_floodfill || has_compatible_floodfill) && total <= entity.module_slots
    }

    /// Apply this template to a building, accumulating effects into
    /// `effects` and recording placements in `used`.
    ///
    /// Without a beacon of its own the template defers beacons to `filler`.
    pub fn modules_info(
        &self,
        ctx: &ModuleContext<'_>,
        effects: &mut ModuleEffects,
        used: &mut UsedModules,
        filler: Option<&dyn ModuleFiller>,
    ) {
        let mut remaining = ctx.entity.module_slots;
        for entry in &self.list {
            if !ctx.accepts(entry.module) {
                continue;
            }
            if remaining == 0 {
                break;
            }
            let Some(def) = ctx.db.module(entry.module) else {
                continue;
            };
            let count = if entry.is_floodfill() {
                remaining
            } else {
                entry.fixed_count.min(remaining)
            };
            remaining -= count;
            effects.add_modules(&def.spec, count as f64, ctx.entity.allowed_effects);
            used.modules.push(UsedModule {
                module: entry.module,
                count,
                in_beacon: false,
            });
        }

        match self.beacon.and_then(|b| ctx.db.beacon(b).map(|def| (b, def))) {
            Some((beacon, def)) => {
                let mut beaconed = 0u32;
                for entry in &self.beacon_list {
                    let Some(module) = ctx.db.module(entry.module) else {
                        continue;
                    };
                    beaconed = beaconed.saturating_add(entry.fixed_count);
                    // Beacon effects reach the building regardless of its mask.
                    effects.add_modules(
                        &module.spec,
                        def.efficiency * entry.fixed_count as f64,
                        AllowedEffects::ALL,
                    );
                    used.modules.push(UsedModule {
                        module: entry.module,
                        count: entry.fixed_count,
                        in_beacon: true,
                    });
                }
                if beaconed > 0 {
                    used.beacon = Some(beacon);
                    used.beacon_count = beacons_for(def, beaconed);
                }
            }
            None => {
                if let Some(filler) = filler {
                    filler.fill_beacons(ctx, effects, used);
                }
            }
        }
    }

    /// Beacons needed to hold every beacon module of this template. An empty
    /// beacon list needs none.
    pub fn calc_beacon_count(&self, db: &Database) -> Result<u32, ModuleError> {
        let beacon = self.beacon.ok_or(ModuleError::NoBeacon)?;
        let def = db.beacon(beacon).ok_or(ModuleError::UnknownBeacon(beacon))?;
        if def.module_slots == 0 {
            return Err(ModuleError::BeaconWithoutSlots(beacon));
        }
        let total = self
            .beacon_list
            .iter()
            .fold(0u32, |acc, e| acc.saturating_add(e.fixed_count));
        Ok(beacons_for(def, total))
    }
}

fn beacons_for(def: &BeaconDef, modules: u32) -> u32 {
    if def.module_slots == 0 {
        0
    } else {
        modules.div_ceil(def.module_slots)
    }
}

/// Resolve the modules of one row: the row's template if it has one, with
/// the filler covering whatever the template leaves open. Without either the
/// building runs bare.
pub fn resolve_row_modules(
    template: Option<&ModuleTemplate>,
    ctx: &ModuleContext<'_>,
    filler: Option<&dyn ModuleFiller>,
) -> (ModuleEffects, UsedModules) {
    let mut effects = ModuleEffects::default();
    let mut used = UsedModules::default();
    match (template, filler) {
        (Some(template), _) => template.modules_info(ctx, &mut effects, &mut used, filler),
        (None, None) => {}
        (None, Some(filler)) => {
            // Beacons first: their consumption changes the soft limit.
            filler.fill_beacons(ctx, &mut effects, &mut used);
            filler.fill_modules(ctx, &mut effects, &mut used);
        }
    }
    (effects, used)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("template has no beacon")]
    NoBeacon,
    #[error("unknown module: {0:?}")]
    UnknownModule(ModuleId),
    #[error("unknown beacon: {0:?}")]
    UnknownBeacon(BeaconId),
    #[error("beacon {0:?} has no module slots")]
    BeaconWithoutSlots(BeaconId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductionModel, RowId};
    use ratio_core::id::{EntityId, RecipeId};
    use ratio_core::test_utils::*;

    fn spec(db: &Database, id: ModuleId) -> ModuleSpec {
        db.module(id).unwrap().spec
    }

    fn ctx<'a>(db: &'a Database, recipe: RecipeId, entity: EntityId) -> ModuleContext<'a> {
        ModuleContext {
            db,
            recipe: db.recipe(recipe).unwrap(),
            entity: db.entity(entity).unwrap(),
        }
    }

    // -----------------------------------------------------------------------
    // ModuleEffects
    // -----------------------------------------------------------------------

    #[test]
    fn multipliers_are_floored() {
        let effects = ModuleEffects {
            speed: -5.0,
            productivity: 0.0,
            consumption: -0.95,
        };
        assert_eq!(effects.speed_mod(), 0.2);
        assert_eq!(effects.energy_usage_mod(), 0.2);

        let effects = ModuleEffects {
            speed: 0.5,
            productivity: 0.0,
            consumption: 0.3,
        };
        assert!((effects.speed_mod() - 1.5).abs() < 1e-12);
        assert!((effects.energy_usage_mod() - 1.3).abs() < 1e-12);
    }

    #[test]
    fn add_modules_respects_mask_and_negative_productivity() {
        let module = ModuleSpec {
            speed: 0.1,
            productivity: -0.2,
            consumption: 0.3,
            pollution: 0.0,
        };
        let mut effects = ModuleEffects::default();
        effects.add_modules(&module, 2.0, AllowedEffects::ALL);
        assert!((effects.speed - 0.2).abs() < 1e-12);
        assert_eq!(effects.productivity, 0.0);
        assert!((effects.consumption - 0.6).abs() < 1e-12);

        let mut masked = ModuleEffects::default();
        masked.add_modules(&module, 2.0, AllowedEffects::CONSUMPTION);
        assert_eq!(masked.speed, 0.0);
        assert!((masked.consumption - 0.6).abs() < 1e-12);
    }

    #[test]
    fn productivity_requires_mask_bit() {
        let module = ModuleSpec {
            productivity: 0.1,
            ..Default::default()
        };
        let mut effects = ModuleEffects::default();
        effects.add_modules(&module, 4.0, AllowedEffects::SPEED | AllowedEffects::CONSUMPTION);
        assert_eq!(effects.productivity, 0.0);
    }

    // -----------------------------------------------------------------------
    // Soft limit
    // -----------------------------------------------------------------------

    #[test]
    fn soft_limit_fills_beneficial_modules() {
        let effects = ModuleEffects::default();
        let speed = ModuleSpec {
            speed: 0.2,
            consumption: 0.5,
            ..Default::default()
        };
        assert_eq!(effects.module_soft_limit(&speed, 4), 4);

        let clean = ModuleSpec {
            pollution: -0.1,
            consumption: 0.2,
            ..Default::default()
        };
        assert_eq!(effects.module_soft_limit(&clean, 3), 3);
    }

    #[test]
    fn soft_limit_stops_efficiency_at_floor() {
        let efficiency = ModuleSpec {
            consumption: -0.3,
            ..Default::default()
        };
        // 0.8 / 0.3 = 2.67 -> 3
        assert_eq!(ModuleEffects::default().module_soft_limit(&efficiency, 4), 3);
        assert_eq!(ModuleEffects::default().module_soft_limit(&efficiency, 2), 2);

        // Consumption already pushed up by other modules needs more.
        let loaded = ModuleEffects {
            consumption: 0.7,
            ..Default::default()
        };
        assert_eq!(loaded.module_soft_limit(&efficiency, 10), 5);

        let saturated = ModuleEffects {
            consumption: -0.9,
            ..Default::default()
        };
        assert_eq!(saturated.module_soft_limit(&efficiency, 4), 0);
    }

    #[test]
    fn soft_limit_rejects_useless_modules() {
        let useless = ModuleSpec {
            consumption: 0.4,
            pollution: 0.1,
            ..Default::default()
        };
        assert_eq!(ModuleEffects::default().module_soft_limit(&useless, 4), 0);
        assert_eq!(ModuleEffects::default().module_soft_limit(&ModuleSpec::default(), 4), 0);
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    fn row_with_entity(db: &Database, entity: Option<EntityId>) -> (ProductionModel, RowId) {
        let mut model = ProductionModel::new();
        let root = model.root();
        let row = model.add_recipe(db, root, gear_recipe()).unwrap();
        model.set_entity(db, row, entity).unwrap();
        (model, row)
    }

    #[test]
    fn compatibility_requires_entity() {
        let db = sample_database();
        let (model, row) = row_with_entity(&db, None);
        let template = ModuleTemplate::single(speed_module());
        assert!(!template.is_compatible_with(&db, model.row(row).unwrap()));
    }

    #[test]
    fn compatibility_checks_slot_count() {
        let db = sample_database();
        let (model, row) = row_with_entity(&db, Some(assembler()));
        let row = model.row(row).unwrap();

        let at_limit = ModuleTemplate {
            list: vec![
                ModuleEntry::fixed(speed_module(), 2),
                ModuleEntry::fixed(productivity_module(), 2),
            ],
            ..Default::default()
        };
        assert!(at_limit.is_compatible_with(&db, row));

        let over = ModuleTemplate {
            list: vec![ModuleEntry::fixed(speed_module(), 5)],
            ..Default::default()
        };
        assert!(!over.is_compatible_with(&db, row));
    }

    #[test]
    fn compatibility_rejects_masked_fixed_entry() {
        let mut b = sample_builder();
        b.register_entity(EntityDef {
            name: "speed_only".to_string(),
            crafting_speed: 1.0,
            module_slots: 2,
            allowed_effects: AllowedEffects::SPEED,
            energy_usage: 1.0,
        });
        let db = b.build().unwrap();
        let speed_only = db.entity_id("speed_only").unwrap();
        let (model, row) = row_with_entity(&db, Some(speed_only));
        let row = model.row(row).unwrap();

        // The speed module also raises consumption, which the mask forbids.
        let fixed = ModuleTemplate {
            list: vec![ModuleEntry::fixed(speed_module(), 1)],
            ..Default::default()
        };
        assert!(!fixed.is_compatible_with(&db, row));

        // A floodfill list needs only one usable candidate.
        let floodfill = ModuleTemplate {
            list: vec![ModuleEntry::floodfill(speed_module())],
            ..Default::default()
        };
        assert!(!floodfill.is_compatible_with(&db, row));
    }

    #[test]
    fn floodfill_takes_remaining_slots() {
        let db = sample_database();
        let template = ModuleTemplate {
            list: vec![
                ModuleEntry::fixed(productivity_module(), 1),
                ModuleEntry::floodfill(speed_module()),
                ModuleEntry::fixed(efficiency_module(), 2),
            ],
            ..Default::default()
        };
        let ctx = ctx(&db, gear_recipe(), assembler());
        let mut effects = ModuleEffects::default();
        let mut used = UsedModules::default();
        template.modules_info(&ctx, &mut effects, &mut used, None);

        assert_eq!(used.modules.len(), 2);
        assert_eq!(used.modules[0].count, 1);
        assert_eq!(used.modules[1].module, speed_module());
        assert_eq!(used.modules[1].count, 3);

        let prod = spec(&db, productivity_module());
        let speed = spec(&db, speed_module());
        assert!((effects.productivity - prod.productivity).abs() < 1e-12);
        assert!((effects.speed - (prod.speed + 3.0 * speed.speed)).abs() < 1e-12);
    }

    #[test]
    fn template_beacon_scales_by_efficiency() {
        let db = sample_database();
        let template = ModuleTemplate {
            beacon: Some(beacon()),
            list: vec![],
            beacon_list: vec![ModuleEntry::fixed(speed_module(), 3)],
        };
        let ctx = ctx(&db, gear_recipe(), assembler());
        let mut effects = ModuleEffects::default();
        let mut used = UsedModules::default();
        template.modules_info(&ctx, &mut effects, &mut used, None);

        // 3 modules * 0.5 efficiency * 0.2 speed
        assert!((effects.speed - 0.3).abs() < 1e-12);
        assert_eq!(used.beacon, Some(beacon()));
        assert_eq!(used.beacon_count, 2);
        assert_eq!(template.calc_beacon_count(&db).unwrap(), 2);
    }

    #[test]
    fn beacon_effects_ignore_entity_mask() {
        let mut b = sample_builder();
        b.register_entity(EntityDef {
            name: "no_speed".to_string(),
            crafting_speed: 1.0,
            module_slots: 0,
            allowed_effects: AllowedEffects::CONSUMPTION,
            energy_usage: 1.0,
        });
        let db = b.build().unwrap();
        let entity = db.entity_id("no_speed").unwrap();
        let template = ModuleTemplate {
            beacon: Some(beacon()),
            list: vec![],
            beacon_list: vec![ModuleEntry::fixed(speed_module(), 2)],
        };
        let ctx = ctx(&db, gear_recipe(), entity);
        let mut effects = ModuleEffects::default();
        let mut used = UsedModules::default();
        template.modules_info(&ctx, &mut effects, &mut used, None);
        assert!((effects.speed - 0.2).abs() < 1e-12);
    }

    #[test]
    fn calc_beacon_count_without_beacon_fails() {
        let db = sample_database();
        let template = ModuleTemplate::single(speed_module());
        assert!(matches!(template.calc_beacon_count(&db), Err(ModuleError::NoBeacon)));
    }

    #[test]
    fn empty_beacon_list_needs_no_beacons() {
        let db = sample_database();
        let template = ModuleTemplate {
            beacon: Some(beacon()),
            ..Default::default()
        };
        assert_eq!(template.calc_beacon_count(&db).unwrap(), 0);

        let ctx = ctx(&db, gear_recipe(), assembler());
        let mut effects = ModuleEffects::default();
        let mut used = UsedModules::default();
        template.modules_info(&ctx, &mut effects, &mut used, None);
        assert_eq!(used.beacon, None);
        assert_eq!(used.beacon_count, 0);
    }

    #[test]
    fn huge_beacon_counts_saturate() {
        let db = sample_database();
        let template = ModuleTemplate {
            beacon: Some(beacon()),
            list: vec![],
            beacon_list: vec![
                ModuleEntry::fixed(speed_module(), u32::MAX),
                ModuleEntry::fixed(speed_module(), 1),
            ],
        };
        // Two slots per beacon.
        assert_eq!(template.calc_beacon_count(&db).unwrap(), u32::MAX.div_ceil(2));

        let ctx = ctx(&db, gear_recipe(), assembler());
        let mut effects = ModuleEffects::default();
        let mut used = UsedModules::default();
        template.modules_info(&ctx, &mut effects, &mut used, None);
        assert_eq!(used.beacon_count, u32::MAX.div_ceil(2));
    }

    #[test]
    fn filler_validate_rejects_unknown_references() {
        let db = sample_database();
        let good = ModuleFillerParameters {
            fill_module: Some(speed_module()),
            beacon: Some(beacon()),
            beacon_module: Some(speed_module()),
            beacons_per_building: 2,
        };
        assert!(good.validate(&db).is_ok());

        let bad_module = ModuleFillerParameters {
            beacon_module: Some(ModuleId(99)),
            ..good.clone()
        };
        assert!(matches!(bad_module.validate(&db), Err(ModuleError::UnknownModule(_))));
        let bad_beacon = ModuleFillerParameters {
            beacon: Some(BeaconId(9)),
            ..good
        };
        assert!(matches!(bad_beacon.validate(&db), Err(ModuleError::UnknownBeacon(_))));
    }

    #[test]
    fn no_template_and_no_filler_runs_bare() {
        let db = sample_database();
        let ctx = ctx(&db, gear_recipe(), assembler());
        let (effects, used) = resolve_row_modules(None, &ctx, None);
        assert_eq!(effects, ModuleEffects::default());
        assert!(used.modules.is_empty());
    }

    #[test]
    fn validate_rejects_unknown_references() {
        let db = sample_database();
        let bad_module = ModuleTemplate::single(ModuleId(99));
        assert!(matches!(bad_module.validate(&db), Err(ModuleError::UnknownModule(_))));
        let bad_beacon = ModuleTemplate {
            beacon: Some(BeaconId(7)),
            ..Default::default()
        };
        assert!(matches!(bad_beacon.validate(&db), Err(ModuleError::UnknownBeacon(_))));
    }

    // -----------------------------------------------------------------------
    // Filler
    // -----------------------------------------------------------------------

    #[test]
    fn filler_respects_soft_limit() {
        let db = sample_database();
        let filler = ModuleFillerParameters {
            fill_module: Some(efficiency_module()),
            ..Default::default()
        };
        let ctx = ctx(&db, gear_recipe(), assembler());
        let (effects, used) = resolve_row_modules(None, &ctx, Some(&filler));
        assert_eq!(used.modules[0].count, 3);
        assert!((effects.consumption + 0.9).abs() < 1e-12);
        assert_eq!(effects.energy_usage_mod(), 0.2);
    }

    #[test]
    fn template_without_beacon_defers_to_filler() {
        let db = sample_database();
        let filler = ModuleFillerParameters {
            fill_module: Some(efficiency_module()),
            beacon: Some(beacon()),
            beacon_module: Some(speed_module()),
            beacons_per_building: 4,
        };
        let template = ModuleTemplate::single(productivity_module());
        let ctx = ctx(&db, gear_recipe(), assembler());
        let (effects, used) = resolve_row_modules(Some(&template), &ctx, Some(&filler));

        // Template modules, not the filler's, fill the building.
        assert_eq!(used.modules[0].module, productivity_module());
        assert_eq!(used.modules[0].count, 4);
        // Beacons come from the filler: 4 beacons * 2 slots.
        assert_eq!(used.beacon_count, 4);
        assert_eq!(used.modules[1].count, 8);
        let expected_speed = 4.0 * -0.05 + 8.0 * 0.5 * 0.2;
        assert!((effects.speed - expected_speed).abs() < 1e-12);
    }

    #[test]
    fn error_display_messages() {
        let msg = format!("{}", ModuleError::NoBeacon);
        assert!(msg.contains("no beacon"), "got: {msg}");
        let msg = format!("{}", ModuleError::UnknownModule(ModuleId(3)));
        assert!(msg.contains("unknown module"), "got: {msg}");
    }
}

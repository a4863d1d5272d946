//! Serde data file structs for the reference database.
//!
//! Every definition refers to others by name. Names are resolved to ids by
//! [`load_database`](crate::loader::load_database).

use ratio_core::database::{AllowedEffects, GoodsKind};
use serde::Deserialize;

// ===========================================================================
// Goods
// ===========================================================================

/// A goods definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct GoodsData {
    pub name: String,
    #[serde(default)]
    pub kind: GoodsKindData,
    /// Joules released per unit burned.
    #[serde(default)]
    pub fuel_value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodsKindData {
    #[default]
    Item,
    Fluid,
}

impl From<GoodsKindData> for GoodsKind {
    fn from(kind: GoodsKindData) -> Self {
        match kind {
            GoodsKindData::Item => GoodsKind::Item,
            GoodsKindData::Fluid => GoodsKind::Fluid,
        }
    }
}

/// A goods amount, either `("iron_plate", 2.0)` or
/// `{ goods: "iron_plate", amount: 2.0 }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountData {
    Short(String, f64),
    Full { goods: String, amount: f64 },
}

impl AmountData {
    pub fn name(&self) -> &str {
        match self {
            AmountData::Short(name, _) => name,
            AmountData::Full { goods, .. } => goods,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            AmountData::Short(_, amount) => *amount,
            AmountData::Full { amount, .. } => *amount,
        }
    }
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<AmountData>,
    #[serde(default)]
    pub products: Vec<AmountData>,
    pub time: f64,
    /// Module names the recipe accepts. Omitted means every module.
    #[serde(default)]
    pub allowed_modules: Option<Vec<String>>,
}

// ===========================================================================
// Entities, modules, beacons
// ===========================================================================

/// A module effect kind, as listed in an entity's `allowed_effects`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectData {
    Speed,
    Productivity,
    Consumption,
    Pollution,
}

impl EffectData {
    fn mask(self) -> AllowedEffects {
        match self {
            EffectData::Speed => AllowedEffects::SPEED,
            EffectData::Productivity => AllowedEffects::PRODUCTIVITY,
            EffectData::Consumption => AllowedEffects::CONSUMPTION,
            EffectData::Pollution => AllowedEffects::POLLUTION,
        }
    }
}

/// Fold an effect list into a mask. `None` allows every effect.
pub fn effects_mask(list: Option<&[EffectData]>) -> AllowedEffects {
    match list {
        None => AllowedEffects::ALL,
        Some(list) => list
            .iter()
            .fold(AllowedEffects::NONE, |mask, effect| mask | effect.mask()),
    }
}

/// A crafting entity definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityData {
    pub name: String,
    pub crafting_speed: f64,
    #[serde(default)]
    pub module_slots: u32,
    #[serde(default)]
    pub allowed_effects: Option<Vec<EffectData>>,
    /// Watts drawn while working.
    #[serde(default)]
    pub energy_usage: f64,
}

/// A module definition in a data file. Omitted effects are zero.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleData {
    pub name: String,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub productivity: f64,
    #[serde(default)]
    pub consumption: f64,
    #[serde(default)]
    pub pollution: f64,
}

/// A beacon definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconData {
    pub name: String,
    pub module_slots: u32,
    pub efficiency: f64,
}

// ===========================================================================
// Technologies
// ===========================================================================

/// A technology definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct TechnologyData {
    pub name: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<AmountData>,
    pub count: f64,
}

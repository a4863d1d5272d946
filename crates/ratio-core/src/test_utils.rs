//! Shared test fixtures for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`. The sample
//! database is registered in a fixed order so the id helpers below stay
//! stable.

use crate::database::*;
use crate::id::*;

// ===========================================================================
// Goods
// ===========================================================================

pub fn iron_ore() -> GoodsId {
    GoodsId(0)
}
pub fn iron_plate() -> GoodsId {
    GoodsId(1)
}
pub fn copper_ore() -> GoodsId {
    GoodsId(2)
}
pub fn copper_plate() -> GoodsId {
    GoodsId(3)
}
pub fn gear() -> GoodsId {
    GoodsId(4)
}
pub fn copper_cable() -> GoodsId {
    GoodsId(5)
}
pub fn circuit() -> GoodsId {
    GoodsId(6)
}
pub fn coal() -> GoodsId {
    GoodsId(7)
}
pub fn red_science() -> GoodsId {
    GoodsId(8)
}
pub fn green_science() -> GoodsId {
    GoodsId(9)
}

// ===========================================================================
// Recipes
// ===========================================================================

pub fn smelt_iron() -> RecipeId {
    RecipeId(0)
}
pub fn smelt_copper() -> RecipeId {
    RecipeId(1)
}
pub fn gear_recipe() -> RecipeId {
    RecipeId(2)
}
pub fn cable_recipe() -> RecipeId {
    RecipeId(3)
}
pub fn circuit_recipe() -> RecipeId {
    RecipeId(4)
}
pub fn red_science_recipe() -> RecipeId {
    RecipeId(5)
}
pub fn green_science_recipe() -> RecipeId {
    RecipeId(6)
}

// ===========================================================================
// Entities, modules, beacons
// ===========================================================================

pub fn assembler() -> EntityId {
    EntityId(0)
}
pub fn electric_furnace() -> EntityId {
    EntityId(1)
}
pub fn stone_furnace() -> EntityId {
    EntityId(2)
}

pub fn speed_module() -> ModuleId {
    ModuleId(0)
}
pub fn productivity_module() -> ModuleId {
    ModuleId(1)
}
pub fn efficiency_module() -> ModuleId {
    ModuleId(2)
}

pub fn beacon() -> BeaconId {
    BeaconId(0)
}

// ===========================================================================
// Technologies
// ===========================================================================

pub fn automation() -> TechId {
    TechId(0)
}
pub fn logistics() -> TechId {
    TechId(1)
}
pub fn electronics() -> TechId {
    TechId(2)
}
pub fn logistic_science() -> TechId {
    TechId(3)
}
pub fn advanced_electronics() -> TechId {
    TechId(4)
}

// ===========================================================================
// Builders
// ===========================================================================

fn amounts(entries: &[(GoodsId, f64)]) -> Vec<GoodsAmount> {
    entries
        .iter()
        .map(|&(goods, amount)| GoodsAmount::new(goods, amount))
        .collect()
}

/// A builder pre-populated with the sample content. Tests that need extra
/// definitions register them before calling `build`.
pub fn sample_builder() -> DatabaseBuilder {
    let mut b = DatabaseBuilder::new();

    let ore = b.register_goods("iron_ore", GoodsKind::Item);
    let plate = b.register_goods("iron_plate", GoodsKind::Item);
    let c_ore = b.register_goods("copper_ore", GoodsKind::Item);
    let c_plate = b.register_goods("copper_plate", GoodsKind::Item);
    let gear = b.register_goods("iron_gear_wheel", GoodsKind::Item);
    let cable = b.register_goods("copper_cable", GoodsKind::Item);
    let circuit = b.register_goods("electronic_circuit", GoodsKind::Item);
    b.register_fuel("coal", GoodsKind::Item, 4_000_000.0);
    let red = b.register_goods("automation_science_pack", GoodsKind::Item);
    let green = b.register_goods("logistic_science_pack", GoodsKind::Item);

    b.register_recipe("smelt_iron", amounts(&[(ore, 1.0)]), amounts(&[(plate, 1.0)]), 3.2);
    b.register_recipe("smelt_copper", amounts(&[(c_ore, 1.0)]), amounts(&[(c_plate, 1.0)]), 3.2);
    b.register_recipe("iron_gear_wheel", amounts(&[(plate, 2.0)]), amounts(&[(gear, 1.0)]), 0.5);
    b.register_recipe("copper_cable", amounts(&[(c_plate, 1.0)]), amounts(&[(cable, 2.0)]), 0.5);
    b.register_recipe(
        "electronic_circuit",
        amounts(&[(plate, 1.0), (cable, 3.0)]),
        amounts(&[(circuit, 1.0)]),
        0.5,
    );
    b.register_recipe(
        "automation_science_pack",
        amounts(&[(c_plate, 1.0), (gear, 1.0)]),
        amounts(&[(red, 1.0)]),
        5.0,
    );
    b.register_recipe(
        "logistic_science_pack",
        amounts(&[(gear, 1.0), (circuit, 1.0)]),
        amounts(&[(green, 1.0)]),
        6.0,
    );

    b.register_entity(EntityDef {
        name: "assembling_machine".to_string(),
        crafting_speed: 0.75,
        module_slots: 4,
        allowed_effects: AllowedEffects::ALL,
        energy_usage: 150_000.0,
    });
    b.register_entity(EntityDef {
        name: "electric_furnace".to_string(),
        crafting_speed: 2.0,
        module_slots: 2,
        allowed_effects: AllowedEffects::ALL,
        energy_usage: 180_000.0,
    });
    b.register_entity(EntityDef {
        name: "stone_furnace".to_string(),
        crafting_speed: 1.0,
        module_slots: 0,
        allowed_effects: AllowedEffects::ALL,
        energy_usage: 90_000.0,
    });

    b.register_module(
        "speed_module",
        ModuleSpec {
            speed: 0.2,
            consumption: 0.5,
            ..Default::default()
        },
    );
    b.register_module(
        "productivity_module",
        ModuleSpec {
            speed: -0.05,
            productivity: 0.04,
            consumption: 0.4,
            pollution: 0.05,
        },
    );
    b.register_module(
        "efficiency_module",
        ModuleSpec {
            consumption: -0.3,
            ..Default::default()
        },
    );

    b.register_beacon("beacon", 2, 0.5);

    let automation = b.register_technology(TechnologyDef {
        name: "automation".to_string(),
        prerequisites: vec![],
        ingredients: amounts(&[(red, 1.0)]),
        count: 10.0,
    });
    let logistics = b.register_technology(TechnologyDef {
        name: "logistics".to_string(),
        prerequisites: vec![],
        ingredients: amounts(&[(red, 1.0)]),
        count: 20.0,
    });
    let electronics = b.register_technology(TechnologyDef {
        name: "electronics".to_string(),
        prerequisites: vec![automation],
        ingredients: amounts(&[(red, 1.0)]),
        count: 30.0,
    });
    let logistic_science = b.register_technology(TechnologyDef {
        name: "logistic_science_pack".to_string(),
        prerequisites: vec![automation, logistics],
        ingredients: amounts(&[(red, 1.0)]),
        count: 75.0,
    });
    b.register_technology(TechnologyDef {
        name: "advanced_electronics".to_string(),
        prerequisites: vec![electronics, logistic_science],
        ingredients: amounts(&[(red, 1.0), (green, 1.0)]),
        count: 200.0,
    });

    b
}

/// The frozen sample database.
pub fn sample_database() -> Database {
    match sample_builder().build() {
        Ok(db) => db,
        Err(e) => panic!("sample database must build: {e}"),
    }
}

//! Immutable reference database: goods, recipes, entities, modules, beacons
//! and technologies, plus the dependency indices derived from them.
//!
//! The database is assembled through [`DatabaseBuilder`] and frozen by
//! [`DatabaseBuilder::build`], which validates every cross reference. Nothing
//! in the planner ever mutates a [`Database`]; a reload replaces it wholesale.

use crate::id::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::ops::BitOr;

// ---------------------------------------------------------------------------
// Goods
// ---------------------------------------------------------------------------

/// Whether a goods type is a discrete item or a fluid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GoodsKind {
    #[default]
    Item,
    Fluid,
}

/// A goods type definition in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsDef {
    pub name: String,
    pub kind: GoodsKind,
    /// Energy released when one unit is burned, in joules. Zero for goods
    /// that are not fuel.
    pub fuel_value: f64,
}

/// A (goods, amount) pair used for recipe ingredients, products and
/// technology costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoodsAmount {
    pub goods: GoodsId,
    pub amount: f64,
}

impl GoodsAmount {
    pub fn new(goods: GoodsId, amount: f64) -> Self {
        Self { goods, amount }
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// A recipe definition: a fixed conversion of ingredients into products over
/// a nominal time in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub name: String,
    pub ingredients: Vec<GoodsAmount>,
    pub products: Vec<GoodsAmount>,
    pub time: f64,
    /// Modules this recipe accepts. `None` accepts every module.
    pub allowed_modules: Option<Vec<ModuleId>>,
}

impl RecipeDef {
    /// Whether the recipe allows `module` to be inserted in its crafter.
    pub fn can_accept_module(&self, module: ModuleId) -> bool {
        match &self.allowed_modules {
            Some(list) => list.contains(&module),
            None => true,
        }
    }

    /// Whether any ingredient or product of this recipe is `goods`.
    pub fn touches(&self, goods: GoodsId) -> bool {
        self.ingredients
            .iter()
            .chain(self.products.iter())
            .any(|e| e.goods == goods)
    }
}

// ---------------------------------------------------------------------------
// Modules, entities, beacons
// ---------------------------------------------------------------------------

/// Bit mask of module effects an entity permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowedEffects(u8);

impl AllowedEffects {
    pub const NONE: Self = Self(0);
    pub const SPEED: Self = Self(1 << 0);
    pub const PRODUCTIVITY: Self = Self(1 << 1);
    pub const CONSUMPTION: Self = Self(1 << 2);
    pub const POLLUTION: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    /// Whether every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for AllowedEffects {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for AllowedEffects {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The additive effect values of a module.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub speed: f64,
    pub productivity: f64,
    pub consumption: f64,
    pub pollution: f64,
}

/// A module definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    pub spec: ModuleSpec,
}

/// A processing entity (assembler, furnace, chemical plant...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub crafting_speed: f64,
    pub module_slots: u32,
    pub allowed_effects: AllowedEffects,
    /// Power draw while working, in watts.
    pub energy_usage: f64,
}

impl EntityDef {
    /// An entity accepts a module when every non-zero effect of the module
    /// is permitted by the entity's mask.
    pub fn can_accept_module(&self, spec: &ModuleSpec) -> bool {
        let effects = self.allowed_effects;
        if effects == AllowedEffects::ALL {
            return true;
        }
        let checks = [
            (spec.speed, AllowedEffects::SPEED),
            (spec.productivity, AllowedEffects::PRODUCTIVITY),
            (spec.consumption, AllowedEffects::CONSUMPTION),
            (spec.pollution, AllowedEffects::POLLUTION),
        ];
        checks
            .iter()
            .all(|&(value, flag)| value == 0.0 || effects.contains(flag))
    }
}

/// A beacon: projects the effects of its modules onto nearby entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconDef {
    pub name: String,
    pub module_slots: u32,
    /// Fraction of each module's effect transmitted to receivers.
    pub efficiency: f64,
}

// ---------------------------------------------------------------------------
// Technologies
// ---------------------------------------------------------------------------

/// A technology node. Prerequisites must form a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyDef {
    pub name: String,
    pub prerequisites: Vec<TechId>,
    /// Science packs consumed per research unit.
    pub ingredients: Vec<GoodsAmount>,
    /// Number of research units.
    pub count: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Database`].
///
/// Registration hands out dense ids in registration order. References
/// between definitions are only checked in [`build`](Self::build), so
/// definitions may be registered in any order.
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    goods: Vec<GoodsDef>,
    goods_names: HashMap<String, GoodsId>,
    recipes: Vec<RecipeDef>,
    recipe_names: HashMap<String, RecipeId>,
    entities: Vec<EntityDef>,
    entity_names: HashMap<String, EntityId>,
    modules: Vec<ModuleDef>,
    module_names: HashMap<String, ModuleId>,
    beacons: Vec<BeaconDef>,
    beacon_names: HashMap<String, BeaconId>,
    technologies: Vec<TechnologyDef>,
    technology_names: HashMap<String, TechId>,
    duplicate: Option<String>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_name<I: Copy>(
        names: &mut HashMap<String, I>,
        duplicate: &mut Option<String>,
        name: &str,
        id: I,
    ) {
        if names.insert(name.to_string(), id).is_some() && duplicate.is_none() {
            *duplicate = Some(name.to_string());
        }
    }

    /// Register a goods type that is not a fuel.
    pub fn register_goods(&mut self, name: &str, kind: GoodsKind) -> GoodsId {
        self.register_fuel(name, kind, 0.0)
    }

    /// Register a goods type with a fuel value in joules.
    pub fn register_fuel(&mut self, name: &str, kind: GoodsKind, fuel_value: f64) -> GoodsId {
        let id = GoodsId(self.goods.len() as u32);
        self.goods.push(GoodsDef {
            name: name.to_string(),
            kind,
            fuel_value,
        });
        Self::note_name(&mut self.goods_names, &mut self.duplicate, name, id);
        id
    }

    /// Register a recipe accepting every module.
    pub fn register_recipe(
        &mut self,
        name: &str,
        ingredients: Vec<GoodsAmount>,
        products: Vec<GoodsAmount>,
        time: f64,
    ) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(RecipeDef {
            name: name.to_string(),
            ingredients,
            products,
            time,
            allowed_modules: None,
        });
        Self::note_name(&mut self.recipe_names, &mut self.duplicate, name, id);
        id
    }

    pub fn register_entity(&mut self, def: EntityDef) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        let name = def.name.clone();
        self.entities.push(def);
        Self::note_name(&mut self.entity_names, &mut self.duplicate, &name, id);
        id
    }

    pub fn register_module(&mut self, name: &str, spec: ModuleSpec) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleDef {
            name: name.to_string(),
            spec,
        });
        Self::note_name(&mut self.module_names, &mut self.duplicate, name, id);
        id
    }

    pub fn register_beacon(&mut self, name: &str, module_slots: u32, efficiency: f64) -> BeaconId {
        let id = BeaconId(self.beacons.len() as u32);
        self.beacons.push(BeaconDef {
            name: name.to_string(),
            module_slots,
            efficiency,
        });
        Self::note_name(&mut self.beacon_names, &mut self.duplicate, name, id);
        id
    }

    pub fn register_technology(&mut self, def: TechnologyDef) -> TechId {
        let id = TechId(self.technologies.len() as u32);
        let name = def.name.clone();
        self.technologies.push(def);
        Self::note_name(&mut self.technology_names, &mut self.duplicate, &name, id);
        id
    }

    /// Mutate an existing recipe by name.
    pub fn mutate_recipe<F>(&mut self, name: &str, f: F) -> Result<(), DatabaseError>
    where
        F: FnOnce(&mut RecipeDef),
    {
        let id = self
            .recipe_names
            .get(name)
            .ok_or_else(|| DatabaseError::NotFound(name.to_string()))?;
        f(&mut self.recipes[id.0 as usize]);
        Ok(())
    }

    /// Mutate an existing technology by name.
    pub fn mutate_technology<F>(&mut self, name: &str, f: F) -> Result<(), DatabaseError>
    where
        F: FnOnce(&mut TechnologyDef),
    {
        let id = self
            .technology_names
            .get(name)
            .ok_or_else(|| DatabaseError::NotFound(name.to_string()))?;
        f(&mut self.technologies[id.0 as usize]);
        Ok(())
    }

    pub fn goods_id(&self, name: &str) -> Option<GoodsId> {
        self.goods_names.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_names.get(name).copied()
    }

    pub fn technology_id(&self, name: &str) -> Option<TechId> {
        self.technology_names.get(name).copied()
    }

    /// Validate every reference and freeze the database.
    pub fn build(self) -> Result<Database, DatabaseError> {
        if let Some(name) = self.duplicate {
            return Err(DatabaseError::DuplicateName(name));
        }

        let goods_count = self.goods.len();
        let check_goods = |owner: &str, entry: &GoodsAmount| {
            if entry.goods.0 as usize >= goods_count {
                Err(DatabaseError::InvalidGoodsRef {
                    owner: owner.to_string(),
                    goods: entry.goods,
                })
            } else {
                Ok(())
            }
        };

        for recipe in &self.recipes {
            if !(recipe.time > 0.0) {
                return Err(DatabaseError::InvalidRecipeTime(recipe.name.clone()));
            }
            for entry in recipe.ingredients.iter().chain(recipe.products.iter()) {
                check_goods(&recipe.name, entry)?;
            }
            for module in recipe.allowed_modules.iter().flatten() {
                if module.0 as usize >= self.modules.len() {
                    return Err(DatabaseError::InvalidModuleRef {
                        recipe: recipe.name.clone(),
                        module: *module,
                    });
                }
            }
        }

        for tech in &self.technologies {
            for entry in &tech.ingredients {
                check_goods(&tech.name, entry)?;
            }
            for prereq in &tech.prerequisites {
                if prereq.index() >= self.technologies.len() {
                    return Err(DatabaseError::InvalidPrerequisite {
                        tech: tech.name.clone(),
                        prereq: *prereq,
                    });
                }
            }
        }

        // Dependency indices.
        let mut producers = vec![Vec::new(); goods_count];
        let mut consumers = vec![Vec::new(); goods_count];
        for (index, recipe) in self.recipes.iter().enumerate() {
            let id = RecipeId(index as u32);
            for entry in &recipe.products {
                let list: &mut Vec<RecipeId> = &mut producers[entry.goods.0 as usize];
                if !list.contains(&id) {
                    list.push(id);
                }
            }
            for entry in &recipe.ingredients {
                let list: &mut Vec<RecipeId> = &mut consumers[entry.goods.0 as usize];
                if !list.contains(&id) {
                    list.push(id);
                }
            }
        }

        let mut tech_dependents = vec![Vec::new(); self.technologies.len()];
        for (index, tech) in self.technologies.iter().enumerate() {
            for prereq in &tech.prerequisites {
                let list: &mut Vec<TechId> = &mut tech_dependents[prereq.index()];
                let id = TechId(index as u32);
                if !list.contains(&id) {
                    list.push(id);
                }
            }
        }

        check_technology_cycles(&self.technologies, &tech_dependents)?;

        let mut science_packs: Vec<GoodsId> = Vec::new();
        for tech in &self.technologies {
            for entry in &tech.ingredients {
                if !science_packs.contains(&entry.goods) {
                    science_packs.push(entry.goods);
                }
            }
        }

        Ok(Database {
            goods: self.goods,
            goods_names: self.goods_names,
            recipes: self.recipes,
            recipe_names: self.recipe_names,
            entities: self.entities,
            entity_names: self.entity_names,
            modules: self.modules,
            module_names: self.module_names,
            beacons: self.beacons,
            beacon_names: self.beacon_names,
            technologies: self.technologies,
            technology_names: self.technology_names,
            producers,
            consumers,
            tech_dependents,
            science_packs,
        })
    }
}

/// Kahn pass over the prerequisite graph. Any technology left unvisited sits
/// on (or behind) a cycle.
fn check_technology_cycles(
    technologies: &[TechnologyDef],
    dependents: &[Vec<TechId>],
) -> Result<(), DatabaseError> {
    let mut in_degree: Vec<usize> = technologies.iter().map(|t| t.prerequisites.len()).collect();
    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut visited = 0;

    while let Some(index) = queue.pop_front() {
        visited += 1;
        for dependent in &dependents[index] {
            // A dependent listing the same prerequisite twice is counted once
            // in `dependents`, so decrement once per occurrence.
            let occurrences = technologies[dependent.index()]
                .prerequisites
                .iter()
                .filter(|p| p.index() == index)
                .count();
            let degree = &mut in_degree[dependent.index()];
            *degree -= occurrences;
            if *degree == 0 {
                queue.push_back(dependent.index());
            }
        }
    }

    if visited != technologies.len() {
        let first = in_degree
            .iter()
            .position(|d| *d > 0)
            .map(|i| technologies[i].name.clone())
            .unwrap_or_default();
        return Err(DatabaseError::TechnologyCycle(first));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Immutable reference database. Frozen after [`DatabaseBuilder::build`].
#[derive(Debug, Clone)]
pub struct Database {
    goods: Vec<GoodsDef>,
    goods_names: HashMap<String, GoodsId>,
    recipes: Vec<RecipeDef>,
    recipe_names: HashMap<String, RecipeId>,
    entities: Vec<EntityDef>,
    entity_names: HashMap<String, EntityId>,
    modules: Vec<ModuleDef>,
    module_names: HashMap<String, ModuleId>,
    beacons: Vec<BeaconDef>,
    beacon_names: HashMap<String, BeaconId>,
    technologies: Vec<TechnologyDef>,
    technology_names: HashMap<String, TechId>,
    producers: Vec<Vec<RecipeId>>,
    consumers: Vec<Vec<RecipeId>>,
    tech_dependents: Vec<Vec<TechId>>,
    science_packs: Vec<GoodsId>,
}

impl Database {
    pub fn goods(&self, id: GoodsId) -> Option<&GoodsDef> {
        self.goods.get(id.0 as usize)
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(id.0 as usize)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityDef> {
        self.entities.get(id.0 as usize)
    }

    pub fn module(&self, id: ModuleId) -> Option<&ModuleDef> {
        self.modules.get(id.0 as usize)
    }

    pub fn beacon(&self, id: BeaconId) -> Option<&BeaconDef> {
        self.beacons.get(id.0 as usize)
    }

    pub fn technology(&self, id: TechId) -> Option<&TechnologyDef> {
        self.technologies.get(id.index())
    }

    pub fn goods_id(&self, name: &str) -> Option<GoodsId> {
        self.goods_names.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_names.get(name).copied()
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entity_names.get(name).copied()
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.module_names.get(name).copied()
    }

    pub fn beacon_id(&self, name: &str) -> Option<BeaconId> {
        self.beacon_names.get(name).copied()
    }

    pub fn technology_id(&self, name: &str) -> Option<TechId> {
        self.technology_names.get(name).copied()
    }

    pub fn goods_count(&self) -> usize {
        self.goods.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    pub fn technology_count(&self) -> usize {
        self.technologies.len()
    }

    /// All technologies in id order.
    pub fn technologies(&self) -> impl Iterator<Item = (TechId, &TechnologyDef)> {
        self.technologies
            .iter()
            .enumerate()
            .map(|(i, t)| (TechId(i as u32), t))
    }

    /// Recipes listing `goods` among their products.
    pub fn producers_of(&self, goods: GoodsId) -> &[RecipeId] {
        self.producers
            .get(goods.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Recipes listing `goods` among their ingredients.
    pub fn consumers_of(&self, goods: GoodsId) -> &[RecipeId] {
        self.consumers
            .get(goods.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Technologies that list `tech` as a direct prerequisite.
    pub fn tech_dependents(&self, tech: TechId) -> &[TechId] {
        self.tech_dependents
            .get(tech.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every goods type used as a technology ingredient, in first-use order.
    pub fn science_packs(&self) -> &[GoodsId] {
        &self.science_packs
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("invalid goods reference {goods:?} in '{owner}'")]
    InvalidGoodsRef { owner: String, goods: GoodsId },
    #[error("invalid module reference {module:?} in recipe '{recipe}'")]
    InvalidModuleRef { recipe: String, module: ModuleId },
    #[error("prerequisite {prereq:?} for technology '{tech}' does not exist")]
    InvalidPrerequisite { tech: String, prereq: TechId },
    #[error("recipe '{0}' must have a positive time")]
    InvalidRecipeTime(String),
    #[error("technology prerequisites form a cycle through '{0}'")]
    TechnologyCycle(String),
}

//! The production model: an arena of tables, rows and links.
//!
//! Tables own rows and links; a row may own one nested table (its
//! subgroup). Ownership only flows downward. Back references (`owner`
//! fields) are plain keys into the arena.
//!
//! Every setter here assumes the caller has already captured a memento of
//! the value it is about to change (see [`ProductionModel::capture_row`]).

use ratio_core::database::Database;
use ratio_core::id::{EntityId, GoodsId, ModuleId, RecipeId};
use ratio_core::snapshot::{Memento, SnapshotError};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::link::{LinkAlgorithm, LinkState, ProductionLink};
use crate::module::{ModuleError, ModuleFillerParameters, ModuleTemplate};
use crate::parameters::RecipeParameters;

new_key_type! {
    /// Identifies a table in the model.
    pub struct TableId;
    /// Identifies a recipe row in the model.
    pub struct RowId;
    /// Identifies a production link in the model.
    pub struct LinkId;
}

// ---------------------------------------------------------------------------
// Tables and rows
// ---------------------------------------------------------------------------

/// An ordered group of rows plus the links scoped to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTable {
    pub(crate) owner: Option<RowId>,
    pub(crate) rows: Vec<RowId>,
    pub(crate) links: Vec<LinkId>,
    pub(crate) expanded: bool,
    pub(crate) modules: Option<ModuleFillerParameters>,
}

impl ProductionTable {
    fn new(owner: Option<RowId>) -> Self {
        Self {
            owner,
            rows: Vec::new(),
            links: Vec::new(),
            expanded: true,
            modules: None,
        }
    }

    /// The row owning this table, `None` for the root.
    pub fn owner(&self) -> Option<RowId> {
        self.owner
    }

    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Expanded tables are balanced on their own; collapsed ones act as a
    /// single unit scaled by their owning row.
    pub fn expanded(&self) -> bool {
        self.expanded
    }

    /// Module filler set on this table itself, not inherited.
    pub fn modules(&self) -> Option<&ModuleFillerParameters> {
        self.modules.as_ref()
    }

    fn state(&self) -> TableState {
        TableState {
            expanded: self.expanded,
            modules: self.modules.clone(),
        }
    }
}

/// The editable part of a table, as captured in a memento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    pub expanded: bool,
    pub modules: Option<ModuleFillerParameters>,
}

/// One recipe placed in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    pub(crate) recipe: RecipeId,
    pub(crate) owner: TableId,
    pub(crate) entity: Option<EntityId>,
    pub(crate) fuel: Option<GoodsId>,
    pub(crate) fixed_buildings: Option<f64>,
    pub(crate) enabled: bool,
    pub(crate) hierarchy_enabled: bool,
    pub(crate) subgroup: Option<TableId>,
    pub(crate) modules: Option<ModuleTemplate>,
    pub(crate) tag: u8,

    pub(crate) recipes_per_second: f64,
    pub(crate) parameters: RecipeParameters,
}

impl RecipeRow {
    fn new(owner: TableId, recipe: RecipeId) -> Self {
        Self {
            recipe,
            owner,
            entity: None,
            fuel: None,
            fixed_buildings: None,
            enabled: true,
            hierarchy_enabled: true,
            subgroup: None,
            modules: None,
            tag: 0,
            recipes_per_second: 0.0,
            parameters: RecipeParameters::default(),
        }
    }

    pub fn recipe(&self) -> RecipeId {
        self.recipe
    }

    pub fn owner(&self) -> TableId {
        self.owner
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    pub fn fuel(&self) -> Option<GoodsId> {
        self.fuel
    }

    pub fn fixed_buildings(&self) -> Option<f64> {
        self.fixed_buildings
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True only when this row and every ancestor row are enabled.
    pub fn hierarchy_enabled(&self) -> bool {
        self.hierarchy_enabled
    }

    pub fn subgroup(&self) -> Option<TableId> {
        self.subgroup
    }

    /// The table whose links this row's recipe is balanced against.
    pub fn link_root(&self) -> TableId {
        self.subgroup.unwrap_or(self.owner)
    }

    pub fn modules(&self) -> Option<&ModuleTemplate> {
        self.modules.as_ref()
    }

    /// Highlight colour index; 0 is none.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn recipes_per_second(&self) -> f64 {
        self.recipes_per_second
    }

    pub fn parameters(&self) -> &RecipeParameters {
        &self.parameters
    }

    /// Buildings needed to run at the solved rate.
    pub fn building_count(&self) -> f64 {
        self.recipes_per_second * self.parameters.recipe_time
    }

    fn state(&self) -> RowState {
        RowState {
            entity: self.entity,
            fuel: self.fuel,
            fixed_buildings: self.fixed_buildings,
            enabled: self.enabled,
            modules: self.modules.clone(),
            tag: self.tag,
        }
    }

    fn apply(&mut self, state: RowState) {
        self.entity = state.entity;
        self.fuel = state.fuel;
        self.fixed_buildings = state.fixed_buildings;
        self.enabled = state.enabled;
        self.modules = state.modules;
        self.tag = state.tag;
    }
}

/// The editable part of a row, as captured in a memento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowState {
    pub entity: Option<EntityId>,
    pub fuel: Option<GoodsId>,
    pub fixed_buildings: Option<f64>,
    pub enabled: bool,
    pub modules: Option<ModuleTemplate>,
    pub tag: u8,
}

// ---------------------------------------------------------------------------
// ProductionModel
// ---------------------------------------------------------------------------

/// The whole planning sheet: a root table and everything nested under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionModel {
    pub(crate) tables: SlotMap<TableId, ProductionTable>,
    pub(crate) rows: SlotMap<RowId, RecipeRow>,
    pub(crate) links: SlotMap<LinkId, ProductionLink>,
    pub(crate) root: TableId,
}

impl Default for ProductionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionModel {
    pub fn new() -> Self {
        let mut tables = SlotMap::with_key();
        let root = tables.insert(ProductionTable::new(None));
        Self {
            tables,
            rows: SlotMap::with_key(),
            links: SlotMap::with_key(),
            root,
        }
    }

    pub fn root(&self) -> TableId {
        self.root
    }

    // -- Queries --

    pub fn table(&self, id: TableId) -> Option<&ProductionTable> {
        self.tables.get(id)
    }

    pub fn row(&self, id: RowId) -> Option<&RecipeRow> {
        self.rows.get(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&ProductionLink> {
        self.links.get(id)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// The link for `goods` scoped to `table`, if any.
    pub fn find_link(&self, table: TableId, goods: GoodsId) -> Option<LinkId> {
        let table = self.tables.get(table)?;
        table
            .links
            .iter()
            .copied()
            .find(|&l| self.links.get(l).is_some_and(|link| link.goods == goods))
    }

    pub fn link_root(&self, row: RowId) -> Option<TableId> {
        self.rows.get(row).map(RecipeRow::link_root)
    }

    /// The module filler in effect for `row`: the one on its link root, or
    /// else on the nearest table above it. `None` when no table sets one.
    pub fn module_filler(&self, row: RowId) -> Option<&ModuleFillerParameters> {
        let mut table = self.link_root(row);
        while let Some(t) = table.and_then(|id| self.tables.get(id)) {
            if let Some(filler) = &t.modules {
                return Some(filler);
            }
            table = t.owner.and_then(|owner| self.rows.get(owner)).map(|r| r.owner);
        }
        None
    }

    /// Every row under `table`, depth first, each row followed by the rows
    /// of its subgroup.
    pub fn rows_recursive(&self, table: TableId) -> Vec<RowId> {
        let mut out = Vec::new();
        self.collect_rows(table, &mut out);
        out
    }

    fn collect_rows(&self, table: TableId, out: &mut Vec<RowId>) {
        let Some(t) = self.tables.get(table) else {
            return;
        };
        for &row in &t.rows {
            out.push(row);
            if let Some(sub) = self.rows.get(row).and_then(|r| r.subgroup) {
                self.collect_rows(sub, out);
            }
        }
    }

    fn row_mut(&mut self, id: RowId) -> Result<&mut RecipeRow, TableError> {
        self.rows.get_mut(id).ok_or(TableError::UnknownRow(id))
    }

    fn link_mut(&mut self, id: LinkId) -> Result<&mut ProductionLink, TableError> {
        self.links.get_mut(id).ok_or(TableError::UnknownLink(id))
    }

    // -- Structure edits --

    /// Append a row running `recipe` to `table`.
    pub fn add_recipe(
        &mut self,
        db: &Database,
        table: TableId,
        recipe: RecipeId,
    ) -> Result<RowId, TableError> {
        if db.recipe(recipe).is_none() {
            return Err(TableError::UnknownRecipe(recipe));
        }
        if !self.tables.contains_key(table) {
            return Err(TableError::UnknownTable(table));
        }
        let row = self.rows.insert(RecipeRow::new(table, recipe));
        self.tables[table].rows.push(row);
        Ok(row)
    }

    /// Remove a row together with its subgroup and everything nested in it.
    pub fn remove_row(&mut self, row: RowId) -> Result<(), TableError> {
        let removed = self.rows.remove(row).ok_or(TableError::UnknownRow(row))?;
        if let Some(table) = self.tables.get_mut(removed.owner) {
            table.rows.retain(|&r| r != row);
        }
        if let Some(sub) = removed.subgroup {
            self.remove_table(sub);
        }
        Ok(())
    }

    fn remove_table(&mut self, table: TableId) {
        let Some(t) = self.tables.remove(table) else {
            return;
        };
        for link in t.links {
            self.links.remove(link);
        }
        for row in t.rows {
            if let Some(removed) = self.rows.remove(row) {
                if let Some(sub) = removed.subgroup {
                    self.remove_table(sub);
                }
            }
        }
    }

    /// Give `row` an empty nested table. The new table starts expanded.
    pub fn create_subgroup(&mut self, row: RowId) -> Result<TableId, TableError> {
        let r = self.rows.get(row).ok_or(TableError::UnknownRow(row))?;
        if r.subgroup.is_some() {
            return Err(TableError::SubgroupExists(row));
        }
        let table = self.tables.insert(ProductionTable::new(Some(row)));
        self.rows[row].subgroup = Some(table);
        Ok(table)
    }

    pub fn set_expanded(&mut self, table: TableId, expanded: bool) -> Result<(), TableError> {
        if table == self.root && !expanded {
            return Err(TableError::RootCannotCollapse);
        }
        let t = self
            .tables
            .get_mut(table)
            .ok_or(TableError::UnknownTable(table))?;
        t.expanded = expanded;
        Ok(())
    }

    /// Add a `Match` link with target 0 for `goods` to `table`.
    pub fn add_link(
        &mut self,
        db: &Database,
        table: TableId,
        goods: GoodsId,
    ) -> Result<LinkId, TableError> {
        if db.goods(goods).is_none() {
            return Err(TableError::UnknownGoods(goods));
        }
        if !self.tables.contains_key(table) {
            return Err(TableError::UnknownTable(table));
        }
        if self.find_link(table, goods).is_some() {
            return Err(TableError::DuplicateLink(goods));
        }
        let link = self.links.insert(ProductionLink::new(table, goods));
        self.tables[table].links.push(link);
        Ok(link)
    }

    pub fn remove_link(&mut self, link: LinkId) -> Result<(), TableError> {
        let removed = self.links.remove(link).ok_or(TableError::UnknownLink(link))?;
        if let Some(table) = self.tables.get_mut(removed.owner) {
            table.links.retain(|&l| l != link);
        }
        Ok(())
    }

    // -- Row edits --

    pub fn set_entity(
        &mut self,
        db: &Database,
        row: RowId,
        entity: Option<EntityId>,
    ) -> Result<(), TableError> {
        if let Some(e) = entity {
            if db.entity(e).is_none() {
                return Err(TableError::UnknownEntity(e));
            }
        }
        self.row_mut(row)?.entity = entity;
        Ok(())
    }

    pub fn set_fuel(
        &mut self,
        db: &Database,
        row: RowId,
        fuel: Option<GoodsId>,
    ) -> Result<(), TableError> {
        if let Some(g) = fuel {
            if db.goods(g).is_none() {
                return Err(TableError::UnknownGoods(g));
            }
        }
        self.row_mut(row)?.fuel = fuel;
        Ok(())
    }

    /// Pin the row to a building count, or release it with `None`.
    pub fn set_fixed_buildings(
        &mut self,
        row: RowId,
        count: Option<f64>,
    ) -> Result<(), TableError> {
        if let Some(c) = count {
            if !c.is_finite() || c < 0.0 {
                return Err(TableError::InvalidAmount(c));
            }
        }
        self.row_mut(row)?.fixed_buildings = count;
        Ok(())
    }

    pub fn set_enabled(&mut self, row: RowId, enabled: bool) -> Result<(), TableError> {
        self.row_mut(row)?.enabled = enabled;
        Ok(())
    }

    pub fn set_modules(
        &mut self,
        db: &Database,
        row: RowId,
        modules: Option<ModuleTemplate>,
    ) -> Result<(), TableError> {
        if let Some(template) = &modules {
            template.validate(db)?;
        }
        self.row_mut(row)?.modules = modules;
        Ok(())
    }

    /// Replace the row's internal modules with a single floodfill entry,
    /// keeping any beacon setup. `None` removes the template.
    pub fn set_fixed_module(
        &mut self,
        db: &Database,
        row: RowId,
        module: Option<ModuleId>,
    ) -> Result<(), TableError> {
        let Some(module) = module else {
            return self.remove_fixed_modules(row);
        };
        if db.module(module).is_none() {
            return Err(TableError::Module(ModuleError::UnknownModule(module)));
        }
        let r = self.row_mut(row)?;
        let template = r.modules.get_or_insert_with(ModuleTemplate::default);
        template.list.clear();
        template.list.push(crate::module::ModuleEntry::floodfill(module));
        Ok(())
    }

    pub fn remove_fixed_modules(&mut self, row: RowId) -> Result<(), TableError> {
        self.row_mut(row)?.modules = None;
        Ok(())
    }

    pub fn set_tag(&mut self, row: RowId, tag: u8) -> Result<(), TableError> {
        self.row_mut(row)?.tag = tag;
        Ok(())
    }

    /// Set the module filler used by rows in `table` and every nested table
    /// that does not set its own. `None` inherits from the table above.
    pub fn set_table_modules(
        &mut self,
        db: &Database,
        table: TableId,
        modules: Option<ModuleFillerParameters>,
    ) -> Result<(), TableError> {
        if let Some(filler) = &modules {
            filler.validate(db)?;
        }
        self.tables
            .get_mut(table)
            .ok_or(TableError::UnknownTable(table))?
            .modules = modules;
        Ok(())
    }

    // -- Link edits --

    pub fn set_link_amount(&mut self, link: LinkId, amount: f64) -> Result<(), TableError> {
        if !amount.is_finite() {
            return Err(TableError::InvalidAmount(amount));
        }
        self.link_mut(link)?.amount = amount;
        Ok(())
    }

    pub fn set_link_algorithm(
        &mut self,
        link: LinkId,
        algorithm: LinkAlgorithm,
    ) -> Result<(), TableError> {
        self.link_mut(link)?.algorithm = algorithm;
        Ok(())
    }

    // -- Undo contract --

    /// Snapshot the editable state of `row`.
    pub fn capture_row(&self, row: RowId) -> Result<Memento<RowId>, TableError> {
        let r = self.rows.get(row).ok_or(TableError::UnknownRow(row))?;
        Ok(Memento::capture(row, &r.state())?)
    }

    /// Put a row back into a previously captured state.
    pub fn restore_row(&mut self, memento: &Memento<RowId>) -> Result<(), TableError> {
        let state: RowState = memento.state()?;
        self.row_mut(memento.target())?.apply(state);
        Ok(())
    }

    pub fn capture_link(&self, link: LinkId) -> Result<Memento<LinkId>, TableError> {
        let l = self.links.get(link).ok_or(TableError::UnknownLink(link))?;
        Ok(Memento::capture(link, &l.state())?)
    }

    pub fn restore_link(&mut self, memento: &Memento<LinkId>) -> Result<(), TableError> {
        let state: LinkState = memento.state()?;
        let link = self.link_mut(memento.target())?;
        link.amount = state.amount;
        link.algorithm = state.algorithm;
        Ok(())
    }

    pub fn capture_table(&self, table: TableId) -> Result<Memento<TableId>, TableError> {
        let t = self.tables.get(table).ok_or(TableError::UnknownTable(table))?;
        Ok(Memento::capture(table, &t.state())?)
    }

    pub fn restore_table(&mut self, memento: &Memento<TableId>) -> Result<(), TableError> {
        let state: TableState = memento.state()?;
        let table = memento.target();
        if table == self.root && !state.expanded {
            return Err(TableError::RootCannotCollapse);
        }
        let t = self
            .tables
            .get_mut(table)
            .ok_or(TableError::UnknownTable(table))?;
        t.expanded = state.expanded;
        t.modules = state.modules;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("unknown table: {0:?}")]
    UnknownTable(TableId),
    #[error("unknown row: {0:?}")]
    UnknownRow(RowId),
    #[error("unknown link: {0:?}")]
    UnknownLink(LinkId),
    #[error("unknown recipe: {0:?}")]
    UnknownRecipe(RecipeId),
    #[error("unknown goods: {0:?}")]
    UnknownGoods(GoodsId),
    #[error("unknown entity: {0:?}")]
    UnknownEntity(EntityId),
    #[error("table already links {0:?}")]
    DuplicateLink(GoodsId),
    #[error("row {0:?} already has a subgroup")]
    SubgroupExists(RowId),
    #[error("the root table cannot be collapsed")]
    RootCannotCollapse,
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

//! Flow solve: turns each table into a linear program and writes rates and
//! link diagnostics back into the model.
//!
//! Tables are solved bottom-up and independently; no constraint crosses a
//! table boundary. A subgroup reaches its parent in one of two shapes:
//!
//! - collapsed: solved once with its owning row pinned to one execution per
//!   second, the resulting net flows become the per-unit coefficients of a
//!   single aggregate variable in the parent, and the subgroup's rates are
//!   scaled by that variable afterwards;
//! - expanded: solved on its own, its net flows enter the parent's links as
//!   constants.
//!
//! Every link gets deficit/surplus slack variables with a large objective
//! penalty, so a model that cannot be balanced still produces rates and
//! reports the links it could not match.

use std::collections::{BTreeMap, HashMap, HashSet};

use ratio_core::database::Database;
use ratio_core::id::GoodsId;
use ratio_solver::{SolveStatus, Solver};
use serde::{Deserialize, Serialize};

use crate::link::LinkFlags;
use crate::model::{LinkId, ProductionModel, RowId, TableId};
use crate::module::ModuleFiller;
use crate::parameters::{RecipeParameters, net_flows};
use crate::settings::SolveSettings;

/// Per-unit flows smaller than this fraction of a profile's largest flow are
/// rounding residue of balanced links.
const PROFILE_RESIDUE: f64 = 1e-9;

/// Outcome of one [`ProductionModel::solve`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveSummary {
    /// Linear programs solved, one per table plus one per collapsed
    /// subgroup profile.
    pub tables_solved: usize,
    /// Worst status seen across all tables.
    pub status: SolveStatus,
    /// Links flagged as not matched after the pass.
    pub unmatched_links: usize,
}

impl Default for SolveSummary {
    fn default() -> Self {
        Self {
            tables_solved: 0,
            status: SolveStatus::Optimal,
            unmatched_links: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum VarKey {
    Row(RowId),
    Deficit(LinkId),
    Surplus(LinkId),
}

/// One decision variable of a table problem: a plain row, or the aggregate
/// of a collapsed subgroup keyed by its owning row.
struct Participant {
    row: RowId,
    flows: BTreeMap<GoodsId, f64>,
    objective: f64,
    min: f64,
    max: f64,
    /// Collapsed subgroup scaled by this variable, and whether its profile
    /// solve succeeded.
    group: Option<(TableId, bool)>,
}

/// Net flows produced by a solved table.
#[derive(Debug, Default)]
struct GroupFlow {
    /// Scales with the owning row.
    linear: BTreeMap<GoodsId, f64>,
    /// Contributed by expanded subgroups; does not scale.
    constant: BTreeMap<GoodsId, f64>,
    /// Buildings per unit of the linear part.
    buildings: f64,
    solved: bool,
}

impl GroupFlow {
    fn total(&self) -> BTreeMap<GoodsId, f64> {
        let mut out = self.linear.clone();
        for (&goods, &value) in &self.constant {
            *out.entry(goods).or_insert(0.0) += value;
        }
        out
    }
}

struct Pass<'a> {
    db: &'a Database,
    settings: &'a SolveSettings,
    previous: HashMap<RowId, f64>,
    summary: SolveSummary,
}

impl Pass<'_> {
    fn record(&mut self, status: SolveStatus) {
        self.summary.tables_solved += 1;
        if status.severity() > self.summary.status.severity() {
            self.summary.status = status;
        }
    }
}

fn add_flow(map: &mut BTreeMap<GoodsId, f64>, goods: GoodsId, value: f64) {
    *map.entry(goods).or_insert(0.0) += value;
}

impl ProductionModel {
    /// Recompute every row's parameters and rates and every link's
    /// diagnostics.
    ///
    /// Rows without a complete module template take automatic modules from
    /// the filler of the nearest table that sets one (see
    /// [`ProductionModel::module_filler`]).
    ///
    /// Solver failures are reported in the summary and flagged on links;
    /// they never surface as errors.
    pub fn solve(&mut self, db: &Database, settings: &SolveSettings) -> SolveSummary {
        let root = self.root;
        self.update_hierarchy_enabled(root, true);

        let ids: Vec<RowId> = self.rows.keys().collect();
        for id in ids {
            let filler = self.module_filler(id).map(|f| f as &dyn ModuleFiller);
            let params = RecipeParameters::calculate(db, &self.rows[id], filler);
            self.rows[id].parameters = params;
        }

        let mut pass = Pass {
            db,
            settings,
            previous: self
                .rows
                .iter()
                .map(|(id, row)| (id, row.recipes_per_second))
                .collect(),
            summary: SolveSummary::default(),
        };
        self.solve_table(&mut pass, root, None);

        let mut summary = pass.summary;
        summary.unmatched_links = self.links.values().filter(|l| l.is_unmatched()).count();
        tracing::debug!(
            tables = summary.tables_solved,
            status = ?summary.status,
            unmatched = summary.unmatched_links,
            "production model solved"
        );
        summary
    }

    fn update_hierarchy_enabled(&mut self, table: TableId, parent_enabled: bool) {
        let Some(rows) = self.tables.get(table).map(|t| t.rows.clone()) else {
            return;
        };
        for id in rows {
            let Some(row) = self.rows.get_mut(id) else {
                continue;
            };
            row.hierarchy_enabled = parent_enabled && row.enabled;
            let (enabled, sub) = (row.hierarchy_enabled, row.subgroup);
            if let Some(sub) = sub {
                self.update_hierarchy_enabled(sub, enabled);
            }
        }
    }

    fn row_bounds(&self, row: RowId) -> (f64, f64) {
        let r = &self.rows[row];
        match r.fixed_buildings {
            Some(count) if r.parameters.recipe_time > 0.0 => {
                let rate = count / r.parameters.recipe_time;
                (rate, rate)
            }
            _ => (0.0, f64::INFINITY),
        }
    }

    /// Solve `table`, with its owning row pinned to `pin` executions per
    /// second when given.
    fn solve_table(
        &mut self,
        pass: &mut Pass<'_>,
        table: TableId,
        pin: Option<f64>,
    ) -> GroupFlow {
        let Some(t) = self.tables.get(table) else {
            return GroupFlow::default();
        };
        let owner = t.owner;
        let members: Vec<RowId> = owner.into_iter().chain(t.rows.iter().copied()).collect();
        let link_ids = t.links.clone();

        let mut participants: Vec<Participant> = Vec::new();
        let mut constant: BTreeMap<GoodsId, f64> = BTreeMap::new();
        let mut children: Vec<TableId> = Vec::new();

        for id in members {
            let Some(row) = self.rows.get(id) else {
                continue;
            };
            let is_owner = Some(id) == owner;
            if !row.hierarchy_enabled {
                self.disable_row(id);
                continue;
            }
            match row.subgroup.filter(|_| !is_owner) {
                Some(sub) => {
                    children.push(sub);
                    let expanded = self.tables.get(sub).is_none_or(|s| s.expanded);
                    if expanded {
                        let flow = self.solve_table(pass, sub, None);
                        for (goods, value) in flow.total() {
                            add_flow(&mut constant, goods, value);
                        }
                    } else {
                        let flow = self.solve_table(pass, sub, Some(1.0));
                        for (&goods, &value) in &flow.constant {
                            add_flow(&mut constant, goods, value);
                        }
                        let (min, max) = self.row_bounds(id);
                        participants.push(Participant {
                            row: id,
                            flows: flow.linear,
                            objective: flow.buildings,
                            min,
                            max,
                            group: Some((sub, flow.solved)),
                        });
                    }
                }
                None => {
                    let (min, max) = match pin {
                        Some(rate) if is_owner => (rate, rate),
                        _ => self.row_bounds(id),
                    };
                    participants.push(Participant {
                        row: id,
                        flows: net_flows(pass.db, row),
                        objective: row.parameters.recipe_time,
                        min,
                        max,
                        group: None,
                    });
                }
            }
        }

        // -- Build and solve the problem --

        let goods_links: BTreeMap<GoodsId, LinkId> = link_ids
            .iter()
            .filter_map(|&l| self.links.get(l).map(|link| (link.goods, l)))
            .collect();
        let penalty = pass.settings.slack_penalty;

        let mut solver: Solver<VarKey, LinkId> = Solver::new();
        let mut link_bounds: HashMap<LinkId, (f64, f64)> = HashMap::new();
        for (&goods, &l) in &goods_links {
            let link = &self.links[l];
            let (lo, hi) = link.algorithm.bounds(link.amount);
            let offset = constant.get(&goods).copied().unwrap_or(0.0);
            let bounds = (lo - offset, hi - offset);
            solver.add_constraint(l, bounds.0, bounds.1);
            link_bounds.insert(l, bounds);
            if link.algorithm.needs_deficit() {
                solver.add_variable(VarKey::Deficit(l), 0.0, f64::INFINITY, penalty);
                solver.set_coefficient(VarKey::Deficit(l), l, 1.0);
            }
            if link.algorithm.needs_surplus() {
                solver.add_variable(VarKey::Surplus(l), 0.0, f64::INFINITY, penalty);
                solver.set_coefficient(VarKey::Surplus(l), l, -1.0);
            }
        }
        for p in &participants {
            let key = VarKey::Row(p.row);
            solver.add_variable(key, p.min, p.max, p.objective);
            for (goods, &coef) in &p.flows {
                if let Some(&l) = goods_links.get(goods) {
                    solver.set_coefficient(key, l, coef);
                }
            }
        }

        let status = solver.solve(false);
        pass.record(status);
        let success = status.is_success();
        if !success {
            tracing::warn!(?table, ?status, "table solve failed; keeping previous rates");
        }

        // -- Write rates back --

        for p in &participants {
            match p.group {
                // A subgroup whose profile failed keeps its previous rates,
                // and so does its owner.
                Some((_, false)) => self.restore_rate(p.row, &pass.previous),
                Some((sub, true)) if success => {
                    let rate = solver.value(&VarKey::Row(p.row));
                    self.rows[p.row].recipes_per_second = rate;
                    self.scale_group(sub, rate);
                }
                Some((sub, true)) => {
                    self.restore_rate(p.row, &pass.previous);
                    self.restore_group(sub, &pass.previous);
                }
                None if success => {
                    self.rows[p.row].recipes_per_second = solver.value(&VarKey::Row(p.row));
                }
                None => self.restore_rate(p.row, &pass.previous),
            }
        }

        let mut flow = GroupFlow {
            constant: constant.clone(),
            solved: success,
            ..GroupFlow::default()
        };
        let mut values: HashMap<RowId, f64> = HashMap::new();
        for p in &participants {
            let rate = self.rows[p.row].recipes_per_second;
            values.insert(p.row, rate);
            // Restored rates are at the parent's scale, not per unit.
            if pin.is_some() && !success {
                continue;
            }
            for (&goods, &coef) in &p.flows {
                add_flow(&mut flow.linear, goods, coef * rate);
            }
            flow.buildings += p.objective * rate;
        }
        // Balanced links leave rounding residue behind.
        let largest = flow.linear.values().fold(0.0_f64, |m, v| m.max(v.abs()));
        flow.linear.retain(|_, v| v.abs() > largest * PROFILE_RESIDUE);

        // -- Link diagnostics --

        let tolerance = pass.settings.tolerance;
        let mut updates: Vec<(LinkId, LinkFlags, f64, f64, Vec<RowId>)> = Vec::new();
        for (&goods, &l) in &goods_links {
            let mut flags = LinkFlags::NONE;
            let mut link_flow = 0.0;
            let mut captured = Vec::new();
            for p in &participants {
                let Some(&coef) = p.flows.get(&goods) else {
                    continue;
                };
                captured.push(p.row);
                if coef > 0.0 {
                    flags.insert(LinkFlags::HAS_PRODUCTION);
                } else if coef < 0.0 {
                    flags.insert(LinkFlags::HAS_CONSUMPTION);
                }
                link_flow += (coef * values[&p.row]).max(0.0);
            }
            let offset = constant.get(&goods).copied().unwrap_or(0.0);
            if offset > 0.0 {
                flags.insert(LinkFlags::HAS_PRODUCTION);
                link_flow += offset;
            } else if offset < 0.0 {
                flags.insert(LinkFlags::HAS_CONSUMPTION);
            }

            let mut not_matched = 0.0;
            if success {
                not_matched =
                    solver.value(&VarKey::Surplus(l)) - solver.value(&VarKey::Deficit(l));
                if not_matched.abs() > tolerance {
                    flags.insert(LinkFlags::NOT_MATCHED);
                } else {
                    not_matched = 0.0;
                }
            } else {
                flags.insert(LinkFlags::NOT_MATCHED);
            }
            updates.push((l, flags, link_flow, not_matched, captured));
        }

        // Unmatched links caught in a feedback loop through this table's rows.
        let unmatched: HashSet<GoodsId> = updates
            .iter()
            .filter(|u| u.1.contains(LinkFlags::NOT_MATCHED))
            .map(|u| self.links[u.0].goods)
            .collect();
        let linked: HashSet<GoodsId> = goods_links.keys().copied().collect();
        let looped = feedback_loops(&participants, &linked, &unmatched);
        for update in &mut updates {
            if looped.contains(&self.links[update.0].goods) {
                update.1.remove(LinkFlags::NOT_MATCHED);
                update.1.insert(LinkFlags::RECURSIVE_NOT_MATCHED);
            }
        }

        // Failures in nested tables surface on this table's link.
        for &child in &children {
            let Some(child_table) = self.tables.get(child) else {
                continue;
            };
            for &cl in &child_table.links {
                let Some(child_link) = self.links.get(cl) else {
                    continue;
                };
                let failed = child_link.flags.intersects(
                    LinkFlags::NOT_MATCHED
                        | LinkFlags::RECURSIVE_NOT_MATCHED
                        | LinkFlags::CHILD_NOT_MATCHED,
                );
                if !failed {
                    continue;
                }
                if let Some(&l) = goods_links.get(&child_link.goods) {
                    if let Some(update) = updates.iter_mut().find(|u| u.0 == l) {
                        update.1.insert(LinkFlags::CHILD_NOT_MATCHED);
                    }
                }
            }
        }

        let mut duals: HashMap<LinkId, f64> = HashMap::new();
        if success && pass.settings.compute_dual_values {
            let base = solver.objective_value();
            for (&l, &(lo, hi)) in &link_bounds {
                solver.set_constraint_bounds(&l, lo + 1.0, hi + 1.0);
                if solver.solve(false).is_success() {
                    duals.insert(l, solver.objective_value() - base);
                }
                solver.set_constraint_bounds(&l, lo, hi);
            }
        }

        for (l, flags, link_flow, not_matched, captured) in updates {
            let link = &mut self.links[l];
            link.flags = flags;
            link.link_flow = link_flow;
            link.not_matched_flow = not_matched;
            link.captured_recipes = captured;
            link.dual_value = duals.get(&l).copied().unwrap_or(0.0);
        }

        tracing::debug!(
            ?table,
            rows = participants.len(),
            links = goods_links.len(),
            ?status,
            "table solved"
        );
        flow
    }

    /// Multiply every rate and flow inside a collapsed subgroup by `scale`.
    fn scale_group(&mut self, table: TableId, scale: f64) {
        let Some(t) = self.tables.get(table) else {
            return;
        };
        let (rows, links) = (t.rows.clone(), t.links.clone());
        for l in links {
            if let Some(link) = self.links.get_mut(l) {
                link.link_flow *= scale;
                link.not_matched_flow *= scale;
            }
        }
        for id in rows {
            let Some(row) = self.rows.get_mut(id) else {
                continue;
            };
            row.recipes_per_second *= scale;
            if let Some(sub) = row.subgroup {
                if self.tables.get(sub).is_some_and(|s| !s.expanded) {
                    self.scale_group(sub, scale);
                }
            }
        }
    }

    fn restore_rate(&mut self, row: RowId, previous: &HashMap<RowId, f64>) {
        if let Some(r) = self.rows.get_mut(row) {
            r.recipes_per_second = previous.get(&row).copied().unwrap_or(0.0);
        }
    }

    fn restore_group(&mut self, table: TableId, previous: &HashMap<RowId, f64>) {
        let Some(rows) = self.tables.get(table).map(|t| t.rows.clone()) else {
            return;
        };
        for id in rows {
            self.restore_rate(id, previous);
            let sub = self.rows.get(id).and_then(|r| r.subgroup);
            if let Some(sub) = sub {
                if self.tables.get(sub).is_some_and(|s| !s.expanded) {
                    self.restore_group(sub, previous);
                }
            }
        }
    }

    /// Zero a disabled row and clear everything nested under it.
    fn disable_row(&mut self, row: RowId) {
        let Some(r) = self.rows.get_mut(row) else {
            return;
        };
        r.recipes_per_second = 0.0;
        let Some(sub) = r.subgroup else {
            return;
        };
        let Some(t) = self.tables.get(sub) else {
            return;
        };
        let (rows, links) = (t.rows.clone(), t.links.clone());
        for l in links {
            if let Some(link) = self.links.get_mut(l) {
                link.reset_computed();
            }
        }
        for id in rows {
            self.disable_row(id);
        }
    }
}

/// Linked goods sharing a feedback loop with an unmatched link.
///
/// A row that consumes linked goods `a` and produces linked goods `b` is an
/// edge `a -> b`. An unmatched link on a cycle marks every link on the
/// cycles through it, matched or not.
fn feedback_loops(
    participants: &[Participant],
    linked: &HashSet<GoodsId>,
    unmatched: &HashSet<GoodsId>,
) -> HashSet<GoodsId> {
    let mut edges: BTreeMap<GoodsId, Vec<GoodsId>> = BTreeMap::new();
    for p in participants {
        for (&from, &consumed) in &p.flows {
            if consumed >= 0.0 || !linked.contains(&from) {
                continue;
            }
            for (&to, &produced) in &p.flows {
                if produced > 0.0 && linked.contains(&to) {
                    let list = edges.entry(from).or_default();
                    if !list.contains(&to) {
                        list.push(to);
                    }
                }
            }
        }
    }

    let reachable = |start: GoodsId| -> HashSet<GoodsId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<GoodsId> = edges.get(&start).cloned().unwrap_or_default();
        while let Some(goods) = stack.pop() {
            if seen.insert(goods) {
                if let Some(next) = edges.get(&goods) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        seen
    };

    let mut looped = HashSet::new();
    for &start in unmatched {
        let from_start = reachable(start);
        if !from_start.contains(&start) {
            continue;
        }
        for &goods in &from_start {
            if reachable(goods).contains(&start) {
                looped.insert(goods);
            }
        }
    }
    looped
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use ratio_core::database::{DatabaseBuilder, GoodsAmount, GoodsKind};

    fn two_row_db() -> Database {
        let mut b = DatabaseBuilder::new();
        let x = b.register_goods("x", GoodsKind::Item);
        b.register_recipe("make", vec![], vec![GoodsAmount::new(x, 2.0)], 1.0);
        b.register_recipe("take", vec![GoodsAmount::new(x, 1.0)], vec![], 1.0);
        b.build().unwrap()
    }

    proptest! {
        /// Producer at 2 per execution, consumer at 1: a matched link keeps
        /// the producer at exactly half the consumer's rate.
        #[test]
        fn producer_runs_at_half_consumer_rate(buildings in 0.0f64..500.0) {
            let db = two_row_db();
            let mut model = ProductionModel::new();
            let root = model.root();
            let make = model.add_recipe(&db, root, db.recipe_id("make").unwrap()).unwrap();
            let take = model.add_recipe(&db, root, db.recipe_id("take").unwrap()).unwrap();
            model.set_fixed_buildings(take, Some(buildings)).unwrap();
            model.add_link(&db, root, db.goods_id("x").unwrap()).unwrap();

            let summary = model.solve(&db, &SolveSettings::default());
            prop_assert!(summary.status.is_success());
            let rate_make = model.row(make).unwrap().recipes_per_second();
            let rate_take = model.row(take).unwrap().recipes_per_second();
            prop_assert!((rate_make - 0.5 * rate_take).abs() < 1e-6 * (1.0 + rate_take));
        }
    }
}

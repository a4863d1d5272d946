//! Cumulative science-pack cost of every technology.

use std::collections::{HashMap, VecDeque};

use ratio_core::database::{Database, GoodsAmount};
use ratio_core::id::{GoodsId, TechId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bits::BitMatrix;

// ---------------------------------------------------------------------------
// Graph access
// ---------------------------------------------------------------------------

/// Read access to a technology graph. Technologies are addressed by dense
/// ordinals `TechId(0)..TechId(tech_count())`.
pub trait TechGraph {
    fn tech_count(&self) -> usize;
    fn prerequisites(&self, tech: TechId) -> &[TechId];
    fn ingredients(&self, tech: TechId) -> &[GoodsAmount];
    /// Number of research units.
    fn research_count(&self, tech: TechId) -> f64;
    /// Technologies listing `tech` as a direct prerequisite.
    fn dependents(&self, tech: TechId) -> &[TechId];
    /// The science packs to report on, in output order.
    fn pack_catalogue(&self) -> &[GoodsId];
}

impl TechGraph for Database {
    fn tech_count(&self) -> usize {
        self.technology_count()
    }

    fn prerequisites(&self, tech: TechId) -> &[TechId] {
        self.technology(tech)
            .map(|t| t.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    fn ingredients(&self, tech: TechId) -> &[GoodsAmount] {
        self.technology(tech)
            .map(|t| t.ingredients.as_slice())
            .unwrap_or(&[])
    }

    fn research_count(&self, tech: TechId) -> f64 {
        self.technology(tech).map_or(0.0, |t| t.count)
    }

    fn dependents(&self, tech: TechId) -> &[TechId] {
        self.tech_dependents(tech)
    }

    fn pack_catalogue(&self) -> &[GoodsId] {
        self.science_packs()
    }
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

/// Ranks goods by the milestone that unlocks them. Later milestones rank
/// higher.
pub trait MilestoneOrder {
    fn milestone_rank(&self, goods: GoodsId) -> u32;
}

impl<F> MilestoneOrder for F
where
    F: Fn(GoodsId) -> u32,
{
    fn milestone_rank(&self, goods: GoodsId) -> u32 {
        self(goods)
    }
}

/// Milestones given as an ordered list. A goods at position `i` ranks
/// `i + 1`; goods not in the list rank 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneList(pub Vec<GoodsId>);

impl MilestoneOrder for MilestoneList {
    fn milestone_rank(&self, goods: GoodsId) -> u32 {
        self.0
            .iter()
            .position(|&g| g == goods)
            .map_or(0, |i| i as u32 + 1)
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// Total science packs needed to research each technology together with
/// every technology it transitively depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnologyScience {
    packs: Vec<GoodsId>,
    costs: Vec<Vec<GoodsAmount>>,
    unprocessed: Vec<TechId>,
}

impl TechnologyScience {
    /// Propagate costs through `graph` in prerequisite order.
    ///
    /// A technology is processed once all of its direct prerequisites are.
    /// Its running totals start as a copy of its first prerequisite's totals
    /// and ancestor set; the remaining ancestors are found by a breadth-first
    /// walk that skips anything already in the set, so shared ancestors are
    /// counted once.
    pub fn compute<G: TechGraph + ?Sized>(graph: &G) -> Self {
        let n = graph.tech_count();
        let packs = graph.pack_catalogue().to_vec();
        let width = packs.len();
        let pack_index: HashMap<GoodsId, usize> =
            packs.iter().enumerate().map(|(i, &g)| (g, i)).collect();

        let mut counts = vec![0.0f64; n * width];
        let mut ancestors = BitMatrix::new(n);
        let mut queued = vec![false; n];
        let mut ready = VecDeque::new();
        let mut walk = VecDeque::new();

        for (i, flag) in queued.iter_mut().enumerate() {
            if graph.prerequisites(TechId(i as u32)).is_empty() {
                *flag = true;
                ready.push_back(i);
            }
        }

        while let Some(current) = ready.pop_front() {
            let tech = TechId(current as u32);

            if let Some(first) = graph.prerequisites(tech).first() {
                let first = first.index();
                counts.copy_within(first * width..(first + 1) * width, current * width);
                ancestors.copy_row(first, current);
            }

            ancestors.set(current, current);
            walk.push_back(current);
            while let Some(node) = walk.pop_front() {
                let node_id = TechId(node as u32);
                let units = graph.research_count(node_id);
                for ingredient in graph.ingredients(node_id) {
                    if let Some(&pack) = pack_index.get(&ingredient.goods) {
                        counts[current * width + pack] += ingredient.amount * units;
                    }
                }
                for prereq in graph.prerequisites(node_id) {
                    let p = prereq.index();
                    if p < n && !ancestors.get(current, p) {
                        ancestors.set(current, p);
                        walk.push_back(p);
                    }
                }
            }

            for &dependent in graph.dependents(tech) {
                let d = dependent.index();
                if d >= n || queued[d] {
                    continue;
                }
                let unlocked = graph
                    .prerequisites(dependent)
                    .iter()
                    .all(|p| queued.get(p.index()).copied().unwrap_or(false));
                if unlocked {
                    queued[d] = true;
                    ready.push_back(d);
                }
            }
        }

        let mut unprocessed = Vec::new();
        let costs = (0..n)
            .map(|i| {
                if !queued[i] {
                    unprocessed.push(TechId(i as u32));
                    return Vec::new();
                }
                counts[i * width..(i + 1) * width]
                    .iter()
                    .zip(&packs)
                    .filter(|(amount, _)| **amount != 0.0)
                    .map(|(&amount, &goods)| GoodsAmount::new(goods, amount))
                    .collect()
            })
            .collect();

        if !unprocessed.is_empty() {
            warn!(
                count = unprocessed.len(),
                "unreachable technologies left without a science cost"
            );
        }
        debug!(technologies = n, packs = width, "science costs propagated");

        Self {
            packs,
            costs,
            unprocessed,
        }
    }

    /// The science-pack catalogue, in first-use order.
    pub fn science_packs(&self) -> &[GoodsId] {
        &self.packs
    }

    pub fn technology_count(&self) -> usize {
        self.costs.len()
    }

    /// Nonzero cumulative pack amounts of `tech`, in catalogue order.
    /// Empty for unknown or unprocessed technologies.
    pub fn cost(&self, tech: TechId) -> &[GoodsAmount] {
        self.costs
            .get(tech.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cumulative amount of `pack` needed for `tech`.
    pub fn total_cost(&self, tech: TechId, pack: GoodsId) -> f64 {
        self.cost(tech)
            .iter()
            .find(|entry| entry.goods == pack)
            .map_or(0.0, |entry| entry.amount)
    }

    /// Technologies that never became ready, in id order.
    pub fn unprocessed(&self) -> &[TechId] {
        &self.unprocessed
    }

    /// The required pack unlocked by the latest milestone. On equal rank
    /// the earlier catalogue entry wins.
    pub fn max_technology_ingredient(
        &self,
        tech: TechId,
        milestones: &dyn MilestoneOrder,
    ) -> Option<GoodsAmount> {
        let mut best: Option<(GoodsAmount, u32)> = None;
        for entry in self.cost(tech) {
            let rank = milestones.milestone_rank(entry.goods);
            match best {
                Some((_, best_rank)) if rank <= best_rank => {}
                _ => best = Some((*entry, rank)),
            }
        }
        best.map(|(entry, _)| entry)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use ratio_core::database::{DatabaseBuilder, GoodsKind, TechnologyDef};
    use std::collections::BTreeSet;

    type TechSpec = (u64, u8, u8, u8);

    /// Technology `i` requires every earlier `j` whose bit is set in its
    /// mask. Amounts are small integers so sums are exact.
    fn build(specs: &[TechSpec]) -> Database {
        let mut b = DatabaseBuilder::new();
        let red = b.register_goods("red", GoodsKind::Item);
        let green = b.register_goods("green", GoodsKind::Item);
        for (i, &(mask, r, g, count)) in specs.iter().enumerate() {
            let prerequisites = (0..i)
                .filter(|j| mask & (1 << j) != 0)
                .map(|j| TechId(j as u32))
                .collect();
            let mut ingredients = Vec::new();
            if r > 0 {
                ingredients.push(GoodsAmount::new(red, r as f64));
            }
            if g > 0 {
                ingredients.push(GoodsAmount::new(green, g as f64));
            }
            b.register_technology(TechnologyDef {
                name: format!("tech_{i}"),
                prerequisites,
                ingredients,
                count: count as f64 + 1.0,
            });
        }
        b.build().unwrap()
    }

    fn ancestors_of(db: &Database, tech: TechId, out: &mut BTreeSet<TechId>) {
        if out.insert(tech) {
            for &p in &db.technology(tech).unwrap().prerequisites {
                ancestors_of(db, p, out);
            }
        }
    }

    fn specs() -> impl Strategy<Value = Vec<TechSpec>> {
        prop::collection::vec((any::<u64>(), 0u8..4, 0u8..4, 0u8..50), 1..24)
    }

    proptest! {
        #[test]
        fn cost_dominates_every_prerequisite(specs in specs()) {
            let db = build(&specs);
            let science = TechnologyScience::compute(&db);
            for (tech, def) in db.technologies() {
                for &prereq in &def.prerequisites {
                    for &pack in science.science_packs() {
                        prop_assert!(
                            science.total_cost(tech, pack) >= science.total_cost(prereq, pack)
                        );
                    }
                }
            }
        }

        #[test]
        fn cost_equals_sum_over_distinct_ancestors(specs in specs()) {
            let db = build(&specs);
            let science = TechnologyScience::compute(&db);
            prop_assert!(science.unprocessed().is_empty());
            for (tech, _) in db.technologies() {
                let mut set = BTreeSet::new();
                ancestors_of(&db, tech, &mut set);
                for &pack in science.science_packs() {
                    let expected: f64 = set
                        .iter()
                        .map(|&a| {
                            let def = db.technology(a).unwrap();
                            def.ingredients
                                .iter()
                                .filter(|e| e.goods == pack)
                                .map(|e| e.amount * def.count)
                                .sum::<f64>()
                        })
                        .sum();
                    prop_assert_eq!(science.total_cost(tech, pack), expected);
                }
            }
        }
    }
}

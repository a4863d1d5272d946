//! Production links: per-table balance constraints on one goods type.

use std::ops::BitOr;

use ratio_core::id::GoodsId;
use serde::{Deserialize, Serialize};

use crate::model::{RowId, TableId};

/// How a link's target may be missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkAlgorithm {
    /// Net production equals the target.
    #[default]
    Match,
    /// Net production may exceed the target.
    AllowOverProduction,
    /// Net production may fall short of the target.
    AllowOverConsumption,
}

impl LinkAlgorithm {
    /// The admissible range of net production for `target`.
    pub fn bounds(self, target: f64) -> (f64, f64) {
        match self {
            LinkAlgorithm::Match => (target, target),
            LinkAlgorithm::AllowOverProduction => (target, f64::INFINITY),
            LinkAlgorithm::AllowOverConsumption => (f64::NEG_INFINITY, target),
        }
    }

    /// Whether a shortfall needs a slack variable.
    pub(crate) fn needs_deficit(self) -> bool {
        matches!(self, LinkAlgorithm::Match | LinkAlgorithm::AllowOverProduction)
    }

    /// Whether an excess needs a slack variable.
    pub(crate) fn needs_surplus(self) -> bool {
        matches!(self, LinkAlgorithm::Match | LinkAlgorithm::AllowOverConsumption)
    }
}

/// Diagnostic flags recomputed on every solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LinkFlags(u8);

impl LinkFlags {
    pub const NONE: Self = Self(0);
    pub const NOT_MATCHED: Self = Self(1 << 0);
    /// Part of a feedback loop that could not be balanced.
    pub const RECURSIVE_NOT_MATCHED: Self = Self(1 << 1);
    pub const HAS_CONSUMPTION: Self = Self(1 << 2);
    pub const HAS_PRODUCTION: Self = Self(1 << 3);
    /// A nested table failed to balance this goods.
    pub const CHILD_NOT_MATCHED: Self = Self(1 << 4);
    pub const HAS_PRODUCTION_AND_CONSUMPTION: Self = Self((1 << 2) | (1 << 3));

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for LinkFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A balance constraint on `goods` within one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionLink {
    pub(crate) owner: TableId,
    pub(crate) goods: GoodsId,
    pub(crate) amount: f64,
    pub(crate) algorithm: LinkAlgorithm,

    pub(crate) flags: LinkFlags,
    pub(crate) link_flow: f64,
    pub(crate) not_matched_flow: f64,
    pub(crate) captured_recipes: Vec<RowId>,
    pub(crate) dual_value: f64,
}

impl ProductionLink {
    pub(crate) fn new(owner: TableId, goods: GoodsId) -> Self {
        Self {
            owner,
            goods,
            amount: 0.0,
            algorithm: LinkAlgorithm::Match,
            flags: LinkFlags::NONE,
            link_flow: 0.0,
            not_matched_flow: 0.0,
            captured_recipes: Vec::new(),
            dual_value: 0.0,
        }
    }

    pub fn owner(&self) -> TableId {
        self.owner
    }

    pub fn goods(&self) -> GoodsId {
        self.goods
    }

    /// Target net production, in units per second.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn algorithm(&self) -> LinkAlgorithm {
        self.algorithm
    }

    pub fn flags(&self) -> LinkFlags {
        self.flags
    }

    /// Total production flowing through the link.
    pub fn link_flow(&self) -> f64 {
        self.link_flow
    }

    /// Net production minus the target. Positive is excess, negative is
    /// shortfall; zero when the link is matched.
    pub fn not_matched_flow(&self) -> f64 {
        self.not_matched_flow
    }

    /// Rows whose recipe produces or consumes the linked goods.
    pub fn captured_recipes(&self) -> &[RowId] {
        &self.captured_recipes
    }

    /// Change in building count when the target is raised by one unit.
    ///
    /// A marginal cost, so it is not rescaled with a collapsed subgroup:
    /// inside one it is measured on the subgroup's single-execution profile,
    /// while [`link_flow`](Self::link_flow) and
    /// [`not_matched_flow`](Self::not_matched_flow) are absolute.
    pub fn dual_value(&self) -> f64 {
        self.dual_value
    }

    pub fn is_unmatched(&self) -> bool {
        self.flags
            .intersects(LinkFlags::NOT_MATCHED | LinkFlags::RECURSIVE_NOT_MATCHED)
    }

    pub(crate) fn reset_computed(&mut self) {
        self.flags = LinkFlags::NONE;
        self.link_flow = 0.0;
        self.not_matched_flow = 0.0;
        self.captured_recipes.clear();
        self.dual_value = 0.0;
    }

    pub(crate) fn state(&self) -> LinkState {
        LinkState {
            amount: self.amount,
            algorithm: self.algorithm,
        }
    }
}

/// The editable part of a link, as captured in a memento.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    pub amount: f64,
    pub algorithm: LinkAlgorithm,
}

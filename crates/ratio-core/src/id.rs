use serde::{Deserialize, Serialize};

/// Identifies a goods type (item or fluid) in the database. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GoodsId(pub u32);

/// Identifies a recipe in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Identifies a processing entity (crafter) in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Identifies a module in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

/// Identifies a beacon in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeaconId(pub u32);

/// Identifies a technology in the database. Also a dense ordinal: technology
/// `TechId(n)` is the `n`-th registered technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TechId(pub u32);

impl TechId {
    /// Dense index usable for bitsets and per-technology vectors.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

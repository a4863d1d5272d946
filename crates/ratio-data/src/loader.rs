//! Turns a directory of game data into a [`Database`].
//!
//! Each data set (`goods`, `recipes`, ...) lives in one file written in RON,
//! TOML or JSON. Definitions refer to each other by name; [`load_database`]
//! registers them in dependency order and resolves every name to its id.
//! [`load_settings`] reads the optional solve settings next to them.

use ratio_core::database::{
    Database, DatabaseBuilder, DatabaseError, EntityDef, GoodsAmount, ModuleSpec, TechnologyDef,
};
use ratio_core::id::{GoodsId, ModuleId, TechId};
use ratio_table::SolveSettings;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::schema::{
    AmountData, BeaconData, EntityData, GoodsData, ModuleData, RecipeData, TechnologyData,
    effects_mask,
};

/// Base names of the data files, without extension.
pub const GOODS_FILE: &str = "goods";
pub const RECIPES_FILE: &str = "recipes";
pub const ENTITIES_FILE: &str = "entities";
pub const MODULES_FILE: &str = "modules";
pub const BEACONS_FILE: &str = "beacons";
pub const TECHNOLOGIES_FILE: &str = "technologies";
pub const SETTINGS_FILE: &str = "settings";

// ===========================================================================
// Errors
// ===========================================================================

/// Why a data directory could not be turned into a database.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("missing data file '{file}' (.ron, .toml or .json) in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("{file} is not a RON, TOML or JSON data file")]
    UnsupportedFormat { file: PathBuf },

    /// The same data set is given in two formats.
    #[error("{a} and {b} both define the same data set")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("cannot parse {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A definition names goods, a module or a technology that does not exist.
    #[error("{file}: no {expected_kind} named '{name}'")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("{file}: '{name}' is defined twice")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved definitions failed database validation.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats
// ===========================================================================

/// Data file encodings, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }

    fn parse<T: DeserializeOwned>(self, path: &Path, text: &str) -> Result<T, DataLoadError> {
        match self {
            Format::Ron => ron::from_str(text).map_err(|e| parse_error(path, e)),
            Format::Toml => toml::from_str(text).map_err(|e| parse_error(path, e)),
            Format::Json => serde_json::from_str(text).map_err(|e| parse_error(path, e)),
        }
    }
}

/// The format a data file is written in, from its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .into_iter()
        .find(|f| Some(f.extension()) == ext)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

// ===========================================================================
// Discovery
// ===========================================================================

/// The file holding data set `name` in `dir`, in whichever format it was
/// written. A data set given in more than one format is rejected.
pub fn find_data_file(dir: &Path, name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut present = Format::ALL
        .into_iter()
        .map(|f| dir.join(format!("{name}.{}", f.extension())))
        .filter(|path| path.is_file());
    let first = present.next();
    if let (Some(a), Some(b)) = (&first, present.next()) {
        return Err(DataLoadError::ConflictingFormats {
            a: a.clone(),
            b,
        });
    }
    Ok(first)
}

/// [`find_data_file`] for a data set the database cannot do without.
pub fn require_data_file(dir: &Path, name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Parsing
// ===========================================================================

/// Parse a whole data file.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    format.parse(path, &std::fs::read_to_string(path)?)
}

/// Parse a file of definitions. RON and JSON files hold a bare list; TOML
/// has no top-level arrays, so its list sits under `key` (`[[goods]]`).
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let mut table: toml::Table = deserialize_file(path)?;
    let Some(list) = table.remove(key) else {
        return Err(parse_error(path, format!("expected a [[{key}]] list")));
    };
    list.try_into().map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Names
// ===========================================================================

/// The id registered under `name`.
pub fn resolve_name<'a, V>(
    ids: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    ids.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Reject a second definition of `name`.
pub fn check_duplicate<V>(
    ids: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if ids.contains_key(name) {
        return Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        });
    }
    Ok(())
}

fn resolve_amounts(
    goods: &HashMap<String, GoodsId>,
    entries: &[AmountData],
    file: &Path,
) -> Result<Vec<GoodsAmount>, DataLoadError> {
    entries
        .iter()
        .map(|entry| {
            let id = resolve_name(goods, entry.name(), file, "goods")?;
            Ok(GoodsAmount::new(*id, entry.amount()))
        })
        .collect()
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Load a list file. Optional files that are absent yield an empty list.
fn load_list<T: DeserializeOwned>(
    dir: &Path,
    base_name: &str,
    required: bool,
) -> Result<(Vec<T>, PathBuf), DataLoadError> {
    let path = if required {
        Some(require_data_file(dir, base_name)?)
    } else {
        find_data_file(dir, base_name)?
    };
    match path {
        Some(path) => {
            let list = deserialize_list(&path, base_name)?;
            debug!(file = %path.display(), entries = list.len(), "read data file");
            Ok((list, path))
        }
        None => Ok((Vec::new(), dir.join(base_name))),
    }
}

/// Load the reference database from `dir`.
///
/// `goods` and `recipes` files are required; `entities`, `modules`,
/// `beacons` and `technologies` are optional. Definitions refer to each
/// other by name, and technologies may name prerequisites defined later in
/// the same file.
pub fn load_database(dir: &Path) -> Result<Database, DataLoadError> {
    let mut b = DatabaseBuilder::new();

    // -- Goods --
    let (goods, path) = load_list::<GoodsData>(dir, GOODS_FILE, true)?;
    let mut goods_ids: HashMap<String, GoodsId> = HashMap::new();
    for g in &goods {
        check_duplicate(&goods_ids, &g.name, &path)?;
        let id = b.register_fuel(&g.name, g.kind.into(), g.fuel_value);
        goods_ids.insert(g.name.clone(), id);
    }

    // -- Modules --
    let (modules, path) = load_list::<ModuleData>(dir, MODULES_FILE, false)?;
    let mut module_ids: HashMap<String, ModuleId> = HashMap::new();
    for m in &modules {
        check_duplicate(&module_ids, &m.name, &path)?;
        let spec = ModuleSpec {
            speed: m.speed,
            productivity: m.productivity,
            consumption: m.consumption,
            pollution: m.pollution,
        };
        module_ids.insert(m.name.clone(), b.register_module(&m.name, spec));
    }

    // -- Beacons --
    let (beacons, path) = load_list::<BeaconData>(dir, BEACONS_FILE, false)?;
    let mut beacon_names = HashMap::new();
    for beacon in &beacons {
        check_duplicate(&beacon_names, &beacon.name, &path)?;
        let id = b.register_beacon(&beacon.name, beacon.module_slots, beacon.efficiency);
        beacon_names.insert(beacon.name.clone(), id);
    }

    // -- Entities --
    let (entities, path) = load_list::<EntityData>(dir, ENTITIES_FILE, false)?;
    let mut entity_names = HashMap::new();
    for e in &entities {
        check_duplicate(&entity_names, &e.name, &path)?;
        let id = b.register_entity(EntityDef {
            name: e.name.clone(),
            crafting_speed: e.crafting_speed,
            module_slots: e.module_slots,
            allowed_effects: effects_mask(e.allowed_effects.as_deref()),
            energy_usage: e.energy_usage,
        });
        entity_names.insert(e.name.clone(), id);
    }

    // -- Recipes --
    let (recipes, path) = load_list::<RecipeData>(dir, RECIPES_FILE, true)?;
    let mut recipe_names = HashMap::new();
    for r in &recipes {
        check_duplicate(&recipe_names, &r.name, &path)?;
        let ingredients = resolve_amounts(&goods_ids, &r.ingredients, &path)?;
        let products = resolve_amounts(&goods_ids, &r.products, &path)?;
        let id = b.register_recipe(&r.name, ingredients, products, r.time);
        recipe_names.insert(r.name.clone(), id);

        if let Some(allowed) = &r.allowed_modules {
            let ids = allowed
                .iter()
                .map(|name| resolve_name(&module_ids, name, &path, "module").copied())
                .collect::<Result<Vec<_>, _>>()?;
            b.mutate_recipe(&r.name, |def| def.allowed_modules = Some(ids))?;
        }
    }

    // -- Technologies --
    let (technologies, path) = load_list::<TechnologyData>(dir, TECHNOLOGIES_FILE, false)?;
    let mut tech_ids: HashMap<String, TechId> = HashMap::new();
    for (i, t) in technologies.iter().enumerate() {
        check_duplicate(&tech_ids, &t.name, &path)?;
        tech_ids.insert(t.name.clone(), TechId(i as u32));
    }
    for t in &technologies {
        let prerequisites = t
            .prerequisites
            .iter()
            .map(|name| resolve_name(&tech_ids, name, &path, "technology").copied())
            .collect::<Result<Vec<_>, _>>()?;
        let ingredients = resolve_amounts(&goods_ids, &t.ingredients, &path)?;
        b.register_technology(TechnologyDef {
            name: t.name.clone(),
            prerequisites,
            ingredients,
            count: t.count,
        });
    }

    let db = b.build()?;
    info!(
        dir = %dir.display(),
        goods = db.goods_count(),
        recipes = db.recipe_count(),
        technologies = db.technology_count(),
        "loaded reference database"
    );
    Ok(db)
}

/// Load solve settings from `settings.{ron,toml,json}` in `dir`. A missing
/// file yields the defaults, and a file only needs to name the values it
/// overrides.
pub fn load_settings(dir: &Path) -> Result<SolveSettings, DataLoadError> {
    match find_data_file(dir, SETTINGS_FILE)? {
        Some(path) => {
            let settings: SolveSettings = deserialize_file(&path)?;
            info!(file = %path.display(), "loaded solve settings");
            Ok(settings)
        }
        None => Ok(SolveSettings::default()),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

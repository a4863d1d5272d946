//! Cross-crate pipeline: data files on disk are loaded into a reference
//! database, planned through a production table and analysed for science
//! cost.

use std::fs;
use std::path::{Path, PathBuf};

use ratio_data::{load_database, load_settings};
use ratio_solver::SolveStatus;
use ratio_table::{
    LinkAlgorithm, LinkFlags, ModuleFillerParameters, ModuleTemplate, ProductionModel,
};
use ratio_tech::{MilestoneList, TechnologyScience};

fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ratio_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = fs::remove_dir_all(dir);
}

/// A small red/green science world split across all three formats.
fn write_world(dir: &Path) {
    fs::write(
        dir.join("goods.ron"),
        r#"[
            (name: "iron_ore"),
            (name: "copper_ore"),
            (name: "iron_plate"),
            (name: "copper_plate"),
            (name: "gear"),
            (name: "coal", fuel_value: 4000000.0),
            (name: "red_science"),
            (name: "green_science"),
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("recipes.ron"),
        r#"[
            (name: "smelt_iron", time: 3.2,
             ingredients: [("iron_ore", 1.0)], products: [("iron_plate", 1.0)]),
            (name: "smelt_copper", time: 3.2,
             ingredients: [("copper_ore", 1.0)], products: [("copper_plate", 1.0)]),
            (name: "gear", time: 0.5,
             ingredients: [("iron_plate", 2.0)], products: [("gear", 1.0)]),
            (name: "red_science", time: 5.0,
             ingredients: [("copper_plate", 1.0), ("gear", 1.0)],
             products: [("red_science", 1.0)]),
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("entities.toml"),
        r#"
[[entities]]
name = "assembler"
crafting_speed = 0.75
module_slots = 4
energy_usage = 150000.0

[[entities]]
name = "stone_furnace"
crafting_speed = 1.0
energy_usage = 90000.0
"#,
    )
    .unwrap();
    fs::write(
        dir.join("modules.json"),
        r#"[{"name": "speed_module", "speed": 0.2, "consumption": 0.5}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("technologies.json"),
        r#"[
            {"name": "automation", "ingredients": [["red_science", 1.0]], "count": 10.0},
            {"name": "logistics", "ingredients": [["red_science", 1.0]], "count": 20.0},
            {"name": "logistic_science", "prerequisites": ["automation", "logistics"],
             "ingredients": [["red_science", 1.0]], "count": 75.0},
            {"name": "steel", "prerequisites": ["automation", "logistic_science"],
             "ingredients": [["red_science", 1.0], ["green_science", 1.0]], "count": 50.0}
        ]"#,
    )
    .unwrap();
    fs::write(dir.join("settings.toml"), "tolerance = 0.0001\n").unwrap();
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn loaded_world_plans_red_science() {
    let dir = make_test_dir("plan");
    write_world(&dir);
    let db = load_database(&dir).unwrap();
    let settings = load_settings(&dir).unwrap();
    assert_eq!(settings.tolerance, 1e-4);

    let id = |name: &str| db.recipe_id(name).unwrap();
    let goods = |name: &str| db.goods_id(name).unwrap();
    let assembler = db.entity_id("assembler").unwrap();
    let furnace = db.entity_id("stone_furnace").unwrap();

    let mut model = ProductionModel::new();
    let root = model.root();
    let red = model.add_recipe(&db, root, id("red_science")).unwrap();
    let gear = model.add_recipe(&db, root, id("gear")).unwrap();
    let iron = model.add_recipe(&db, root, id("smelt_iron")).unwrap();
    let copper = model.add_recipe(&db, root, id("smelt_copper")).unwrap();
    for row in [red, gear] {
        model.set_entity(&db, row, Some(assembler)).unwrap();
    }
    for row in [iron, copper] {
        model.set_entity(&db, row, Some(furnace)).unwrap();
        model.set_fuel(&db, row, Some(goods("coal"))).unwrap();
    }

    let target = model.add_link(&db, root, goods("red_science")).unwrap();
    model.set_link_amount(target, 1.0).unwrap();
    for name in ["gear", "iron_plate", "copper_plate"] {
        model.add_link(&db, root, goods(name)).unwrap();
    }
    // Coal comes from outside the sheet, up to 1000 per second.
    let coal = model.add_link(&db, root, goods("coal")).unwrap();
    model
        .set_link_algorithm(coal, LinkAlgorithm::AllowOverProduction)
        .unwrap();
    model.set_link_amount(coal, -1000.0).unwrap();

    let summary = model.solve(&db, &settings);
    assert_eq!(summary.status, SolveStatus::Optimal);
    assert_eq!(summary.unmatched_links, 0);

    let rate = |row| model.row(row).unwrap().recipes_per_second();
    assert!(close(rate(red), 1.0));
    assert!(close(rate(gear), 1.0));
    assert!(close(rate(iron), 2.0));
    assert!(close(rate(copper), 1.0));
    assert!(close(model.row(red).unwrap().building_count(), 5.0 / 0.75));

    let coal_link = model.link(coal).unwrap();
    assert!(!coal_link.is_unmatched());
    assert!(coal_link.flags().contains(LinkFlags::HAS_CONSUMPTION));
    assert_eq!(coal_link.captured_recipes(), &[iron, copper]);
    assert!(close(model.link(target).unwrap().link_flow(), 1.0));

    cleanup(&dir);
}

#[test]
fn modules_from_data_speed_up_assemblers() {
    let dir = make_test_dir("modules");
    write_world(&dir);
    let db = load_database(&dir).unwrap();
    let speed = db.module_id("speed_module").unwrap();

    let mut model = ProductionModel::new();
    let root = model.root();
    let red = model
        .add_recipe(&db, root, db.recipe_id("red_science").unwrap())
        .unwrap();
    model
        .set_entity(&db, red, Some(db.entity_id("assembler").unwrap()))
        .unwrap();
    model
        .set_modules(&db, red, Some(ModuleTemplate::single(speed)))
        .unwrap();
    let link = model
        .add_link(&db, root, db.goods_id("red_science").unwrap())
        .unwrap();
    model.set_link_amount(link, 2.0).unwrap();

    let settings = load_settings(&dir).unwrap();
    model.solve(&db, &settings);
    let row = model.row(red).unwrap();
    assert!(close(row.parameters().effects.speed_mod(), 1.8));
    assert!(close(row.building_count(), 2.0 * 5.0 / (0.75 * 1.8)));

    // The same modules picked automatically by the sheet's filler.
    model.remove_fixed_modules(red).unwrap();
    model.solve(&db, &settings);
    assert!(close(model.row(red).unwrap().parameters().effects.speed_mod(), 1.0));

    let filler = ModuleFillerParameters {
        fill_module: Some(speed),
        ..Default::default()
    };
    model.set_table_modules(&db, root, Some(filler)).unwrap();
    model.solve(&db, &settings);
    let row = model.row(red).unwrap();
    assert!(close(row.parameters().effects.speed_mod(), 1.8));
    assert!(close(row.building_count(), 2.0 * 5.0 / (0.75 * 1.8)));

    cleanup(&dir);
}

#[test]
fn loaded_technologies_propagate_science() {
    let dir = make_test_dir("tech");
    write_world(&dir);
    let db = load_database(&dir).unwrap();
    let science = TechnologyScience::compute(&db);

    let red = db.goods_id("red_science").unwrap();
    let green = db.goods_id("green_science").unwrap();
    let steel = db.technology_id("steel").unwrap();

    // automation is reached both directly and via logistic_science.
    assert_eq!(science.total_cost(steel, red), 50.0 + 75.0 + 10.0 + 20.0);
    assert_eq!(science.total_cost(steel, green), 50.0);
    assert_eq!(science.science_packs(), &[red, green]);

    let milestones = MilestoneList(science.science_packs().to_vec());
    let gate = science.max_technology_ingredient(steel, &milestones).unwrap();
    assert_eq!(gate.goods, green);

    cleanup(&dir);
}

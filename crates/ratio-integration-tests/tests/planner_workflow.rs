//! Editor-style workflows on the shared sample database: edit, solve,
//! undo through mementos, and nest lines in subgroups.

use ratio_core::test_utils::*;
use ratio_solver::SolveStatus;
use ratio_table::{ModuleTemplate, ProductionModel, SolveSettings};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn solve(model: &mut ProductionModel, db: &ratio_core::database::Database) -> SolveStatus {
    model.solve(db, &SolveSettings::default()).status
}

#[test]
fn undo_restores_solved_building_count() {
    let db = sample_database();
    let mut model = ProductionModel::new();
    let root = model.root();
    let row = model.add_recipe(&db, root, gear_recipe()).unwrap();
    model.set_entity(&db, row, Some(assembler())).unwrap();
    let link = model.add_link(&db, root, gear()).unwrap();
    model.set_link_amount(link, 3.0).unwrap();

    assert_eq!(solve(&mut model, &db), SolveStatus::Optimal);
    let before = model.row(row).unwrap().building_count();

    let row_memento = model.capture_row(row).unwrap();
    let link_memento = model.capture_link(link).unwrap();
    model
        .set_modules(&db, row, Some(ModuleTemplate::single(speed_module())))
        .unwrap();
    model.set_link_amount(link, 6.0).unwrap();
    solve(&mut model, &db);
    assert!(!close(model.row(row).unwrap().building_count(), before));

    model.restore_row(&row_memento).unwrap();
    model.restore_link(&link_memento).unwrap();
    solve(&mut model, &db);
    assert!(close(model.row(row).unwrap().building_count(), before));
    assert!(model.row(row).unwrap().modules().is_none());
    assert_eq!(model.link(link).unwrap().amount(), 3.0);
}

#[test]
fn expanding_a_subgroup_detaches_it_from_parent_demand() {
    let db = sample_database();
    let mut model = ProductionModel::new();
    let root = model.root();
    let red = model.add_recipe(&db, root, red_science_recipe()).unwrap();
    let sub = model.create_subgroup(red).unwrap();
    let gears = model.add_recipe(&db, sub, gear_recipe()).unwrap();
    model.add_link(&db, sub, gear()).unwrap();
    let target = model.add_link(&db, root, red_science()).unwrap();
    model.set_link_amount(target, 2.0).unwrap();

    // Collapsed: the parent link drives the whole nested line.
    model.set_expanded(sub, false).unwrap();
    assert_eq!(solve(&mut model, &db), SolveStatus::Optimal);
    assert!(close(model.row(red).unwrap().recipes_per_second(), 2.0));
    assert!(close(model.row(gears).unwrap().recipes_per_second(), 2.0));
    assert!(!model.link(target).unwrap().is_unmatched());

    // Expanded: the subgroup balances itself and idles; the parent falls short.
    model.set_expanded(sub, true).unwrap();
    assert_eq!(solve(&mut model, &db), SolveStatus::Optimal);
    assert!(close(model.row(red).unwrap().recipes_per_second(), 0.0));
    let link = model.link(target).unwrap();
    assert!(link.is_unmatched());
    assert!(close(link.not_matched_flow(), -2.0));
}

#[test]
fn removing_owner_drops_nested_rows() {
    let db = sample_database();
    let mut model = ProductionModel::new();
    let root = model.root();
    let green = model.add_recipe(&db, root, green_science_recipe()).unwrap();
    let sub = model.create_subgroup(green).unwrap();
    model.add_recipe(&db, sub, circuit_recipe()).unwrap();
    model.add_recipe(&db, sub, cable_recipe()).unwrap();
    assert_eq!(model.rows_recursive(root).len(), 3);

    model.remove_row(green).unwrap();
    assert_eq!(model.row_count(), 0);
    assert!(model.table(sub).is_none());
    assert_eq!(solve(&mut model, &db), SolveStatus::Optimal);
}

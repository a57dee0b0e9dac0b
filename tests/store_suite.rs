use std::collections::HashSet;

use proptest::prelude::*;
use swimlane_flow::audit::Action;
use swimlane_flow::layout::{lane_geometry, pixel_from_row, position_of_step};
use swimlane_flow::{
    CommandError, Config, ConnectionPatch, Endpoints, LanePatch, Marker, Orientation, PhasePatch,
    SelectionTarget, StepKind, StepPatch, Store,
};

fn lane_ids(store: &Store) -> Vec<String> {
    store
        .diagram()
        .lanes_by_order()
        .into_iter()
        .map(|lane| lane.id.clone())
        .collect()
}

fn step_ids_in(store: &Store, lane_id: &str) -> Vec<String> {
    store
        .diagram()
        .steps_in_lane(lane_id)
        .into_iter()
        .map(|step| step.id.clone())
        .collect()
}

fn assert_lane_orders_dense(store: &Store) {
    let mut orders: Vec<u32> = store.diagram().lanes.iter().map(|lane| lane.order).collect();
    orders.sort_unstable();
    let expected: Vec<u32> = (0..orders.len() as u32).collect();
    assert_eq!(orders, expected);
}

fn assert_no_duplicate_connections(store: &Store) {
    let mut seen = HashSet::new();
    for conn in &store.diagram().connections {
        assert!(seen.insert(conn.key()), "duplicate connection {conn:?}");
    }
}

/// Applies one command, then checks that undo and redo restore both sides exactly.
fn assert_undo_redo_inverse(store: &mut Store, apply: impl FnOnce(&mut Store)) {
    let before = store.diagram().clone();
    apply(store);
    let after = store.diagram().clone();
    assert_ne!(before, after, "command did not change the diagram");
    store.undo().expect("undo");
    assert_eq!(store.diagram(), &before);
    store.redo().expect("redo");
    assert_eq!(store.diagram(), &after);
}

#[test]
fn decision_step_lands_on_first_free_row_of_empty_lane() {
    let config = Config::default();
    let mut store = Store::new(config.clone());
    let lanes = lane_ids(&store);
    store.remove_lane(&lanes[2]).unwrap();
    let lane_two = lanes[1].clone();
    for step_id in step_ids_in(&store, &lane_two) {
        store.remove_step(&step_id).unwrap();
    }

    let id = store.add_step(&lane_two, StepKind::Decision).unwrap();
    let diagram = store.diagram();
    let step = diagram.step(&id).unwrap();
    let size = config.layout.step_sizes.get(StepKind::Decision);
    assert_eq!(step.order, 0);
    assert_eq!((step.width, step.height), (size.width, size.height));
    assert_eq!(step.lane_id, lane_two);

    let lane = diagram.lane(&lane_two).unwrap();
    let geometry = lane_geometry(&diagram.lanes, lane, &config.layout);
    let expected = position_of_step(
        geometry,
        diagram.orientation,
        0,
        size.width,
        size.height,
        &config.layout,
    );
    assert_eq!((step.x, step.y), (expected.x, expected.y));
}

#[test]
fn reorder_moves_third_step_to_front() {
    let mut store = Store::default();
    let lane = lane_ids(&store)[0].clone();
    for _ in 0..3 {
        store.add_step(&lane, StepKind::Process).unwrap();
    }
    let old = step_ids_in(&store, &lane);
    assert_eq!(old.len(), 4);

    store.reorder_step(&old[2], 0).unwrap();

    let now = step_ids_in(&store, &lane);
    assert_eq!(now, [old[2].clone(), old[0].clone(), old[1].clone(), old[3].clone()]);
    let orders: Vec<u32> = store
        .diagram()
        .steps_in_lane(&lane)
        .into_iter()
        .map(|step| step.order)
        .collect();
    assert_eq!(orders, [0, 1, 2, 3]);
}

#[test]
fn reorder_clamps_target_index() {
    let mut store = Store::default();
    let lane = lane_ids(&store)[0].clone();
    store.add_step(&lane, StepKind::Process).unwrap();
    let old = step_ids_in(&store, &lane);
    store.reorder_step(&old[0], 99).unwrap();
    assert_eq!(step_ids_in(&store, &lane), [old[1].clone(), old[0].clone()]);
}

#[test]
fn move_step_crosses_lanes_and_pins_row() {
    let config = Config::default();
    let mut store = Store::new(config.clone());
    let lanes = lane_ids(&store);
    let moving = step_ids_in(&store, &lanes[0])[0].clone();
    let occupant = step_ids_in(&store, &lanes[1])[0].clone();

    let (x, y) = {
        let diagram = store.diagram();
        let step = diagram.step(&moving).unwrap();
        let target = diagram.lane(&lanes[1]).unwrap();
        let geometry = lane_geometry(&diagram.lanes, target, &config.layout);
        (
            geometry.center() - step.width / 2.0,
            pixel_from_row(0, step.height, Orientation::Vertical, &config.layout) + 10.0,
        )
    };
    store.move_step(&moving, x, y).unwrap();

    let diagram = store.diagram();
    let moved = diagram.step(&moving).unwrap();
    assert_eq!(moved.lane_id, lanes[1]);
    assert_eq!(moved.order, 0);
    assert_eq!(diagram.step(&occupant).unwrap().order, 1);
    assert!(diagram.steps_in_lane(&lanes[0]).is_empty());

    let expected_y = pixel_from_row(1, diagram.step(&occupant).unwrap().height, Orientation::Vertical, &config.layout);
    assert_eq!(diagram.step(&occupant).unwrap().y, expected_y);
}

#[test]
fn move_step_rejects_non_finite_coordinates() {
    let mut store = Store::default();
    let step = store.diagram().steps[0].id.clone();
    assert!(matches!(
        store.move_step(&step, f64::NAN, 0.0),
        Err(CommandError::Rejected(_))
    ));
    assert!(!store.can_undo());
}

#[test]
fn move_step_up_and_down_swap_neighbours() {
    let mut store = Store::default();
    let lane = lane_ids(&store)[0].clone();
    store.add_step(&lane, StepKind::Process).unwrap();
    let ids = step_ids_in(&store, &lane);

    store.move_step_down(&ids[0]).unwrap();
    assert_eq!(step_ids_in(&store, &lane), [ids[1].clone(), ids[0].clone()]);

    store.move_step_down(&ids[0]).unwrap();
    let diagram = store.diagram();
    assert_eq!(diagram.step(&ids[0]).unwrap().order, 2);
    assert_eq!(diagram.step(&ids[1]).unwrap().order, 0);

    store.move_step_up(&ids[1]).unwrap_err();
    store.move_step_up(&ids[0]).unwrap();
    assert_eq!(store.diagram().step(&ids[0]).unwrap().order, 1);
}

#[test]
fn undo_and_redo_are_exact_inverses() {
    let mut store = Store::default();
    let lanes = lane_ids(&store);
    let first = step_ids_in(&store, &lanes[0])[0].clone();
    let second = step_ids_in(&store, &lanes[1])[0].clone();

    assert_undo_redo_inverse(&mut store, |s| {
        s.rename_diagram("Renamed").unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.add_lane("Extra").unwrap();
    });
    let lane0 = lanes[0].clone();
    assert_undo_redo_inverse(&mut store, |s| {
        s.add_step(&lane0, StepKind::Database).unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.update_lane(
            &lane0,
            LanePatch {
                title: Some("Intake".to_string()),
                width: Some(300.0),
                ..LanePatch::default()
            },
        )
        .unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.update_step(
            &first,
            StepPatch {
                title: Some("Kick off".to_string()),
                height: Some(90.0),
                ..StepPatch::default()
            },
        )
        .unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.change_step_kind(&first, StepKind::LoopStart).unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.insert_row(0).unwrap();
    });
    let mut conn = String::new();
    assert_undo_redo_inverse(&mut store, |s| {
        conn = s.add_connection(Endpoints::new(&first, &second)).unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.update_connection(
            &conn,
            ConnectionPatch {
                label: Some("next".to_string()),
                start_marker: Some(Marker::Dot),
                ..ConnectionPatch::default()
            },
        )
        .unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.reverse_connection(&conn).unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.reorder_lane(&lane0, 2).unwrap();
    });
    assert_undo_redo_inverse(&mut store, |s| {
        s.remove_lane(&lanes[1]).unwrap();
    });
}

#[test]
fn new_command_after_undo_drops_redo_branch() {
    let mut store = Store::default();
    store.rename_diagram("one").unwrap();
    store.undo().unwrap();
    assert!(store.can_redo());
    store.rename_diagram("two").unwrap();
    assert!(!store.can_redo());
    assert_eq!(store.redo(), Err(CommandError::NothingToRedo));
}

#[test]
fn history_capacity_evicts_oldest() {
    let mut config = Config::default();
    config.history.capacity = 2;
    let mut store = Store::new(config);
    for title in ["a", "b", "c"] {
        store.rename_diagram(title).unwrap();
    }
    store.undo().unwrap();
    store.undo().unwrap();
    assert_eq!(store.diagram().title, "a");
    assert!(store.undo().is_err());
}

#[test]
fn duplicate_connections_are_refused() {
    let mut store = Store::default();
    let a = store.diagram().steps[0].id.clone();
    let b = store.diagram().steps[1].id.clone();
    let forward = store.add_connection(Endpoints::new(&a, &b)).unwrap();
    assert_eq!(
        store.add_connection(Endpoints::new(&a, &b)),
        Err(CommandError::DuplicateConnection)
    );
    store
        .add_connection(Endpoints::new(&a, &b).with_handles("right-source", "left-target"))
        .unwrap();
    store.add_connection(Endpoints::new(&b, &a)).unwrap();
    let logged = store.audit().len();

    assert_eq!(
        store.reverse_connection(&forward),
        Err(CommandError::DuplicateConnection)
    );
    assert_eq!(
        store.update_connection_endpoints(&forward, Endpoints::new(&b, &a)),
        Err(CommandError::DuplicateConnection)
    );
    assert_eq!(store.audit().len(), logged);
    assert_no_duplicate_connections(&store);
}

#[test]
fn reversing_translates_handles_and_clears_control() {
    let mut store = Store::default();
    let a = store.diagram().steps[0].id.clone();
    let b = store.diagram().steps[1].id.clone();
    let id = store
        .add_connection(Endpoints::new(&a, &b).with_handles("bottom-source", "top-target"))
        .unwrap();
    store
        .update_connection(
            &id,
            ConnectionPatch {
                control: Some(Some(swimlane_flow::Point { x: 5.0, y: 5.0 })),
                ..ConnectionPatch::default()
            },
        )
        .unwrap();
    store.reverse_connection(&id).unwrap();
    let conn = store.diagram().connection(&id).unwrap();
    assert_eq!((conn.source_id.as_str(), conn.target_id.as_str()), (b.as_str(), a.as_str()));
    assert_eq!(conn.source_handle.as_deref(), Some("top-source"));
    assert_eq!(conn.target_handle.as_deref(), Some("bottom-target"));
    assert!(conn.control.is_none());
}

#[test]
fn connection_patch_is_bounded() {
    let mut store = Store::default();
    let a = store.diagram().steps[0].id.clone();
    let b = store.diagram().steps[1].id.clone();
    let id = store.add_connection(Endpoints::new(&a, &b)).unwrap();
    store
        .update_connection(
            &id,
            ConnectionPatch {
                label: Some("x".repeat(80)),
                marker_size: Some(1000.0),
                end_marker: Some(Marker::None),
                ..ConnectionPatch::default()
            },
        )
        .unwrap();
    let conn = store.diagram().connection(&id).unwrap();
    assert_eq!(conn.label.chars().count(), 50);
    assert_eq!(conn.marker_size, 64.0);
    assert_eq!(conn.end_marker, Marker::None);
}

#[test]
fn removing_steps_and_lanes_cascades() {
    let mut store = Store::default();
    let lanes = lane_ids(&store);
    let a = step_ids_in(&store, &lanes[0])[0].clone();
    let b = step_ids_in(&store, &lanes[1])[0].clone();
    let c = step_ids_in(&store, &lanes[2])[0].clone();
    store.add_connection(Endpoints::new(&a, &b)).unwrap();
    store.add_connection(Endpoints::new(&b, &c)).unwrap();
    store.add_connection(Endpoints::new(&a, &c)).unwrap();

    store.remove_step(&a).unwrap();
    assert_eq!(store.diagram().connections.len(), 1);

    store.remove_lane(&lanes[1]).unwrap();
    let diagram = store.diagram();
    assert!(diagram.step(&b).is_none());
    assert!(diagram.connections.is_empty());
    assert_eq!(diagram.lanes.len(), 2);
    assert_lane_orders_dense(&store);
}

#[test]
fn rows_open_and_close_across_lanes() {
    let mut store = Store::default();
    store.insert_row(0).unwrap();
    assert!(store.diagram().steps.iter().all(|step| step.order == 1));
    assert!(store.remove_row(1).is_err());
    store.remove_row(0).unwrap();
    assert!(store.diagram().steps.iter().all(|step| step.order == 0));
}

#[test]
fn phase_groups_require_occupied_rows() {
    let mut store = Store::default();
    let lane = lane_ids(&store)[0].clone();
    assert!(matches!(
        store.add_phase_group("Setup", 0, 1),
        Err(CommandError::Rejected(_))
    ));
    store.add_step(&lane, StepKind::Process).unwrap();
    let id = store.add_phase_group("Setup", 1, 0).unwrap();
    let group = store.diagram().phase_group(&id).unwrap();
    assert_eq!((group.start_row, group.end_row), (0, 1));

    store
        .update_phase_group(
            &id,
            PhasePatch {
                title: Some("Kickoff".to_string()),
                end_row: Some(0),
                ..PhasePatch::default()
            },
        )
        .unwrap();
    assert_eq!(store.diagram().phase_group(&id).unwrap().title, "Kickoff");
    assert!(
        store
            .update_phase_group(
                &id,
                PhasePatch {
                    end_row: Some(5),
                    ..PhasePatch::default()
                },
            )
            .is_err()
    );
    store.remove_phase_group(&id).unwrap();
    assert!(store.diagram().phase_groups.is_empty());
}

#[test]
fn selection_follows_the_diagram() {
    let mut store = Store::default();
    let lanes = lane_ids(&store);
    let step = step_ids_in(&store, &lanes[0])[0].clone();
    store.select(SelectionTarget::Step(step.clone()), false).unwrap();
    store.select(SelectionTarget::Lane(lanes[2].clone()), true).unwrap();
    assert!(store.selection().contains(&SelectionTarget::Step(step.clone())));

    store.remove_lane(&lanes[0]).unwrap();
    assert!(!store.selection().contains(&SelectionTarget::Step(step)));
    assert!(store.selection().contains(&SelectionTarget::Lane(lanes[2].clone())));

    store.select(SelectionTarget::Lane(lanes[1].clone()), false).unwrap();
    assert_eq!(store.selection().lanes.len(), 1);
    store.clear_selection();
    assert!(store.selection().is_empty());
}

#[test]
fn audit_trail_names_each_command() {
    let mut store = Store::default();
    let lane = store.add_lane("Finance").unwrap();
    store.add_step(&lane, StepKind::File).unwrap();
    store.undo().unwrap();
    store.redo().unwrap();
    let actions: Vec<Action> = store.audit().entries().map(|entry| entry.action).collect();
    assert_eq!(actions, [Action::AddLane, Action::AddStep, Action::Undo, Action::Redo]);

    let export: serde_json::Value =
        serde_json::from_str(&store.export_audit().unwrap()).unwrap();
    assert_eq!(export["count"], 4);
    assert_eq!(export["entries"][1]["payload"]["kind"], "file");
    assert_eq!(export["entries"][0]["targetId"], lane.as_str());
}

#[test]
fn set_diagram_starts_a_fresh_timeline() {
    let mut store = Store::default();
    store.rename_diagram("old").unwrap();
    let mut replacement = Store::default().diagram().clone();
    replacement.title = "replacement".to_string();
    replacement.steps[0].order = 4;

    store.set_diagram(replacement.clone(), true);
    assert!(!store.can_undo());
    assert_eq!(store.diagram().title, "replacement");
    assert_eq!(store.diagram().steps[0].y, replacement.steps[0].y);

    store.set_diagram(replacement.clone(), false);
    assert_ne!(store.diagram().steps[0].y, replacement.steps[0].y);
    assert_eq!(
        store.audit().last().map(|entry| entry.action),
        Some(Action::SetDiagram)
    );
}

#[test]
fn preserved_layout_replaces_positions_of_rows_the_repair_moved() {
    let config = Config::default();
    let mut diagram = Store::default().diagram().clone();
    let lanes: Vec<String> = diagram.lanes_by_order().iter().map(|lane| lane.id.clone()).collect();
    let mut extra = diagram
        .steps
        .iter()
        .find(|step| step.lane_id == lanes[0])
        .cloned()
        .unwrap();
    extra.id = "extra".to_string();
    extra.order = 0;
    diagram.steps.push(extra);
    let kept = diagram
        .steps
        .iter_mut()
        .find(|step| step.lane_id == lanes[1])
        .unwrap();
    kept.y += 7.0;
    let kept = kept.clone();

    let check = |store: &Store| {
        let diagram = store.diagram();
        let first_lane = diagram.steps_in_lane(&lanes[0]);
        assert_eq!(first_lane.iter().map(|step| step.order).collect::<Vec<_>>(), [0, 1]);
        let geometry = lane_geometry(&diagram.lanes, diagram.lane(&lanes[0]).unwrap(), &config.layout);
        for step in first_lane {
            let expected = position_of_step(
                geometry,
                diagram.orientation,
                step.order,
                step.width,
                step.height,
                &config.layout,
            );
            assert_eq!((step.x, step.y), (expected.x, expected.y), "step {}", step.id);
        }
        assert_eq!(diagram.step(&kept.id).unwrap().y, kept.y);
    };

    let mut store = Store::default();
    store.set_diagram(diagram.clone(), true);
    check(&store);
    check(&Store::with_diagram(diagram, config.clone()));
}

#[test]
fn reset_restores_default_diagram() {
    let mut store = Store::default();
    store.add_lane("Extra").unwrap();
    store.reset("Fresh", Orientation::Horizontal);
    let diagram = store.diagram();
    assert_eq!(diagram.title, "Fresh");
    assert_eq!(diagram.orientation, Orientation::Horizontal);
    assert_eq!(diagram.lanes.len(), 3);
    assert!(!store.can_undo());
}

#[derive(Debug, Clone)]
enum LaneOp {
    Add,
    Remove(usize),
    Reorder(usize, usize),
}

fn lane_op() -> impl Strategy<Value = LaneOp> {
    prop_oneof![
        Just(LaneOp::Add),
        (0usize..8).prop_map(LaneOp::Remove),
        (0usize..8, 0usize..8).prop_map(|(from, to)| LaneOp::Reorder(from, to)),
    ]
}

proptest! {
    #[test]
    fn lane_orders_stay_dense(ops in prop::collection::vec(lane_op(), 0..24)) {
        let mut store = Store::default();
        for op in ops {
            let lanes = lane_ids(&store);
            match op {
                LaneOp::Add => {
                    store.add_lane("L").unwrap();
                }
                LaneOp::Remove(idx) if !lanes.is_empty() => {
                    store.remove_lane(&lanes[idx % lanes.len()]).unwrap();
                }
                LaneOp::Reorder(idx, to) if !lanes.is_empty() => {
                    store.reorder_lane(&lanes[idx % lanes.len()], to).unwrap();
                }
                _ => {}
            }
            let mut orders: Vec<u32> = store.diagram().lanes.iter().map(|lane| lane.order).collect();
            orders.sort_unstable();
            prop_assert_eq!(orders, (0..lanes_len(&store)).collect::<Vec<u32>>());
        }
    }
}

fn lanes_len(store: &Store) -> u32 {
    store.diagram().lanes.len() as u32
}

//! Invariant helpers shared by the command store and the importer.
//!
//! These functions mutate a [`Diagram`] in place and restore the model
//! invariants: dense lane orders, unique step rows per lane, derived step
//! positions, no dangling or duplicate connections.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::{Config, LayoutConfig};
use crate::ir::{
    CONNECTION_LABEL_MAX_CHARS, Connection, Diagram, Lane, MARKER_SIZE_DEFAULT, MARKER_SIZE_MAX,
    MARKER_SIZE_MIN, Orientation, Step, StepKind, new_id,
};
use crate::layout;
use crate::theme::Theme;

#[derive(Debug, Clone, PartialEq)]
pub struct StepDefaults {
    pub width: f64,
    pub height: f64,
    pub fill_color: String,
    pub text_color: String,
}

pub fn step_defaults(kind: StepKind, config: &Config) -> StepDefaults {
    let size = config.layout.step_sizes.get(kind);
    let colors = config.theme.kind_colors(kind);
    StepDefaults {
        width: size.width,
        height: size.height,
        fill_color: colors.fill.clone(),
        text_color: colors.text.clone(),
    }
}

pub fn apply_kind_defaults(step: &mut Step, kind: StepKind, config: &Config) {
    let defaults = step_defaults(kind, config);
    step.kind = kind;
    step.width = defaults.width;
    step.height = defaults.height;
    step.fill_color = defaults.fill_color;
    step.text_color = defaults.text_color;
}

/// A step with kind defaults; `x`/`y` stay at zero until the lane is reflowed.
pub fn new_step(lane_id: &str, kind: StepKind, order: u32, config: &Config) -> Step {
    let defaults = step_defaults(kind, config);
    Step {
        id: new_id("step"),
        lane_id: lane_id.to_string(),
        title: kind.default_title().to_string(),
        description: None,
        order,
        x: 0.0,
        y: 0.0,
        width: defaults.width,
        height: defaults.height,
        kind,
        text_color: defaults.text_color,
        fill_color: defaults.fill_color,
    }
}

pub fn new_lane(title: &str, order: u32, config: &Config) -> Lane {
    Lane {
        id: new_id("lane"),
        title: title.to_string(),
        description: None,
        order,
        color: config.theme.lane_color(order as usize),
        width: config.layout.lane_thickness,
    }
}

/// Sorts lanes by their current order (stable), then reassigns `0..n-1` and
/// positional colors.
pub fn normalize_lane_orders(lanes: &mut [Lane], theme: &Theme) {
    lanes.sort_by_key(|lane| lane.order);
    for (position, lane) in lanes.iter_mut().enumerate() {
        lane.order = position as u32;
        lane.color = theme.lane_color(position);
    }
}

/// Shifts later steps forward until no two steps of the lane share an order.
/// The pinned step wins a tie. Returns whether any order changed.
pub fn resolve_order_collisions(diagram: &mut Diagram, lane_id: &str, pinned: Option<&str>) -> bool {
    let is_pinned = |step: &Step| pinned == Some(step.id.as_str());
    let mut indices: Vec<usize> = diagram
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.lane_id == lane_id)
        .map(|(idx, _)| idx)
        .collect();
    indices.sort_by(|&a, &b| {
        let (left, right) = (&diagram.steps[a], &diagram.steps[b]);
        left.order
            .cmp(&right.order)
            .then_with(|| is_pinned(right).cmp(&is_pinned(left)))
            .then_with(|| a.cmp(&b))
    });

    let mut changed = false;
    let mut next_free: Option<u32> = None;
    for idx in indices {
        let step = &mut diagram.steps[idx];
        if let Some(min) = next_free
            && step.order < min
        {
            step.order = min;
            changed = true;
        }
        next_free = Some(step.order.saturating_add(1));
    }
    changed
}

/// Recomputes `x`/`y` of every step in the lane from its order.
pub fn position_lane_steps(diagram: &mut Diagram, lane_id: &str, config: &LayoutConfig) {
    let Some(lane) = diagram.lane(lane_id) else {
        return;
    };
    let geometry = layout::lane_geometry(&diagram.lanes, lane, config);
    let orientation = diagram.orientation;
    for step in diagram.steps.iter_mut().filter(|step| step.lane_id == lane_id) {
        let pos = layout::position_of_step(
            geometry,
            orientation,
            step.order,
            step.width,
            step.height,
            config,
        );
        step.x = pos.x;
        step.y = pos.y;
    }
}

pub fn reflow_lane(diagram: &mut Diagram, lane_id: &str, pinned: Option<&str>, config: &LayoutConfig) {
    resolve_order_collisions(diagram, lane_id, pinned);
    position_lane_steps(diagram, lane_id, config);
}

pub fn reflow_all(diagram: &mut Diagram, config: &LayoutConfig) {
    let lane_ids: Vec<String> = diagram.lanes.iter().map(|lane| lane.id.clone()).collect();
    for lane_id in lane_ids {
        reflow_lane(diagram, &lane_id, None, config);
    }
}

pub fn first_free_row(diagram: &Diagram, lane_id: &str) -> u32 {
    let used: HashSet<u32> = diagram
        .steps
        .iter()
        .filter(|step| step.lane_id == lane_id)
        .map(|step| step.order)
        .collect();
    (0..).find(|row| !used.contains(row)).unwrap_or(0)
}

/// Removes the step and every connection touching it.
pub fn cascade_delete(diagram: &mut Diagram, step_id: &str) -> bool {
    let before = diagram.steps.len();
    diagram.steps.retain(|step| step.id != step_id);
    if diagram.steps.len() == before {
        return false;
    }
    diagram.connections.retain(|conn| !conn.touches(step_id));
    true
}

/// Removes the lane, its steps and every connection touching those steps.
pub fn cascade_delete_lane(diagram: &mut Diagram, lane_id: &str) -> bool {
    let before = diagram.lanes.len();
    diagram.lanes.retain(|lane| lane.id != lane_id);
    if diagram.lanes.len() == before {
        return false;
    }
    let removed: HashSet<String> = diagram
        .steps
        .iter()
        .filter(|step| step.lane_id == lane_id)
        .map(|step| step.id.clone())
        .collect();
    diagram.steps.retain(|step| step.lane_id != lane_id);
    diagram.connections.retain(|conn| {
        !removed.contains(&conn.source_id) && !removed.contains(&conn.target_id)
    });
    true
}

/// True when another connection already uses the candidate's endpoint tuple.
pub fn is_duplicate_connection(diagram: &Diagram, candidate: &Connection) -> bool {
    diagram
        .connections
        .iter()
        .any(|conn| conn.id != candidate.id && conn.key() == candidate.key())
}

pub fn translate_handle(handle: &str) -> String {
    if let Some(side) = handle.strip_suffix("-source") {
        format!("{side}-target")
    } else if let Some(side) = handle.strip_suffix("-target") {
        format!("{side}-source")
    } else {
        handle.to_string()
    }
}

pub fn truncate_label(label: &str) -> String {
    label.chars().take(CONNECTION_LABEL_MAX_CHARS).collect()
}

pub fn clamp_marker_size(size: f64) -> f64 {
    if size.is_finite() {
        size.clamp(MARKER_SIZE_MIN, MARKER_SIZE_MAX)
    } else {
        MARKER_SIZE_DEFAULT
    }
}

/// Every row of the range holds at least one step in some lane.
pub fn phase_group_is_valid(diagram: &Diagram, start_row: u32, end_row: u32) -> bool {
    if start_row > end_row {
        return false;
    }
    let occupied: BTreeSet<u32> = diagram.steps.iter().map(|step| step.order).collect();
    let span = u64::from(end_row - start_row) + 1;
    if span > occupied.len() as u64 {
        return false;
    }
    (start_row..=end_row).all(|row| occupied.contains(&row))
}

/// Opens an empty row at `row` in every lane.
pub fn insert_row(diagram: &mut Diagram, row: u32) {
    for step in diagram.steps.iter_mut().filter(|step| step.order >= row) {
        step.order = step.order.saturating_add(1);
    }
    for group in &mut diagram.phase_groups {
        if group.start_row >= row {
            group.start_row = group.start_row.saturating_add(1);
            group.end_row = group.end_row.saturating_add(1);
        } else if group.end_row >= row {
            group.end_row = group.end_row.saturating_add(1);
        }
    }
}

/// Closes an empty row. Returns false (and changes nothing) when a step occupies it.
pub fn remove_row(diagram: &mut Diagram, row: u32) -> bool {
    if diagram.row_is_occupied(row) {
        return false;
    }
    for step in diagram.steps.iter_mut().filter(|step| step.order > row) {
        step.order -= 1;
    }
    diagram.phase_groups.retain_mut(|group| {
        if group.start_row > row {
            group.start_row -= 1;
            group.end_row -= 1;
        } else if group.contains(row) {
            if group.start_row == group.end_row {
                return false;
            }
            group.end_row -= 1;
        }
        true
    });
    true
}

/// Restores every invariant on a diagram that did not come from the store.
/// Returns the number of entities dropped.
pub fn repair(diagram: &mut Diagram, config: &Config) -> usize {
    let mut dropped = 0;
    normalize_lane_orders(&mut diagram.lanes, &config.theme);

    let lane_ids: HashSet<String> = diagram.lanes.iter().map(|lane| lane.id.clone()).collect();
    let before = diagram.steps.len();
    diagram.steps.retain(|step| lane_ids.contains(&step.lane_id));
    dropped += before - diagram.steps.len();

    let step_ids: HashSet<String> = diagram.steps.iter().map(|step| step.id.clone()).collect();
    let before = diagram.connections.len();
    let mut seen = HashSet::new();
    diagram.connections.retain(|conn| {
        step_ids.contains(&conn.source_id)
            && step_ids.contains(&conn.target_id)
            && seen.insert((
                conn.source_id.clone(),
                conn.target_id.clone(),
                conn.source_handle.clone(),
                conn.target_handle.clone(),
            ))
    });
    dropped += before - diagram.connections.len();

    for group in &mut diagram.phase_groups {
        if group.start_row > group.end_row {
            std::mem::swap(&mut group.start_row, &mut group.end_row);
        }
    }

    let ids: Vec<String> = diagram.lanes.iter().map(|lane| lane.id.clone()).collect();
    for lane_id in ids {
        resolve_order_collisions(diagram, &lane_id, None);
    }
    dropped
}

/// [`repair`] for a diagram whose embedded positions are trusted.
///
/// Steps listed in `unplaced`, steps whose row the repair changed and steps
/// of a lane that was renumbered get positions derived from their order;
/// every other step keeps its `x`/`y`. Returns the number of entities dropped.
pub fn repair_keeping_layout(diagram: &mut Diagram, config: &Config, mut unplaced: HashSet<String>) -> usize {
    let lane_orders: HashMap<String, u32> = diagram
        .lanes
        .iter()
        .map(|lane| (lane.id.clone(), lane.order))
        .collect();
    let step_orders: HashMap<String, u32> = diagram
        .steps
        .iter()
        .map(|step| (step.id.clone(), step.order))
        .collect();
    let dropped = repair(diagram, config);

    let moved_lanes: HashSet<&str> = diagram
        .lanes
        .iter()
        .filter(|lane| lane_orders.get(&lane.id) != Some(&lane.order))
        .map(|lane| lane.id.as_str())
        .collect();
    for step in &diagram.steps {
        if step_orders.get(&step.id) != Some(&step.order) || moved_lanes.contains(step.lane_id.as_str()) {
            unplaced.insert(step.id.clone());
        }
    }
    place_steps(diagram, &unplaced, &config.layout);
    dropped
}

/// Derives positions from `order` for the listed steps only.
pub fn place_steps(diagram: &mut Diagram, ids: &HashSet<String>, config: &LayoutConfig) {
    if ids.is_empty() {
        return;
    }
    let orientation = diagram.orientation;
    for idx in 0..diagram.steps.len() {
        let step = &diagram.steps[idx];
        if !ids.contains(&step.id) {
            continue;
        }
        let Some(lane) = diagram.lane(&step.lane_id) else {
            continue;
        };
        let geometry = layout::lane_geometry(&diagram.lanes, lane, config);
        let pos = layout::position_of_step(
            geometry,
            orientation,
            step.order,
            step.width,
            step.height,
            config,
        );
        let step = &mut diagram.steps[idx];
        step.x = pos.x;
        step.y = pos.y;
    }
}

/// Three lanes holding a start, a process and an end step.
pub fn default_diagram(title: &str, orientation: Orientation, config: &Config) -> Diagram {
    let mut diagram = Diagram::empty(title, orientation);
    let kinds = [StepKind::Start, StepKind::Process, StepKind::End];
    for (position, kind) in kinds.into_iter().enumerate() {
        let lane = new_lane(&format!("Lane {}", position + 1), position as u32, config);
        diagram.steps.push(new_step(&lane.id, kind, 0, config));
        diagram.lanes.push(lane);
    }
    normalize_lane_orders(&mut diagram.lanes, &config.theme);
    reflow_all(&mut diagram, &config.layout);
    diagram
}

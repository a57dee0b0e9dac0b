//! Command store: the single owner of the live [`Diagram`].
//!
//! Every mutating command clones the current diagram, applies its change to
//! the clone, restores the model invariants, stamps `updatedAt`, pushes the
//! pre-mutation diagram onto the undo stack (clearing redo), appends one audit
//! entry and finally swaps the clone in. A command that fails validation
//! returns an error and leaves the store exactly as it was: no mutation, no
//! history entry, no audit entry.

use std::collections::HashSet;

use chrono::Utc;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audit::{Action, AuditLog};
use crate::config::Config;
use crate::error::{CommandError, FormatError, TargetType};
use crate::history::History;
use crate::ir::{Connection, DEFAULT_TITLE, Diagram, Marker, Orientation, PhaseGroup, Point, StepKind, new_id};
use crate::layout;
use crate::model;
use crate::parser;
use crate::render;
use crate::selection::{Selection, SelectionTarget};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_marker: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_marker: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_size: Option<f64>,
    /// `Some(None)` removes the manual bend point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Option<Point>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_row: Option<u32>,
}

/// Endpoints of a connection: step ids plus optional named handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Endpoints {
    pub fn new(source_id: &str, target_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(mut self, source_handle: &str, target_handle: &str) -> Self {
        self.source_handle = Some(source_handle.to_string());
        self.target_handle = Some(target_handle.to_string());
        self
    }
}

struct Target {
    kind: TargetType,
    id: Option<String>,
}

impl Target {
    fn new(kind: TargetType, id: &str) -> Self {
        Self {
            kind,
            id: Some(id.to_string()),
        }
    }
}

fn payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn positive(value: f64, what: &str) -> Result<f64, CommandError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CommandError::rejected(format!("{what} must be a positive number")))
    }
}

fn require_step(diagram: &Diagram, id: &str) -> Result<(), CommandError> {
    match diagram.step(id) {
        Some(_) => Ok(()),
        None => Err(CommandError::not_found(TargetType::Step, id)),
    }
}

fn validate_endpoints(diagram: &Diagram, ends: &Endpoints) -> Result<(), CommandError> {
    require_step(diagram, &ends.source_id)?;
    require_step(diagram, &ends.target_id)
}

#[derive(Debug, Clone)]
pub struct Store {
    diagram: Diagram,
    history: History,
    audit: AuditLog,
    selection: Selection,
    config: Config,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Store {
    /// A store holding the default three-lane diagram.
    pub fn new(config: Config) -> Self {
        let diagram = model::default_diagram(DEFAULT_TITLE, Orientation::Vertical, &config);
        Self::with_diagram(diagram, config)
    }

    /// A store around an existing diagram. Invariants are repaired, embedded
    /// positions are kept, and nothing is written to history or audit.
    pub fn with_diagram(mut diagram: Diagram, config: Config) -> Self {
        model::repair_keeping_layout(&mut diagram, &config, HashSet::new());
        Self {
            diagram,
            history: History::new(config.history.capacity),
            audit: AuditLog::new(config.history.audit_capacity),
            selection: Selection::default(),
            config,
        }
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn export(&self) -> String {
        render::render_document(&self.diagram)
    }

    pub fn export_audit(&self) -> serde_json::Result<String> {
        self.audit.export_json()
    }

    fn execute<T, F>(&mut self, action: Action, args: Value, mutate: F) -> Result<T, CommandError>
    where
        F: FnOnce(&mut Diagram, &Config) -> Result<(T, Target), CommandError>,
    {
        let mut draft = self.diagram.clone();
        let (value, target) = match mutate(&mut draft, &self.config) {
            Ok(applied) => applied,
            Err(err) => {
                trace!(action:?, error:% = err; "command skipped");
                return Err(err);
            }
        };
        draft.updated_at = Utc::now();
        let previous = std::mem::replace(&mut self.diagram, draft);
        self.history.record(previous);
        debug!(action:?, target_id:? = target.id; "command applied");
        self.audit.record(action, target.kind, target.id, Some(args));
        self.selection.retain_existing(&self.diagram);
        Ok(value)
    }

    // ── Diagram ─────────────────────────────────────────────────────

    pub fn rename_diagram(&mut self, title: &str) -> Result<(), CommandError> {
        self.execute(Action::RenameDiagram, json!({ "title": title }), |d, _| {
            d.title = title.to_string();
            Ok(((), Target::new(TargetType::Diagram, &d.id)))
        })
    }

    /// Replaces the whole diagram and starts a fresh timeline.
    ///
    /// Invariants are repaired first. With `preserve_layout` the embedded
    /// step positions are kept for every step the repair left in place;
    /// otherwise every position is recomputed from the logical order.
    pub fn set_diagram(&mut self, mut diagram: Diagram, preserve_layout: bool) {
        let dropped = if preserve_layout {
            model::repair_keeping_layout(&mut diagram, &self.config, HashSet::new())
        } else {
            let dropped = model::repair(&mut diagram, &self.config);
            model::reflow_all(&mut diagram, &self.config.layout);
            dropped
        };
        if dropped > 0 {
            warn!(dropped; "dropped dangling entities while replacing the diagram");
        }
        self.history.clear();
        self.selection.clear();
        let args = json!({
            "preserveLayout": preserve_layout,
            "title": diagram.title,
            "lanes": diagram.lanes.len(),
            "steps": diagram.steps.len(),
            "connections": diagram.connections.len(),
        });
        self.audit.record(
            Action::SetDiagram,
            TargetType::Diagram,
            Some(diagram.id.clone()),
            Some(args),
        );
        self.diagram = diagram;
    }

    /// Parses a text document and applies it with [`Store::set_diagram`].
    /// On a format error the store is not touched.
    pub fn import(&mut self, text: &str, preserve_layout: bool) -> Result<(), FormatError> {
        let diagram = parser::parse_document(text, &self.config)?;
        self.set_diagram(diagram, preserve_layout);
        Ok(())
    }

    pub fn reset(&mut self, title: &str, orientation: Orientation) {
        let diagram = model::default_diagram(title, orientation, &self.config);
        self.history.clear();
        self.selection.clear();
        self.audit.record(
            Action::Reset,
            TargetType::Diagram,
            Some(diagram.id.clone()),
            Some(json!({ "title": title, "orientation": orientation })),
        );
        self.diagram = diagram;
    }

    pub fn undo(&mut self) -> Result<(), CommandError> {
        if !self.history.undo(&mut self.diagram) {
            return Err(CommandError::NothingToUndo);
        }
        self.audit.record(
            Action::Undo,
            TargetType::Diagram,
            Some(self.diagram.id.clone()),
            None,
        );
        self.selection.retain_existing(&self.diagram);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), CommandError> {
        if !self.history.redo(&mut self.diagram) {
            return Err(CommandError::NothingToRedo);
        }
        self.audit.record(
            Action::Redo,
            TargetType::Diagram,
            Some(self.diagram.id.clone()),
            None,
        );
        self.selection.retain_existing(&self.diagram);
        Ok(())
    }

    // ── Lanes ───────────────────────────────────────────────────────

    /// Appends a lane after the last one and returns its id.
    pub fn add_lane(&mut self, title: &str) -> Result<String, CommandError> {
        self.execute(Action::AddLane, json!({ "title": title }), |d, cfg| {
            let lane = model::new_lane(title, d.lanes.len() as u32, cfg);
            let id = lane.id.clone();
            d.lanes.push(lane);
            model::normalize_lane_orders(&mut d.lanes, &cfg.theme);
            model::reflow_all(d, &cfg.layout);
            let target = Target::new(TargetType::Lane, &id);
            Ok((id, target))
        })
    }

    /// Removes a lane with its steps and their connections. Removing the
    /// last lane is allowed here; callers decide whether to offer it.
    pub fn remove_lane(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::RemoveLane, json!({ "id": id }), |d, cfg| {
            if !model::cascade_delete_lane(d, id) {
                return Err(CommandError::not_found(TargetType::Lane, id));
            }
            model::normalize_lane_orders(&mut d.lanes, &cfg.theme);
            model::reflow_all(d, &cfg.layout);
            Ok(((), Target::new(TargetType::Lane, id)))
        })
    }

    pub fn update_lane(&mut self, id: &str, patch: LanePatch) -> Result<(), CommandError> {
        let args = json!({ "id": id, "patch": payload(&patch) });
        self.execute(Action::UpdateLane, args, |d, cfg| {
            let width = patch.width.map(|w| positive(w, "lane width")).transpose()?;
            let lane = d
                .lane_mut(id)
                .ok_or_else(|| CommandError::not_found(TargetType::Lane, id))?;
            if let Some(title) = patch.title {
                lane.title = title;
            }
            if let Some(description) = patch.description {
                lane.description = description;
            }
            if let Some(width) = width {
                lane.width = width;
                model::reflow_all(d, &cfg.layout);
            }
            Ok(((), Target::new(TargetType::Lane, id)))
        })
    }

    /// Moves a lane to `target_index` (clamped) and renumbers every lane.
    pub fn reorder_lane(&mut self, id: &str, target_index: usize) -> Result<(), CommandError> {
        let args = json!({ "id": id, "targetIndex": target_index });
        self.execute(Action::ReorderLane, args, |d, cfg| {
            model::normalize_lane_orders(&mut d.lanes, &cfg.theme);
            let position = d
                .lanes
                .iter()
                .position(|lane| lane.id == id)
                .ok_or_else(|| CommandError::not_found(TargetType::Lane, id))?;
            let lane = d.lanes.remove(position);
            let target = target_index.min(d.lanes.len());
            d.lanes.insert(target, lane);
            for (order, lane) in d.lanes.iter_mut().enumerate() {
                lane.order = order as u32;
            }
            model::normalize_lane_orders(&mut d.lanes, &cfg.theme);
            model::reflow_all(d, &cfg.layout);
            Ok(((), Target::new(TargetType::Lane, id)))
        })
    }

    // ── Steps ───────────────────────────────────────────────────────

    /// Adds a step of `kind` at the first free row of the lane and returns its id.
    pub fn add_step(&mut self, lane_id: &str, kind: StepKind) -> Result<String, CommandError> {
        let args = json!({ "laneId": lane_id, "kind": kind });
        self.execute(Action::AddStep, args, |d, cfg| {
            if d.lane(lane_id).is_none() {
                return Err(CommandError::not_found(TargetType::Lane, lane_id));
            }
            let row = model::first_free_row(d, lane_id);
            let step = model::new_step(lane_id, kind, row, cfg);
            let id = step.id.clone();
            d.steps.push(step);
            model::reflow_lane(d, lane_id, Some(&id), &cfg.layout);
            let target = Target::new(TargetType::Step, &id);
            Ok((id, target))
        })
    }

    pub fn remove_step(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::RemoveStep, json!({ "id": id }), |d, cfg| {
            let lane_id = d
                .step(id)
                .map(|step| step.lane_id.clone())
                .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
            model::cascade_delete(d, id);
            model::reflow_lane(d, &lane_id, None, &cfg.layout);
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    pub fn update_step(&mut self, id: &str, patch: StepPatch) -> Result<(), CommandError> {
        let args = json!({ "id": id, "patch": payload(&patch) });
        self.execute(Action::UpdateStep, args, |d, cfg| {
            let width = patch.width.map(|w| positive(w, "step width")).transpose()?;
            let height = patch.height.map(|h| positive(h, "step height")).transpose()?;
            let step = d
                .step_mut(id)
                .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
            if let Some(title) = patch.title {
                step.title = title;
            }
            if let Some(description) = patch.description {
                step.description = description;
            }
            if let Some(fill) = patch.fill_color {
                step.fill_color = fill;
            }
            if let Some(text) = patch.text_color {
                step.text_color = text;
            }
            if let Some(width) = width {
                step.width = width;
            }
            if let Some(height) = height {
                step.height = height;
            }
            let lane_id = step.lane_id.clone();
            model::reflow_lane(d, &lane_id, Some(id), &cfg.layout);
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    /// Drops a step at pixel position `x`/`y` (its leading corner).
    ///
    /// The lane is the one nearest to the step's center on the cross axis,
    /// the row comes from the primary axis. The moved step keeps the target
    /// row; any previous occupant shifts forward. Both the source and the
    /// destination lane are reflowed.
    pub fn move_step(&mut self, id: &str, x: f64, y: f64) -> Result<(), CommandError> {
        let args = json!({ "id": id, "x": x, "y": y });
        self.execute(Action::MoveStep, args, |d, cfg| {
            if !x.is_finite() || !y.is_finite() {
                return Err(CommandError::rejected("coordinates must be finite"));
            }
            let step = d
                .step(id)
                .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
            let source_lane = step.lane_id.clone();
            let (cross, along, along_size) = match d.orientation {
                Orientation::Vertical => (x + step.width / 2.0, y, step.height),
                Orientation::Horizontal => (y + step.height / 2.0, x, step.width),
            };
            let dest_lane = layout::nearest_lane(&d.lanes, cross, &cfg.layout)
                .map(|lane| lane.id.clone())
                .ok_or_else(|| CommandError::rejected("diagram has no lanes"))?;
            let row = layout::row_from_pixel(along, along_size, d.orientation, &cfg.layout);
            if let Some(step) = d.step_mut(id) {
                step.lane_id = dest_lane.clone();
                step.order = row;
            }
            model::reflow_lane(d, &dest_lane, Some(id), &cfg.layout);
            if source_lane != dest_lane {
                model::reflow_lane(d, &source_lane, None, &cfg.layout);
            }
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    /// Moves a step to `target_index` within its lane and compacts the lane
    /// to orders `0..n-1`.
    pub fn reorder_step(&mut self, id: &str, target_index: usize) -> Result<(), CommandError> {
        let args = json!({ "id": id, "targetIndex": target_index });
        self.execute(Action::ReorderStep, args, |d, cfg| {
            let lane_id = d
                .step(id)
                .map(|step| step.lane_id.clone())
                .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
            let mut ids: Vec<String> = d
                .steps_in_lane(&lane_id)
                .into_iter()
                .map(|step| step.id.clone())
                .filter(|step_id| step_id != id)
                .collect();
            let target = target_index.min(ids.len());
            ids.insert(target, id.to_string());
            for (order, step_id) in ids.iter().enumerate() {
                if let Some(step) = d.step_mut(step_id) {
                    step.order = order as u32;
                }
            }
            model::reflow_lane(d, &lane_id, None, &cfg.layout);
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    pub fn move_step_up(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::MoveStepUp, json!({ "id": id }), |d, cfg| {
            shift_step(d, id, -1, cfg)?;
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    pub fn move_step_down(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::MoveStepDown, json!({ "id": id }), |d, cfg| {
            shift_step(d, id, 1, cfg)?;
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    /// Resets size and colors to the defaults of `kind`.
    pub fn change_step_kind(&mut self, id: &str, kind: StepKind) -> Result<(), CommandError> {
        let args = json!({ "id": id, "kind": kind });
        self.execute(Action::ChangeStepKind, args, |d, cfg| {
            let step = d
                .step_mut(id)
                .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
            model::apply_kind_defaults(step, kind, cfg);
            let lane_id = step.lane_id.clone();
            model::reflow_lane(d, &lane_id, Some(id), &cfg.layout);
            Ok(((), Target::new(TargetType::Step, id)))
        })
    }

    /// Opens an empty row at `row` across every lane.
    pub fn insert_row(&mut self, row: u32) -> Result<(), CommandError> {
        self.execute(Action::InsertRow, json!({ "row": row }), |d, cfg| {
            model::insert_row(d, row);
            model::reflow_all(d, &cfg.layout);
            Ok(((), Target::new(TargetType::Diagram, &d.id)))
        })
    }

    /// Closes `row` when no step occupies it.
    pub fn remove_row(&mut self, row: u32) -> Result<(), CommandError> {
        self.execute(Action::RemoveRow, json!({ "row": row }), |d, cfg| {
            if !model::remove_row(d, row) {
                return Err(CommandError::rejected(format!("row {row} is not empty")));
            }
            model::reflow_all(d, &cfg.layout);
            Ok(((), Target::new(TargetType::Diagram, &d.id)))
        })
    }

    // ── Connections ─────────────────────────────────────────────────

    pub fn add_connection(&mut self, ends: Endpoints) -> Result<String, CommandError> {
        let args = payload(&ends);
        self.execute(Action::AddConnection, args, |d, _| {
            validate_endpoints(d, &ends)?;
            let mut conn = Connection::new(&ends.source_id, &ends.target_id);
            conn.source_handle = ends.source_handle;
            conn.target_handle = ends.target_handle;
            if model::is_duplicate_connection(d, &conn) {
                return Err(CommandError::DuplicateConnection);
            }
            let id = conn.id.clone();
            d.connections.push(conn);
            let target = Target::new(TargetType::Connection, &id);
            Ok((id, target))
        })
    }

    /// Rewires a connection. Any manual bend point is cleared.
    pub fn update_connection_endpoints(
        &mut self,
        id: &str,
        ends: Endpoints,
    ) -> Result<(), CommandError> {
        let args = json!({ "id": id, "endpoints": payload(&ends) });
        self.execute(Action::UpdateConnectionEndpoints, args, |d, _| {
            validate_endpoints(d, &ends)?;
            let mut conn = d
                .connection(id)
                .cloned()
                .ok_or_else(|| CommandError::not_found(TargetType::Connection, id))?;
            conn.source_id = ends.source_id;
            conn.target_id = ends.target_id;
            conn.source_handle = ends.source_handle;
            conn.target_handle = ends.target_handle;
            conn.control = None;
            replace_connection(d, conn)?;
            Ok(((), Target::new(TargetType::Connection, id)))
        })
    }

    /// Swaps source and target; `…-source`/`…-target` handle names are
    /// translated so each end keeps its attachment side.
    pub fn reverse_connection(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::ReverseConnection, json!({ "id": id }), |d, _| {
            let mut conn = d
                .connection(id)
                .cloned()
                .ok_or_else(|| CommandError::not_found(TargetType::Connection, id))?;
            std::mem::swap(&mut conn.source_id, &mut conn.target_id);
            let source_handle = conn.target_handle.as_deref().map(model::translate_handle);
            let target_handle = conn.source_handle.as_deref().map(model::translate_handle);
            conn.source_handle = source_handle;
            conn.target_handle = target_handle;
            conn.control = None;
            replace_connection(d, conn)?;
            Ok(((), Target::new(TargetType::Connection, id)))
        })
    }

    pub fn update_connection(&mut self, id: &str, patch: ConnectionPatch) -> Result<(), CommandError> {
        let args = json!({ "id": id, "patch": payload(&patch) });
        self.execute(Action::UpdateConnection, args, |d, _| {
            let conn = d
                .connection_mut(id)
                .ok_or_else(|| CommandError::not_found(TargetType::Connection, id))?;
            if let Some(label) = patch.label {
                conn.label = model::truncate_label(&label);
            }
            if let Some(marker) = patch.start_marker {
                conn.start_marker = marker;
            }
            if let Some(marker) = patch.end_marker {
                conn.end_marker = marker;
            }
            if let Some(size) = patch.marker_size {
                conn.marker_size = model::clamp_marker_size(size);
            }
            if let Some(control) = patch.control {
                conn.control = control.filter(|p| p.x.is_finite() && p.y.is_finite());
            }
            Ok(((), Target::new(TargetType::Connection, id)))
        })
    }

    pub fn remove_connection(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::RemoveConnection, json!({ "id": id }), |d, _| {
            let before = d.connections.len();
            d.connections.retain(|conn| conn.id != id);
            if d.connections.len() == before {
                return Err(CommandError::not_found(TargetType::Connection, id));
            }
            Ok(((), Target::new(TargetType::Connection, id)))
        })
    }

    // ── Phase groups ────────────────────────────────────────────────

    /// Adds a phase group over the inclusive row range (swapped if reversed).
    /// Rejected unless every row in the range holds at least one step.
    pub fn add_phase_group(
        &mut self,
        title: &str,
        start_row: u32,
        end_row: u32,
    ) -> Result<String, CommandError> {
        let args = json!({ "title": title, "startRow": start_row, "endRow": end_row });
        self.execute(Action::AddPhaseGroup, args, |d, _| {
            let (start_row, end_row) = (start_row.min(end_row), start_row.max(end_row));
            if !model::phase_group_is_valid(d, start_row, end_row) {
                return Err(CommandError::rejected(format!(
                    "rows {start_row}..={end_row} are not all occupied"
                )));
            }
            let id = new_id("phase");
            d.phase_groups.push(PhaseGroup {
                id: id.clone(),
                title: title.to_string(),
                start_row,
                end_row,
            });
            let target = Target::new(TargetType::PhaseGroup, &id);
            Ok((id, target))
        })
    }

    pub fn update_phase_group(&mut self, id: &str, patch: PhasePatch) -> Result<(), CommandError> {
        let args = json!({ "id": id, "patch": payload(&patch) });
        self.execute(Action::UpdatePhaseGroup, args, |d, _| {
            let current = d
                .phase_group(id)
                .cloned()
                .ok_or_else(|| CommandError::not_found(TargetType::PhaseGroup, id))?;
            let start = patch.start_row.unwrap_or(current.start_row);
            let end = patch.end_row.unwrap_or(current.end_row);
            let (start_row, end_row) = (start.min(end), start.max(end));
            if (start_row, end_row) != (current.start_row, current.end_row)
                && !model::phase_group_is_valid(d, start_row, end_row)
            {
                return Err(CommandError::rejected(format!(
                    "rows {start_row}..={end_row} are not all occupied"
                )));
            }
            if let Some(group) = d.phase_group_mut(id) {
                if let Some(title) = patch.title {
                    group.title = title;
                }
                group.start_row = start_row;
                group.end_row = end_row;
            }
            Ok(((), Target::new(TargetType::PhaseGroup, id)))
        })
    }

    pub fn remove_phase_group(&mut self, id: &str) -> Result<(), CommandError> {
        self.execute(Action::RemovePhaseGroup, json!({ "id": id }), |d, _| {
            let before = d.phase_groups.len();
            d.phase_groups.retain(|group| group.id != id);
            if d.phase_groups.len() == before {
                return Err(CommandError::not_found(TargetType::PhaseGroup, id));
            }
            Ok(((), Target::new(TargetType::PhaseGroup, id)))
        })
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Selects an entity. Without `additive` the previous selection is replaced.
    pub fn select(&mut self, target: SelectionTarget, additive: bool) -> Result<(), CommandError> {
        if !target.exists_in(&self.diagram) {
            return Err(CommandError::not_found(target.target_type(), target.id()));
        }
        if !additive {
            self.selection.clear();
        }
        self.selection.insert(target);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Deletes everything selected as a single undoable command.
    pub fn remove_selection(&mut self) -> Result<(), CommandError> {
        if self.selection.is_empty() {
            return Err(CommandError::rejected("nothing is selected"));
        }
        let selection = self.selection.clone();
        let args = payload(&selection);
        self.execute(Action::RemoveSelection, args, |d, cfg| {
            d.connections
                .retain(|conn| !selection.connections.contains(&conn.id));
            d.phase_groups
                .retain(|group| !selection.phase_groups.contains(&group.id));
            for step_id in &selection.steps {
                model::cascade_delete(d, step_id);
            }
            for lane_id in &selection.lanes {
                model::cascade_delete_lane(d, lane_id);
            }
            model::normalize_lane_orders(&mut d.lanes, &cfg.theme);
            model::reflow_all(d, &cfg.layout);
            Ok(((), Target::new(TargetType::Diagram, &d.id)))
        })
    }
}

/// Swaps `order` with the neighbour at `order + delta`, or just shifts into
/// the empty row.
fn shift_step(diagram: &mut Diagram, id: &str, delta: i64, config: &Config) -> Result<(), CommandError> {
    let step = diagram
        .step(id)
        .ok_or_else(|| CommandError::not_found(TargetType::Step, id))?;
    let lane_id = step.lane_id.clone();
    let order = step.order;
    let target = u32::try_from(i64::from(order) + delta)
        .map_err(|_| CommandError::rejected("step is already at the edge of its lane"))?;
    let occupant = diagram
        .steps
        .iter()
        .find(|other| other.lane_id == lane_id && other.order == target)
        .map(|other| other.id.clone());
    if let Some(other_id) = occupant
        && let Some(other) = diagram.step_mut(&other_id)
    {
        other.order = order;
    }
    if let Some(step) = diagram.step_mut(id) {
        step.order = target;
    }
    model::reflow_lane(diagram, &lane_id, Some(id), &config.layout);
    Ok(())
}

/// Writes back an edited connection unless it now duplicates another one.
fn replace_connection(diagram: &mut Diagram, conn: Connection) -> Result<(), CommandError> {
    if model::is_duplicate_connection(diagram, &conn) {
        return Err(CommandError::DuplicateConnection);
    }
    if let Some(slot) = diagram.connection_mut(&conn.id) {
        *slot = conn;
    }
    Ok(())
}

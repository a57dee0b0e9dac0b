use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TargetType;
use crate::ir::Diagram;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum SelectionTarget {
    Lane(String),
    Step(String),
    Connection(String),
    PhaseGroup(String),
}

impl SelectionTarget {
    pub fn target_type(&self) -> TargetType {
        match self {
            SelectionTarget::Lane(_) => TargetType::Lane,
            SelectionTarget::Step(_) => TargetType::Step,
            SelectionTarget::Connection(_) => TargetType::Connection,
            SelectionTarget::PhaseGroup(_) => TargetType::PhaseGroup,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SelectionTarget::Lane(id)
            | SelectionTarget::Step(id)
            | SelectionTarget::Connection(id)
            | SelectionTarget::PhaseGroup(id) => id,
        }
    }

    pub fn exists_in(&self, diagram: &Diagram) -> bool {
        match self {
            SelectionTarget::Lane(id) => diagram.lane(id).is_some(),
            SelectionTarget::Step(id) => diagram.step(id).is_some(),
            SelectionTarget::Connection(id) => diagram.connection(id).is_some(),
            SelectionTarget::PhaseGroup(id) => diagram.phase_group(id).is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub lanes: BTreeSet<String>,
    pub steps: BTreeSet<String>,
    pub connections: BTreeSet<String>,
    pub phase_groups: BTreeSet<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
            && self.steps.is_empty()
            && self.connections.is_empty()
            && self.phase_groups.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn insert(&mut self, target: SelectionTarget) {
        match target {
            SelectionTarget::Lane(id) => self.lanes.insert(id),
            SelectionTarget::Step(id) => self.steps.insert(id),
            SelectionTarget::Connection(id) => self.connections.insert(id),
            SelectionTarget::PhaseGroup(id) => self.phase_groups.insert(id),
        };
    }

    pub fn contains(&self, target: &SelectionTarget) -> bool {
        match target {
            SelectionTarget::Lane(id) => self.lanes.contains(id),
            SelectionTarget::Step(id) => self.steps.contains(id),
            SelectionTarget::Connection(id) => self.connections.contains(id),
            SelectionTarget::PhaseGroup(id) => self.phase_groups.contains(id),
        }
    }

    /// Drops ids that no longer exist in `diagram`.
    pub fn retain_existing(&mut self, diagram: &Diagram) {
        self.lanes.retain(|id| diagram.lane(id).is_some());
        self.steps.retain(|id| diagram.step(id).is_some());
        self.connections.retain(|id| diagram.connection(id).is_some());
        self.phase_groups.retain(|id| diagram.phase_group(id).is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ir::Orientation;
    use crate::model::default_diagram;

    #[test]
    fn prunes_missing_ids() {
        let diagram = default_diagram("t", Orientation::Vertical, &Config::default());
        let mut selection = Selection::default();
        selection.insert(SelectionTarget::Step(diagram.steps[0].id.clone()));
        selection.insert(SelectionTarget::Step("gone".to_string()));
        selection.insert(SelectionTarget::Lane("gone".to_string()));
        selection.retain_existing(&diagram);
        assert_eq!(selection.steps.len(), 1);
        assert!(selection.lanes.is_empty());
        assert!(!selection.is_empty());
        selection.clear();
        assert!(selection.is_empty());
    }
}

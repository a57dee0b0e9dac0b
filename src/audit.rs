use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TargetType;
use crate::ir::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    RenameDiagram,
    AddLane,
    RemoveLane,
    UpdateLane,
    ReorderLane,
    AddStep,
    RemoveStep,
    UpdateStep,
    MoveStep,
    ReorderStep,
    MoveStepUp,
    MoveStepDown,
    ChangeStepKind,
    InsertRow,
    RemoveRow,
    AddConnection,
    UpdateConnection,
    UpdateConnectionEndpoints,
    ReverseConnection,
    RemoveConnection,
    AddPhaseGroup,
    UpdatePhaseGroup,
    RemovePhaseGroup,
    RemoveSelection,
    Undo,
    Redo,
    SetDiagram,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub action: Action,
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditExport<'a> {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    pub entries: &'a VecDeque<AuditEntry>,
}

/// Append-only trail of applied commands, optionally capped.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: Option<usize>,
}

impl AuditLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn record(
        &mut self,
        action: Action,
        target_type: TargetType,
        target_id: Option<String>,
        payload: Option<serde_json::Value>,
    ) -> &AuditEntry {
        self.entries.push_back(AuditEntry {
            id: new_id("audit"),
            action,
            target_type,
            target_id,
            payload,
            timestamp: Utc::now(),
        });
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity.max(1) {
                self.entries.pop_front();
            }
        }
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn export(&self) -> AuditExport<'_> {
        AuditExport {
            generated_at: Utc::now(),
            count: self.entries.len(),
            entries: &self.entries,
        }
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut log = AuditLog::new(None);
        log.record(Action::AddLane, TargetType::Lane, Some("l1".to_string()), None);
        log.record(Action::Undo, TargetType::Diagram, None, None);
        let actions: Vec<Action> = log.entries().map(|entry| entry.action).collect();
        assert_eq!(actions, [Action::AddLane, Action::Undo]);
        assert_eq!(log.last().unwrap().target_id, None);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut log = AuditLog::new(Some(2));
        for idx in 0..4 {
            log.record(Action::AddStep, TargetType::Step, Some(idx.to_string()), None);
        }
        let ids: Vec<String> = log
            .entries()
            .filter_map(|entry| entry.target_id.clone())
            .collect();
        assert_eq!(ids, ["2", "3"]);
    }

    #[test]
    fn export_wraps_entries() {
        let mut log = AuditLog::new(None);
        log.record(
            Action::MoveStep,
            TargetType::Step,
            Some("s".to_string()),
            Some(serde_json::json!({ "x": 1.0 })),
        );
        let value: serde_json::Value = serde_json::from_str(&log.export_json().unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert!(value["generatedAt"].is_string());
        assert_eq!(value["entries"][0]["action"], "moveStep");
        assert_eq!(value["entries"][0]["targetType"], "step");
        assert_eq!(value["entries"][0]["payload"]["x"], 1.0);
    }
}

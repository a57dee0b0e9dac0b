//! Lenient conversion of imported JSON records into model entities.
//!
//! Every field is read independently. Anything missing or malformed falls
//! back to a computed default instead of failing the record.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::ir::{
    Connection, Lane, Marker, Orientation, PhaseGroup, Point, Step, StepKind, new_id,
};
use crate::model;

/// Diagram-level fields; `None` means the record did not carry a usable value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramMeta {
    pub id: Option<String>,
    pub title: Option<String>,
    pub orientation: Option<Orientation>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DiagramMeta {
    /// Fills gaps in `self` from `other`.
    pub fn or(self, other: DiagramMeta) -> DiagramMeta {
        DiagramMeta {
            id: self.id.or(other.id),
            title: self.title.or(other.title),
            orientation: self.orientation.or(other.orientation),
            created_at: self.created_at.or(other.created_at),
            updated_at: self.updated_at.or(other.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedStep {
    pub step: Step,
    /// The record carried both coordinates.
    pub positioned: bool,
}

pub fn diagram_meta(value: &Value) -> DiagramMeta {
    DiagramMeta {
        id: text(value, "id").filter(|id| !id.trim().is_empty()),
        title: text(value, "title"),
        orientation: text(value, "orientation").and_then(|name| {
            Orientation::from_name(&name).or_else(|| Orientation::from_token(name.trim()))
        }),
        created_at: timestamp(value, "createdAt"),
        updated_at: timestamp(value, "updatedAt"),
    }
}

/// Sanitizes records while handing out ids. An id repeated within one entity
/// type counts as invalid; lanes, steps, connections and phase groups each
/// have their own namespace.
pub struct Sanitizer<'a> {
    config: &'a Config,
    seen: HashMap<&'static str, HashSet<String>>,
}

impl<'a> Sanitizer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            seen: HashMap::new(),
        }
    }

    fn claim_id(&mut self, value: &Value, prefix: &'static str) -> String {
        let seen = self.seen.entry(prefix).or_default();
        if let Some(id) = text(value, "id")
            && !id.trim().is_empty()
            && seen.insert(id.clone())
        {
            return id;
        }
        let id = new_id(prefix);
        seen.insert(id.clone());
        id
    }

    pub fn lane(&mut self, value: &Value, fallback_order: u32) -> Lane {
        let id = self.claim_id(value, "lane");
        let order = row(value, "order").unwrap_or(fallback_order);
        Lane {
            id,
            title: text(value, "title").unwrap_or_else(|| format!("Lane {}", order + 1)),
            description: text(value, "description"),
            order,
            color: text(value, "color")
                .unwrap_or_else(|| self.config.theme.lane_color(order as usize)),
            width: positive(value, "width").unwrap_or(self.config.layout.lane_thickness),
        }
    }

    pub fn step(&mut self, value: &Value, fallback_lane: &str, fallback_order: u32) -> SanitizedStep {
        let id = self.claim_id(value, "step");
        let kind = text(value, "kind")
            .and_then(|name| StepKind::from_name(&name))
            .unwrap_or_default();
        let defaults = model::step_defaults(kind, self.config);
        let x = non_negative(value, "x");
        let y = non_negative(value, "y");
        let step = Step {
            id,
            lane_id: text(value, "laneId")
                .filter(|lane| !lane.is_empty())
                .unwrap_or_else(|| fallback_lane.to_string()),
            title: text(value, "title").unwrap_or_else(|| kind.default_title().to_string()),
            description: text(value, "description"),
            order: row(value, "order").unwrap_or(fallback_order),
            x: x.unwrap_or(0.0),
            y: y.unwrap_or(0.0),
            width: positive(value, "width").unwrap_or(defaults.width),
            height: positive(value, "height").unwrap_or(defaults.height),
            kind,
            text_color: text(value, "textColor").unwrap_or(defaults.text_color),
            fill_color: text(value, "fillColor").unwrap_or(defaults.fill_color),
        };
        SanitizedStep {
            step,
            positioned: x.is_some() && y.is_some(),
        }
    }

    /// `None` when either endpoint is missing.
    pub fn connection(&mut self, value: &Value) -> Option<Connection> {
        let source_id = text(value, "sourceId").filter(|id| !id.is_empty())?;
        let target_id = text(value, "targetId").filter(|id| !id.is_empty())?;
        let id = self.claim_id(value, "conn");
        let mut conn = Connection::new(&source_id, &target_id);
        conn.id = id;
        conn.source_handle = text(value, "sourceHandle");
        conn.target_handle = text(value, "targetHandle");
        conn.control = value.get("control").and_then(point);
        if let Some(marker) = marker(value, "startMarker") {
            conn.start_marker = marker;
        }
        if let Some(marker) = marker(value, "endMarker") {
            conn.end_marker = marker;
        }
        if let Some(size) = number(value, "markerSize") {
            conn.marker_size = model::clamp_marker_size(size);
        }
        conn.label = model::truncate_label(&text(value, "label").unwrap_or_default());
        Some(conn)
    }

    pub fn phase_group(&mut self, value: &Value) -> Option<PhaseGroup> {
        let start = row(value, "startRow");
        let end = row(value, "endRow");
        let (start_row, end_row) = match (start, end) {
            (Some(start), Some(end)) => (start.min(end), start.max(end)),
            (Some(row), None) | (None, Some(row)) => (row, row),
            (None, None) => return None,
        };
        Some(PhaseGroup {
            id: self.claim_id(value, "phase"),
            title: text(value, "title").unwrap_or_else(|| "Phase".to_string()),
            start_row,
            end_row,
        })
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    let raw = match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|n| n.is_finite())
}

fn non_negative(value: &Value, key: &str) -> Option<f64> {
    number(value, key).map(|n| n.max(0.0))
}

fn positive(value: &Value, key: &str) -> Option<f64> {
    number(value, key).filter(|n| *n > 0.0)
}

fn row(value: &Value, key: &str) -> Option<u32> {
    number(value, key).map(|n| {
        let n = n.round();
        if n <= 0.0 {
            0
        } else if n >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            n as u32
        }
    })
}

fn marker(value: &Value, key: &str) -> Option<Marker> {
    text(value, key).and_then(|name| Marker::from_name(&name))
}

fn point(value: &Value) -> Option<Point> {
    Some(Point {
        x: number(value, "x")?,
        y: number(value, "y")?,
    })
}

fn timestamp(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = text(value, key)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

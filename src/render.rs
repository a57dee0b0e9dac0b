//! Text export: a fenced flowchart outline carrying typed JSON records.

use std::collections::{HashMap, HashSet};

use log::warn;
use serde::Serialize;
use serde_json::json;

use crate::ir::{Connection, Diagram, Marker, Orientation, Step, StepKind};

pub const HEADER_MARKER: &str = "%% swimlane-flow";
pub const FORMAT_VERSION: u32 = 1;
pub const RECORD_PREFIX: &str = "%% @";
pub const FENCE: &str = "```";

const RESERVED_IDS: [&str; 6] = ["end", "subgraph", "graph", "flowchart", "style", "class"];

/// Renders the whole document, fence included.
pub fn render_document(diagram: &Diagram) -> String {
    let mut out = String::new();
    out.push_str(FENCE);
    out.push_str("mermaid\n");
    out.push_str(&render_body(diagram));
    out.push_str(FENCE);
    out.push('\n');
    out
}

/// The document without the surrounding fence.
pub fn render_body(diagram: &Diagram) -> String {
    let mut out = String::new();
    let mut ids = OutlineIds::default();

    out.push_str(&format!("{HEADER_MARKER} v{FORMAT_VERSION}\n"));
    out.push_str(&format!("flowchart {}\n", diagram.orientation.token()));
    push_record(
        &mut out,
        "",
        "diagram",
        &json!({
            "id": diagram.id,
            "title": diagram.title,
            "orientation": diagram.orientation,
            "createdAt": diagram.created_at,
            "updatedAt": diagram.updated_at,
        }),
    );
    push_record(&mut out, "", "snapshot", diagram);

    let mut step_ids = HashMap::new();
    for lane in diagram.lanes_by_order() {
        let lane_node = ids.assign(&lane.id);
        out.push_str(&format!("subgraph {lane_node}[\"{}\"]\n", escape_label(&lane.title)));
        push_record(&mut out, "  ", "lane", lane);
        for step in steps_along_primary_axis(diagram, &lane.id) {
            let node = ids.assign(&step.id);
            out.push_str(&format!("  {node}{}\n", node_shape(step.kind, &step.title)));
            push_record(&mut out, "  ", "step", step);
            step_ids.insert(step.id.as_str(), node);
        }
        out.push_str("end\n");
    }

    for group in &diagram.phase_groups {
        push_record(&mut out, "", "phase", group);
    }

    for conn in &diagram.connections {
        let (Some(source), Some(target)) = (
            step_ids.get(conn.source_id.as_str()),
            step_ids.get(conn.target_id.as_str()),
        ) else {
            continue;
        };
        out.push_str(&edge_line(conn, source, target));
        out.push('\n');
        push_record(&mut out, "", "connection", conn);
    }
    out
}

fn steps_along_primary_axis<'a>(diagram: &'a Diagram, lane_id: &str) -> Vec<&'a Step> {
    let mut steps = diagram.steps_in_lane(lane_id);
    let primary = |step: &Step| match diagram.orientation {
        Orientation::Vertical => step.y,
        Orientation::Horizontal => step.x,
    };
    steps.sort_by(|a, b| {
        primary(a)
            .total_cmp(&primary(b))
            .then_with(|| a.order.cmp(&b.order))
    });
    steps
}

fn push_record<T: Serialize + ?Sized>(out: &mut String, indent: &str, tag: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => {
            out.push_str(indent);
            out.push_str(RECORD_PREFIX);
            out.push_str(tag);
            out.push(' ');
            out.push_str(&json);
            out.push('\n');
        }
        Err(err) => warn!(tag, error:% = err; "skipping record that failed to serialize"),
    }
}

pub fn node_shape(kind: StepKind, title: &str) -> String {
    let label = escape_label(title);
    match kind {
        StepKind::Process => format!("[\"{label}\"]"),
        StepKind::Decision => format!("{{\"{label}\"}}"),
        StepKind::Start => format!("([\"{label}\"])"),
        StepKind::End => format!("((\"{label}\"))"),
        StepKind::File => format!("[/\"{label}\"/]"),
        StepKind::LoopStart => format!("[/\"{label}\"\\]"),
        StepKind::LoopEnd => format!("[\\\"{label}\"/]"),
        StepKind::Database => format!("[(\"{label}\")]"),
    }
}

pub fn arrow_token(start: Marker, end: Marker) -> String {
    let head = match start {
        Marker::None => "",
        Marker::Arrow => "<",
        Marker::Dot => "o",
    };
    let tail = match end {
        Marker::None => "-",
        Marker::Arrow => ">",
        Marker::Dot => "o",
    };
    format!("{head}--{tail}")
}

fn edge_line(conn: &Connection, source: &str, target: &str) -> String {
    let arrow = arrow_token(conn.start_marker, conn.end_marker);
    if conn.label.is_empty() {
        format!("{source} {arrow} {target}")
    } else {
        format!(
            "{source} {arrow}|\"{}\"| {target}",
            escape_label(&conn.label)
        )
    }
}

/// Entity codes used inside quoted outline labels. `#` itself is encoded so
/// that text which already looks like an entity survives a round trip.
const LABEL_ENTITIES: [(&str, char); 4] = [("#35;", '#'), ("#quot;", '"'), ("#124;", '|'), ("#lt;", '<')];
const LINE_BREAKS: [&str; 3] = ["<br/>", "<br />", "<br>"];

pub fn escape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push_str(LINE_BREAKS[0]);
            }
            '\n' => out.push_str(LINE_BREAKS[0]),
            _ => match LABEL_ENTITIES.iter().find(|(_, decoded)| *decoded == ch) {
                Some((entity, _)) => out.push_str(entity),
                None => out.push(ch),
            },
        }
    }
    out
}

/// Inverse of [`escape_label`]; also accepts the `<br>` spellings hand-written
/// outlines use.
pub fn unescape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(ch) = rest.chars().next() {
        if let Some(br) = LINE_BREAKS.iter().find(|br| rest.starts_with(*br)) {
            out.push('\n');
            rest = &rest[br.len()..];
        } else if let Some((entity, decoded)) =
            LABEL_ENTITIES.iter().find(|(entity, _)| rest.starts_with(*entity))
        {
            out.push(*decoded);
            rest = &rest[entity.len()..];
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out
}

/// Hands out outline node ids made of `[A-Za-z0-9_]`, unique per document.
#[derive(Debug, Default)]
struct OutlineIds {
    used: HashSet<String>,
}

impl OutlineIds {
    fn assign(&mut self, id: &str) -> String {
        let mut base: String = id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
            .collect();
        if base.is_empty() || base.starts_with(|ch: char| ch.is_ascii_digit()) {
            base = format!("n_{base}");
        }
        if RESERVED_IDS.contains(&base.to_ascii_lowercase().as_str()) {
            base.push('_');
        }
        let mut candidate = base.clone();
        let mut suffix = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        candidate
    }
}

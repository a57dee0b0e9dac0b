use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::FormatError;
use crate::ir::{Connection, DEFAULT_TITLE, Diagram, Lane, Marker, Orientation, PhaseGroup, StepKind};
use crate::model;
use crate::render::{FORMAT_VERSION, unescape_label};
use crate::sanitize::{DiagramMeta, SanitizedStep, Sanitizer, diagram_meta};

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%%\s*swimlane-flow(?:\s+v(?P<version>\d+))?\s*$").unwrap());
static DIRECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:flowchart|graph)\s+(?P<dir>\w+)").unwrap());
static RECORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%%\s*@(?P<tag>[A-Za-z][\w-]*)\s*(?P<json>.*)$").unwrap());
static SUBGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^subgraph\s+(.*)$").unwrap());
static EDGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<source>[A-Za-z0-9_]+)\s*(?P<start>[<o]?)--(?P<end>[->o])\s*(?:\|(?P<label>[^|]*)\|)?\s*(?P<target>[A-Za-z0-9_]+)\s*$",
    )
    .unwrap()
});
static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<id>[A-Za-z0-9_]+)\s*(?P<shape>.*)$").unwrap());

/// Opening and closing delimiters per kind. More specific shapes come first.
const SHAPES: [(&str, &str, StepKind); 8] = [
    ("([", "])", StepKind::Start),
    ("((", "))", StepKind::End),
    ("[(", ")]", StepKind::Database),
    ("[/", "/]", StepKind::File),
    ("[/", "\\]", StepKind::LoopStart),
    ("[\\", "/]", StepKind::LoopEnd),
    ("[", "]", StepKind::Process),
    ("{", "}", StepKind::Decision),
];

#[derive(Debug, Default)]
struct Document {
    version: Option<u32>,
    direction: Option<Orientation>,
    meta: Option<Value>,
    snapshot: Option<Value>,
    lanes: Vec<OutlineLane>,
    phases: Vec<Value>,
    edges: Vec<OutlineEdge>,
}

#[derive(Debug)]
struct OutlineLane {
    title: String,
    record: Option<Value>,
    nodes: Vec<OutlineNode>,
}

#[derive(Debug)]
struct OutlineNode {
    node_id: String,
    title: String,
    kind: StepKind,
    record: Option<Value>,
}

#[derive(Debug)]
struct OutlineEdge {
    source: String,
    target: String,
    start_marker: Marker,
    end_marker: Marker,
    label: String,
    record: Option<Value>,
}

/// Item a following `%% @…` record may attach to.
#[derive(Debug, Clone, Copy)]
enum Last {
    Lane(usize),
    Node(usize, usize),
    Edge(usize),
}

/// Parses an exported document back into a sanitized [`Diagram`].
///
/// The full snapshot record is preferred; when it is missing or yields no
/// usable lanes and steps, the diagram is rebuilt from the outline.
pub fn parse_document(input: &str, config: &Config) -> Result<Diagram, FormatError> {
    let body = locate_document(input).ok_or(FormatError::MissingHeader)?;
    let doc = tokenize(&body);
    if let Some(version) = doc.version
        && version > FORMAT_VERSION
    {
        warn!(version, supported = FORMAT_VERSION; "document uses a newer format version");
    }

    if let Some(snapshot) = &doc.snapshot {
        match from_snapshot(snapshot, &doc, config) {
            Ok(diagram) => {
                debug!(
                    strategy = "snapshot",
                    lanes = diagram.lanes.len(),
                    steps = diagram.steps.len();
                    "parsed document"
                );
                return Ok(diagram);
            }
            Err(err) => {
                warn!(error:% = err; "snapshot record unusable, rebuilding from outline");
            }
        }
    }

    let diagram = from_outline(&doc, config)?;
    debug!(
        strategy = "outline",
        lanes = diagram.lanes.len(),
        steps = diagram.steps.len();
        "parsed document"
    );
    Ok(diagram)
}

/// True when `input` carries the header marker, fenced or bare.
pub fn is_swimlane_document(input: &str) -> bool {
    locate_document(input).is_some()
}

fn locate_document(input: &str) -> Option<String> {
    extract_mermaid_blocks(input)
        .into_iter()
        .find(|block| has_header(block))
        .or_else(|| has_header(input).then(|| input.to_string()))
}

fn has_header(text: &str) -> bool {
    text.lines().any(|line| HEADER_RE.is_match(line.trim()))
}

fn extract_mermaid_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = Vec::new();
    let mut fence = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(start_fence) = detect_mermaid_fence(trimmed) {
                in_block = true;
                fence = start_fence;
            }
            continue;
        }
        if is_fence_end(trimmed, &fence) {
            in_block = false;
            blocks.push(current.join("\n"));
            current.clear();
            continue;
        }
        current.push(line);
    }

    blocks
}

fn detect_mermaid_fence(line: &str) -> Option<String> {
    for marker in ["```", "~~~", ":::"] {
        if let Some(rest) = line.strip_prefix(marker) {
            let lang = rest.trim_start_matches(marker.chars().next().unwrap_or('`')).trim();
            if lang.starts_with("mermaid") {
                return Some(marker.to_string());
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    line.strip_prefix(fence)
        .is_some_and(|rest| rest.trim().is_empty())
}

fn tokenize(body: &str) -> Document {
    let mut doc = Document::default();
    let mut current_lane: Option<usize> = None;
    let mut last: Option<Last> = None;

    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = HEADER_RE.captures(line) {
            doc.version = caps
                .name("version")
                .and_then(|v| v.as_str().parse().ok())
                .or(Some(FORMAT_VERSION));
            last = None;
            continue;
        }
        if let Some(caps) = RECORD_RE.captures(line) {
            attach_record(&mut doc, &caps["tag"], &caps["json"], last);
            last = None;
            continue;
        }
        if line.starts_with("%%") {
            continue;
        }

        let line = strip_trailing_comment(line);
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = DIRECTION_RE.captures(&line) {
            doc.direction = Orientation::from_token(&caps["dir"].to_ascii_uppercase());
            last = None;
        } else if let Some(caps) = SUBGRAPH_RE.captures(&line) {
            let title = parse_subgraph_header(&caps[1]);
            doc.lanes.push(OutlineLane {
                title,
                record: None,
                nodes: Vec::new(),
            });
            let idx = doc.lanes.len() - 1;
            current_lane = Some(idx);
            last = Some(Last::Lane(idx));
        } else if line == "end" {
            current_lane = None;
            last = None;
        } else if let Some(edge) = parse_edge(&line) {
            doc.edges.push(edge);
            last = Some(Last::Edge(doc.edges.len() - 1));
        } else if let Some(lane_idx) = current_lane
            && let Some(node) = parse_node(&line)
        {
            let nodes = &mut doc.lanes[lane_idx].nodes;
            nodes.push(node);
            last = Some(Last::Node(lane_idx, nodes.len() - 1));
        } else {
            trace!(line = line.as_str(); "ignoring outline line");
            last = None;
        }
    }
    doc
}

fn attach_record(doc: &mut Document, tag: &str, text: &str, last: Option<Last>) {
    let Some(value) = parse_json(text) else {
        warn!(tag; "skipping record with malformed JSON");
        return;
    };
    let slot = match (tag, last) {
        ("diagram", _) => &mut doc.meta,
        ("snapshot", _) => &mut doc.snapshot,
        ("phase", _) => {
            doc.phases.push(value);
            return;
        }
        ("lane", Some(Last::Lane(idx))) => &mut doc.lanes[idx].record,
        ("step", Some(Last::Node(lane, node))) => &mut doc.lanes[lane].nodes[node].record,
        ("connection", Some(Last::Edge(idx))) => &mut doc.edges[idx].record,
        ("lane" | "step" | "connection", _) => {
            trace!(tag; "record has nothing to attach to");
            return;
        }
        _ => {
            trace!(tag; "ignoring unknown record tag");
            return;
        }
    };
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| json5::from_str(text).ok())
}

fn parse_subgraph_header(header: &str) -> String {
    let header = header.trim();
    if let Some(open) = header.find('[')
        && header.ends_with(']')
    {
        let id = header[..open].trim();
        let title = unquote(&header[open + 1..header.len() - 1]);
        if !title.is_empty() {
            return title;
        }
        return id.to_string();
    }
    unquote(header)
}

fn parse_node(line: &str) -> Option<OutlineNode> {
    let caps = NODE_RE.captures(line)?;
    let node_id = caps["id"].to_string();
    let shape = caps["shape"].trim();
    if shape.is_empty() {
        return Some(OutlineNode {
            title: node_id.clone(),
            node_id,
            kind: StepKind::Process,
            record: None,
        });
    }
    SHAPES.iter().find_map(|(open, close, kind)| {
        if shape.len() >= open.len() + close.len()
            && shape.starts_with(open)
            && shape.ends_with(close)
        {
            Some(OutlineNode {
                node_id: node_id.clone(),
                title: unquote(&shape[open.len()..shape.len() - close.len()]),
                kind: *kind,
                record: None,
            })
        } else {
            None
        }
    })
}

fn parse_edge(line: &str) -> Option<OutlineEdge> {
    let caps = EDGE_RE.captures(line)?;
    let start_marker = match &caps["start"] {
        "<" => Marker::Arrow,
        "o" => Marker::Dot,
        _ => Marker::None,
    };
    let end_marker = match &caps["end"] {
        ">" => Marker::Arrow,
        "o" => Marker::Dot,
        _ => Marker::None,
    };
    Some(OutlineEdge {
        source: caps["source"].to_string(),
        target: caps["target"].to_string(),
        start_marker,
        end_marker,
        label: caps.name("label").map(|m| unquote(m.as_str())).unwrap_or_default(),
        record: None,
    })
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    let inner = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text);
    unescape_label(inner)
}

fn strip_trailing_comment(line: &str) -> String {
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    let mut out = String::new();
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            quote = Some(ch);
            out.push(ch);
            continue;
        }
        if ch == '%'
            && let Some('%') = chars.peek().copied()
        {
            break;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

/// Outline-derived fields overlaid by whatever the paired record carries.
fn overlay(mut base: Value, record: Option<&Value>) -> Value {
    if let (Value::Object(fields), Some(Value::Object(extra))) = (&mut base, record) {
        for (key, value) in extra {
            fields.insert(key.clone(), value.clone());
        }
    }
    base
}

fn from_snapshot(snapshot: &Value, doc: &Document, config: &Config) -> Result<Diagram, FormatError> {
    let (Some(lanes), Some(steps), Some(connections)) = (
        snapshot.get("lanes").and_then(Value::as_array),
        snapshot.get("steps").and_then(Value::as_array),
        snapshot.get("connections").and_then(Value::as_array),
    ) else {
        return Err(FormatError::NoLanes);
    };
    let phases = snapshot
        .get("phaseGroups")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut sanitizer = Sanitizer::new(config);
    let lanes: Vec<Lane> = lanes
        .iter()
        .enumerate()
        .map(|(position, value)| sanitizer.lane(value, position as u32))
        .collect();
    let steps: Vec<SanitizedStep> = steps
        .iter()
        .map(|value| sanitizer.step(value, "", 0))
        .collect();
    let connections: Vec<Connection> = connections
        .iter()
        .filter_map(|value| sanitizer.connection(value))
        .collect();
    let phase_groups: Vec<PhaseGroup> = phases
        .iter()
        .filter_map(|value| sanitizer.phase_group(value))
        .collect();

    let meta = diagram_meta(snapshot).or(doc_meta(doc));
    assemble(meta, doc.direction, lanes, steps, connections, phase_groups, config)
}

fn from_outline(doc: &Document, config: &Config) -> Result<Diagram, FormatError> {
    let mut sanitizer = Sanitizer::new(config);
    let mut node_ids: HashMap<&str, String> = HashMap::new();
    let mut lanes = Vec::new();
    let mut steps = Vec::new();

    for (position, outline) in doc.lanes.iter().enumerate() {
        let base = json!({ "title": outline.title, "order": position });
        let lane = sanitizer.lane(&overlay(base, outline.record.as_ref()), position as u32);
        for (row, node) in outline.nodes.iter().enumerate() {
            let base = json!({ "title": node.title, "kind": node.kind, "order": row });
            let mut sanitized = sanitizer.step(&overlay(base, node.record.as_ref()), &lane.id, row as u32);
            sanitized.step.lane_id = lane.id.clone();
            node_ids.insert(node.node_id.as_str(), sanitized.step.id.clone());
            steps.push(sanitized);
        }
        lanes.push(lane);
    }

    let mut connections = Vec::new();
    for edge in &doc.edges {
        let (Some(source), Some(target)) = (
            node_ids.get(edge.source.as_str()),
            node_ids.get(edge.target.as_str()),
        ) else {
            trace!(from = edge.source.as_str(), to = edge.target.as_str(); "edge references an undeclared node");
            continue;
        };
        let base = json!({
            "sourceId": source,
            "targetId": target,
            "startMarker": edge.start_marker,
            "endMarker": edge.end_marker,
            "label": edge.label,
        });
        if let Some(mut conn) = sanitizer.connection(&overlay(base, edge.record.as_ref())) {
            conn.source_id = source.clone();
            conn.target_id = target.clone();
            connections.push(conn);
        }
    }

    let phase_groups: Vec<PhaseGroup> = doc
        .phases
        .iter()
        .filter_map(|value| sanitizer.phase_group(value))
        .collect();

    assemble(doc_meta(doc), doc.direction, lanes, steps, connections, phase_groups, config)
}

fn doc_meta(doc: &Document) -> DiagramMeta {
    doc.meta.as_ref().map(diagram_meta).unwrap_or_default()
}

fn assemble(
    meta: DiagramMeta,
    direction: Option<Orientation>,
    lanes: Vec<Lane>,
    steps: Vec<SanitizedStep>,
    connections: Vec<Connection>,
    phase_groups: Vec<PhaseGroup>,
    config: &Config,
) -> Result<Diagram, FormatError> {
    let orientation = meta.orientation.or(direction).unwrap_or_default();
    let mut diagram = Diagram::empty(meta.title.as_deref().unwrap_or(DEFAULT_TITLE), orientation);
    if let Some(id) = meta.id {
        diagram.id = id;
    }
    if let Some(created_at) = meta.created_at {
        diagram.created_at = created_at;
    }
    diagram.updated_at = meta.updated_at.unwrap_or(diagram.created_at);

    let unplaced: HashSet<String> = steps
        .iter()
        .filter(|sanitized| !sanitized.positioned)
        .map(|sanitized| sanitized.step.id.clone())
        .collect();
    diagram.lanes = lanes;
    diagram.steps = steps.into_iter().map(|sanitized| sanitized.step).collect();
    diagram.connections = connections;
    diagram.phase_groups = phase_groups;

    let dropped = model::repair_keeping_layout(&mut diagram, config, unplaced);
    if dropped > 0 {
        warn!(dropped; "dropped imported entities with dangling or duplicate references");
    }

    if diagram.lanes.is_empty() {
        return Err(FormatError::NoLanes);
    }
    if diagram.steps.is_empty() {
        return Err(FormatError::NoSteps);
    }
    Ok(diagram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::model::default_diagram;
    use crate::render::render_document;

    const OUTLINE_ONLY: &str = r#"
Some notes before the diagram.

```mermaid
%% swimlane-flow v1
flowchart LR
subgraph sales["Sales"]
  lead(["New lead"])
  qualify{"Qualified?"}
end
subgraph ops["Operations"]
  ship["Ship #quot;order#quot;"] %% trailing note
  archive[("Archive")]
end
lead --> qualify
qualify -->|"yes"| ship
qualify o--o missing
ship --- archive
```
"#;

    #[test]
    fn rendered_document_round_trips_through_snapshot() {
        let config = Config::default();
        let diagram = default_diagram("Flow", Orientation::Vertical, &config);
        let parsed = parse_document(&render_document(&diagram), &config).unwrap();
        assert_eq!(parsed, diagram);
    }

    #[test]
    fn missing_header_is_rejected() {
        let config = Config::default();
        let err = parse_document("```mermaid\nflowchart TD\nA --> B\n```", &config).unwrap_err();
        assert_eq!(err, FormatError::MissingHeader);
    }

    #[test]
    fn outline_is_rebuilt_without_records() {
        let config = Config::default();
        let diagram = parse_document(OUTLINE_ONLY, &config).unwrap();
        assert_eq!(diagram.orientation, Orientation::Horizontal);
        let titles: Vec<&str> = diagram.lanes.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, ["Sales", "Operations"]);

        let sales = diagram.steps_in_lane(&diagram.lanes[0].id);
        assert_eq!(sales[0].kind, StepKind::Start);
        assert_eq!(sales[1].kind, StepKind::Decision);
        assert_eq!(sales[1].order, 1);
        let ops = diagram.steps_in_lane(&diagram.lanes[1].id);
        assert_eq!(ops[0].title, "Ship \"order\"");
        assert_eq!(ops[1].kind, StepKind::Database);

        assert_eq!(diagram.connections.len(), 3);
        let labelled = diagram.connections.iter().find(|c| c.label == "yes").unwrap();
        assert_eq!(labelled.end_marker, Marker::Arrow);
        let plain = diagram
            .connections
            .iter()
            .find(|c| c.end_marker == Marker::None)
            .unwrap();
        assert_eq!(plain.start_marker, Marker::None);

        let geometry = layout::lane_geometry(&diagram.lanes, &diagram.lanes[0], &config.layout);
        let expected = layout::position_of_step(
            geometry,
            Orientation::Horizontal,
            1,
            sales[1].width,
            sales[1].height,
            &config.layout,
        );
        assert_eq!((sales[1].x, sales[1].y), (expected.x, expected.y));
    }

    #[test]
    fn outline_without_steps_fails() {
        let config = Config::default();
        let doc = "%% swimlane-flow v1\nflowchart TD\nsubgraph a[\"A\"]\nend\n";
        assert_eq!(parse_document(doc, &config), Err(FormatError::NoSteps));
        let doc = "%% swimlane-flow v1\nflowchart TD\n";
        assert_eq!(parse_document(doc, &config), Err(FormatError::NoLanes));
    }

    #[test]
    fn broken_snapshot_falls_back_to_outline() {
        let config = Config::default();
        let doc = concat!(
            "%% swimlane-flow v1\n",
            "flowchart TD\n",
            "%% @snapshot {\"lanes\": []}\n",
            "subgraph a[\"A\"]\n",
            "  %% @lane {title: 'From record', color: '#123456'}\n",
            "  s1[\"One\"]\n",
            "  %% @step {\"id\": \"step_one\", \"kind\": \"file\", \"order\": 3}\n",
            "end\n",
        );
        let diagram = parse_document(doc, &config).unwrap();
        assert_eq!(diagram.lanes[0].title, "From record");
        let step = &diagram.steps[0];
        assert_eq!(step.id, "step_one");
        assert_eq!(step.kind, StepKind::File);
        assert_eq!(step.order, 3);
    }

    #[test]
    fn first_fenced_block_with_header_wins() {
        let config = Config::default();
        let diagram = default_diagram("Second", Orientation::Vertical, &config);
        let input = format!(
            "```mermaid\nflowchart TD\nA-->B\n```\n\n{}",
            render_document(&diagram)
        );
        assert!(is_swimlane_document(&input));
        assert_eq!(parse_document(&input, &config).unwrap().title, "Second");
    }

    #[test]
    fn nodes_parse_every_shape() {
        for (line, kind) in [
            (r#"a["x"]"#, StepKind::Process),
            (r#"a{"x"}"#, StepKind::Decision),
            (r#"a(["x"])"#, StepKind::Start),
            (r#"a(("x"))"#, StepKind::End),
            (r#"a[/"x"/]"#, StepKind::File),
            (r#"a[/"x"\]"#, StepKind::LoopStart),
            (r#"a[\"x"/]"#, StepKind::LoopEnd),
            (r#"a[("x")]"#, StepKind::Database),
        ] {
            let node = parse_node(line).unwrap();
            assert_eq!(node.kind, kind, "{line}");
            assert_eq!(node.title, "x");
        }
        assert!(parse_node("direction TB").is_none());
    }
}

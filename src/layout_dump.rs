use crate::config::LayoutConfig;
use crate::ir::{Diagram, Marker, Orientation};
use crate::layout;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub title: String,
    pub orientation: String,
    pub width: f64,
    pub height: f64,
    pub lanes: Vec<LaneDump>,
    pub steps: Vec<StepDump>,
    pub connections: Vec<ConnectionDump>,
    pub phase_groups: Vec<PhaseDump>,
}

#[derive(Debug, Serialize)]
pub struct LaneDump {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub steps: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StepDump {
    pub id: String,
    pub lane_id: String,
    pub kind: String,
    pub title: String,
    pub row: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionDump {
    pub id: String,
    pub from: String,
    pub to: String,
    pub arrow_start: bool,
    pub arrow_end: bool,
    pub label: String,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
pub struct PhaseDump {
    pub id: String,
    pub title: String,
    pub start_row: u32,
    pub end_row: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutDump {
    pub fn from_diagram(diagram: &Diagram, config: &LayoutConfig) -> Self {
        let extent = layout::diagram_extent(diagram, config);
        let orientation = diagram.orientation;

        let lanes = diagram
            .lanes_by_order()
            .into_iter()
            .map(|lane| {
                let geometry = layout::lane_geometry(&diagram.lanes, lane, config);
                let (x, y, width, height) = match orientation {
                    Orientation::Vertical => (geometry.offset, 0.0, geometry.thickness, extent.height),
                    Orientation::Horizontal => (0.0, geometry.offset, extent.width, geometry.thickness),
                };
                LaneDump {
                    id: lane.id.clone(),
                    title: lane.title.clone(),
                    order: lane.order,
                    color: lane.color.clone(),
                    x,
                    y,
                    width,
                    height,
                    steps: diagram
                        .steps_in_lane(&lane.id)
                        .into_iter()
                        .map(|step| step.id.clone())
                        .collect(),
                }
            })
            .collect();

        let mut centers = HashMap::new();
        let steps = diagram
            .steps
            .iter()
            .map(|step| {
                centers.insert(
                    step.id.as_str(),
                    [step.x + step.width / 2.0, step.y + step.height / 2.0],
                );
                StepDump {
                    id: step.id.clone(),
                    lane_id: step.lane_id.clone(),
                    kind: step.kind.as_str().to_string(),
                    title: step.title.clone(),
                    row: step.order,
                    x: step.x,
                    y: step.y,
                    width: step.width,
                    height: step.height,
                }
            })
            .collect();

        let connections = diagram
            .connections
            .iter()
            .filter_map(|conn| {
                let from = *centers.get(conn.source_id.as_str())?;
                let to = *centers.get(conn.target_id.as_str())?;
                let mut points = vec![from];
                if let Some(control) = conn.control {
                    points.push([control.x, control.y]);
                }
                points.push(to);
                Some(ConnectionDump {
                    id: conn.id.clone(),
                    from: conn.source_id.clone(),
                    to: conn.target_id.clone(),
                    arrow_start: conn.start_marker != Marker::None,
                    arrow_end: conn.end_marker != Marker::None,
                    label: conn.label.clone(),
                    points,
                })
            })
            .collect();

        let stride = layout::stride(orientation, config);
        let origin = layout::row_origin(config);
        let phase_groups = diagram
            .phase_groups
            .iter()
            .map(|group| {
                let start = origin + f64::from(group.start_row) * stride;
                let length = f64::from(group.end_row - group.start_row + 1) * stride;
                let (x, y, width, height) = match orientation {
                    Orientation::Vertical => (0.0, start, extent.width, length),
                    Orientation::Horizontal => (start, 0.0, length, extent.height),
                };
                PhaseDump {
                    id: group.id.clone(),
                    title: group.title.clone(),
                    start_row: group.start_row,
                    end_row: group.end_row,
                    x,
                    y,
                    width,
                    height,
                }
            })
            .collect();

        LayoutDump {
            title: diagram.title.clone(),
            orientation: orientation.as_str().to_string(),
            width: extent.width,
            height: extent.height,
            lanes,
            steps,
            connections,
            phase_groups,
        }
    }
}

pub fn write_layout_dump(path: &Path, diagram: &Diagram, config: &LayoutConfig) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_diagram(diagram, config);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

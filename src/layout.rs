//! Geometry for swimlane diagrams.
//!
//! Every function here is pure: lane offsets, step positions and row indices
//! are derived from logical coordinates (lane order, row) plus [`LayoutConfig`].
//! Nothing is cached between calls. Out-of-range or non-finite inputs clamp to
//! the nearest valid value instead of failing.

use crate::config::LayoutConfig;
use crate::ir::{Diagram, Lane, Orientation, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneGeometry {
    /// Start of the lane on the cross axis (x for vertical, y for horizontal).
    pub offset: f64,
    pub thickness: f64,
}

impl LaneGeometry {
    pub fn center(&self) -> f64 {
        self.offset + self.thickness / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.offset && value <= self.offset + self.thickness
    }
}

fn thickness(lane: &Lane, config: &LayoutConfig) -> f64 {
    if lane.width.is_finite() && lane.width > 0.0 {
        lane.width
    } else {
        config.lane_thickness
    }
}

pub fn stride(orientation: Orientation, config: &LayoutConfig) -> f64 {
    let raw = match orientation {
        Orientation::Vertical => config.row_stride,
        Orientation::Horizontal => config.column_stride,
    };
    if raw.is_finite() { raw.max(1.0) } else { 1.0 }
}

pub fn row_origin(config: &LayoutConfig) -> f64 {
    config.lane_header + config.lane_padding
}

/// Cross-axis offset of the lane at `order`: the sum of every earlier lane's
/// thickness plus the fixed gap after each of them.
pub fn position_of_lane(lanes: &[Lane], order: u32, config: &LayoutConfig) -> f64 {
    let mut sorted: Vec<&Lane> = lanes.iter().collect();
    sorted.sort_by_key(|lane| lane.order);
    let mut offset = config.lane_origin;
    for lane in sorted {
        if lane.order >= order {
            break;
        }
        offset += thickness(lane, config) + config.lane_gap;
    }
    offset
}

pub fn lane_geometry(lanes: &[Lane], lane: &Lane, config: &LayoutConfig) -> LaneGeometry {
    LaneGeometry {
        offset: position_of_lane(lanes, lane.order, config),
        thickness: thickness(lane, config),
    }
}

/// Leading edge of a step of `step_size` (measured along the primary axis)
/// centered in cell `row`.
pub fn pixel_from_row(
    row: u32,
    step_size: f64,
    orientation: Orientation,
    config: &LayoutConfig,
) -> f64 {
    let stride = stride(orientation, config);
    row_origin(config) + f64::from(row) * stride + (stride - step_size) / 2.0
}

pub fn row_from_pixel(
    value: f64,
    step_size: f64,
    orientation: Orientation,
    config: &LayoutConfig,
) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let stride = stride(orientation, config);
    let raw = ((value - row_origin(config) - (stride - step_size) / 2.0) / stride).round();
    if raw <= 0.0 {
        0
    } else if raw >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        raw as u32
    }
}

pub fn position_of_step(
    lane: LaneGeometry,
    orientation: Orientation,
    row: u32,
    width: f64,
    height: f64,
    config: &LayoutConfig,
) -> Point {
    match orientation {
        Orientation::Vertical => Point {
            x: lane.offset + (lane.thickness - width) / 2.0,
            y: pixel_from_row(row, height, orientation, config),
        },
        Orientation::Horizontal => Point {
            x: pixel_from_row(row, width, orientation, config),
            y: lane.offset + (lane.thickness - height) / 2.0,
        },
    }
}

/// Primary-axis extent of a lane holding steps at `rows`:
/// `max(min_lane_length, lane_header + 2 * lane_padding + (max_row + 1) * stride)`.
///
/// `lane_header` is counted because [`row_origin`] starts row 0 below the
/// header, so the last row ends `lane_header` further along the lane.
pub fn lane_length<I>(rows: I, orientation: Orientation, config: &LayoutConfig) -> f64
where
    I: IntoIterator<Item = u32>,
{
    let stride = stride(orientation, config);
    let content = rows.into_iter().max().map_or(0.0, |max_row| {
        config.lane_header + config.lane_padding * 2.0 + (f64::from(max_row) + 1.0) * stride
    });
    content.max(config.min_lane_length)
}

/// Lane whose cross-axis span contains `value`, else the one with the nearest center.
pub fn nearest_lane<'a>(lanes: &'a [Lane], value: f64, config: &LayoutConfig) -> Option<&'a Lane> {
    let mut best: Option<(&Lane, f64)> = None;
    for lane in lanes {
        let geometry = lane_geometry(lanes, lane, config);
        if geometry.contains(value) {
            return Some(lane);
        }
        let distance = (geometry.center() - value).abs();
        match best {
            Some((_, current)) if current <= distance => {}
            _ => best = Some((lane, distance)),
        }
    }
    best.map(|(lane, _)| lane)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

/// Overall size: lanes side by side on the cross axis, all stretched to the
/// longest lane on the primary axis.
pub fn diagram_extent(diagram: &Diagram, config: &LayoutConfig) -> Extent {
    let cross = diagram
        .lanes
        .iter()
        .map(|lane| thickness(lane, config))
        .sum::<f64>()
        + config.lane_gap * diagram.lanes.len().saturating_sub(1) as f64
        + config.lane_origin;
    let primary = diagram
        .lanes
        .iter()
        .map(|lane| {
            let rows = diagram
                .steps
                .iter()
                .filter(|step| step.lane_id == lane.id)
                .map(|step| step.order);
            lane_length(rows, diagram.orientation, config)
        })
        .fold(config.min_lane_length, f64::max);
    match diagram.orientation {
        Orientation::Vertical => Extent {
            width: cross,
            height: primary,
        },
        Orientation::Horizontal => Extent {
            width: primary,
            height: cross,
        },
    }
}
